use crate::payments::{OptimizationMode, TransferRequest};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no active provider supports {currency}")]
    NoProviderAvailable { currency: String },
}

pub type RouteResult<T> = Result<T, RoutingError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    /// ISO country codes used for corridor preferences.
    pub source_country: String,
    pub dest_country: String,
    pub mode: OptimizationMode,
}

impl RouteRequest {
    pub fn from_transfer(request: &TransferRequest) -> Self {
        Self {
            amount: request.amount,
            from_currency: request.from_currency.to_uppercase(),
            to_currency: request.to_currency.to_uppercase(),
            source_country: request.sender_country.to_uppercase(),
            dest_country: request.recipient_country.to_uppercase(),
            mode: request.mode,
        }
    }
}

/// One provider's priced quote for a route. Lower scores are better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingCandidate {
    pub provider: String,
    pub priority: u32,
    pub exchange_rate: Decimal,
    pub commission: Decimal,
    pub fx_cost: Decimal,
    pub latency_penalty: f64,
    pub risk_penalty: f64,
    /// commission + fx_cost + latency_penalty + risk_penalty
    pub base_score: f64,
    pub geo_adjustment: f64,
    pub adjusted_score: f64,
    pub weighted_score: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    pub optimal: RoutingCandidate,
    /// Up to three next-best candidates, best first.
    pub alternatives: Vec<RoutingCandidate>,
    pub all_candidates: Vec<RoutingCandidate>,
    pub mode: OptimizationMode,
    pub analyzed_at: DateTime<Utc>,
}

impl RoutingResult {
    pub fn candidate(&self, provider: &str) -> Option<&RoutingCandidate> {
        self.all_candidates
            .iter()
            .find(|c| c.provider.eq_ignore_ascii_case(provider))
    }

    /// Next-ranked candidate after `failed`, for retrying a failed provider.
    pub fn next_alternative(&self, failed: &str) -> Option<&RoutingCandidate> {
        let position = self
            .all_candidates
            .iter()
            .position(|c| c.provider.eq_ignore_ascii_case(failed))?;
        self.all_candidates.get(position + 1)
    }

    /// Weighted-score gap between the optimal pick and `candidate`.
    pub fn cost_difference(&self, candidate: &RoutingCandidate) -> f64 {
        candidate.weighted_score - self.optimal.weighted_score
    }
}
