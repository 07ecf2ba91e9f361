use crate::payments::{OptimizationMode, ProviderRegistry, RegisteredProvider};
use crate::routing::fees::{CostComponents, FxMarkupTable};
use crate::routing::geo::GeoTable;
use crate::routing::types::{RouteRequest, RouteResult, RoutingCandidate, RoutingError, RoutingResult};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ranks registered providers for a route by cost, latency and reliability.
pub struct RoutingEngine {
    registry: Arc<ProviderRegistry>,
    geo: GeoTable,
    fx_markups: FxMarkupTable,
}

impl RoutingEngine {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_tables(registry, GeoTable::standard(), FxMarkupTable::standard())
    }

    pub fn with_tables(
        registry: Arc<ProviderRegistry>,
        geo: GeoTable,
        fx_markups: FxMarkupTable,
    ) -> Self {
        Self {
            registry,
            geo,
            fx_markups,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub async fn select_optimal(&self, request: &RouteRequest) -> RouteResult<RoutingResult> {
        let mut candidates = Vec::new();
        for provider in self.registry.active_providers().await {
            if !provider.adapter().supports_currency(&request.to_currency) {
                continue;
            }
            if let Some(candidate) = self.price(&provider, request).await {
                candidates.push(candidate);
            }
        }

        rank(&mut candidates);

        let mut ranked = candidates.into_iter();
        let Some(optimal) = ranked.next() else {
            warn!(
                from = %request.from_currency,
                to = %request.to_currency,
                "no provider available for route"
            );
            return Err(RoutingError::NoProviderAvailable {
                currency: request.to_currency.clone(),
            });
        };
        let rest: Vec<RoutingCandidate> = ranked.collect();
        let alternatives = rest.iter().take(3).cloned().collect();
        let mut all_candidates = Vec::with_capacity(rest.len() + 1);
        all_candidates.push(optimal.clone());
        all_candidates.extend(rest);

        info!(
            provider = %optimal.provider,
            weighted_score = optimal.weighted_score,
            candidates = all_candidates.len(),
            mode = %request.mode,
            "optimal route selected"
        );

        Ok(RoutingResult {
            optimal,
            alternatives,
            all_candidates,
            mode: request.mode,
            analyzed_at: Utc::now(),
        })
    }

    /// Quote one provider, or `None` when its rate feed fails.
    pub async fn price(
        &self,
        provider: &RegisteredProvider,
        request: &RouteRequest,
    ) -> Option<RoutingCandidate> {
        let adapter = provider.adapter();
        let exchange_rate = match adapter
            .get_exchange_rate(&request.from_currency, &request.to_currency)
            .await
        {
            Ok(rate) => rate,
            Err(err) => {
                warn!(
                    provider = %adapter.name(),
                    error = %err,
                    "exchange rate unavailable, skipping provider"
                );
                return None;
            }
        };

        let profile = provider.profile().await;
        let costs = CostComponents::price(
            request.amount,
            adapter.commission_rule(&request.from_currency),
            self.fx_markups.fx_cost(
                request.amount,
                &request.from_currency,
                &request.to_currency,
                exchange_rate,
            ),
            &profile,
        );
        let base_score = costs.base_score();
        let geo_adjustment = self.geo.adjustment(
            adapter.name(),
            &request.source_country,
            &request.dest_country,
            request.amount.to_f64().unwrap_or(0.0),
        );
        let adjusted_score = base_score + geo_adjustment;
        let weighted_score = apply_mode_weighting(request.mode, adjusted_score, &costs, base_score);

        debug!(
            provider = %adapter.name(),
            base_score,
            geo_adjustment,
            weighted_score,
            "provider priced"
        );

        Some(RoutingCandidate {
            provider: adapter.name().to_string(),
            priority: profile.priority,
            exchange_rate,
            recommendation: recommendation(adapter.name(), &costs, base_score),
            commission: costs.commission,
            fx_cost: costs.fx_cost,
            latency_penalty: costs.latency_penalty,
            risk_penalty: costs.risk_penalty,
            base_score,
            geo_adjustment,
            adjusted_score,
            weighted_score,
        })
    }
}

pub fn apply_mode_weighting(
    mode: OptimizationMode,
    adjusted_score: f64,
    costs: &CostComponents,
    base_score: f64,
) -> f64 {
    match mode {
        OptimizationMode::Cheap => adjusted_score * 1.5,
        OptimizationMode::Fast => costs.latency_penalty * 2.5 + base_score * 0.3,
        OptimizationMode::Balanced => adjusted_score,
    }
}

/// Ascending weighted score; ties go to higher priority, then name.
fn rank(candidates: &mut [RoutingCandidate]) {
    candidates.sort_by(|a, b| {
        a.weighted_score
            .partial_cmp(&b.weighted_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.priority.cmp(&a.priority))
            .then_with(|| a.provider.cmp(&b.provider))
    });
}

pub fn recommendation(provider: &str, costs: &CostComponents, base_score: f64) -> String {
    match provider {
        "Wise" => format!(
            "Best for international transfers. Low FX markup ({:.2} FX cost). Fast processing.",
            costs.fx_cost
        ),
        "Iyzico" => format!(
            "Optimized for Turkish market. Best commission rates for TRY ({:.2}). Fastest local processing.",
            costs.commission
        ),
        "Stripe" => format!(
            "Reliable card processor. Standard fees ({:.2}). Industry standard uptime.",
            costs.commission
        ),
        "PayPal" => {
            "Universal payment solution. Wide currency support. Covers most use cases.".to_string()
        }
        other => format!(
            "Selected: {}. Total estimated cost: {:.2}",
            other, base_score
        ),
    }
}
