//! Payment Orchestrator Service
//!
//! Drives one transfer from submission to a terminal outcome: blacklist,
//! pending row, fraud screening, route selection, provider execution, terminal
//! row and receipt. Fraud declines and provider failures end the run with a
//! typed [`TransferStatus`]; store failures are logged and flagged on the
//! result without changing it.

use crate::config::ConfigError;
use crate::database::{
    BlacklistStore, NewTransaction, PersistenceStore, RoutingSource, TransactionOutcome,
    TransactionStatus,
};
use crate::error::{AppError, AppErrorKind, DomainError, ErrorCode, ValidationError};
use crate::fraud::{FraudEngine, RiskAction, RiskAssessment, RiskSignal};
use crate::logging::mask_identity;
use crate::payments::{
    PaymentError, PaymentInstruction, ProviderProfile, ProviderRegistry, TransferRequest,
};
use crate::routing::{RouteRequest, RoutingCandidate, RoutingEngine, RoutingResult};
use crate::services::receipt::{ReceiptSink, TransactionSummary};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Configuration Types
// ============================================================================

/// What to do with a transfer whose risk action is `VERIFY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Log and continue to routing.
    #[default]
    PassThrough,
    /// Stop as declined with `verification_required` set.
    Hold,
}

impl FromStr for VerifyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass_through" | "passthrough" => Ok(VerifyPolicy::PassThrough),
            "hold" => Ok(VerifyPolicy::Hold),
            other => Err(ConfigError::InvalidValue(format!("VERIFY_POLICY={}", other))),
        }
    }
}

impl VerifyPolicy {
    /// Whether a transfer with this risk action proceeds past the fraud check.
    pub fn admits(self, action: RiskAction) -> bool {
        match action {
            RiskAction::Approve => true,
            RiskAction::Verify => self == VerifyPolicy::PassThrough,
            RiskAction::Decline => false,
        }
    }
}

/// Configuration for the payment orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on a single provider call
    pub provider_timeout: Duration,
    pub verify_policy: VerifyPolicy,
    /// Retry a failed automatic route on the next-ranked providers
    pub failover_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(30),
            verify_policy: VerifyPolicy::PassThrough,
            failover_enabled: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let provider_timeout = match std::env::var("PROVIDER_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue("PROVIDER_TIMEOUT_MS".to_string()))?,
            ),
            Err(_) => defaults.provider_timeout,
        };
        let verify_policy = match std::env::var("VERIFY_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.verify_policy,
        };
        let failover_enabled = std::env::var("FAILOVER_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("FAILOVER_ENABLED".to_string()))?;

        Ok(Self {
            provider_timeout,
            verify_policy,
            failover_enabled,
        })
    }
}

// ============================================================================
// Transaction State Machine Types
// ============================================================================

/// Orchestrator pipeline state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    Created,
    BlacklistCheck,
    /// Pending row written
    Pending,
    FraudCheck,
    RouteSelection,
    ProviderExecution,
    PersistComplete,
    /// Best-effort receipt
    Receipt,
    Completed,
    Declined,
    Failed,
}

impl std::fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OrchestrationState::Created => "created",
            OrchestrationState::BlacklistCheck => "blacklist_check",
            OrchestrationState::Pending => "pending",
            OrchestrationState::FraudCheck => "fraud_check",
            OrchestrationState::RouteSelection => "route_selection",
            OrchestrationState::ProviderExecution => "provider_execution",
            OrchestrationState::PersistComplete => "persist_complete",
            OrchestrationState::Receipt => "receipt",
            OrchestrationState::Completed => "completed",
            OrchestrationState::Declined => "declined",
            OrchestrationState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

impl OrchestrationState {
    /// Get all valid transitions from this state
    pub fn valid_transitions(&self) -> Vec<OrchestrationState> {
        match self {
            OrchestrationState::Created => vec![OrchestrationState::BlacklistCheck],
            OrchestrationState::BlacklistCheck => vec![
                OrchestrationState::Pending,
                OrchestrationState::Declined,
                OrchestrationState::Failed,
            ],
            OrchestrationState::Pending => vec![OrchestrationState::FraudCheck],
            OrchestrationState::FraudCheck => vec![
                OrchestrationState::RouteSelection,
                OrchestrationState::Declined,
                OrchestrationState::Failed,
            ],
            OrchestrationState::RouteSelection => vec![
                OrchestrationState::ProviderExecution,
                OrchestrationState::Failed,
            ],
            OrchestrationState::ProviderExecution => vec![
                OrchestrationState::PersistComplete,
                OrchestrationState::Failed,
            ],
            OrchestrationState::PersistComplete => vec![OrchestrationState::Receipt],
            OrchestrationState::Receipt => vec![OrchestrationState::Completed],
            // Terminal states - no valid transitions
            OrchestrationState::Completed
            | OrchestrationState::Declined
            | OrchestrationState::Failed => vec![],
        }
    }

    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationState::Completed
                | OrchestrationState::Declined
                | OrchestrationState::Failed
        )
    }
}

/// Terminal status reported to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Completed,
    Declined,
    Failed,
}

impl TransferStatus {
    fn from_state(state: OrchestrationState) -> Option<Self> {
        match state {
            OrchestrationState::Completed => Some(TransferStatus::Completed),
            OrchestrationState::Declined => Some(TransferStatus::Declined),
            OrchestrationState::Failed => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn transaction_status(&self) -> TransactionStatus {
        match self {
            TransferStatus::Completed => TransactionStatus::Completed,
            TransferStatus::Declined => TransactionStatus::Declined,
            TransferStatus::Failed => TransactionStatus::Failed,
        }
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// A runner-up route shown next to the chosen one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteAlternative {
    pub provider: String,
    pub weighted_score: f64,
    /// Positive when the alternative would have cost more.
    pub cost_difference: f64,
}

/// One call to a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderAttempt {
    pub provider: String,
    pub success: bool,
    pub latency_ms: f64,
    pub provider_transaction_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    /// Absent only when the run ended before the pending row step.
    pub transaction_id: Option<Uuid>,
    pub status: TransferStatus,
    pub provider_transaction_id: Option<String>,
    pub selected_provider: Option<String>,
    pub routing_source: Option<RoutingSource>,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub fx_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub risk: Option<RiskAssessment>,
    pub alternatives: Vec<RouteAlternative>,
    pub attempts: Vec<ProviderAttempt>,
    pub error: Option<String>,
    /// Set when the run stopped on a business rule.
    pub error_code: Option<ErrorCode>,
    pub verification_required: bool,
    /// Some store write failed; the stored row may lag this result.
    pub persistence_degraded: bool,
    pub receipt_saved: bool,
    pub state_trail: Vec<OrchestrationState>,
    pub completed_at: DateTime<Utc>,
}

impl TransferResult {
    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// Provider health derived from registry metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ProviderHealth {
    pub fn from_profile(profile: &ProviderProfile) -> Self {
        if !profile.is_active || profile.success_rate < 70.0 {
            ProviderHealth::Unhealthy
        } else if profile.success_rate < 85.0 {
            ProviderHealth::Degraded
        } else {
            ProviderHealth::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthReport {
    pub profile: ProviderProfile,
    pub health: ProviderHealth,
}

// ============================================================================
// Orchestrator Error Types
// ============================================================================

/// Faults that stop a run before it can produce a [`TransferResult`].
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid transfer request: {0}")]
    InvalidRequest(PaymentError),

    #[error("invalid state transition from {current} to {target}")]
    InvalidStateTransition {
        current: OrchestrationState,
        target: OrchestrationState,
    },
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::InvalidRequest(payment) => payment.into(),
            OrchestratorError::InvalidStateTransition { .. } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidField {
                    field: "state".to_string(),
                    reason: err.to_string(),
                }))
            }
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// ============================================================================
// Clock
// ============================================================================

/// Source of the timestamp fraud rules see.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Run context
// ============================================================================

/// Accumulates what one run has learned while it moves through the states.
struct Run {
    state: OrchestrationState,
    trail: Vec<OrchestrationState>,
    started_at: DateTime<Utc>,
    row_id: Option<Uuid>,
    transaction_id: Option<Uuid>,
    risk: Option<RiskAssessment>,
    candidate: Option<RoutingCandidate>,
    routing_source: Option<RoutingSource>,
    alternatives: Vec<RouteAlternative>,
    attempts: Vec<ProviderAttempt>,
    provider_transaction_id: Option<String>,
    error: Option<String>,
    error_code: Option<ErrorCode>,
    verification_required: bool,
    persistence_degraded: bool,
    receipt_saved: bool,
}

impl Run {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: OrchestrationState::Created,
            trail: vec![OrchestrationState::Created],
            started_at,
            row_id: None,
            transaction_id: None,
            risk: None,
            candidate: None,
            routing_source: None,
            alternatives: Vec::new(),
            attempts: Vec::new(),
            provider_transaction_id: None,
            error: None,
            error_code: None,
            verification_required: false,
            persistence_degraded: false,
            receipt_saved: false,
        }
    }

    fn reject(&mut self, err: AppError) {
        self.error_code = Some(err.error_code());
        self.error = Some(err.user_message());
    }

    fn advance(&mut self, target: OrchestrationState) -> OrchestratorResult<()> {
        if !self.state.valid_transitions().contains(&target) {
            return Err(OrchestratorError::InvalidStateTransition {
                current: self.state,
                target,
            });
        }
        self.state = target;
        self.trail.push(target);
        Ok(())
    }

    fn total_cost(&self) -> Option<Decimal> {
        self.candidate.as_ref().map(|c| c.commission + c.fx_cost)
    }

    fn outcome(&self, status: TransactionStatus) -> TransactionOutcome {
        let mut outcome = TransactionOutcome::new(status);
        if let Some(risk) = &self.risk {
            outcome.fraud_score = Some(risk.score);
            outcome.fraud_level = Some(risk.level);
        }
        if let Some(candidate) = &self.candidate {
            outcome.selected_provider = Some(candidate.provider.clone());
            outcome.exchange_rate = Some(candidate.exchange_rate);
            outcome.commission = Some(candidate.commission);
            outcome.fx_cost = Some(candidate.fx_cost);
            outcome.total_cost = self.total_cost();
        }
        outcome.routing_source = self.routing_source;
        outcome.provider_transaction_id = self.provider_transaction_id.clone();
        outcome.error_message = self.error.clone();
        outcome
    }

    fn into_result(self, request: &TransferRequest) -> OrchestratorResult<TransferResult> {
        let status = TransferStatus::from_state(self.state).ok_or(
            OrchestratorError::InvalidStateTransition {
                current: self.state,
                target: OrchestrationState::Completed,
            },
        )?;
        let total_cost = self.total_cost();
        let candidate = self.candidate;

        Ok(TransferResult {
            transaction_id: self.transaction_id,
            status,
            provider_transaction_id: self.provider_transaction_id,
            selected_provider: candidate.as_ref().map(|c| c.provider.clone()),
            routing_source: self.routing_source,
            amount: request.amount,
            from_currency: request.from_currency.to_uppercase(),
            to_currency: request.to_currency.to_uppercase(),
            exchange_rate: candidate.as_ref().map(|c| c.exchange_rate),
            commission: candidate.as_ref().map(|c| c.commission),
            fx_cost: candidate.as_ref().map(|c| c.fx_cost),
            total_cost,
            risk: self.risk,
            alternatives: self.alternatives,
            attempts: self.attempts,
            error: self.error,
            error_code: self.error_code,
            verification_required: self.verification_required,
            persistence_degraded: self.persistence_degraded,
            receipt_saved: self.receipt_saved,
            state_trail: self.trail,
            completed_at: Utc::now(),
        })
    }
}

// ============================================================================
// Main Payment Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    config: OrchestratorConfig,
    fraud: Arc<FraudEngine>,
    routing: Arc<RoutingEngine>,
    blacklist: Arc<dyn BlacklistStore>,
    store: Arc<dyn PersistenceStore>,
    receipts: Arc<dyn ReceiptSink>,
    clock: Arc<dyn Clock>,
}

impl PaymentOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        fraud: Arc<FraudEngine>,
        routing: Arc<RoutingEngine>,
        blacklist: Arc<dyn BlacklistStore>,
        store: Arc<dyn PersistenceStore>,
        receipts: Arc<dyn ReceiptSink>,
    ) -> Self {
        Self {
            config,
            fraud,
            routing,
            blacklist,
            store,
            receipts,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn registry(&self) -> &Arc<ProviderRegistry> {
        self.routing.registry()
    }

    /// Run a transfer to a terminal status.
    ///
    /// Only a malformed request is returned as an error; every other outcome,
    /// including store and provider faults, comes back as a [`TransferResult`].
    pub async fn initiate_transfer(
        &self,
        request: TransferRequest,
    ) -> OrchestratorResult<TransferResult> {
        request.validate().map_err(OrchestratorError::InvalidRequest)?;

        let now = self.clock.now();
        let mut run = Run::new(now);

        // Blacklist
        run.advance(OrchestrationState::BlacklistCheck)?;
        match self.blacklist.is_blocked(&request.sender_identity).await {
            Ok(false) => {}
            Ok(true) => {
                warn!(
                    sender = %mask_identity(&request.sender_identity),
                    "transfer blocked: sender is blacklisted"
                );
                run.reject(AppError::new(AppErrorKind::Domain(DomainError::TransferBlocked {
                    reason: "sender is blacklisted".to_string(),
                })));
                return self.conclude(run, OrchestrationState::Declined, &request).await;
            }
            Err(err) => {
                error!(error = %err, "blacklist lookup failed, refusing transfer");
                run.error = Some(format!("blacklist unavailable: {}", err));
                return self.conclude(run, OrchestrationState::Failed, &request).await;
            }
        }

        // Pending row
        run.advance(OrchestrationState::Pending)?;
        match self
            .store
            .create_pending_transaction(NewTransaction::from_transfer(&request))
            .await
        {
            Ok(id) => {
                run.row_id = Some(id);
                run.transaction_id = Some(id);
            }
            Err(err) => {
                warn!(
                    target: "PersistenceWarning",
                    error = %err,
                    sender_id = %request.sender_id,
                    "failed to persist pending transaction, continuing"
                );
                run.persistence_degraded = true;
                run.transaction_id = Some(Uuid::new_v4());
            }
        }

        // Fraud
        run.advance(OrchestrationState::FraudCheck)?;
        let signal = RiskSignal::from_transfer(&request, now);
        let policy = self.config.verify_policy;
        let assessment = match self
            .fraud
            .screen_with(&signal, |assessment| policy.admits(assessment.action))
            .await
        {
            Ok(assessment) => assessment,
            Err(err) => {
                error!(error = %err, sender_id = %request.sender_id, "risk screening failed");
                run.error = Some(format!("risk screening unavailable: {}", err));
                return self.conclude(run, OrchestrationState::Failed, &request).await;
            }
        };
        let action = assessment.action;
        run.risk = Some(assessment);

        match action {
            RiskAction::Approve => {}
            RiskAction::Decline => {
                run.error = Some("transfer declined by risk assessment".to_string());
                return self.conclude(run, OrchestrationState::Declined, &request).await;
            }
            RiskAction::Verify => match self.config.verify_policy {
                VerifyPolicy::PassThrough => {
                    info!(sender_id = %request.sender_id, "risk action VERIFY, continuing");
                }
                VerifyPolicy::Hold => {
                    run.verification_required = true;
                    run.error = Some("additional verification required".to_string());
                    return self.conclude(run, OrchestrationState::Declined, &request).await;
                }
            },
        }

        // Route
        run.advance(OrchestrationState::RouteSelection)?;
        let route_request = RouteRequest::from_transfer(&request);
        let routing = match self.routing.select_optimal(&route_request).await {
            Ok(routing) => routing,
            Err(err) => {
                run.reject(err.into());
                return self.conclude(run, OrchestrationState::Failed, &request).await;
            }
        };
        run.alternatives = routing
            .alternatives
            .iter()
            .take(2)
            .map(|alt| RouteAlternative {
                provider: alt.provider.clone(),
                weighted_score: alt.weighted_score,
                cost_difference: routing.cost_difference(alt),
            })
            .collect();

        let (first, source) = match request.preferred_provider.as_deref() {
            Some(pinned) => match self.pinned_candidate(&routing, pinned, &route_request).await {
                Ok(candidate) => (candidate, RoutingSource::Manual),
                Err(err) => {
                    warn!(provider = %pinned, reason = ?err, "pinned provider rejected");
                    run.reject(AppError::new(AppErrorKind::Domain(err)));
                    return self.conclude(run, OrchestrationState::Failed, &request).await;
                }
            },
            None => (routing.optimal.clone(), RoutingSource::Automatic),
        };
        run.routing_source = Some(source);

        // Provider
        run.advance(OrchestrationState::ProviderExecution)?;
        let transaction_id = run.transaction_id.unwrap_or_else(Uuid::new_v4);
        let mut candidate = first;
        loop {
            let attempt = self.execute(&candidate, &request, transaction_id).await;
            let success = attempt.success;
            run.provider_transaction_id = attempt.provider_transaction_id.clone();
            run.error = attempt.error.clone();
            run.attempts.push(attempt);
            run.candidate = Some(candidate.clone());

            if success {
                break;
            }

            let next = if source == RoutingSource::Automatic && self.config.failover_enabled {
                routing.next_alternative(&candidate.provider).cloned()
            } else {
                None
            };
            match next {
                Some(alternative) => {
                    warn!(
                        failed = %candidate.provider,
                        next = %alternative.provider,
                        "failing over to next provider"
                    );
                    candidate = alternative;
                }
                None => {
                    return self.conclude(run, OrchestrationState::Failed, &request).await;
                }
            }
        }
        run.error = None;

        // Completed row
        run.advance(OrchestrationState::PersistComplete)?;
        self.persist_outcome(&mut run, TransactionStatus::Completed).await;

        // Receipt
        run.advance(OrchestrationState::Receipt)?;
        if let Some(candidate) = &run.candidate {
            let summary = TransactionSummary {
                transaction_id,
                provider_transaction_id: run.provider_transaction_id.clone(),
                selected_provider: candidate.provider.clone(),
                amount: request.amount,
                from_currency: request.from_currency.to_uppercase(),
                to_currency: request.to_currency.to_uppercase(),
                exchange_rate: candidate.exchange_rate,
                commission: candidate.commission,
                fx_cost: candidate.fx_cost,
                sender_identity: mask_identity(&request.sender_identity),
                recipient_name: request.recipient_name.clone(),
                status: TransactionStatus::Completed.as_str().to_string(),
                created_at: run.started_at,
            };
            match self.receipts.save(&summary).await {
                Ok(()) => run.receipt_saved = true,
                Err(err) => {
                    warn!(transaction_id = %transaction_id, error = %err, "receipt generation failed, continuing");
                }
            }
        }

        run.advance(OrchestrationState::Completed)?;
        info!(
            transaction_id = %transaction_id,
            provider = ?run.candidate.as_ref().map(|c| c.provider.as_str()),
            attempts = run.attempts.len(),
            "transfer completed"
        );
        run.into_result(&request)
    }

    /// Check a sender-pinned provider and find its quote in `routing`.
    async fn pinned_candidate(
        &self,
        routing: &RoutingResult,
        pinned: &str,
        request: &RouteRequest,
    ) -> Result<RoutingCandidate, DomainError> {
        let not_eligible = |provider: &str, reason: String| DomainError::ProviderNotEligible {
            provider: provider.to_string(),
            reason,
        };
        let provider = self
            .registry()
            .get(pinned)
            .await
            .ok_or_else(|| not_eligible(pinned, "not registered".to_string()))?;
        if !provider.is_active().await {
            return Err(not_eligible(provider.name(), "not active".to_string()));
        }
        if !provider.adapter().supports_currency(&request.to_currency) {
            return Err(not_eligible(
                provider.name(),
                format!("does not support {}", request.to_currency),
            ));
        }
        routing.candidate(provider.name()).cloned().ok_or_else(|| {
            not_eligible(provider.name(), "could not quote this route".to_string())
        })
    }

    /// Call the provider once under the configured timeout and record metrics.
    async fn execute(
        &self,
        candidate: &RoutingCandidate,
        request: &TransferRequest,
        transaction_id: Uuid,
    ) -> ProviderAttempt {
        let Some(provider) = self.registry().get(&candidate.provider).await else {
            return ProviderAttempt {
                provider: candidate.provider.clone(),
                success: false,
                latency_ms: 0.0,
                provider_transaction_id: None,
                error: Some(
                    PaymentError::UnknownProvider {
                        name: candidate.provider.clone(),
                    }
                    .to_string(),
                ),
            };
        };

        let instruction = PaymentInstruction {
            transaction_id,
            sender_id: request.sender_id.clone(),
            recipient_id: request.recipient_id.clone(),
            recipient_name: request.recipient_name.clone(),
            amount: request.amount,
            from_currency: request.from_currency.to_uppercase(),
            to_currency: request.to_currency.to_uppercase(),
            exchange_rate: candidate.exchange_rate,
            card_token: request.card_token.clone(),
            description: request.description.clone(),
        };

        let started = Instant::now();
        let call = tokio::time::timeout(
            self.config.provider_timeout,
            provider.adapter().process_payment(&instruction),
        )
        .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (provider_transaction_id, error) = match call {
            Ok(Ok(outcome)) if outcome.success => (outcome.provider_transaction_id, None),
            Ok(Ok(outcome)) => (
                None,
                Some(
                    PaymentError::PaymentDeclinedError {
                        message: outcome
                            .message
                            .unwrap_or_else(|| "declined by provider".to_string()),
                        provider_code: None,
                    }
                    .to_string(),
                ),
            ),
            Ok(Err(err)) => (None, Some(err.to_string())),
            Err(_) => (
                None,
                Some(
                    PaymentError::Timeout {
                        provider: candidate.provider.clone(),
                        timeout_ms: self.config.provider_timeout.as_millis() as u64,
                    }
                    .to_string(),
                ),
            ),
        };
        let success = error.is_none();

        if let Err(err) = self
            .registry()
            .update_metrics(&candidate.provider, latency_ms, success, request.amount)
            .await
        {
            warn!(provider = %candidate.provider, error = %err, "failed to update provider metrics");
        }

        if let Some(message) = &error {
            warn!(
                transaction_id = %transaction_id,
                provider = %candidate.provider,
                latency_ms,
                error = %message,
                "provider attempt failed"
            );
        }

        ProviderAttempt {
            provider: candidate.provider.clone(),
            success,
            latency_ms,
            provider_transaction_id,
            error,
        }
    }

    async fn persist_outcome(&self, run: &mut Run, status: TransactionStatus) {
        let Some(id) = run.row_id else {
            return;
        };
        if let Err(err) = self.store.update_transaction_outcome(id, run.outcome(status)).await {
            warn!(
                target: "PersistenceWarning",
                transaction_id = %id,
                status = %status,
                error = %err,
                "failed to persist transaction outcome, continuing"
            );
            run.persistence_degraded = true;
        }
    }

    /// Move to a declined or failed state, write it, and build the result.
    async fn conclude(
        &self,
        mut run: Run,
        terminal: OrchestrationState,
        request: &TransferRequest,
    ) -> OrchestratorResult<TransferResult> {
        run.advance(terminal)?;
        if let Some(status) = TransferStatus::from_state(terminal) {
            self.persist_outcome(&mut run, status.transaction_status()).await;
        }
        info!(
            transaction_id = ?run.transaction_id,
            status = %terminal,
            reason = ?run.error,
            "transfer finished"
        );
        run.into_result(request)
    }

    /// Metrics and derived health for every registered provider.
    pub async fn provider_health(&self) -> Vec<ProviderHealthReport> {
        self.registry()
            .snapshot()
            .await
            .into_iter()
            .map(|profile| ProviderHealthReport {
                health: ProviderHealth::from_profile(&profile),
                profile,
            })
            .collect()
    }

    /// Drop the user's risk history, as on logout.
    pub async fn clear_user_session(&self, user_id: &str) -> Result<(), AppError> {
        self.fraud.clear_user_history(user_id).await?;
        info!(user_id = %user_id, "user session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{InMemoryBlacklist, InMemoryTransactionStore};
    use crate::fraud::{FraudConfig, InMemoryRiskHistoryStore};
    use crate::payments::providers::{ProviderSpec, SandboxOutcome, SandboxProvider};
    use crate::services::receipt::MemoryReceiptSink;
    use chrono::TimeZone;

    struct NoonClock;

    impl Clock for NoonClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        }
    }

    struct Harness {
        orchestrator: PaymentOrchestrator,
        store: Arc<InMemoryTransactionStore>,
        blacklist: Arc<InMemoryBlacklist>,
        stripe: Arc<SandboxProvider>,
    }

    async fn harness(config: OrchestratorConfig) -> Harness {
        let registry = Arc::new(ProviderRegistry::new());
        let stripe = Arc::new(SandboxProvider::new(ProviderSpec::stripe()));
        registry.register(stripe.clone()).await.unwrap();

        let store = Arc::new(InMemoryTransactionStore::new());
        let blacklist = Arc::new(InMemoryBlacklist::new());
        let fraud = Arc::new(FraudEngine::new(
            FraudConfig::default(),
            Arc::new(InMemoryRiskHistoryStore::default()),
        ));
        let orchestrator = PaymentOrchestrator::new(
            config,
            fraud,
            Arc::new(RoutingEngine::new(registry)),
            blacklist.clone(),
            store.clone(),
            Arc::new(MemoryReceiptSink::new()),
        )
        .with_clock(Arc::new(NoonClock));

        Harness {
            orchestrator,
            store,
            blacklist,
            stripe,
        }
    }

    fn request() -> TransferRequest {
        TransferRequest {
            sender_id: "user-1".to_string(),
            sender_identity: "user1@example.com".to_string(),
            recipient_id: "user-2".to_string(),
            recipient_name: "Bob".to_string(),
            amount: Decimal::new(100, 0),
            from_currency: "USD".to_string(),
            to_currency: "USD".to_string(),
            sender_country: "US".to_string(),
            recipient_country: "US".to_string(),
            mode: Default::default(),
            preferred_provider: None,
            ip_address: "10.0.0.1".to_string(),
            device_id: "device-1".to_string(),
            card_token: None,
            description: String::new(),
        }
    }

    #[test]
    fn test_state_transitions_valid() {
        assert!(OrchestrationState::Created
            .valid_transitions()
            .contains(&OrchestrationState::BlacklistCheck));
        assert!(OrchestrationState::FraudCheck
            .valid_transitions()
            .contains(&OrchestrationState::Declined));
        assert!(!OrchestrationState::Pending
            .valid_transitions()
            .contains(&OrchestrationState::ProviderExecution));
    }

    #[test]
    fn test_terminal_states() {
        for state in [
            OrchestrationState::Completed,
            OrchestrationState::Declined,
            OrchestrationState::Failed,
        ] {
            assert!(state.is_terminal());
            assert!(state.valid_transitions().is_empty());
        }
        assert!(!OrchestrationState::Receipt.is_terminal());
    }

    #[test]
    fn test_run_rejects_skipped_state() {
        let mut run = Run::new(Utc::now());
        let err = run.advance(OrchestrationState::RouteSelection).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidStateTransition {
                current: OrchestrationState::Created,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_policy_admission() {
        for policy in [VerifyPolicy::PassThrough, VerifyPolicy::Hold] {
            assert!(policy.admits(RiskAction::Approve));
            assert!(!policy.admits(RiskAction::Decline));
        }
        assert!(VerifyPolicy::PassThrough.admits(RiskAction::Verify));
        assert!(!VerifyPolicy::Hold.admits(RiskAction::Verify));
    }

    #[test]
    fn test_verify_policy_parsing() {
        assert_eq!("hold".parse::<VerifyPolicy>().unwrap(), VerifyPolicy::Hold);
        assert_eq!(
            "pass_through".parse::<VerifyPolicy>().unwrap(),
            VerifyPolicy::PassThrough
        );
        assert!("maybe".parse::<VerifyPolicy>().is_err());
    }

    #[tokio::test]
    async fn completed_run_walks_every_state() {
        let h = harness(OrchestratorConfig::default()).await;
        let result = h.orchestrator.initiate_transfer(request()).await.unwrap();

        assert_eq!(result.status, TransferStatus::Completed);
        assert_eq!(result.selected_provider.as_deref(), Some("Stripe"));
        assert_eq!(result.routing_source, Some(RoutingSource::Automatic));
        assert!(result.receipt_saved);
        assert_eq!(
            result.state_trail,
            vec![
                OrchestrationState::Created,
                OrchestrationState::BlacklistCheck,
                OrchestrationState::Pending,
                OrchestrationState::FraudCheck,
                OrchestrationState::RouteSelection,
                OrchestrationState::ProviderExecution,
                OrchestrationState::PersistComplete,
                OrchestrationState::Receipt,
                OrchestrationState::Completed,
            ]
        );

        let row = h
            .store
            .find_by_id(result.transaction_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status(), Some(TransactionStatus::Completed));
        assert_eq!(row.selected_psp.as_deref(), Some("Stripe"));
    }

    #[tokio::test]
    async fn blacklisted_sender_never_gets_a_row() {
        let h = harness(OrchestratorConfig::default()).await;
        h.blacklist.add("user1@example.com").await;

        let result = h.orchestrator.initiate_transfer(request()).await.unwrap();

        assert_eq!(result.status, TransferStatus::Declined);
        assert!(result.risk.is_none());
        assert!(result.transaction_id.is_none());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn provider_timeout_fails_the_transfer() {
        let h = harness(OrchestratorConfig {
            provider_timeout: Duration::from_millis(20),
            ..OrchestratorConfig::default()
        })
        .await;
        h.stripe
            .push_outcomes([SandboxOutcome::Delay(Duration::from_secs(5))])
            .await;

        let result = h.orchestrator.initiate_transfer(request()).await.unwrap();

        assert_eq!(result.status, TransferStatus::Failed);
        assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
        let profile = h.orchestrator.provider_health().await.remove(0).profile;
        assert_eq!(profile.failed_attempts, 1);
    }

    #[tokio::test]
    async fn invalid_request_is_an_error() {
        let h = harness(OrchestratorConfig::default()).await;
        let mut bad = request();
        bad.amount = Decimal::ZERO;
        let err = h.orchestrator.initiate_transfer(bad).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    }

    #[test]
    fn test_health_thresholds() {
        let mut profile = ProviderProfile {
            name: "Wise".to_string(),
            supported_currencies: vec!["USD".to_string()],
            priority: 90,
            is_active: true,
            avg_latency_ms: 300.0,
            success_rate: 100.0,
            total_attempts: 0,
            successful_attempts: 0,
            failed_attempts: 0,
            total_volume: Decimal::ZERO,
        };
        assert_eq!(ProviderHealth::from_profile(&profile), ProviderHealth::Healthy);
        profile.success_rate = 80.0;
        assert_eq!(ProviderHealth::from_profile(&profile), ProviderHealth::Degraded);
        profile.success_rate = 60.0;
        assert_eq!(ProviderHealth::from_profile(&profile), ProviderHealth::Unhealthy);
        profile.success_rate = 100.0;
        profile.is_active = false;
        assert_eq!(ProviderHealth::from_profile(&profile), ProviderHealth::Unhealthy);
    }
}
