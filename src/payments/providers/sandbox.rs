//! Deterministic in-process provider used for local runs and tests.
//!
//! Outcomes are scripted up front; with an empty script every payment is
//! approved unless it carries the declined-card sentinel.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::ProviderAdapter;
use crate::payments::providers::catalog::ProviderSpec;
use crate::payments::types::{CommissionTable, PaymentInstruction, PaymentOutcome};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Card token that every sandbox provider declines.
pub const DECLINED_TEST_CARD: &str = "4000000000000002";

#[derive(Debug, Clone)]
pub enum SandboxOutcome {
    Approve,
    Decline { reason: String },
    Fail(PaymentError),
    /// Wait before approving; combine with a short provider timeout to simulate a hang.
    Delay(Duration),
}

pub struct SandboxProvider {
    spec: ProviderSpec,
    script: Mutex<VecDeque<SandboxOutcome>>,
    rate_unavailable: AtomicBool,
    calls: AtomicU64,
}

impl SandboxProvider {
    pub fn new(spec: ProviderSpec) -> Self {
        Self {
            spec,
            script: Mutex::new(VecDeque::new()),
            rate_unavailable: AtomicBool::new(false),
            calls: AtomicU64::new(0),
        }
    }

    pub fn named(name: &str) -> PaymentResult<Self> {
        Ok(Self::new(ProviderSpec::by_name(name)?))
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// Queue outcomes consumed one per `process_payment` call.
    pub async fn push_outcomes(&self, outcomes: impl IntoIterator<Item = SandboxOutcome>) {
        self.script.lock().await.extend(outcomes);
    }

    /// Make `get_exchange_rate` fail until reset.
    pub fn set_rate_unavailable(&self, unavailable: bool) {
        self.rate_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn payment_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn reference(&self, sequence: u64) -> String {
        format!("{}_sbx_{:06}", self.spec.name.to_lowercase(), sequence)
    }
}

#[async_trait]
impl ProviderAdapter for SandboxProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn supported_currencies(&self) -> &[String] {
        &self.spec.currencies
    }

    fn commission_rules(&self) -> &CommissionTable {
        &self.spec.commissions
    }

    fn priority(&self) -> u32 {
        self.spec.priority
    }

    fn initial_latency_ms(&self) -> f64 {
        self.spec.initial_latency_ms
    }

    async fn get_exchange_rate(&self, from: &str, to: &str) -> PaymentResult<Decimal> {
        if self.rate_unavailable.load(Ordering::SeqCst) {
            return Err(PaymentError::ProviderError {
                provider: self.spec.name.clone(),
                message: format!("rate feed unavailable for {}-{}", from, to),
                provider_code: None,
                retryable: true,
            });
        }
        Ok(self.spec.reference_rate(from, to))
    }

    async fn process_payment(
        &self,
        instruction: &PaymentInstruction,
    ) -> PaymentResult<PaymentOutcome> {
        let sequence = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if instruction.card_token.as_deref() == Some(DECLINED_TEST_CARD) {
            debug!(provider = %self.spec.name, "sandbox declined test card");
            return Ok(PaymentOutcome::declined("Card declined"));
        }

        let next = self.script.lock().await.pop_front();
        match next.unwrap_or(SandboxOutcome::Approve) {
            SandboxOutcome::Approve => Ok(PaymentOutcome::approved(self.reference(sequence))),
            SandboxOutcome::Decline { reason } => Ok(PaymentOutcome::declined(reason)),
            SandboxOutcome::Fail(err) => Err(err),
            SandboxOutcome::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(PaymentOutcome::approved(self.reference(sequence)))
            }
        }
    }
}
