use crate::payments::error::PaymentResult;
use crate::payments::types::{CommissionRule, CommissionTable, PaymentInstruction, PaymentOutcome};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// A payment-service-provider gateway the router can send money through.
///
/// Adapters are stateless with respect to performance; rolling latency and
/// success-rate metrics live on the registry entry that wraps them.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supported_currencies(&self) -> &[String];

    fn commission_rules(&self) -> &CommissionTable;

    /// Higher wins when two candidates score the same.
    fn priority(&self) -> u32;

    /// Latency the registry assumes before the first real attempt.
    fn initial_latency_ms(&self) -> f64;

    fn supports_currency(&self, currency: &str) -> bool {
        self.supported_currencies()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(currency))
    }

    fn commission_rule(&self, currency: &str) -> CommissionRule {
        self.commission_rules().rule_for(currency)
    }

    async fn get_exchange_rate(&self, from: &str, to: &str) -> PaymentResult<Decimal>;

    async fn process_payment(&self, instruction: &PaymentInstruction)
        -> PaymentResult<PaymentOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct MockProvider {
        currencies: Vec<String>,
        commissions: CommissionTable,
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        fn name(&self) -> &str {
            "Mock"
        }

        fn supported_currencies(&self) -> &[String] {
            &self.currencies
        }

        fn commission_rules(&self) -> &CommissionTable {
            &self.commissions
        }

        fn priority(&self) -> u32 {
            50
        }

        fn initial_latency_ms(&self) -> f64 {
            500.0
        }

        async fn get_exchange_rate(&self, _from: &str, _to: &str) -> PaymentResult<Decimal> {
            Ok(Decimal::ONE)
        }

        async fn process_payment(
            &self,
            instruction: &PaymentInstruction,
        ) -> PaymentResult<PaymentOutcome> {
            Ok(PaymentOutcome::approved(format!("mock_{}", instruction.transaction_id)))
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_provider() {
        let provider: Box<dyn ProviderAdapter> = Box::new(MockProvider {
            currencies: vec!["USD".to_string()],
            commissions: CommissionTable::default(),
        });

        assert!(provider.supports_currency("usd"));
        assert!(!provider.supports_currency("EUR"));
        assert_eq!(provider.commission_rule("USD"), CommissionRule::fallback());

        let outcome = provider
            .process_payment(&PaymentInstruction {
                transaction_id: Uuid::new_v4(),
                sender_id: "u1".to_string(),
                recipient_id: "u2".to_string(),
                recipient_name: "Bob".to_string(),
                amount: Decimal::new(10, 0),
                from_currency: "USD".to_string(),
                to_currency: "USD".to_string(),
                exchange_rate: Decimal::ONE,
                card_token: None,
                description: String::new(),
            })
            .await
            .expect("payment should succeed");
        assert!(outcome.success);
    }
}
