use crate::payments::CommissionRule;
use crate::payments::ProviderProfile;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// FX markup percentage charged on cross-currency transfers, by `FROM-TO`.
#[derive(Debug, Clone)]
pub struct FxMarkupTable {
    markups: HashMap<String, Decimal>,
    default: Decimal,
}

impl FxMarkupTable {
    pub fn standard() -> Self {
        let markups = [
            ("TRY-USD", Decimal::new(25, 1)),
            ("TRY-EUR", Decimal::new(25, 1)),
            ("USD-EUR", Decimal::new(15, 1)),
            ("EUR-USD", Decimal::new(15, 1)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            markups,
            default: Decimal::new(20, 1),
        }
    }

    pub fn markup_for(&self, from: &str, to: &str) -> Decimal {
        let key = format!("{}-{}", from.to_uppercase(), to.to_uppercase());
        self.markups.get(&key).copied().unwrap_or(self.default)
    }

    /// `amount × rate × markup / 100`, zero for same-currency transfers.
    pub fn fx_cost(&self, amount: Decimal, from: &str, to: &str, rate: Decimal) -> Decimal {
        if from.eq_ignore_ascii_case(to) {
            return Decimal::ZERO;
        }
        amount * rate * self.markup_for(from, to) / Decimal::ONE_HUNDRED
    }
}

impl Default for FxMarkupTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// The four cost components of a provider quote.
#[derive(Debug, Clone, PartialEq)]
pub struct CostComponents {
    pub commission: Decimal,
    pub fx_cost: Decimal,
    pub latency_penalty: f64,
    pub risk_penalty: f64,
}

impl CostComponents {
    pub fn price(
        amount: Decimal,
        rule: CommissionRule,
        fx_cost: Decimal,
        profile: &ProviderProfile,
    ) -> Self {
        Self {
            commission: rule.commission_for(amount),
            fx_cost,
            latency_penalty: profile.avg_latency_ms / 100.0,
            risk_penalty: (100.0 - profile.success_rate) * 2.0,
        }
    }

    pub fn base_score(&self) -> f64 {
        self.commission.to_f64().unwrap_or(f64::MAX)
            + self.fx_cost.to_f64().unwrap_or(f64::MAX)
            + self.latency_penalty
            + self.risk_penalty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_defaults_to_two_percent() {
        let table = FxMarkupTable::standard();
        assert_eq!(table.markup_for("TRY", "USD"), Decimal::new(25, 1));
        assert_eq!(table.markup_for("GBP", "JPY"), Decimal::new(2, 0));
    }

    #[test]
    fn fx_cost_is_zero_for_same_currency() {
        let table = FxMarkupTable::standard();
        assert_eq!(
            table.fx_cost(Decimal::new(100, 0), "USD", "usd", Decimal::ONE),
            Decimal::ZERO
        );
        // 1000 * 0.0325 * 2.5 / 100
        assert_eq!(
            table.fx_cost(Decimal::new(1000, 0), "TRY", "USD", Decimal::new(325, 4)),
            Decimal::new(8125, 4)
        );
    }
}
