//! Static profiles for the providers the router ships with.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::{CommissionRule, CommissionTable};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Currencies, fees, ranking priority and reference FX rates of one provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub currencies: Vec<String>,
    pub commissions: CommissionTable,
    pub priority: u32,
    pub initial_latency_ms: f64,
    /// Keyed by `FROM-TO`.
    pub exchange_rates: HashMap<String, Decimal>,
}

fn rule(pct: (i64, u32), fixed: (i64, u32)) -> CommissionRule {
    CommissionRule::new(Decimal::new(pct.0, pct.1), Decimal::new(fixed.0, fixed.1))
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

fn rates(list: &[(&str, i64, u32)]) -> HashMap<String, Decimal> {
    list.iter()
        .map(|(pair, num, scale)| (pair.to_string(), Decimal::new(*num, *scale)))
        .collect()
}

impl ProviderSpec {
    pub fn stripe() -> Self {
        let standard = rule((29, 1), (30, 2));
        Self {
            name: "Stripe".to_string(),
            currencies: codes(&["USD", "EUR", "GBP", "JPY", "AUD", "CAD"]),
            commissions: CommissionTable::with_default(standard)
                .with_rule("USD", standard)
                .with_rule("EUR", standard),
            priority: 80,
            initial_latency_ms: 600.0,
            exchange_rates: rates(&[
                ("TRY-USD", 32, 3),
                ("TRY-EUR", 30, 3),
                ("USD-EUR", 92, 2),
                ("EUR-USD", 109, 2),
            ]),
        }
    }

    pub fn wise() -> Self {
        let standard = rule((15, 1), (50, 2));
        Self {
            name: "Wise".to_string(),
            currencies: codes(&[
                "USD", "EUR", "GBP", "AUD", "CAD", "JPY", "CHF", "SEK", "NZD", "TRY",
            ]),
            commissions: CommissionTable::with_default(standard)
                .with_rule("USD", standard)
                .with_rule("EUR", standard)
                .with_rule("GBP", standard)
                .with_rule("TRY", rule((12, 1), (30, 2))),
            priority: 85,
            initial_latency_ms: 300.0,
            exchange_rates: rates(&[
                ("TRY-USD", 325, 4),
                ("TRY-EUR", 302, 4),
                ("USD-EUR", 92, 2),
                ("EUR-USD", 109, 2),
                ("GBP-USD", 127, 2),
                ("USD-GBP", 79, 2),
            ]),
        }
    }

    pub fn paypal() -> Self {
        Self {
            name: "PayPal".to_string(),
            currencies: codes(&[
                "USD", "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "CZK", "DKK", "HUF",
                "INR", "ILS", "MXN", "MYR", "NOK", "NZD", "PHP", "PLN", "SGD", "SEK", "THB",
                "TRY", "TWD",
            ]),
            commissions: CommissionTable::with_default(rule((349, 2), (49, 2)))
                .with_rule("USD", rule((349, 2), (49, 2)))
                .with_rule("EUR", rule((349, 2), (35, 2)))
                .with_rule("GBP", rule((349, 2), (35, 2)))
                .with_rule("TRY", rule((45, 1), (100, 2))),
            priority: 70,
            initial_latency_ms: 900.0,
            exchange_rates: rates(&[
                ("TRY-USD", 31, 3),
                ("TRY-EUR", 29, 3),
                ("USD-EUR", 92, 2),
                ("EUR-USD", 109, 2),
            ]),
        }
    }

    pub fn iyzico() -> Self {
        let standard = rule((29, 1), (30, 2));
        Self {
            name: "Iyzico".to_string(),
            currencies: codes(&["TRY", "USD", "EUR"]),
            commissions: CommissionTable::with_default(standard)
                .with_rule("TRY", rule((245, 2), (25, 2)))
                .with_rule("USD", standard)
                .with_rule("EUR", standard),
            priority: 90,
            initial_latency_ms: 350.0,
            exchange_rates: rates(&[
                ("TRY-USD", 323, 4),
                ("TRY-EUR", 301, 4),
                ("USD-TRY", 309, 1),
                ("EUR-TRY", 332, 1),
            ]),
        }
    }

    /// Every catalog provider, in default registration order.
    pub fn all() -> Vec<Self> {
        vec![Self::stripe(), Self::wise(), Self::paypal(), Self::iyzico()]
    }

    pub fn by_name(name: &str) -> PaymentResult<Self> {
        Self::all()
            .into_iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| PaymentError::UnknownProvider {
                name: name.to_string(),
            })
    }

    /// Reference rate for a pair. Same currency is 1; unknown pairs quote at par.
    pub fn reference_rate(&self, from: &str, to: &str) -> Decimal {
        if from.eq_ignore_ascii_case(to) {
            return Decimal::ONE;
        }
        let key = format!("{}-{}", from.to_uppercase(), to.to_uppercase());
        self.exchange_rates.get(&key).copied().unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_four_providers_in_order() {
        let names: Vec<String> = ProviderSpec::all().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Stripe", "Wise", "PayPal", "Iyzico"]);
    }

    #[test]
    fn wise_has_cheaper_try_rule() {
        let wise = ProviderSpec::wise();
        let try_rule = wise.commissions.rule_for("TRY");
        assert_eq!(try_rule.percentage, Decimal::new(12, 1));
        assert_eq!(wise.commissions.rule_for("CHF").percentage, Decimal::new(15, 1));
    }

    #[test]
    fn reference_rate_defaults_to_par() {
        let iyzico = ProviderSpec::iyzico();
        assert_eq!(iyzico.reference_rate("USD", "TRY"), Decimal::new(309, 1));
        assert_eq!(iyzico.reference_rate("USD", "EUR"), Decimal::ONE);
        assert_eq!(iyzico.reference_rate("try", "TRY"), Decimal::ONE);
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        assert_eq!(ProviderSpec::by_name("paypal").unwrap().priority, 70);
        assert!(ProviderSpec::by_name("venmo").is_err());
    }
}
