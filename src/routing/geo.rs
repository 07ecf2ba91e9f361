//! Per-provider corridor preferences keyed by `SRC-DST` country pair.

use std::collections::HashMap;

const INTERNATIONAL: &str = "international";

#[derive(Debug, Clone, Default)]
pub struct GeoTable {
    adjustments: HashMap<String, HashMap<String, f64>>,
}

impl GeoTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        Self::empty()
            .with("Wise", "TR-US", -10.0)
            .with("Wise", "TR-DE", -10.0)
            .with("Wise", INTERNATIONAL, -8.0)
            .with("Iyzico", "TR-*", -15.0)
            .with("Iyzico", "TR-TR", -20.0)
            .with("Stripe", "US-*", -5.0)
            .with("Stripe", "*-US", -3.0)
            .with("PayPal", "*-*", 0.0)
    }

    pub fn with(mut self, provider: &str, key: &str, adjustment: f64) -> Self {
        self.adjustments
            .entry(provider.to_string())
            .or_default()
            .insert(key.to_string(), adjustment);
        self
    }

    /// Exact pair, then `src-*`, then `*-dst`, then `international` for cross-border.
    pub fn static_adjustment(&self, provider: &str, from: &str, to: &str) -> f64 {
        let Some(table) = self.adjustments.get(provider) else {
            return 0.0;
        };
        let from = from.to_uppercase();
        let to = to.to_uppercase();

        [
            format!("{}-{}", from, to),
            format!("{}-*", from),
            format!("*-{}", to),
        ]
        .iter()
        .find_map(|key| table.get(key).copied())
        .or_else(|| {
            if from != to {
                table.get(INTERNATIONAL).copied()
            } else {
                None
            }
        })
        .unwrap_or(0.0)
    }

    pub fn adjustment(&self, provider: &str, from: &str, to: &str, amount: f64) -> f64 {
        self.static_adjustment(provider, from, to) + dynamic_variance(provider, amount)
    }
}

/// 32-bit shift-subtract hash over UTF-16 code units (`h = h*31 + c`, wrapping).
pub fn provider_hash(name: &str) -> i32 {
    name.encode_utf16()
        .fold(0i32, |h, c| (h << 5).wrapping_sub(h).wrapping_add(i32::from(c)))
}

/// Deterministic spread in (-3, 3) so near-equal providers alternate by amount.
pub fn dynamic_variance(provider: &str, amount: f64) -> f64 {
    let seed = f64::from(provider_hash(provider).unsigned_abs()) + amount;
    (seed * 0.00001).sin() * 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_known_values() {
        assert_eq!(provider_hash(""), 0);
        assert_eq!(provider_hash("a"), 97);
        assert_eq!(provider_hash("ab"), 97 * 31 + 98);
        // Wraps like a 32-bit integer.
        assert_eq!(provider_hash("PayPal"), -1_911_368_973);
        assert_eq!(provider_hash("Wise"), 2_696_388);
    }

    #[test]
    fn lookup_precedence() {
        let geo = GeoTable::standard();
        assert_eq!(geo.static_adjustment("Wise", "TR", "US"), -10.0);
        assert_eq!(geo.static_adjustment("Wise", "tr", "de"), -10.0);
        assert_eq!(geo.static_adjustment("Wise", "GB", "US"), -8.0);
        assert_eq!(geo.static_adjustment("Wise", "US", "US"), 0.0);
        assert_eq!(geo.static_adjustment("Iyzico", "TR", "TR"), -20.0);
        assert_eq!(geo.static_adjustment("Iyzico", "TR", "FR"), -15.0);
        assert_eq!(geo.static_adjustment("Stripe", "US", "DE"), -5.0);
        assert_eq!(geo.static_adjustment("Stripe", "DE", "US"), -3.0);
        assert_eq!(geo.static_adjustment("PayPal", "TR", "US"), 0.0);
        assert_eq!(geo.static_adjustment("Unknown", "TR", "US"), 0.0);
    }

    #[test]
    fn variance_is_bounded_and_deterministic() {
        for amount in [0.0, 1.0, 100.0, 12_345.67, 1e9] {
            let v = dynamic_variance("Wise", amount);
            assert!(v.abs() <= 3.0);
            assert_eq!(v, dynamic_variance("Wise", amount));
        }
    }
}
