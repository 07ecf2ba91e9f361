//! The seven scoring rules. Each reads the signal and prior history only.

use crate::fraud::history::UserRiskHistory;
use chrono::{Duration, Timelike};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub score: u8,
    /// Present only when the rule counts as a violation.
    pub violation: Option<String>,
    pub auto_logout: bool,
}

impl RuleOutcome {
    pub fn clear() -> Self {
        Self::default()
    }

    fn violated(score: u8, reason: impl Into<String>) -> Self {
        Self {
            score,
            violation: Some(reason.into()),
            auto_logout: false,
        }
    }

    fn hard_decline(reason: impl Into<String>) -> Self {
        Self {
            score: 100,
            violation: Some(reason.into()),
            auto_logout: true,
        }
    }
}

pub fn velocity(history: &UserRiskHistory, now: chrono::DateTime<chrono::Utc>, window: Duration) -> RuleOutcome {
    let recent = history.transactions_within(now, window);
    match recent {
        0 => RuleOutcome::clear(),
        1 => RuleOutcome::violated(10, "Multiple transactions in short time"),
        2 => RuleOutcome::violated(20, "Rapid transactions detected (2 in window)"),
        3 => RuleOutcome::violated(
            35,
            "WARNING: 3 transactions in window - next one will trigger auto-logout",
        ),
        n => RuleOutcome::hard_decline(format!(
            "ACCOUNT SUSPENDED: {} transactions in window. Auto-logout triggered",
            n
        )),
    }
}

fn mean(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, count) = values.fold((Decimal::ZERO, 0u32), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / Decimal::from(count))
    }
}

pub fn unusual_amount(history: &UserRiskHistory, amount: Decimal) -> RuleOutcome {
    let amounts = &history.amounts;
    let Some(average) = mean(amounts.iter().copied()) else {
        return RuleOutcome::clear();
    };

    if amounts.len() >= 3 {
        if let Some(last3) = mean(amounts.iter().rev().take(3).copied()) {
            if amount > last3 * Decimal::from(3) {
                return RuleOutcome::hard_decline(format!(
                    "SUSPICIOUS AMOUNT: {} exceeds 3x average of last 3 ({}). Account suspended",
                    amount,
                    last3.round_dp(2)
                ));
            }
        }
    }

    if average > Decimal::ZERO {
        let deviation = amount / average;
        if deviation > Decimal::from(5) {
            return RuleOutcome::violated(
                25,
                format!(
                    "Amount is 5x+ usual (avg: {}, current: {})",
                    average.round_dp(2),
                    amount
                ),
            );
        }
        if deviation > Decimal::from(3) {
            return RuleOutcome::violated(15, "Amount is 3x+ usual average");
        }
    }

    let max = amounts.iter().copied().max().unwrap_or(Decimal::ZERO);
    if amount > max * Decimal::new(15, 1) {
        // Scored but not reported as a violation.
        return RuleOutcome {
            score: 8,
            violation: None,
            auto_logout: false,
        };
    }

    RuleOutcome::clear()
}

/// Directional distance between two countries in km.
pub fn country_distance_km(from: &str, to: &str) -> f64 {
    if from.eq_ignore_ascii_case(to) {
        return 0.0;
    }
    match format!("{}-{}", from.to_uppercase(), to.to_uppercase()).as_str() {
        "TR-US" => 9500.0,
        "TR-EU" => 2000.0,
        "US-EU" => 6500.0,
        _ => 5000.0,
    }
}

pub fn geolocation(
    history: &UserRiskHistory,
    country: &str,
    now: chrono::DateTime<chrono::Utc>,
    max_travel_kmh: f64,
) -> RuleOutcome {
    let Some(last) = history.last_location() else {
        return RuleOutcome::clear();
    };

    let elapsed_ms = now.signed_duration_since(last.observed_at).num_milliseconds() as f64;
    let distance = country_distance_km(&last.country, country);
    let reachable = elapsed_ms / 3_600_000.0 * max_travel_kmh;

    if distance > reachable && distance > 1000.0 {
        return RuleOutcome::violated(
            30,
            format!(
                "Impossible travel: {}km in {} minutes",
                distance,
                (elapsed_ms / 60_000.0).round()
            ),
        );
    }

    if !last.country.eq_ignore_ascii_case(country) && distance > 5000.0 {
        return RuleOutcome::violated(
            15,
            format!("Large geographic change: {} -> {}", last.country, country),
        );
    }

    RuleOutcome::clear()
}

pub fn device_mismatch(history: &UserRiskHistory, device_id: &str, ip_address: &str) -> RuleOutcome {
    if history.devices.is_empty() {
        return RuleOutcome::clear();
    }
    let known_device = history.knows_device(device_id);
    let known_ip = history.knows_ip(ip_address);
    match (known_device, known_ip) {
        (false, false) => RuleOutcome::violated(20, "Unknown device and IP combination"),
        (false, true) => RuleOutcome::violated(10, "New device from known IP"),
        (true, false) => RuleOutcome::violated(8, "Known device from new location"),
        (true, true) => RuleOutcome::clear(),
    }
}

const HIGH_RISK_PAIRS: [(&str, &str); 3] = [("KP", "US"), ("IR", "US"), ("SY", "US")];

pub fn high_risk_country(sender: &str, recipient: &str) -> RuleOutcome {
    let sender = sender.to_uppercase();
    let recipient = recipient.to_uppercase();
    let flagged = HIGH_RISK_PAIRS.iter().any(|(a, b)| {
        (*a == sender && *b == recipient) || (*b == sender && *a == recipient)
    });
    if flagged {
        RuleOutcome::violated(
            15,
            format!("High-risk country pair: {} -> {}", sender, recipient),
        )
    } else {
        RuleOutcome::clear()
    }
}

pub fn card_velocity(
    history: &UserRiskHistory,
    card_fingerprint: Option<&str>,
    now: chrono::DateTime<chrono::Utc>,
    window: Duration,
) -> RuleOutcome {
    let Some(fingerprint) = card_fingerprint else {
        return RuleOutcome::clear();
    };
    let distinct = history.distinct_cards_within(now, window, Some(fingerprint));
    if distinct > 3 {
        RuleOutcome::violated(
            20,
            format!("Multiple card attempts with different cards ({} cards)", distinct),
        )
    } else {
        RuleOutcome::clear()
    }
}

pub fn abnormal_time(
    now: chrono::DateTime<chrono::Utc>,
    utc_offset_minutes: i32,
) -> RuleOutcome {
    let local = now + Duration::minutes(i64::from(utc_offset_minutes));
    let hour = local.hour();
    if (2..=5).contains(&hour) {
        RuleOutcome::violated(10, format!("Transaction at unusual time: {}:00", hour))
    } else {
        RuleOutcome::clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraud::history::{DeviceObservation, LocationObservation};
    use chrono::{TimeZone, Utc};

    fn history_with_amounts(amounts: &[i64]) -> UserRiskHistory {
        let mut history = UserRiskHistory::default();
        history.amounts = amounts.iter().map(|a| Decimal::from(*a)).collect();
        history
    }

    #[test]
    fn velocity_table() {
        let now = Utc::now();
        let mut history = UserRiskHistory::default();
        let expected = [0u8, 10, 20, 35, 100, 100];
        for (priors, score) in expected.iter().enumerate() {
            history.timestamps = (0..priors)
                .map(|i| now - Duration::seconds(10 * (i as i64 + 1)))
                .collect();
            let outcome = velocity(&history, now, Duration::minutes(5));
            assert_eq!(outcome.score, *score, "priors = {}", priors);
            assert_eq!(outcome.auto_logout, priors > 3);
        }
    }

    #[test]
    fn velocity_ignores_old_timestamps() {
        let now = Utc::now();
        let mut history = UserRiskHistory::default();
        history.timestamps = vec![now - Duration::minutes(5), now - Duration::minutes(6)].into();
        assert_eq!(velocity(&history, now, Duration::minutes(5)).score, 0);
    }

    #[test]
    fn amount_hard_decline_over_three_times_recent_mean() {
        let outcome = unusual_amount(&history_with_amounts(&[100, 100, 100]), Decimal::from(301));
        assert_eq!(outcome.score, 100);
        assert!(outcome.auto_logout);

        let outcome = unusual_amount(&history_with_amounts(&[100, 100, 100]), Decimal::from(300));
        assert_ne!(outcome.score, 100);
    }

    #[test]
    fn amount_deviation_tiers() {
        assert_eq!(unusual_amount(&history_with_amounts(&[100]), Decimal::from(600)).score, 25);
        assert_eq!(unusual_amount(&history_with_amounts(&[100, 100]), Decimal::from(400)).score, 15);

        let soft = unusual_amount(&history_with_amounts(&[100, 100]), Decimal::from(160));
        assert_eq!(soft.score, 8);
        assert!(soft.violation.is_none());

        assert_eq!(unusual_amount(&UserRiskHistory::default(), Decimal::from(10_000)).score, 0);
    }

    #[test]
    fn geolocation_detects_impossible_travel() {
        let now = Utc::now();
        let mut history = UserRiskHistory::default();
        history.locations.push_back(LocationObservation {
            country: "TR".to_string(),
            ip_address: "1.1.1.1".to_string(),
            observed_at: now - Duration::hours(1),
        });
        assert_eq!(geolocation(&history, "US", now, 900.0).score, 30);
        assert_eq!(geolocation(&history, "TR", now, 900.0).score, 0);
    }

    #[test]
    fn geolocation_flags_large_change_when_travel_possible() {
        let now = Utc::now();
        let mut history = UserRiskHistory::default();
        history.locations.push_back(LocationObservation {
            country: "US".to_string(),
            ip_address: "1.1.1.1".to_string(),
            observed_at: now - Duration::hours(10),
        });
        // US-EU is 6500km, reachable in 10h at 900km/h.
        assert_eq!(geolocation(&history, "EU", now, 900.0).score, 15);
        assert_eq!(country_distance_km("EU", "US"), 5000.0);
    }

    #[test]
    fn device_combinations() {
        let mut history = UserRiskHistory::default();
        assert_eq!(device_mismatch(&history, "d1", "ip1").score, 0);

        history.devices.push_back(DeviceObservation {
            device_id: "d1".to_string(),
            ip_address: "ip1".to_string(),
        });
        assert_eq!(device_mismatch(&history, "d2", "ip2").score, 20);
        assert_eq!(device_mismatch(&history, "d2", "ip1").score, 10);
        assert_eq!(device_mismatch(&history, "d1", "ip2").score, 8);
        assert_eq!(device_mismatch(&history, "d1", "ip1").score, 0);
    }

    #[test]
    fn high_risk_pairs_are_order_independent() {
        assert_eq!(high_risk_country("US", "IR").score, 15);
        assert_eq!(high_risk_country("kp", "us").score, 15);
        assert_eq!(high_risk_country("TR", "US").score, 0);
    }

    #[test]
    fn abnormal_time_uses_local_offset() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 0).unwrap();
        assert_eq!(abnormal_time(at, 0).score, 0);
        assert_eq!(abnormal_time(at, 180).score, 10);
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 5, 59, 0).unwrap();
        assert_eq!(abnormal_time(late, 0).score, 10);
    }
}
