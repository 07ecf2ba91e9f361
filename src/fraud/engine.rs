use crate::fraud::history::{card_fingerprint, RiskHistoryStore, RiskResult, UserRiskHistory};
use crate::fraud::rules::{self, RuleOutcome};
use crate::fraud::types::{RiskAction, RiskAssessment, RiskSignal, RuleBreakdown};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct FraudConfig {
    pub velocity_window: Duration,
    pub card_velocity_window: Duration,
    /// Offset applied to UTC before the abnormal-hour check.
    pub utc_offset_minutes: i32,
    pub max_travel_kmh: f64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            velocity_window: Duration::minutes(5),
            card_velocity_window: Duration::minutes(10),
            utc_offset_minutes: 0,
            max_travel_kmh: 900.0,
        }
    }
}

impl FraudConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            velocity_window: std::env::var("FRAUD_VELOCITY_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.velocity_window),
            card_velocity_window: std::env::var("FRAUD_CARD_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .map(Duration::seconds)
                .unwrap_or(defaults.card_velocity_window),
            utc_offset_minutes: std::env::var("FRAUD_UTC_OFFSET_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i32>().ok())
                .unwrap_or(defaults.utc_offset_minutes),
            max_travel_kmh: std::env::var("FRAUD_MAX_TRAVEL_KMH")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(defaults.max_travel_kmh),
        }
    }
}

/// Scores transfers against each user's rolling history.
pub struct FraudEngine {
    config: FraudConfig,
    store: Arc<dyn RiskHistoryStore>,
}

impl FraudEngine {
    pub fn new(config: FraudConfig, store: Arc<dyn RiskHistoryStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Score a signal against an explicit history. Does not touch the store.
    pub fn assess_risk(&self, signal: &RiskSignal, history: &UserRiskHistory) -> RiskAssessment {
        let now = signal.timestamp;
        let fingerprint = signal.card_token.as_deref().map(card_fingerprint);

        let velocity = rules::velocity(history, now, self.config.velocity_window);
        let amount = rules::unusual_amount(history, signal.amount);
        let geo = rules::geolocation(history, &signal.sender_country, now, self.config.max_travel_kmh);
        let device = rules::device_mismatch(history, &signal.device_id, &signal.ip_address);
        let country = rules::high_risk_country(&signal.sender_country, &signal.recipient_country);
        let card = rules::card_velocity(
            history,
            fingerprint.as_deref(),
            now,
            self.config.card_velocity_window,
        );
        let time = rules::abnormal_time(now, self.config.utc_offset_minutes);

        let breakdown = RuleBreakdown {
            velocity: velocity.score,
            unusual_amount: amount.score,
            geolocation: geo.score,
            device_mismatch: device.score,
            high_risk_country: country.score,
            card_velocity: card.score,
            abnormal_time: time.score,
        };

        let outcomes: [RuleOutcome; 7] = [velocity, amount, geo, device, country, card, time];
        let auto_logout = outcomes.iter().any(|o| o.auto_logout);
        let violations = outcomes.into_iter().filter_map(|o| o.violation).collect();

        RiskAssessment::from_breakdown(breakdown, violations, auto_logout, now)
    }

    /// Score against the stored history without recording.
    pub async fn assess(&self, signal: &RiskSignal) -> RiskResult<RiskAssessment> {
        let history = self.store.load(&signal.user_id).await?;
        Ok(self.assess_risk(signal, &history))
    }

    pub async fn record_transaction(&self, signal: &RiskSignal) -> RiskResult<()> {
        let lease = self.store.acquire(&signal.user_id).await?;
        let result: RiskResult<()> = async {
            let mut history = self.store.load(&signal.user_id).await?;
            history.record(signal);
            self.store.save(&signal.user_id, &history).await
        }
        .await;
        self.store.release(lease).await?;
        result
    }

    /// Load, assess and record-if-not-declined under the user's lease.
    ///
    /// Two concurrent transfers for the same user are scored one after the other,
    /// so the second always sees the first in its history.
    pub async fn screen(&self, signal: &RiskSignal) -> RiskResult<RiskAssessment> {
        self.screen_with(signal, |assessment| {
            assessment.action != RiskAction::Decline
        })
        .await
    }

    /// Like [`screen`](Self::screen), but the caller decides under the same lease
    /// whether the transfer enters the history. Declined transfers never do.
    pub async fn screen_with<F>(&self, signal: &RiskSignal, admit: F) -> RiskResult<RiskAssessment>
    where
        F: FnOnce(&RiskAssessment) -> bool + Send,
    {
        let lease = self.store.acquire(&signal.user_id).await?;
        let result: RiskResult<RiskAssessment> = async {
            let mut history = self.store.load(&signal.user_id).await?;
            let assessment = self.assess_risk(signal, &history);
            if assessment.action != RiskAction::Decline && admit(&assessment) {
                history.record(signal);
                self.store.save(&signal.user_id, &history).await?;
            }
            Ok(assessment)
        }
        .await;

        if let Err(err) = self.store.release(lease).await {
            warn!(user_id = %signal.user_id, error = %err, "failed to release risk history lease");
        }

        if let Ok(assessment) = &result {
            info!(
                user_id = %signal.user_id,
                score = assessment.score,
                level = %assessment.level,
                action = %assessment.action,
                violations = assessment.violations.len(),
                "risk assessment completed"
            );
            if assessment.auto_logout {
                warn!(user_id = %signal.user_id, "auto-logout triggered by risk assessment");
            }
        }
        result
    }

    pub async fn clear_user_history(&self, user_id: &str) -> RiskResult<()> {
        self.store.clear(user_id).await?;
        debug!(user_id = %user_id, "risk history cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraud::history::InMemoryRiskHistoryStore;
    use crate::fraud::types::RiskLevel;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn signal(at: DateTime<Utc>, amount: i64) -> RiskSignal {
        RiskSignal {
            user_id: "user-1".to_string(),
            amount: Decimal::from(amount),
            sender_country: "TR".to_string(),
            recipient_country: "US".to_string(),
            ip_address: "10.0.0.1".to_string(),
            device_id: "device-1".to_string(),
            card_token: None,
            timestamp: at,
        }
    }

    fn engine() -> FraudEngine {
        FraudEngine::new(
            FraudConfig::default(),
            Arc::new(InMemoryRiskHistoryStore::default()),
        )
    }

    #[test]
    fn cold_start_is_clean() {
        let assessment = engine().assess_risk(&signal(noon(), 100), &UserRiskHistory::default());
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.level, RiskLevel::Low);
        assert_eq!(assessment.action, RiskAction::Approve);
        assert!(assessment.violations.is_empty());
        assert!(!assessment.auto_logout);
    }

    #[test]
    fn breakdown_sums_to_uncapped_score() {
        let engine = engine();
        let mut history = UserRiskHistory::default();
        history.record(&signal(noon() - Duration::minutes(1), 100));

        let mut next = signal(noon(), 100);
        next.sender_country = "IR".to_string();
        next.device_id = "device-2".to_string();
        let assessment = engine.assess_risk(&next, &history);

        // velocity 10 + impossible travel 30 + new device known ip 10 + IR-US 15
        assert_eq!(assessment.breakdown.velocity, 10);
        assert_eq!(assessment.breakdown.geolocation, 30);
        assert_eq!(assessment.breakdown.device_mismatch, 10);
        assert_eq!(assessment.breakdown.high_risk_country, 15);
        assert_eq!(assessment.score, 65);
        assert_eq!(assessment.action, RiskAction::Verify);
        assert_eq!(assessment.violations.len(), 4);
    }

    #[tokio::test]
    async fn screen_records_only_non_declined() {
        let engine = engine();
        for i in 0..4 {
            let a = engine
                .screen(&signal(noon() + Duration::seconds(i * 10), 100))
                .await
                .unwrap();
            assert_ne!(a.action, RiskAction::Decline);
        }

        let declined = engine
            .screen(&signal(noon() + Duration::seconds(50), 100))
            .await
            .unwrap();
        assert_eq!(declined.action, RiskAction::Decline);
        assert!(declined.auto_logout);

        let history = engine.store.load("user-1").await.unwrap();
        assert_eq!(history.timestamps.len(), 4);
    }

    #[tokio::test]
    async fn clear_user_history_resets_scoring() {
        let engine = engine();
        engine.record_transaction(&signal(noon(), 100)).await.unwrap();
        assert_eq!(engine.assess(&signal(noon(), 100)).await.unwrap().score, 10);

        engine.clear_user_history("user-1").await.unwrap();
        assert_eq!(engine.assess(&signal(noon(), 100)).await.unwrap().score, 0);
    }

    #[tokio::test]
    async fn concurrent_screens_see_each_other() {
        let engine = Arc::new(engine());
        let tasks = (0..2).map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.screen(&signal(noon(), 100)).await.unwrap() })
        });
        let mut scores: Vec<u8> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().score)
            .collect();
        scores.sort_unstable();
        assert_eq!(scores, vec![0, 10]);
    }
}
