use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=30 => RiskLevel::Low,
            31..=70 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskAction {
    Approve,
    Verify,
    Decline,
}

impl RiskAction {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=30 => RiskAction::Approve,
            31..=70 => RiskAction::Verify,
            _ => RiskAction::Decline,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskAction::Approve => "Transaction looks legitimate. Proceeding...",
            RiskAction::Verify => "Please verify your identity (2FA/OTP)",
            RiskAction::Decline => {
                "Transaction blocked for security reasons. Please contact support."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskAction::Approve => "APPROVE",
            RiskAction::Verify => "VERIFY",
            RiskAction::Decline => "DECLINE",
        }
    }
}

impl fmt::Display for RiskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Points contributed by each rule before the total is capped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleBreakdown {
    pub velocity: u8,
    pub unusual_amount: u8,
    pub geolocation: u8,
    pub device_mismatch: u8,
    pub high_risk_country: u8,
    pub card_velocity: u8,
    pub abnormal_time: u8,
}

impl RuleBreakdown {
    pub fn total(&self) -> u32 {
        [
            self.velocity,
            self.unusual_amount,
            self.geolocation,
            self.device_mismatch,
            self.high_risk_country,
            self.card_velocity,
            self.abnormal_time,
        ]
        .iter()
        .map(|v| u32::from(*v))
        .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    /// Capped at 100.
    pub score: u8,
    pub level: RiskLevel,
    pub action: RiskAction,
    pub violations: Vec<String>,
    pub breakdown: RuleBreakdown,
    pub auto_logout: bool,
    pub recommendation: String,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn from_breakdown(
        breakdown: RuleBreakdown,
        violations: Vec<String>,
        auto_logout: bool,
        assessed_at: DateTime<Utc>,
    ) -> Self {
        let score = breakdown.total().min(100) as u8;
        let action = RiskAction::from_score(score);
        Self {
            score,
            level: RiskLevel::from_score(score),
            action,
            violations,
            breakdown,
            auto_logout,
            recommendation: action.recommendation().to_string(),
            assessed_at,
        }
    }

    pub fn is_declined(&self) -> bool {
        self.action == RiskAction::Decline
    }
}

/// The slice of a transfer the risk engine looks at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSignal {
    pub user_id: String,
    pub amount: Decimal,
    pub sender_country: String,
    pub recipient_country: String,
    pub ip_address: String,
    pub device_id: String,
    pub card_token: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RiskSignal {
    pub fn from_transfer(request: &crate::payments::TransferRequest, timestamp: DateTime<Utc>) -> Self {
        Self {
            user_id: request.sender_id.clone(),
            amount: request.amount,
            sender_country: request.sender_country.to_uppercase(),
            recipient_country: request.recipient_country.to_uppercase(),
            ip_address: request.ip_address.clone(),
            device_id: request.device_id.clone(),
            card_token: request.card_token.clone(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_boundaries() {
        assert_eq!(RiskAction::from_score(30), RiskAction::Approve);
        assert_eq!(RiskAction::from_score(31), RiskAction::Verify);
        assert_eq!(RiskAction::from_score(70), RiskAction::Verify);
        assert_eq!(RiskAction::from_score(71), RiskAction::Decline);
        assert_eq!(RiskLevel::from_score(71), RiskLevel::High);
    }

    #[test]
    fn assessment_caps_total_at_100() {
        let breakdown = RuleBreakdown {
            velocity: 100,
            unusual_amount: 100,
            geolocation: 30,
            ..Default::default()
        };
        let assessment = RiskAssessment::from_breakdown(breakdown, vec![], true, Utc::now());
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.action, RiskAction::Decline);
        assert_eq!(
            assessment.recommendation,
            "Transaction blocked for security reasons. Please contact support."
        );
    }

    #[test]
    fn serialises_uppercase_labels() {
        assert_eq!(serde_json::to_string(&RiskAction::Verify).unwrap(), "\"VERIFY\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
    }
}
