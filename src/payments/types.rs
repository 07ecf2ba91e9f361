use crate::payments::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// How candidate providers are ranked for a transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationMode {
    Cheap,
    Fast,
    #[default]
    Balanced,
}

impl OptimizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMode::Cheap => "cheap",
            OptimizationMode::Fast => "fast",
            OptimizationMode::Balanced => "balanced",
        }
    }
}

impl std::fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OptimizationMode {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "cheap" => Ok(OptimizationMode::Cheap),
            "fast" => Ok(OptimizationMode::Fast),
            "balanced" => Ok(OptimizationMode::Balanced),
            _ => Err(PaymentError::validation(
                format!("unsupported optimization mode: {}", value),
                "optimization_mode",
            )),
        }
    }
}

/// Percentage plus fixed fee charged by a provider for one currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionRule {
    pub percentage: Decimal,
    pub fixed: Decimal,
}

impl CommissionRule {
    pub fn new(percentage: Decimal, fixed: Decimal) -> Self {
        Self { percentage, fixed }
    }

    /// 2.9% + 0.30, applied when a provider has no rule for the currency and no default.
    pub fn fallback() -> Self {
        Self::new(Decimal::new(29, 1), Decimal::new(30, 2))
    }

    pub fn commission_for(&self, amount: Decimal) -> Decimal {
        amount * self.percentage / Decimal::ONE_HUNDRED + self.fixed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionTable {
    pub by_currency: HashMap<String, CommissionRule>,
    pub default: Option<CommissionRule>,
}

impl CommissionTable {
    pub fn with_default(rule: CommissionRule) -> Self {
        Self {
            by_currency: HashMap::new(),
            default: Some(rule),
        }
    }

    pub fn with_rule(mut self, currency: &str, rule: CommissionRule) -> Self {
        self.by_currency.insert(currency.to_uppercase(), rule);
        self
    }

    pub fn rule_for(&self, currency: &str) -> CommissionRule {
        self.by_currency
            .get(&currency.to_uppercase())
            .copied()
            .or(self.default)
            .unwrap_or_else(CommissionRule::fallback)
    }
}

/// A funds-movement request as submitted by the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender_id: String,
    /// Email used for blacklist screening.
    pub sender_identity: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub sender_country: String,
    pub recipient_country: String,
    #[serde(default)]
    pub mode: OptimizationMode,
    pub preferred_provider: Option<String>,
    pub ip_address: String,
    pub device_id: String,
    pub card_token: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl TransferRequest {
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.sender_id.trim().is_empty() {
            return Err(PaymentError::validation("sender id is required", "sender_id"));
        }
        if self.sender_identity.trim().is_empty() {
            return Err(PaymentError::validation(
                "sender identity is required",
                "sender_identity",
            ));
        }
        if self.recipient_id.trim().is_empty() {
            return Err(PaymentError::validation(
                "recipient id is required",
                "recipient_id",
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::validation(
                "amount must be greater than zero",
                "amount",
            ));
        }
        validate_currency(&self.from_currency, "from_currency")?;
        validate_currency(&self.to_currency, "to_currency")?;
        Ok(())
    }
}

fn validate_currency(code: &str, field: &str) -> Result<(), PaymentError> {
    let trimmed = code.trim();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(PaymentError::validation(
            format!("invalid ISO currency code: {}", code),
            field,
        ));
    }
    Ok(())
}

/// What the pipeline hands to a provider adapter once a route is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInstruction {
    pub transaction_id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: Decimal,
    pub card_token: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub success: bool,
    pub provider_transaction_id: Option<String>,
    pub message: Option<String>,
}

impl PaymentOutcome {
    pub fn approved(provider_transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_transaction_id: Some(provider_transaction_id.into()),
            message: None,
        }
    }

    pub fn declined(message: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_transaction_id: None,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TransferRequest {
        TransferRequest {
            sender_id: "user-1".to_string(),
            sender_identity: "alice@example.com".to_string(),
            recipient_id: "user-2".to_string(),
            recipient_name: "Bob".to_string(),
            amount: Decimal::new(100, 0),
            from_currency: "TRY".to_string(),
            to_currency: "USD".to_string(),
            sender_country: "TR".to_string(),
            recipient_country: "US".to_string(),
            mode: OptimizationMode::Balanced,
            preferred_provider: None,
            ip_address: "10.0.0.1".to_string(),
            device_id: "device-1".to_string(),
            card_token: None,
            description: String::new(),
        }
    }

    #[test]
    fn commission_falls_back_to_default_then_global() {
        let table = CommissionTable::with_default(CommissionRule::new(
            Decimal::new(15, 1),
            Decimal::new(5, 1),
        ))
        .with_rule("TRY", CommissionRule::new(Decimal::new(12, 1), Decimal::new(3, 1)));

        assert_eq!(table.rule_for("try").percentage, Decimal::new(12, 1));
        assert_eq!(table.rule_for("USD").fixed, Decimal::new(5, 1));
        assert_eq!(
            CommissionTable::default().rule_for("USD"),
            CommissionRule::fallback()
        );
    }

    #[test]
    fn commission_combines_percentage_and_fixed() {
        let rule = CommissionRule::fallback();
        assert_eq!(rule.commission_for(Decimal::new(100, 0)), Decimal::new(320, 2));
    }

    #[test]
    fn mode_parsing_is_case_insensitive() {
        assert_eq!(OptimizationMode::from_str("FAST").unwrap(), OptimizationMode::Fast);
        assert!(OptimizationMode::from_str("slow").is_err());
        assert_eq!(OptimizationMode::default(), OptimizationMode::Balanced);
    }

    #[test]
    fn validation_rejects_non_positive_amount_and_bad_currency() {
        let mut req = request();
        assert!(req.validate().is_ok());

        req.amount = Decimal::ZERO;
        assert!(matches!(
            req.validate(),
            Err(PaymentError::ValidationError { field: Some(f), .. }) if f == "amount"
        ));

        let mut req = request();
        req.to_currency = "US".to_string();
        assert!(req.validate().is_err());
    }
}
