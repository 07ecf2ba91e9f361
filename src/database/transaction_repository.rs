use crate::fraud::RiskLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Declined,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "declined" => Some(TransactionStatus::Declined),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the provider was picked by the router or pinned by the sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoutingSource {
    Automatic,
    Manual,
}

impl RoutingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingSource::Automatic => "automatic",
            RoutingSource::Manual => "manual",
        }
    }
}

/// Transaction entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Transaction {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub sender_country: String,
    pub recipient_country: String,
    pub description: String,
    pub status: String,
    pub selected_psp: Option<String>,
    pub routing_source: Option<String>,
    pub fx_rate: Option<Decimal>,
    pub fraud_score: Option<i16>,
    pub fraud_level: Option<String>,
    pub commission: Option<Decimal>,
    pub fx_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub provider_transaction_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn status(&self) -> Option<TransactionStatus> {
        TransactionStatus::parse(&self.status)
    }

    pub fn pending(id: Uuid, tx: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sender_id: tx.sender_id,
            recipient_id: tx.recipient_id,
            recipient_name: tx.recipient_name,
            amount: tx.amount,
            from_currency: tx.from_currency,
            to_currency: tx.to_currency,
            sender_country: tx.sender_country,
            recipient_country: tx.recipient_country,
            description: tx.description,
            status: TransactionStatus::Pending.as_str().to_string(),
            selected_psp: None,
            routing_source: None,
            fx_rate: None,
            fraud_score: None,
            fraud_level: None,
            commission: None,
            fx_cost: None,
            total_cost: None,
            provider_transaction_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite with a terminal outcome. Fields absent from the outcome are kept.
    pub fn apply_outcome(&mut self, outcome: &TransactionOutcome, now: DateTime<Utc>) {
        self.status = outcome.status.as_str().to_string();
        if let Some(provider) = &outcome.selected_provider {
            self.selected_psp = Some(provider.clone());
        }
        if let Some(source) = outcome.routing_source {
            self.routing_source = Some(source.as_str().to_string());
        }
        self.fx_rate = outcome.exchange_rate.or(self.fx_rate);
        self.fraud_score = outcome.fraud_score.map(i16::from).or(self.fraud_score);
        if let Some(level) = outcome.fraud_level {
            self.fraud_level = Some(level.as_str().to_lowercase());
        }
        self.commission = outcome.commission.or(self.commission);
        self.fx_cost = outcome.fx_cost.or(self.fx_cost);
        self.total_cost = outcome.total_cost.or(self.total_cost);
        if let Some(id) = &outcome.provider_transaction_id {
            self.provider_transaction_id = Some(id.clone());
        }
        if let Some(message) = &outcome.error_message {
            self.error_message = Some(message.clone());
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub sender_id: String,
    pub recipient_id: String,
    pub recipient_name: String,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub sender_country: String,
    pub recipient_country: String,
    pub description: String,
}

impl NewTransaction {
    pub fn from_transfer(request: &crate::payments::TransferRequest) -> Self {
        Self {
            sender_id: request.sender_id.clone(),
            recipient_id: request.recipient_id.clone(),
            recipient_name: request.recipient_name.clone(),
            amount: request.amount,
            from_currency: request.from_currency.to_uppercase(),
            to_currency: request.to_currency.to_uppercase(),
            sender_country: request.sender_country.to_uppercase(),
            recipient_country: request.recipient_country.to_uppercase(),
            description: request.description.clone(),
        }
    }
}

/// Terminal write for a transaction row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionOutcome {
    pub status: TransactionStatus,
    pub selected_provider: Option<String>,
    pub routing_source: Option<RoutingSource>,
    pub exchange_rate: Option<Decimal>,
    pub fraud_score: Option<u8>,
    pub fraud_level: Option<RiskLevel>,
    pub commission: Option<Decimal>,
    pub fx_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub provider_transaction_id: Option<String>,
    pub error_message: Option<String>,
}

impl TransactionOutcome {
    pub fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            selected_provider: None,
            routing_source: None,
            exchange_rate: None,
            fraud_score: None,
            fraud_level: None,
            commission: None,
            fx_cost: None,
            total_cost: None,
            provider_transaction_id: None,
            error_message: None,
        }
    }
}

// ============================================================================
// Postgres repository
// ============================================================================

#[cfg(feature = "database")]
pub use postgres::TransactionRepository;

#[cfg(feature = "database")]
mod postgres {
    use super::*;
    use crate::database::error::DatabaseError;
    use crate::database::repository::PersistenceStore;
    use async_trait::async_trait;
    use sqlx::PgPool;

    const COLUMNS: &str = "id, sender_id, recipient_id, recipient_name, amount, from_currency, \
         to_currency, sender_country, recipient_country, description, status, selected_psp, \
         routing_source, fx_rate, fraud_score, fraud_level, commission, fx_cost, total_cost, \
         provider_transaction_id, error_message, created_at, updated_at";

    /// Repository for managing transfer rows
    pub struct TransactionRepository {
        pool: PgPool,
    }

    impl TransactionRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Recent transfers of one sender, newest first.
        pub async fn find_by_sender(
            &self,
            sender_id: &str,
            limit: i64,
        ) -> Result<Vec<Transaction>, DatabaseError> {
            sqlx::query_as::<_, Transaction>(&format!(
                "SELECT {} FROM transactions WHERE sender_id = $1 ORDER BY created_at DESC LIMIT $2",
                COLUMNS
            ))
            .bind(sender_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
        }
    }

    #[async_trait]
    impl PersistenceStore for TransactionRepository {
        async fn create_pending_transaction(
            &self,
            tx: NewTransaction,
        ) -> Result<Uuid, DatabaseError> {
            let id: Uuid = sqlx::query_scalar(
                "INSERT INTO transactions
                 (id, sender_id, recipient_id, recipient_name, amount, from_currency, to_currency,
                  sender_country, recipient_country, description, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending')
                 RETURNING id",
            )
            .bind(Uuid::new_v4())
            .bind(&tx.sender_id)
            .bind(&tx.recipient_id)
            .bind(&tx.recipient_name)
            .bind(tx.amount)
            .bind(&tx.from_currency)
            .bind(&tx.to_currency)
            .bind(&tx.sender_country)
            .bind(&tx.recipient_country)
            .bind(&tx.description)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            Ok(id)
        }

        async fn update_transaction_outcome(
            &self,
            id: Uuid,
            outcome: TransactionOutcome,
        ) -> Result<(), DatabaseError> {
            let result = sqlx::query(
                "UPDATE transactions
                 SET status = $2,
                     selected_psp = COALESCE($3, selected_psp),
                     routing_source = COALESCE($4, routing_source),
                     fx_rate = COALESCE($5, fx_rate),
                     fraud_score = COALESCE($6, fraud_score),
                     fraud_level = COALESCE($7, fraud_level),
                     commission = COALESCE($8, commission),
                     fx_cost = COALESCE($9, fx_cost),
                     total_cost = COALESCE($10, total_cost),
                     provider_transaction_id = COALESCE($11, provider_transaction_id),
                     error_message = COALESCE($12, error_message),
                     updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(id)
            .bind(outcome.status.as_str())
            .bind(outcome.selected_provider)
            .bind(outcome.routing_source.map(|s| s.as_str()))
            .bind(outcome.exchange_rate)
            .bind(outcome.fraud_score.map(i16::from))
            .bind(outcome.fraud_level.map(|l| l.as_str().to_lowercase()))
            .bind(outcome.commission)
            .bind(outcome.fx_cost)
            .bind(outcome.total_cost)
            .bind(outcome.provider_transaction_id)
            .bind(outcome.error_message)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::not_found("transaction", id));
            }
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
            sqlx::query_as::<_, Transaction>(&format!(
                "SELECT {} FROM transactions WHERE id = $1",
                COLUMNS
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
        }

        async fn find_by_external_id(
            &self,
            provider_transaction_id: &str,
        ) -> Result<Option<Transaction>, DatabaseError> {
            sqlx::query_as::<_, Transaction>(&format!(
                "SELECT {} FROM transactions WHERE provider_transaction_id = $1",
                COLUMNS
            ))
            .bind(provider_transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_tx() -> NewTransaction {
        NewTransaction {
            sender_id: "u1".to_string(),
            recipient_id: "u2".to_string(),
            recipient_name: "Bob".to_string(),
            amount: Decimal::new(100, 0),
            from_currency: "TRY".to_string(),
            to_currency: "USD".to_string(),
            sender_country: "TR".to_string(),
            recipient_country: "US".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn outcome_overwrites_only_present_fields() {
        let now = Utc::now();
        let mut tx = Transaction::pending(Uuid::new_v4(), new_tx(), now);
        assert_eq!(tx.status(), Some(TransactionStatus::Pending));

        let mut outcome = TransactionOutcome::new(TransactionStatus::Completed);
        outcome.selected_provider = Some("Wise".to_string());
        outcome.routing_source = Some(RoutingSource::Automatic);
        outcome.fraud_score = Some(10);
        outcome.fraud_level = Some(RiskLevel::Low);
        tx.apply_outcome(&outcome, now);

        assert_eq!(tx.status(), Some(TransactionStatus::Completed));
        assert_eq!(tx.selected_psp.as_deref(), Some("Wise"));
        assert_eq!(tx.routing_source.as_deref(), Some("automatic"));
        assert_eq!(tx.fraud_level.as_deref(), Some("low"));
        assert_eq!(tx.fx_rate, None);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Declined.is_terminal());
        assert_eq!(TransactionStatus::parse("failed"), Some(TransactionStatus::Failed));
    }
}
