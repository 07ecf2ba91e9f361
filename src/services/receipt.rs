//! Receipts for completed transfers.
//!
//! Rendering is left to whatever sits behind [`ReceiptSink`]; the pipeline only
//! hands over a [`TransactionSummary`] and treats a failed save as non-fatal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReceiptError {
    #[error("receipt storage unavailable: {message}")]
    Storage { message: String },
}

/// Everything a receipt shows about one completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSummary {
    pub transaction_id: Uuid,
    pub provider_transaction_id: Option<String>,
    pub selected_provider: String,
    pub amount: Decimal,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: Decimal,
    pub commission: Decimal,
    pub fx_cost: Decimal,
    pub sender_identity: String,
    pub recipient_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionSummary {
    /// Amount the recipient gets in the destination currency.
    pub fn total_received(&self) -> Decimal {
        ((self.amount - self.commission) * self.exchange_rate).round_dp(2)
    }
}

#[async_trait]
pub trait ReceiptSink: Send + Sync {
    async fn save(&self, summary: &TransactionSummary) -> Result<(), ReceiptError>;
}

/// Writes receipts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReceiptSink;

#[async_trait]
impl ReceiptSink for LoggingReceiptSink {
    async fn save(&self, summary: &TransactionSummary) -> Result<(), ReceiptError> {
        info!(
            transaction_id = %summary.transaction_id,
            provider = %summary.selected_provider,
            amount = %summary.amount,
            from_currency = %summary.from_currency,
            to_currency = %summary.to_currency,
            total_received = %summary.total_received(),
            "receipt issued"
        );
        Ok(())
    }
}

/// Keeps receipts in memory, newest last.
#[derive(Debug, Default)]
pub struct MemoryReceiptSink {
    receipts: Mutex<Vec<TransactionSummary>>,
}

impl MemoryReceiptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn receipts(&self) -> Vec<TransactionSummary> {
        self.receipts.lock().await.clone()
    }
}

#[async_trait]
impl ReceiptSink for MemoryReceiptSink {
    async fn save(&self, summary: &TransactionSummary) -> Result<(), ReceiptError> {
        self.receipts.lock().await.push(summary.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> TransactionSummary {
        TransactionSummary {
            transaction_id: Uuid::new_v4(),
            provider_transaction_id: Some("wise_sbx_000001".to_string()),
            selected_provider: "Wise".to_string(),
            amount: Decimal::new(100, 0),
            from_currency: "TRY".to_string(),
            to_currency: "USD".to_string(),
            exchange_rate: Decimal::new(3125, 5),
            commission: Decimal::new(150, 2),
            fx_cost: Decimal::new(8125, 5),
            sender_identity: "ja***@example.com".to_string(),
            recipient_name: "Bob".to_string(),
            status: "completed".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_received_deducts_commission_before_conversion() {
        // (100 - 1.50) * 0.03125 = 3.078125
        assert_eq!(summary().total_received(), Decimal::new(308, 2));
    }

    #[tokio::test]
    async fn memory_sink_keeps_receipts() {
        let sink = MemoryReceiptSink::new();
        sink.save(&summary()).await.unwrap();
        LoggingReceiptSink.save(&summary()).await.unwrap();
        assert_eq!(sink.receipts().await.len(), 1);
    }
}
