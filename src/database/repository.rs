//! Storage seams the orchestration pipeline depends on.

use crate::database::error::DatabaseError;
use crate::database::transaction_repository::{NewTransaction, Transaction, TransactionOutcome};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert a `pending` row and return its id.
    async fn create_pending_transaction(&self, tx: NewTransaction) -> Result<Uuid, DatabaseError>;

    async fn update_transaction_outcome(
        &self,
        id: Uuid,
        outcome: TransactionOutcome,
    ) -> Result<(), DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError>;

    /// Look up by the provider-assigned transaction id.
    async fn find_by_external_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Transaction>, DatabaseError>;
}

#[async_trait]
pub trait BlacklistStore: Send + Sync {
    async fn is_blocked(&self, identity: &str) -> Result<bool, DatabaseError>;
}
