//! Process-local stores for sandbox runs and tests.

use crate::database::error::DatabaseError;
use crate::database::repository::{BlacklistStore, PersistenceStore};
use crate::database::transaction_repository::{NewTransaction, Transaction, TransactionOutcome};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryTransactionStore {
    rows: RwLock<HashMap<Uuid, Transaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self.rows.read().await.values().cloned().collect();
        rows.sort_by_key(|t| t.created_at);
        rows
    }
}

#[async_trait]
impl PersistenceStore for InMemoryTransactionStore {
    async fn create_pending_transaction(&self, tx: NewTransaction) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        self.rows
            .write()
            .await
            .insert(id, Transaction::pending(id, tx, Utc::now()));
        Ok(id)
    }

    async fn update_transaction_outcome(
        &self,
        id: Uuid,
        outcome: TransactionOutcome,
    ) -> Result<(), DatabaseError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("transaction", id))?;
        row.apply_outcome(&outcome, Utc::now());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_external_id(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Transaction>, DatabaseError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|t| t.provider_transaction_id.as_deref() == Some(provider_transaction_id))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryBlacklist {
    identities: RwLock<HashSet<String>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, identity: &str) {
        self.identities
            .write()
            .await
            .insert(identity.trim().to_lowercase());
    }

    pub async fn remove(&self, identity: &str) {
        self.identities
            .write()
            .await
            .remove(&identity.trim().to_lowercase());
    }
}

#[async_trait]
impl BlacklistStore for InMemoryBlacklist {
    async fn is_blocked(&self, identity: &str) -> Result<bool, DatabaseError> {
        Ok(self
            .identities
            .read()
            .await
            .contains(&identity.trim().to_lowercase()))
    }
}
