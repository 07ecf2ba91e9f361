//! Per-user rolling windows the risk rules read, and the stores that keep them.

use crate::fraud::types::RiskSignal;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

pub const MAX_TRANSACTIONS: usize = 100;
pub const MAX_LOCATIONS: usize = 50;
pub const MAX_DEVICES: usize = 50;
pub const MAX_CARD_USES: usize = 50;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("risk history store error: {message}")]
    Store { message: String },

    #[error("risk history serialization error: {message}")]
    Serialization { message: String },

    #[error("timed out waiting for risk history lease of user {user_id}")]
    LockTimeout { user_id: String },
}

pub type RiskResult<T> = Result<T, RiskError>;

impl From<serde_json::Error> for RiskError {
    fn from(err: serde_json::Error) -> Self {
        RiskError::Serialization {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationObservation {
    pub country: String,
    pub ip_address: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceObservation {
    pub device_id: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardUse {
    /// Hex SHA-256 of the card token; raw tokens are never stored.
    pub fingerprint: String,
    pub used_at: DateTime<Utc>,
}

pub fn card_fingerprint(card_token: &str) -> String {
    hex::encode(Sha256::digest(card_token.trim().as_bytes()))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserRiskHistory {
    pub timestamps: VecDeque<DateTime<Utc>>,
    pub amounts: VecDeque<Decimal>,
    pub locations: VecDeque<LocationObservation>,
    pub devices: VecDeque<DeviceObservation>,
    pub card_uses: VecDeque<CardUse>,
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T, cap: usize) {
    queue.push_back(value);
    while queue.len() > cap {
        queue.pop_front();
    }
}

impl UserRiskHistory {
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
            && self.amounts.is_empty()
            && self.locations.is_empty()
            && self.devices.is_empty()
            && self.card_uses.is_empty()
    }

    /// Prior transactions strictly less than `window` before `now`.
    pub fn transactions_within(&self, now: DateTime<Utc>, window: Duration) -> usize {
        self.timestamps
            .iter()
            .filter(|t| now.signed_duration_since(**t) < window)
            .count()
    }

    pub fn last_location(&self) -> Option<&LocationObservation> {
        self.locations.back()
    }

    pub fn knows_device(&self, device_id: &str) -> bool {
        self.devices.iter().any(|d| d.device_id == device_id)
    }

    pub fn knows_ip(&self, ip_address: &str) -> bool {
        self.devices.iter().any(|d| d.ip_address == ip_address)
    }

    /// Distinct card fingerprints seen in the window, counting `current` if given.
    pub fn distinct_cards_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        current: Option<&str>,
    ) -> usize {
        let mut seen: Vec<&str> = self
            .card_uses
            .iter()
            .filter(|u| now.signed_duration_since(u.used_at) < window)
            .map(|u| u.fingerprint.as_str())
            .collect();
        if let Some(fp) = current {
            seen.push(fp);
        }
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Append an accepted transaction to every window.
    pub fn record(&mut self, signal: &RiskSignal) {
        push_capped(&mut self.timestamps, signal.timestamp, MAX_TRANSACTIONS);
        push_capped(&mut self.amounts, signal.amount, MAX_TRANSACTIONS);
        push_capped(
            &mut self.locations,
            LocationObservation {
                country: signal.sender_country.clone(),
                ip_address: signal.ip_address.clone(),
                observed_at: signal.timestamp,
            },
            MAX_LOCATIONS,
        );

        let known_pair = self
            .devices
            .iter()
            .any(|d| d.device_id == signal.device_id && d.ip_address == signal.ip_address);
        if !known_pair {
            push_capped(
                &mut self.devices,
                DeviceObservation {
                    device_id: signal.device_id.clone(),
                    ip_address: signal.ip_address.clone(),
                },
                MAX_DEVICES,
            );
        }

        if let Some(token) = signal.card_token.as_deref() {
            push_capped(
                &mut self.card_uses,
                CardUse {
                    fingerprint: card_fingerprint(token),
                    used_at: signal.timestamp,
                },
                MAX_CARD_USES,
            );
        }
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Exclusive right to read-modify-write one user's history.
pub struct HistoryLease {
    pub user_id: String,
    /// Identifies the holder for stores that release by compare-and-delete.
    pub token: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl HistoryLease {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            token: Uuid::new_v4().to_string(),
            guard: None,
        }
    }

    fn with_guard(user_id: &str, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            guard: Some(guard),
            ..Self::new(user_id)
        }
    }
}

impl std::fmt::Debug for HistoryLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLease")
            .field("user_id", &self.user_id)
            .field("token", &self.token)
            .field("local", &self.guard.is_some())
            .finish()
    }
}

#[async_trait]
pub trait RiskHistoryStore: Send + Sync {
    async fn acquire(&self, user_id: &str) -> RiskResult<HistoryLease>;

    async fn release(&self, lease: HistoryLease) -> RiskResult<()>;

    /// Missing users load as an empty history.
    async fn load(&self, user_id: &str) -> RiskResult<UserRiskHistory>;

    async fn save(&self, user_id: &str, history: &UserRiskHistory) -> RiskResult<()>;

    async fn clear(&self, user_id: &str) -> RiskResult<()>;
}

/// Process-local store; leases are per-user async mutexes.
pub struct InMemoryRiskHistoryStore {
    histories: Mutex<HashMap<String, UserRiskHistory>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    lease_timeout: std::time::Duration,
}

impl Default for InMemoryRiskHistoryStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(5))
    }
}

impl InMemoryRiskHistoryStore {
    pub fn new(lease_timeout: std::time::Duration) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            lease_timeout,
        }
    }

    pub async fn tracked_users(&self) -> usize {
        self.histories.lock().await.len()
    }

    pub async fn lock_entries(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// Drops the user's lock entry when nobody holds or waits on it.
fn prune_idle_lock(locks: &mut HashMap<String, Arc<Mutex<()>>>, user_id: &str) {
    if locks
        .get(user_id)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(user_id);
    }
}

#[async_trait]
impl RiskHistoryStore for InMemoryRiskHistoryStore {
    async fn acquire(&self, user_id: &str) -> RiskResult<HistoryLease> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(user_id.to_string()).or_default().clone()
        };
        let guard = tokio::time::timeout(self.lease_timeout, lock.lock_owned())
            .await
            .map_err(|_| RiskError::LockTimeout {
                user_id: user_id.to_string(),
            })?;
        Ok(HistoryLease::with_guard(user_id, guard))
    }

    async fn release(&self, lease: HistoryLease) -> RiskResult<()> {
        let mut locks = self.locks.lock().await;
        let user_id = lease.user_id.clone();
        drop(lease);
        prune_idle_lock(&mut locks, &user_id);
        debug!(user_id = %user_id, "risk history lease released");
        Ok(())
    }

    async fn load(&self, user_id: &str) -> RiskResult<UserRiskHistory> {
        Ok(self
            .histories
            .lock()
            .await
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, user_id: &str, history: &UserRiskHistory) -> RiskResult<()> {
        self.histories
            .lock()
            .await
            .insert(user_id.to_string(), history.clone());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> RiskResult<()> {
        self.histories.lock().await.remove(user_id);
        prune_idle_lock(&mut *self.locks.lock().await, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(at: DateTime<Utc>, card: Option<&str>) -> RiskSignal {
        RiskSignal {
            user_id: "user-1".to_string(),
            amount: Decimal::new(100, 0),
            sender_country: "TR".to_string(),
            recipient_country: "US".to_string(),
            ip_address: "10.0.0.1".to_string(),
            device_id: "device-1".to_string(),
            card_token: card.map(str::to_string),
            timestamp: at,
        }
    }

    #[test]
    fn record_caps_windows() {
        let mut history = UserRiskHistory::default();
        let start = Utc::now();
        for i in 0..120 {
            history.record(&signal(start + Duration::seconds(i), None));
        }
        assert_eq!(history.timestamps.len(), MAX_TRANSACTIONS);
        assert_eq!(history.amounts.len(), MAX_TRANSACTIONS);
        assert_eq!(history.locations.len(), MAX_LOCATIONS);
        assert_eq!(history.devices.len(), 1);
        assert_eq!(history.timestamps[0], start + Duration::seconds(20));
    }

    #[test]
    fn card_uses_store_fingerprints_only() {
        let mut history = UserRiskHistory::default();
        history.record(&signal(Utc::now(), Some("4111111111111111")));
        let stored = &history.card_uses[0].fingerprint;
        assert_eq!(stored.len(), 64);
        assert!(!stored.contains("4111"));
        assert_eq!(stored, &card_fingerprint("4111111111111111"));
    }

    #[test]
    fn distinct_cards_counts_current_once() {
        let now = Utc::now();
        let mut history = UserRiskHistory::default();
        history.record(&signal(now - Duration::minutes(1), Some("card-a")));
        history.record(&signal(now - Duration::minutes(2), Some("card-b")));
        history.record(&signal(now - Duration::minutes(30), Some("card-c")));

        let a = card_fingerprint("card-a");
        let d = card_fingerprint("card-d");
        assert_eq!(history.distinct_cards_within(now, Duration::minutes(10), Some(&a)), 2);
        assert_eq!(history.distinct_cards_within(now, Duration::minutes(10), Some(&d)), 3);
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_and_clears() {
        let store = InMemoryRiskHistoryStore::default();
        assert!(store.load("user-1").await.unwrap().is_empty());

        let mut history = UserRiskHistory::default();
        history.record(&signal(Utc::now(), None));
        store.save("user-1", &history).await.unwrap();
        assert_eq!(store.load("user-1").await.unwrap(), history);

        store.clear("user-1").await.unwrap();
        assert!(store.load("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lease_serializes_same_user() {
        let store = InMemoryRiskHistoryStore::new(std::time::Duration::from_millis(50));
        let lease = store.acquire("user-1").await.unwrap();

        let blocked = store.acquire("user-1").await;
        assert!(matches!(blocked, Err(RiskError::LockTimeout { .. })));

        // Other users are unaffected.
        let other = store.acquire("user-2").await.unwrap();
        store.release(other).await.unwrap();

        store.release(lease).await.unwrap();
        let again = store.acquire("user-1").await.unwrap();
        assert_eq!(again.user_id, "user-1");
    }

    #[tokio::test]
    async fn lock_entries_do_not_outlive_their_users() {
        let store = InMemoryRiskHistoryStore::default();
        for i in 0..1000 {
            let user = format!("user-{}", i);
            let lease = store.acquire(&user).await.unwrap();
            store.save(&user, &UserRiskHistory::default()).await.unwrap();
            store.release(lease).await.unwrap();
            store.clear(&user).await.unwrap();
        }
        assert_eq!(store.tracked_users().await, 0);
        assert_eq!(store.lock_entries().await, 0);
    }

    #[tokio::test]
    async fn release_keeps_lock_while_another_caller_waits() {
        let store = Arc::new(InMemoryRiskHistoryStore::default());
        let lease = store.acquire("user-1").await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.acquire("user-1").await })
        };
        tokio::task::yield_now().await;
        // Holder and waiter share the entry; clearing must not drop it.
        store.clear("user-1").await.unwrap();
        assert_eq!(store.lock_entries().await, 1);

        store.release(lease).await.unwrap();
        let second = waiter.await.unwrap().unwrap();
        assert_eq!(store.lock_entries().await, 1);

        store.release(second).await.unwrap();
        assert_eq!(store.lock_entries().await, 0);
    }
}
