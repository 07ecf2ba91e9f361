use crate::cache::error::CacheError;
use crate::cache::keys::risk::{HistoryKey, LockKey};
use crate::cache::RedisPool;
use crate::fraud::{HistoryLease, RiskError, RiskHistoryStore, RiskResult, UserRiskHistory};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Deletes the lock only while it still carries the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Risk histories shared across instances through Redis.
///
/// Histories are stored as JSON with a sliding TTL. Leases are `SET NX PX`
/// locks carrying a random token, so a lease that outlived its TTL cannot
/// delete a lock another instance has since taken.
pub struct RedisRiskHistoryStore {
    pool: RedisPool,
    history_ttl: Duration,
    lock_ttl: Duration,
    acquire_timeout: Duration,
    retry_interval: Duration,
}

impl RedisRiskHistoryStore {
    pub fn new(pool: RedisPool, history_ttl: Duration, lock_ttl: Duration) -> Self {
        Self {
            pool,
            history_ttl,
            lock_ttl,
            acquire_timeout: lock_ttl,
            retry_interval: Duration::from_millis(25),
        }
    }

    pub fn from_config(pool: RedisPool, config: &crate::config::CacheConfig) -> Self {
        Self::new(
            pool,
            Duration::from_secs(config.history_ttl_secs),
            Duration::from_millis(config.lock_ttl_ms),
        )
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    async fn try_lock(&self, key: &str, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(self.lock_ttl.as_millis() as u64)
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl RiskHistoryStore for RedisRiskHistoryStore {
    async fn acquire(&self, user_id: &str) -> RiskResult<HistoryLease> {
        let key = LockKey::new(user_id).to_string();
        let lease = HistoryLease::new(user_id);
        let deadline = Instant::now() + self.acquire_timeout;

        loop {
            if self.try_lock(&key, &lease.token).await? {
                debug!(user_id = %user_id, "risk history lease acquired");
                return Ok(lease);
            }
            if Instant::now() >= deadline {
                return Err(RiskError::LockTimeout {
                    user_id: user_id.to_string(),
                });
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn release(&self, lease: HistoryLease) -> RiskResult<()> {
        let key = LockKey::new(lease.user_id.as_str()).to_string();
        let mut conn = self.pool.get().await.map_err(CacheError::from)?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&key)
            .arg(&lease.token)
            .invoke_async(&mut *conn)
            .await
            .map_err(CacheError::from)?;

        if deleted == 0 {
            warn!(user_id = %lease.user_id, "risk history lease expired before release");
        }
        Ok(())
    }

    async fn load(&self, user_id: &str) -> RiskResult<UserRiskHistory> {
        let key = HistoryKey::new(user_id).to_string();
        let mut conn = self.pool.get().await.map_err(CacheError::from)?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)?;

        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(UserRiskHistory::default()),
        }
    }

    async fn save(&self, user_id: &str, history: &UserRiskHistory) -> RiskResult<()> {
        let key = HistoryKey::new(user_id).to_string();
        let json = serde_json::to_string(history)?;
        let mut conn = self.pool.get().await.map_err(CacheError::from)?;
        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(json)
            .arg("EX")
            .arg(self.history_ttl.as_secs().max(1))
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)?;
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> RiskResult<()> {
        let key = HistoryKey::new(user_id).to_string();
        let mut conn = self.pool.get().await.map_err(CacheError::from)?;
        let _: i64 = redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)?;
        Ok(())
    }
}
