use crate::database::error::DatabaseError;
use crate::database::repository::BlacklistStore;
use async_trait::async_trait;
use sqlx::PgPool;

/// Reads the `blacklist` table, matching identities case-insensitively.
pub struct BlacklistRepository {
    pool: PgPool,
}

impl BlacklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn add(&self, identity: &str, reason: Option<&str>) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO blacklist (identifier, reason) VALUES (LOWER($1), $2)
             ON CONFLICT (identifier) DO NOTHING",
        )
        .bind(identity.trim())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl BlacklistStore for BlacklistRepository {
    async fn is_blocked(&self, identity: &str) -> Result<bool, DatabaseError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM blacklist WHERE LOWER(identifier) = LOWER($1))",
        )
        .bind(identity.trim())
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
