pub mod error;
pub mod memory;
pub mod repository;
pub mod transaction_repository;

#[cfg(feature = "database")]
pub mod blacklist_repository;

pub use error::{DatabaseError, DatabaseErrorKind};
pub use memory::{InMemoryBlacklist, InMemoryTransactionStore};
pub use repository::{BlacklistStore, PersistenceStore};
pub use transaction_repository::{
    NewTransaction, RoutingSource, Transaction, TransactionOutcome, TransactionStatus,
};

#[cfg(feature = "database")]
pub use pool::{health_check, init_pool, init_pool_from_config, PoolConfig};

#[cfg(feature = "database")]
mod pool {
    use super::error::DatabaseError;
    use crate::config::DatabaseConfig;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::time::Duration;
    use tracing::{error as log_error, info, warn};

    /// Database pool configuration
    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub connection_timeout: Duration,
        pub idle_timeout: Duration,
        pub max_lifetime: Duration,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 10,
                min_connections: 2,
                connection_timeout: Duration::from_secs(30),
                idle_timeout: Duration::from_secs(600),
                max_lifetime: Duration::from_secs(1800),
            }
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(
        database_url: &str,
        config: Option<PoolConfig>,
    ) -> Result<PgPool, DatabaseError> {
        let config = config.unwrap_or_default();

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "initializing database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connection_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| {
                log_error!("Failed to initialize database pool: {}", e);
                DatabaseError::from_sqlx(e)
            })?;

        info!("Database pool initialized successfully");
        Ok(pool)
    }

    /// Connection pool health check
    pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
            warn!("Database health check failed: {}", e);
            DatabaseError::from_sqlx(e)
        })?;
        Ok(())
    }

    pub async fn init_pool_from_config(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let pool_config = PoolConfig {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connection_timeout: Duration::from_secs(config.connection_timeout_secs),
            ..PoolConfig::default()
        };
        init_pool(&config.url, Some(pool_config)).await
    }

}
