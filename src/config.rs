//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::fraud::FraudConfig;
use crate::payments::RegistryConfig;
use crate::services::OrchestratorConfig;
use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// `None` when `DATABASE_URL` is unset; transfers are then kept in memory.
    pub database: Option<DatabaseConfig>,
    /// `None` when `REDIS_URL` is unset; risk histories are then process-local.
    pub cache: Option<CacheConfig>,
    pub fraud: FraudConfig,
    pub providers: RegistryConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout_secs: u64,
}

/// Redis configuration for the shared risk-history store
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub history_ttl_secs: u64,
    pub lock_ttl_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            logging: LoggingConfig::from_env()?,
            database: DatabaseConfig::from_env_optional()?,
            cache: CacheConfig::from_env_optional()?,
            fraud: FraudConfig::from_env(),
            providers: RegistryConfig::from_env()
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?,
            orchestrator: OrchestratorConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        if self.orchestrator.provider_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "PROVIDER_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout_secs: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
        })
    }

    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Self::from_env().map(Some),
            _ => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: parse_var("CACHE_MAX_CONNECTIONS", "10")?,
            history_ttl_secs: parse_var("RISK_HISTORY_TTL_SECS", "86400")?,
            lock_ttl_ms: parse_var("RISK_LOCK_TTL_MS", "5000")?,
        })
    }

    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => Self::from_env().map(Some),
            _ => Ok(None),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        if self.lock_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue("RISK_LOCK_TTL_MS".to_string()));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_validation() {
        let config = DatabaseConfig {
            url: "postgres://localhost/routepay".to_string(),
            max_connections: 10,
            min_connections: 2,
            connection_timeout_secs: 30,
        };
        assert!(config.validate().is_ok());

        let inverted = DatabaseConfig {
            min_connections: 20,
            ..config
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_cache_url_scheme_validation() {
        let config = CacheConfig {
            redis_url: "http://localhost:6379".to_string(),
            max_connections: 10,
            history_ttl_secs: 60,
            lock_ttl_ms: 5000,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Plain,
        };
        assert!(config.validate().is_err());
        assert!(LoggingConfig::default().validate().is_ok());
    }
}
