//! Health check module
//! Reports provider registry state plus optional database and cache pings

use crate::payments::ProviderRegistry;
use crate::services::payment_orchestrator::ProviderHealth;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
#[cfg(any(feature = "database", feature = "cache"))]
use std::time::Instant;
#[cfg(any(feature = "database", feature = "cache"))]
use tokio::time::timeout;
#[cfg(any(feature = "database", feature = "cache"))]
use tracing::error;
use tracing::info;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    registry: Arc<ProviderRegistry>,
    check_timeout: Duration,
    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
    #[cfg(feature = "cache")]
    cache_pool: Option<crate::cache::RedisPool>,
}

impl HealthChecker {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            check_timeout: Duration::from_secs(5),
            #[cfg(feature = "database")]
            db_pool: None,
            #[cfg(feature = "cache")]
            cache_pool: None,
        }
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, pool: sqlx::PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, pool: crate::cache::RedisPool) -> Self {
        self.cache_pool = Some(pool);
        self
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut infra_down = false;

        #[cfg(feature = "database")]
        if let Some(pool) = &self.db_pool {
            let component = self
                .timed("database", crate::database::health_check(pool))
                .await;
            infra_down |= component.status == ComponentState::Down;
            health_status.checks.insert("database".to_string(), component);
        }

        #[cfg(feature = "cache")]
        if let Some(pool) = &self.cache_pool {
            let component = self.timed("cache", crate::cache::health_check(pool)).await;
            infra_down |= component.status == ComponentState::Down;
            health_status.checks.insert("cache".to_string(), component);
        }

        let providers = self.registry.all().await;
        let profiles = join_all(providers.iter().map(|p| p.profile())).await;
        let mut usable = 0usize;
        let mut impaired = 0usize;
        for profile in &profiles {
            let component = match ProviderHealth::from_profile(profile) {
                ProviderHealth::Healthy => {
                    usable += 1;
                    ComponentHealth::up(Some(profile.avg_latency_ms.round() as u128))
                }
                ProviderHealth::Degraded => {
                    usable += 1;
                    impaired += 1;
                    ComponentHealth::warning(
                        Some(profile.avg_latency_ms.round() as u128),
                        Some(format!("success rate {:.1}%", profile.success_rate)),
                    )
                }
                ProviderHealth::Unhealthy => {
                    impaired += 1;
                    let reason = if profile.is_active {
                        format!("success rate {:.1}%", profile.success_rate)
                    } else {
                        "inactive".to_string()
                    };
                    ComponentHealth::down(Some(reason))
                }
            };
            health_status
                .checks
                .insert(format!("psp:{}", profile.name), component);
        }

        health_status.status = if infra_down || usable == 0 {
            HealthState::Unhealthy
        } else if impaired > 0 {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        info!(
            status = ?health_status.status,
            providers = profiles.len(),
            usable_providers = usable,
            "health check completed"
        );
        health_status
    }

    #[cfg(any(feature = "database", feature = "cache"))]
    async fn timed<F, E>(&self, name: &str, check: F) -> ComponentHealth
    where
        F: std::future::Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        match timeout(self.check_timeout, check).await {
            Ok(Ok(())) => ComponentHealth::up(Some(start.elapsed().as_millis())),
            Ok(Err(e)) => {
                error!(component = %name, error = %e, "health check failed");
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!(component = %name, "health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::providers::{ProviderSpec, SandboxProvider};
    use rust_decimal::Decimal;

    async fn registry() -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(Arc::new(SandboxProvider::new(ProviderSpec::wise())))
            .await
            .unwrap();
        registry
            .register(Arc::new(SandboxProvider::new(ProviderSpec::stripe())))
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_fresh_registry_is_healthy() {
        let checker = HealthChecker::new(registry().await);
        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert!(status.checks.contains_key("psp:Wise"));
        assert!(status.checks.contains_key("psp:Stripe"));
    }

    #[tokio::test]
    async fn test_inactive_provider_degrades() {
        let registry = registry().await;
        registry.set_active("Stripe", false).await.unwrap();
        let status = HealthChecker::new(registry.clone()).check_health().await;
        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.checks["psp:Stripe"].status, ComponentState::Down);

        registry.set_active("Wise", false).await.unwrap();
        let status = HealthChecker::new(registry).check_health().await;
        assert_eq!(status.status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_failing_provider_shows_warning() {
        let registry = registry().await;
        // 100 -> 70 -> 49 after two failures
        registry
            .update_metrics("Wise", 100.0, false, Decimal::ONE)
            .await
            .unwrap();
        let status = HealthChecker::new(registry.clone()).check_health().await;
        assert_eq!(status.checks["psp:Wise"].status, ComponentState::Warning);

        registry
            .update_metrics("Wise", 100.0, false, Decimal::ONE)
            .await
            .unwrap();
        let status = HealthChecker::new(registry).check_health().await;
        assert_eq!(status.checks["psp:Wise"].status, ComponentState::Down);
    }

    #[test]
    fn test_component_health_states() {
        let warning_health = ComponentHealth::warning(Some(500), Some("Slow response".to_string()));
        assert!(matches!(warning_health.status, ComponentState::Warning));
        assert_eq!(warning_health.response_time_ms, Some(500));
    }
}
