use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::ProviderAdapter;
use crate::payments::providers::{HttpProviderAdapter, ProviderSpec, SandboxProvider};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// In-process deterministic adapters.
    Sandbox,
    /// HTTP gateways configured via `{NAME}_API_URL` / `{NAME}_API_KEY`.
    Live,
}

impl FromStr for ProviderMode {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sandbox" => Ok(ProviderMode::Sandbox),
            "live" => Ok(ProviderMode::Live),
            _ => Err(PaymentError::validation(
                format!("unsupported provider mode: {}", value),
                "PSP_MODE",
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub enabled_providers: Vec<String>,
    pub mode: ProviderMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled_providers: ProviderSpec::all().into_iter().map(|s| s.name).collect(),
            mode: ProviderMode::Sandbox,
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let enabled_raw = std::env::var("ENABLED_PSPS")
            .unwrap_or_else(|_| "stripe,wise,paypal,iyzico".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            // Resolve to the canonical catalog name.
            enabled_providers.push(ProviderSpec::by_name(value)?.name);
        }

        if enabled_providers.is_empty() {
            return Err(PaymentError::validation(
                "at least one provider must be enabled",
                "ENABLED_PSPS",
            ));
        }

        let mode = std::env::var("PSP_MODE")
            .map(|v| ProviderMode::from_str(&v))
            .unwrap_or(Ok(ProviderMode::Sandbox))?;

        Ok(Self {
            enabled_providers,
            mode,
        })
    }
}

// ============================================================================
// Profiles and metrics
// ============================================================================

/// Snapshot of a provider's static attributes and rolling performance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderProfile {
    pub name: String,
    pub supported_currencies: Vec<String>,
    pub priority: u32,
    pub is_active: bool,
    pub avg_latency_ms: f64,
    /// Percentage in [0, 100].
    pub success_rate: f64,
    pub total_attempts: u64,
    pub successful_attempts: u64,
    pub failed_attempts: u64,
    pub total_volume: Decimal,
}

impl ProviderProfile {
    fn for_adapter(adapter: &dyn ProviderAdapter) -> Self {
        Self {
            name: adapter.name().to_string(),
            supported_currencies: adapter.supported_currencies().to_vec(),
            priority: adapter.priority(),
            is_active: true,
            avg_latency_ms: adapter.initial_latency_ms(),
            success_rate: 100.0,
            total_attempts: 0,
            successful_attempts: 0,
            failed_attempts: 0,
            total_volume: Decimal::ZERO,
        }
    }

    /// Halve toward the newest latency; blend success 70/30 toward the newest outcome.
    pub fn apply_attempt(&mut self, latency_ms: f64, success: bool, amount: Decimal) {
        self.avg_latency_ms = (self.avg_latency_ms + latency_ms) / 2.0;
        let observed = if success { 100.0 } else { 0.0 };
        self.success_rate = self.success_rate * 0.7 + observed * 0.3;

        self.total_attempts += 1;
        if success {
            self.successful_attempts += 1;
            self.total_volume += amount;
        } else {
            self.failed_attempts += 1;
        }
    }
}

pub struct RegisteredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    profile: RwLock<ProviderProfile>,
}

impl RegisteredProvider {
    fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        let profile = ProviderProfile::for_adapter(adapter.as_ref());
        Self {
            adapter,
            profile: RwLock::new(profile),
        }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub async fn profile(&self) -> ProviderProfile {
        self.profile.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.profile.read().await.is_active
    }

    /// Read-modify-write under the write lock so concurrent attempts are never lost.
    pub async fn record_attempt(
        &self,
        latency_ms: f64,
        success: bool,
        amount: Decimal,
    ) -> ProviderProfile {
        let mut profile = self.profile.write().await;
        profile.apply_attempt(latency_ms, success, amount);
        profile.clone()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registered providers in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<RegisteredProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry for the enabled catalog providers in the configured mode.
    pub async fn from_config(config: &RegistryConfig) -> PaymentResult<Self> {
        let registry = Self::new();
        for name in &config.enabled_providers {
            let spec = ProviderSpec::by_name(name)?;
            let adapter: Arc<dyn ProviderAdapter> = match config.mode {
                ProviderMode::Sandbox => Arc::new(SandboxProvider::new(spec)),
                ProviderMode::Live => Arc::new(HttpProviderAdapter::from_env(spec)?),
            };
            registry.register(adapter).await?;
        }
        info!(
            providers = config.enabled_providers.len(),
            mode = ?config.mode,
            "provider registry initialised"
        );
        Ok(registry)
    }

    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> PaymentResult<()> {
        let mut providers = self.providers.write().await;
        if providers
            .iter()
            .any(|p| p.name().eq_ignore_ascii_case(adapter.name()))
        {
            return Err(PaymentError::validation(
                format!("provider {} is already registered", adapter.name()),
                "provider",
            ));
        }
        info!(provider = %adapter.name(), "registered payment provider");
        providers.push(Arc::new(RegisteredProvider::new(adapter)));
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<RegisteredProvider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub async fn all(&self) -> Vec<Arc<RegisteredProvider>> {
        self.providers.read().await.clone()
    }

    pub async fn active_providers(&self) -> Vec<Arc<RegisteredProvider>> {
        let providers = self.all().await;
        let mut active = Vec::with_capacity(providers.len());
        for provider in providers {
            if provider.is_active().await {
                active.push(provider);
            }
        }
        active
    }

    pub async fn set_active(&self, name: &str, active: bool) -> PaymentResult<()> {
        let provider = self
            .get(name)
            .await
            .ok_or_else(|| PaymentError::UnknownProvider {
                name: name.to_string(),
            })?;
        provider.profile.write().await.is_active = active;
        info!(provider = %name, active, "provider activation changed");
        Ok(())
    }

    pub async fn update_metrics(
        &self,
        name: &str,
        latency_ms: f64,
        success: bool,
        amount: Decimal,
    ) -> PaymentResult<ProviderProfile> {
        let provider = self
            .get(name)
            .await
            .ok_or_else(|| PaymentError::UnknownProvider {
                name: name.to_string(),
            })?;
        let profile = provider.record_attempt(latency_ms, success, amount).await;
        if !success {
            warn!(
                provider = %name,
                success_rate = profile.success_rate,
                "provider attempt failed"
            );
        }
        Ok(profile)
    }

    /// Per-provider analytics in registration order.
    pub async fn snapshot(&self) -> Vec<ProviderProfile> {
        let mut profiles = Vec::new();
        for provider in self.all().await {
            profiles.push(provider.profile().await);
        }
        profiles
    }

    pub async fn len(&self) -> usize {
        self.providers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sandbox_registry() -> ProviderRegistry {
        ProviderRegistry::from_config(&RegistryConfig::default())
            .await
            .expect("sandbox registry")
    }

    #[tokio::test]
    async fn registers_catalog_in_order_with_initial_metrics() {
        let registry = sandbox_registry().await;
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot[1].name, "Wise");
        assert_eq!(snapshot[1].avg_latency_ms, 300.0);
        assert_eq!(snapshot[1].success_rate, 100.0);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = sandbox_registry().await;
        let result = registry
            .register(Arc::new(SandboxProvider::new(ProviderSpec::wise())))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn metrics_update_follows_rolling_formula() {
        let registry = sandbox_registry().await;
        let profile = registry
            .update_metrics("Wise", 500.0, false, Decimal::new(100, 0))
            .await
            .unwrap();
        assert_eq!(profile.avg_latency_ms, 400.0);
        assert!((profile.success_rate - 70.0).abs() < 1e-9);
        assert_eq!(profile.failed_attempts, 1);
        assert_eq!(profile.total_volume, Decimal::ZERO);

        let profile = registry
            .update_metrics("Wise", 200.0, true, Decimal::new(100, 0))
            .await
            .unwrap();
        assert_eq!(profile.avg_latency_ms, 300.0);
        assert!((profile.success_rate - 79.0).abs() < 1e-9);
        assert_eq!(profile.total_volume, Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let registry = Arc::new(sandbox_registry().await);
        let tasks = (0..20).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .update_metrics("Stripe", 600.0, true, Decimal::ONE)
                    .await
                    .unwrap();
            })
        });
        futures::future::join_all(tasks).await;

        let profile = registry.get("stripe").await.unwrap().profile().await;
        assert_eq!(profile.total_attempts, 20);
        assert_eq!(profile.total_volume, Decimal::new(20, 0));
    }

    #[tokio::test]
    async fn inactive_providers_are_excluded() {
        let registry = sandbox_registry().await;
        registry.set_active("PayPal", false).await.unwrap();
        let active: Vec<String> = registry
            .active_providers()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(active, vec!["Stripe", "Wise", "Iyzico"]);
        assert!(registry.set_active("Venmo", true).await.is_err());
    }
}
