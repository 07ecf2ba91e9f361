use routepay_backend::config::AppConfig;
use routepay_backend::database::{
    BlacklistStore, InMemoryBlacklist, InMemoryTransactionStore, PersistenceStore,
};
use routepay_backend::fraud::{FraudEngine, InMemoryRiskHistoryStore, RiskHistoryStore};
use routepay_backend::health::HealthChecker;
use routepay_backend::logging::init_tracing;
use routepay_backend::payments::{OptimizationMode, ProviderRegistry, TransferRequest};
use routepay_backend::routing::RoutingEngine;
use routepay_backend::services::{LoggingReceiptSink, PaymentOrchestrator};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

struct Stores {
    risk: Arc<dyn RiskHistoryStore>,
    transactions: Arc<dyn PersistenceStore>,
    blacklist: Arc<dyn BlacklistStore>,
    health: HealthChecker,
}

async fn init_stores(
    config: &AppConfig,
    registry: Arc<ProviderRegistry>,
    skip_externals: bool,
) -> anyhow::Result<Stores> {
    #[allow(unused_mut)]
    let mut stores = Stores {
        risk: Arc::new(InMemoryRiskHistoryStore::default()),
        transactions: Arc::new(InMemoryTransactionStore::new()),
        blacklist: Arc::new(InMemoryBlacklist::new()),
        health: HealthChecker::new(registry),
    };

    if skip_externals {
        info!("Skipping database and cache initialization (SKIP_EXTERNALS=true)");
        return Ok(stores);
    }

    #[cfg(feature = "database")]
    if let Some(database) = &config.database {
        use routepay_backend::database::blacklist_repository::BlacklistRepository;
        use routepay_backend::database::transaction_repository::TransactionRepository;

        let pool = routepay_backend::database::init_pool_from_config(database).await?;
        info!(
            max_connections = pool.options().get_max_connections(),
            "Database connection pool initialized"
        );
        stores.transactions = Arc::new(TransactionRepository::new(pool.clone()));
        stores.blacklist = Arc::new(BlacklistRepository::new(pool.clone()));
        stores.health = stores.health.with_database(pool);
    }

    #[cfg(feature = "cache")]
    if let Some(cache) = &config.cache {
        use routepay_backend::cache::{init_cache_pool, CachePoolConfig, RedisRiskHistoryStore};

        let pool = init_cache_pool(CachePoolConfig::from(cache)).await?;
        stores.risk = Arc::new(RedisRiskHistoryStore::from_config(pool.clone(), cache));
        stores.health = stores.health.with_cache(pool);
        info!("Risk histories shared through Redis");
    }

    #[cfg(not(all(feature = "database", feature = "cache")))]
    let _ = config;

    Ok(stores)
}

fn demo_request() -> TransferRequest {
    TransferRequest {
        sender_id: "demo-sender".to_string(),
        sender_identity: "demo.sender@example.com".to_string(),
        recipient_id: "demo-recipient".to_string(),
        recipient_name: "Demo Recipient".to_string(),
        amount: Decimal::new(100, 0),
        from_currency: "TRY".to_string(),
        to_currency: "USD".to_string(),
        sender_country: "TR".to_string(),
        recipient_country: "US".to_string(),
        mode: OptimizationMode::Balanced,
        preferred_provider: None,
        ip_address: "127.0.0.1".to_string(),
        device_id: "demo-device".to_string(),
        card_token: None,
        description: "demo transfer".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("tracing already initialised: {}", e);
    }
    config.validate()?;

    let skip_externals = std::env::var("SKIP_EXTERNALS")
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true";

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting routepay backend"
    );

    let registry = Arc::new(ProviderRegistry::from_config(&config.providers).await?);
    let stores = init_stores(&config, registry.clone(), skip_externals).await?;

    let fraud = Arc::new(FraudEngine::new(config.fraud.clone(), stores.risk));
    let routing = Arc::new(RoutingEngine::new(registry));
    let orchestrator = PaymentOrchestrator::new(
        config.orchestrator.clone(),
        fraud,
        routing,
        stores.blacklist,
        stores.transactions,
        Arc::new(LoggingReceiptSink),
    );

    let run = async {
        let result = orchestrator.initiate_transfer(demo_request()).await?;
        info!(
            status = ?result.status,
            provider = ?result.selected_provider,
            total_cost = ?result.total_cost,
            "demo transfer finished"
        );
        println!("{}", serde_json::to_string_pretty(&result)?);

        let health = stores.health.check_health().await;
        if !health.is_healthy() {
            warn!(status = ?health.status, "system not fully healthy");
        }
        println!("{}", serde_json::to_string_pretty(&health)?);
        anyhow::Ok(())
    };

    tokio::select! {
        outcome = run => outcome?,
        _ = shutdown_signal() => {
            warn!("Demo interrupted before completion");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
