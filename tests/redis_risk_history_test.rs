//! Integration tests for the Redis-backed risk history store
//!
//! Requires: REDIS_URL
//! Run with: cargo test --test redis_risk_history_test -- --ignored

#![cfg(feature = "cache")]

use chrono::{TimeZone, Utc};
use routepay_backend::cache::{init_cache_pool, CachePoolConfig, RedisRiskHistoryStore};
use routepay_backend::fraud::{
    FraudConfig, FraudEngine, RiskAction, RiskError, RiskHistoryStore, RiskSignal,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn setup_store() -> RedisRiskHistoryStore {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let pool = init_cache_pool(CachePoolConfig {
        redis_url,
        ..Default::default()
    })
    .await
    .expect("Redis init");
    RedisRiskHistoryStore::new(pool, Duration::from_secs(60), Duration::from_millis(2000))
}

fn signal(user: &str) -> RiskSignal {
    RiskSignal {
        user_id: user.to_string(),
        amount: Decimal::new(100, 0),
        sender_country: "US".to_string(),
        recipient_country: "US".to_string(),
        ip_address: "10.0.0.1".to_string(),
        device_id: "device-1".to_string(),
        card_token: None,
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    }
}

#[tokio::test]
#[ignore]
async fn test_history_round_trips_through_redis() {
    let store = setup_store().await;
    let user = format!("it-{}", Uuid::new_v4());

    assert!(store.load(&user).await.unwrap().is_empty());

    let mut history = store.load(&user).await.unwrap();
    history.record(&signal(&user));
    store.save(&user, &history).await.unwrap();
    assert_eq!(store.load(&user).await.unwrap(), history);

    store.clear(&user).await.unwrap();
    assert!(store.load(&user).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_lease_is_exclusive_until_released() {
    let store = setup_store()
        .await
        .with_acquire_timeout(Duration::from_millis(200));
    let user = format!("it-{}", Uuid::new_v4());

    let lease = store.acquire(&user).await.unwrap();
    let contended = store.acquire(&user).await;
    assert!(matches!(contended, Err(RiskError::LockTimeout { .. })));

    store.release(lease).await.unwrap();
    let again = store.acquire(&user).await.unwrap();
    store.release(again).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_two_engines_share_velocity() {
    let store: Arc<dyn RiskHistoryStore> = Arc::new(setup_store().await);
    let first = FraudEngine::new(FraudConfig::default(), store.clone());
    let second = FraudEngine::new(FraudConfig::default(), store.clone());
    let user = format!("it-{}", Uuid::new_v4());

    for engine in [&first, &second, &first, &second] {
        let assessment = engine.screen(&signal(&user)).await.unwrap();
        assert_ne!(assessment.action, RiskAction::Decline);
    }
    let fifth = second.screen(&signal(&user)).await.unwrap();
    assert_eq!(fifth.action, RiskAction::Decline);

    first.clear_user_history(&user).await.unwrap();
}
