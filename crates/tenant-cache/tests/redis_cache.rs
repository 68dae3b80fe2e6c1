//! Integration tests against a real Redis.
//!
//! Tests use testcontainers to spin up a Redis instance and are ignored by
//! default; run with `cargo test -- --ignored` where Docker is available.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TrackedRepository, User, tenant, user};
use tenant_cache::{
    CacheAppConfig, CacheBackend, CacheKey, CacheRuntime, CollectionQuery, InvalidationEvent,
    KeyPattern, Namespace, RedisBackend, Repository, connect_redis,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");
            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{host_port}");
            (container, url)
        })
        .await;
    url.clone()
}

async fn redis_config() -> CacheAppConfig {
    let mut config = CacheAppConfig::default();
    config.redis.enabled = true;
    config.redis.url = get_redis_url().await;
    config.cache.operation_timeout_ms = 1000;
    config
}

fn users_ns() -> Namespace {
    Namespace::parse("users").unwrap()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_backend_get_set_delete() {
    let config = redis_config().await;
    let pool = connect_redis(&config.redis).await.expect("redis reachable");
    let backend = RedisBackend::new(pool);

    backend.set("t:k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
    assert_eq!(backend.get("t:k").await.unwrap(), Some(b"v".to_vec()));
    assert!(backend.exists("t:k").await.unwrap());
    assert!(backend.delete("t:k").await.unwrap());
    assert_eq!(backend.get("t:k").await.unwrap(), None);
    backend.ping().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_pattern_delete_is_tenant_scoped() {
    let config = redis_config().await;
    let backend = RedisBackend::new(connect_redis(&config.redis).await.unwrap());
    let acme = tenant("scan-acme");
    let globex = tenant("scan-globex");

    for i in 0..1200 {
        let key = CacheKey::for_entity(&acme, &users_ns(), &format!("U{i}")).unwrap();
        backend.set(key.as_str(), vec![1], Duration::from_secs(60)).await.unwrap();
    }
    let survivor = CacheKey::for_entity(&globex, &users_ns(), "U1").unwrap();
    backend.set(survivor.as_str(), vec![1], Duration::from_secs(60)).await.unwrap();

    let removed = backend
        .delete_by_pattern(&KeyPattern::namespace(&acme, &users_ns()))
        .await
        .unwrap();

    assert_eq!(removed, 1200);
    assert!(backend.exists(survivor.as_str()).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_ttl_expires_entries() {
    let config = redis_config().await;
    let backend = RedisBackend::new(connect_redis(&config.redis).await.unwrap());

    backend.set("ttl:k", vec![1], Duration::from_secs(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(backend.get("ttl:k").await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_published_event_reaches_subscribed_runtime() {
    let runtime = CacheRuntime::start(redis_config().await).await.unwrap();
    assert_eq!(runtime.client().backend_name(), "redis");
    let repo = TrackedRepository::<User>::new("users");
    let users = runtime.cached(Arc::clone(&repo), users_ns());
    let acme = tenant("pubsub-acme");
    repo.store.save(&acme, user("U1", "Ada", "ACTIVE")).await.unwrap();

    users.find_by_id(&acme, "U1").await.unwrap();
    users
        .find_by_query(&acme, &CollectionQuery::new().with("status", "ACTIVE"))
        .await
        .unwrap();
    let entity_key = CacheKey::for_entity(&acme, &users_ns(), "U1").unwrap();
    assert!(runtime.client().exists(&entity_key).await);

    // Give the subscription time to attach before publishing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    runtime
        .publish(&InvalidationEvent::updated(acme.clone(), users_ns(), "U1"))
        .await
        .unwrap();

    let mut evicted = false;
    for _ in 0..50 {
        if !runtime.client().exists(&entity_key).await {
            evicted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(evicted, "entity key still cached after event");

    runtime.shutdown().await;
}
