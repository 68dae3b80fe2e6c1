//! Startup warming never delays readiness and tolerates failing targets.

mod common;

use std::sync::Arc;

use common::{TrackedRepository, User, tenant, user};
use serde::{Deserialize, Serialize};
use tenant_cache::{
    CacheAppConfig, CacheKey, CacheRuntime, CacheableEntity, CollectionQuery, Namespace,
    Repository, RepositoryWarmingTarget, TargetOutcome,
};
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Product {
    sku: String,
    price_cents: u64,
}

impl CacheableEntity for Product {
    fn entity_id(&self) -> String {
        self.sku.clone()
    }
}

#[tokio::test]
async fn test_failing_target_does_not_block_readiness_or_other_targets() {
    let runtime = CacheRuntime::start(CacheAppConfig::default()).await.unwrap();
    let acme = tenant("acme");
    let users_ns = Namespace::parse("users").unwrap();
    let products_ns = Namespace::parse("products").unwrap();

    let users_repo = TrackedRepository::<User>::new("users");
    users_repo.store.save(&acme, user("U1", "Ada", "ACTIVE")).await.unwrap();
    let products_repo = TrackedRepository::<Product>::new("products");
    products_repo
        .store
        .save(&acme, Product { sku: "P1".into(), price_cents: 999 })
        .await
        .unwrap();
    products_repo.set_failing(true);

    let warmer = runtime
        .warmer()
        .with_target(Arc::new(
            RepositoryWarmingTarget::new("users", users_ns.clone(), Arc::clone(&users_repo))
                .entity(acme.clone(), "U1")
                .collection(acme.clone(), CollectionQuery::new().with("status", "ACTIVE")),
        ))
        .with_target(Arc::new(
            RepositoryWarmingTarget::new("products", products_ns.clone(), Arc::clone(&products_repo))
                .entity(acme.clone(), "P1"),
        ));

    let (ready_tx, ready_rx) = watch::channel(false);
    let handle = runtime.spawn_warming(warmer, ready_rx).unwrap();

    // The host flips to ready without waiting on warming.
    ready_tx.send(true).unwrap();
    let report = handle.await.unwrap();

    assert_eq!(report.get("users").unwrap().outcome, TargetOutcome::Warmed { entries: 2 });
    assert!(matches!(report.get("products").unwrap().outcome, TargetOutcome::Failed { .. }));

    // Warmed entries are served as ordinary hits.
    let users = runtime.cached(Arc::clone(&users_repo), users_ns);
    let reads_before = users_repo.reads();
    users.find_by_id(&acme, "U1").await.unwrap();
    assert_eq!(users_repo.reads(), reads_before);

    // The failed namespace fills on first read once its store recovers.
    products_repo.set_failing(false);
    let products = runtime.cached(Arc::clone(&products_repo), products_ns.clone());
    let product = products.find_by_id(&acme, "P1").await.unwrap().unwrap();
    assert_eq!(product.price_cents, 999);
    assert!(
        runtime
            .client()
            .exists(&CacheKey::for_entity(&acme, &products_ns, "P1").unwrap())
            .await
    );

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_disabled_warming_spawns_nothing() {
    let mut config = CacheAppConfig::default();
    config.warming.enabled = false;
    let runtime = CacheRuntime::start(config).await.unwrap();
    let (_ready_tx, ready_rx) = watch::channel(true);

    assert!(runtime.spawn_warming(runtime.warmer(), ready_rx).is_none());
    runtime.shutdown().await;
}
