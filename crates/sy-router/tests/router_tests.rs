//! Router core integration tests.
//!
//! Driven end-to-end through the registry and connection cache against the
//! in-memory store backend, with out-of-band store mutations standing in for
//! crashes and external corruption.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use sy_common::RouteAddr;
use sy_config::{AppConfig, StoreSettings};
use sy_router::{
    ConnectionCache, ListStore, MemoryListStore, Router, RouteOp, RouterError, RouterRegistry,
    StoreError, StoreFactory,
};

/// Hands out one persistent in-memory store per prefix so tests can inspect
/// and corrupt the same lists the router writes.
struct SharedMemoryFactory {
    stores: Mutex<HashMap<String, Arc<MemoryListStore>>>,
}

impl SharedMemoryFactory {
    fn new() -> Self {
        Self {
            stores: Mutex::new(HashMap::new()),
        }
    }

    fn store(&self, prefix: &str) -> Arc<MemoryListStore> {
        self.stores
            .lock()
            .entry(prefix.to_string())
            .or_insert_with(|| Arc::new(MemoryListStore::new()))
            .clone()
    }
}

#[async_trait]
impl StoreFactory for SharedMemoryFactory {
    async fn connect(
        &self,
        prefix: &str,
        _settings: &StoreSettings,
    ) -> Result<Arc<dyn ListStore>, StoreError> {
        Ok(self.store(prefix) as Arc<dyn ListStore>)
    }
}

fn harness(config_toml: &str) -> (Arc<RouterRegistry>, Arc<SharedMemoryFactory>) {
    let config: Arc<AppConfig> = Arc::new(toml::from_str(config_toml).unwrap());
    let factory = Arc::new(SharedMemoryFactory::new());
    let cache = Arc::new(ConnectionCache::new(config.clone(), factory.clone()));
    let registry = Arc::new(RouterRegistry::with_builtin(config, cache));
    (registry, factory)
}

async fn frontend(registry: &RouterRegistry) -> Arc<dyn Router> {
    registry.get("frontend").await.unwrap()
}

fn route(s: &str) -> RouteAddr {
    s.parse().unwrap()
}

const DOMAIN_CONFIG: &str = "domain = \"apps.test\"";

#[tokio::test]
async fn add_backend_creates_marker_list() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    let store = factory.store("frontend");
    assert_eq!(store.contents("frontend:tip.apps.test"), vec!["tip"]);

    // Idempotent create: a second call does not duplicate the marker.
    router.add_backend("tip").await.unwrap();
    assert_eq!(store.contents("frontend:tip.apps.test"), vec!["tip"]);
}

#[tokio::test]
async fn remove_backend_leaves_empty_list() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    router.remove_backend("tip").await.unwrap();
    assert!(factory
        .store("frontend")
        .contents("frontend:tip.apps.test")
        .is_empty());
}

#[tokio::test]
async fn remove_backend_without_canonical_list_fails() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    let err = router.remove_backend("ghost").await.unwrap_err();
    assert!(matches!(err, RouterError::BackendNotFound));
}

#[tokio::test]
async fn first_route_lands_after_marker() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    router
        .add_route("tip", &route("http://10.10.10.10:8080"))
        .await
        .unwrap();
    assert_eq!(
        factory.store("frontend").contents("frontend:tip.apps.test"),
        vec!["tip", "http://10.10.10.10:8080"]
    );
}

#[tokio::test]
async fn duplicate_route_is_rejected() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    let addr = route("http://10.10.10.10:8080");
    router.add_route("tip", &addr).await.unwrap();
    let err = router.add_route("tip", &addr).await.unwrap_err();
    assert!(matches!(err, RouterError::RouteExists));
}

#[tokio::test]
async fn add_route_appends_to_every_mirror() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    router
        .add_route("tip", &route("http://10.10.10.10:8080"))
        .await
        .unwrap();
    router.set_cname("mycname.com", "tip").await.unwrap();

    router
        .add_route("tip", &route("http://10.10.10.11:8080"))
        .await
        .unwrap();
    assert_eq!(
        factory.store("frontend").contents("frontend:mycname.com"),
        vec!["tip", "http://10.10.10.10:8080", "http://10.10.10.11:8080"]
    );
}

#[tokio::test]
async fn add_route_after_out_of_band_delete_reports_backend_not_found() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("b1").await.unwrap();
    // Corruption: the canonical list vanishes underneath the router.
    let store = factory.store("frontend");
    store
        .delete(&["frontend:b1.apps.test".to_string()])
        .await
        .unwrap();

    let err = router
        .add_route("b1", &route("http://127.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::BackendNotFound));
}

#[tokio::test]
async fn remove_route_strips_canonical_and_mirrors() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    let addr = route("http://10.10.10.10");
    router.add_route("tip", &addr).await.unwrap();
    router.set_cname("test.com", "tip").await.unwrap();

    router.remove_route("tip", &addr).await.unwrap();
    let store = factory.store("frontend");
    assert_eq!(store.contents("frontend:tip.apps.test"), vec!["tip"]);
    assert_eq!(store.contents("frontend:test.com"), vec!["tip"]);
}

#[tokio::test]
async fn remove_route_of_absent_address_is_a_noop() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    router
        .remove_route("tip", &route("http://10.10.10.99"))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_domain_tags_errors_with_operation_label() {
    let (registry, _) = harness("");
    let router = frontend(&registry).await;

    let addr = route("http://10.10.10.10");
    let err = router.add_route("tip", &addr).await.unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Add));

    let err = router.remove_route("tip", &addr).await.unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Remove));

    let err = router.addr("tip").await.unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Get));
}

#[tokio::test]
async fn connectivity_failure_is_tagged_and_not_permanent() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    let store = factory.store("frontend");
    store.set_available(false);

    // The existence read inside add_route carries the "routes" label.
    let err = router
        .add_route("tip", &route("http://10.10.10.10"))
        .await
        .unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Routes));

    let err = router
        .remove_route("tip", &route("http://10.10.10.10"))
        .await
        .unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Remove));

    let err = router.addr("tip").await.unwrap_err();
    assert_eq!(err.op_label(), Some(RouteOp::Get));

    assert!(router.health_check().await.is_err());

    // The cache is not poisoned: the store coming back is enough.
    store.set_available(true);
    router
        .add_route("tip", &route("http://10.10.10.10"))
        .await
        .unwrap();
    assert!(router.health_check().await.is_ok());
}

#[tokio::test]
async fn addr_returns_canonical_hostname() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    assert_eq!(router.addr("tip").await.unwrap(), "tip.apps.test");

    let err = router.addr("ghost").await.unwrap_err();
    assert!(matches!(err, RouterError::BackendNotFound));
}

#[tokio::test]
async fn routes_excludes_marker_and_skips_garbage() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    let addr = route("http://10.10.10.10:8080");
    router.add_route("tip", &addr).await.unwrap();

    // A corrupted element must not take the whole route set down.
    factory
        .store("frontend")
        .push("frontend:tip.apps.test", &["not a url".to_string()])
        .await
        .unwrap();

    assert_eq!(router.routes("tip").await.unwrap(), vec![addr]);
}

#[tokio::test]
async fn set_cname_clones_canonical_list_and_records_alias() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("myapp").await.unwrap();
    router
        .add_route("myapp", &route("http://10.10.10.10"))
        .await
        .unwrap();
    router
        .add_route("myapp", &route("http://10.10.10.11"))
        .await
        .unwrap();
    router.set_cname("mycname.com", "myapp").await.unwrap();

    let store = factory.store("frontend");
    assert_eq!(
        store.contents("frontend:mycname.com"),
        vec!["myapp", "http://10.10.10.10", "http://10.10.10.11"]
    );
    assert_eq!(store.contents("cname:myapp"), vec!["mycname.com"]);
}

#[tokio::test]
async fn set_cname_for_unknown_backend_fails() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    let err = router.set_cname("mycname.com", "ghost").await.unwrap_err();
    assert!(matches!(err, RouterError::BackendNotFound));
}

#[tokio::test]
async fn set_cname_repairs_diverged_mirror_and_keeps_reporting_exists() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("myapp").await.unwrap();
    router
        .add_route("myapp", &route("http://10.10.10.10"))
        .await
        .unwrap();
    router
        .add_route("myapp", &route("http://10.10.10.11"))
        .await
        .unwrap();
    router.set_cname("mycname.com", "myapp").await.unwrap();

    let store = factory.store("frontend");
    let expected = vec![
        "myapp".to_string(),
        "http://10.10.10.10".to_string(),
        "http://10.10.10.11".to_string(),
    ];
    assert_eq!(store.contents("frontend:mycname.com"), expected);

    // Divergence by extra element.
    store
        .push("frontend:mycname.com", &["http://invalid.addr:1234".to_string()])
        .await
        .unwrap();
    let err = router.set_cname("mycname.com", "myapp").await.unwrap_err();
    assert!(matches!(err, RouterError::CNameExists));
    assert_eq!(store.contents("frontend:mycname.com"), expected);

    // Divergence by missing element.
    store
        .remove_all("frontend:mycname.com", "http://10.10.10.10")
        .await
        .unwrap();
    let err = router.set_cname("mycname.com", "myapp").await.unwrap_err();
    assert!(matches!(err, RouterError::CNameExists));
    assert_eq!(store.contents("frontend:mycname.com"), expected);

    // Already consistent: still never plain success again.
    let err = router.set_cname("mycname.com", "myapp").await.unwrap_err();
    assert!(matches!(err, RouterError::CNameExists));
    assert_eq!(store.contents("frontend:mycname.com"), expected);
}

#[tokio::test]
async fn set_cname_after_mirror_deleted_out_of_band_recreates_it() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("myapp").await.unwrap();
    router.set_cname("mycname.com", "myapp").await.unwrap();

    let store = factory.store("frontend");
    store
        .delete(&["frontend:mycname.com".to_string()])
        .await
        .unwrap();

    // Absent mirror again, so re-registration is plain success, and the
    // alias set must not grow a duplicate entry.
    router.set_cname("mycname.com", "myapp").await.unwrap();
    assert_eq!(store.contents("frontend:mycname.com"), vec!["myapp"]);
    assert_eq!(store.contents("cname:myapp"), vec!["mycname.com"]);
}

#[tokio::test]
async fn remove_backend_cascades_over_mirrors_and_alias_set() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("tip").await.unwrap();
    router.set_cname("c.example.com", "tip").await.unwrap();
    router.remove_backend("tip").await.unwrap();

    let store = factory.store("frontend");
    assert!(store.contents("cname:tip").is_empty());
    assert!(store.contents("frontend:c.example.com").is_empty());
    assert!(store.contents("frontend:tip.apps.test").is_empty());
}

#[tokio::test]
async fn unsetting_one_alias_leaves_the_other_untouched() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("myapp").await.unwrap();
    router
        .add_route("myapp", &route("http://10.10.10.10"))
        .await
        .unwrap();
    router.set_cname("one.example.com", "myapp").await.unwrap();
    router.set_cname("two.example.com", "myapp").await.unwrap();

    let store = factory.store("frontend");
    assert_eq!(store.contents("cname:myapp").len(), 2);

    router.unset_cname("one.example.com", "myapp").await.unwrap();
    assert_eq!(store.contents("cname:myapp"), vec!["two.example.com"]);
    assert!(store.contents("frontend:one.example.com").is_empty());
    assert_eq!(
        store.contents("frontend:two.example.com"),
        vec!["myapp", "http://10.10.10.10"]
    );
}

#[tokio::test]
async fn unset_cname_of_unregistered_alias_is_a_noop() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("myapp").await.unwrap();
    router.unset_cname("never-set.com", "myapp").await.unwrap();
}

#[tokio::test]
async fn swap_exchanges_canonical_route_sets() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("b1").await.unwrap();
    router.add_route("b1", &route("http://127.0.0.1")).await.unwrap();
    router.add_backend("b2").await.unwrap();
    router
        .add_route("b2", &route("http://10.10.10.10"))
        .await
        .unwrap();

    router.swap("b1", "b2", false).await.unwrap();

    let store = factory.store("frontend");
    assert_eq!(
        store.contents("frontend:b1.apps.test"),
        vec!["b1", "http://10.10.10.10"]
    );
    assert_eq!(
        store.contents("frontend:b2.apps.test"),
        vec!["b2", "http://127.0.0.1"]
    );
}

#[tokio::test]
async fn swap_rewrites_mirrors_with_the_new_address_sets() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("b1").await.unwrap();
    router.add_route("b1", &route("http://127.0.0.1")).await.unwrap();
    router.set_cname("b1.example.com", "b1").await.unwrap();
    router.add_backend("b2").await.unwrap();
    router
        .add_route("b2", &route("http://10.10.10.10"))
        .await
        .unwrap();

    router.swap("b1", "b2", false).await.unwrap();
    assert_eq!(
        factory.store("frontend").contents("frontend:b1.example.com"),
        vec!["b1", "http://10.10.10.10"]
    );
}

#[tokio::test]
async fn cname_only_swap_leaves_canonical_lists_alone() {
    let (registry, factory) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("b1").await.unwrap();
    router.add_route("b1", &route("http://127.0.0.1")).await.unwrap();
    router.set_cname("b1.example.com", "b1").await.unwrap();
    router.add_backend("b2").await.unwrap();
    router
        .add_route("b2", &route("http://10.10.10.10"))
        .await
        .unwrap();
    router.set_cname("b2.example.com", "b2").await.unwrap();

    router.swap("b1", "b2", true).await.unwrap();

    let store = factory.store("frontend");
    // Canonical lists keep their own routes.
    assert_eq!(
        store.contents("frontend:b1.apps.test"),
        vec!["b1", "http://127.0.0.1"]
    );
    assert_eq!(
        store.contents("frontend:b2.apps.test"),
        vec!["b2", "http://10.10.10.10"]
    );
    // The mirrors carry the exchanged sets.
    assert_eq!(
        store.contents("frontend:b1.example.com"),
        vec!["b1", "http://10.10.10.10"]
    );
    assert_eq!(
        store.contents("frontend:b2.example.com"),
        vec!["b2", "http://127.0.0.1"]
    );
}

#[tokio::test]
async fn swap_with_missing_backend_fails() {
    let (registry, _) = harness(DOMAIN_CONFIG);
    let router = frontend(&registry).await;

    router.add_backend("b1").await.unwrap();
    let err = router.swap("b1", "ghost", false).await.unwrap_err();
    assert!(matches!(err, RouterError::BackendNotFound));
}

#[tokio::test]
async fn instances_with_distinct_prefixes_use_distinct_stores() {
    let (registry, factory) = harness(
        r#"
        domain = "apps.test"
        [routers.inst1]
        type = "frontend"
        [routers.inst2]
        type = "frontend"
        "#,
    );

    let r1 = registry.get("inst1").await.unwrap();
    let r2 = registry.get("inst2").await.unwrap();
    r1.add_backend("tip").await.unwrap();
    r2.add_backend("tip").await.unwrap();
    r1.add_route("tip", &route("http://10.0.0.1")).await.unwrap();

    assert_eq!(
        factory.store("inst1").contents("frontend:tip.apps.test"),
        vec!["tip", "http://10.0.0.1"]
    );
    assert_eq!(
        factory.store("inst2").contents("frontend:tip.apps.test"),
        vec!["tip"]
    );
}
