//! Route-driven lifecycles through registration and `start()`.
//!
//! Covers:
//! - register, start, navigate and remount without reloading
//! - loaders blocking until `start()`
//! - duplicate, invalid and rejected registrations
//! - prefetch passthrough and router start bookkeeping

mod common;

use std::sync::Arc;

use common::{app, harness_with_apps, settle};
use mosaic_config::{FrameworkConfig, PrefetchStrategy};
use mosaic_runtime::host::RouterStartOptions;
use mosaic_test::prelude::*;

fn routed(name: &str) -> AppDescriptor {
    app(name).with_activation(ActivationRule::prefix(format!("/{name}")))
}

fn after_mount_hooks(log: &EventLog) -> LifecycleHooks {
    let log = log.clone();
    LifecycleHooks::new().on(HookStage::AfterMount, move |ctx: HookContext| {
        log.push(format!("hook:after_mount:{}", ctx.app.name));
        async { Ok::<_, anyhow::Error>(()) }
    })
}

#[tokio::test(start_paused = true)]
async fn test_register_start_and_navigate() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();

    frontend
        .register_micro_apps(vec![routed("a"), routed("b")], after_mount_hooks(&harness.log))
        .unwrap();
    assert_eq!(harness.router.registered(), vec!["a", "b"]);
    assert_eq!(frontend.registered_apps(), vec!["a", "b"]);

    frontend.start(None).unwrap();
    assert!(frontend.is_started());
    assert_eq!(harness.router.start_count(), 1);
    assert_eq!(
        harness.router.start_options(),
        Some(RouterStartOptions {
            url_reroute_only: true
        })
    );

    harness.router.navigate("/a/orders").await;
    assert_eq!(harness.router.status("a"), Some(AppStatus::Mounted));
    assert_eq!(harness.router.status("b"), Some(AppStatus::NotLoaded));
    assert!(harness.log.before("a:mount", "hook:after_mount:a"));

    harness.router.navigate("/b").await;
    assert_eq!(harness.router.status("a"), Some(AppStatus::Unmounted));
    assert_eq!(harness.router.status("b"), Some(AppStatus::Mounted));
    assert!(harness.log.before("a:unmount", "b:mount"));

    harness.router.navigate("/a").await;
    assert_eq!(harness.router.status("a"), Some(AppStatus::Mounted));
    assert_eq!(harness.log.count("a:bootstrap"), 1);
    assert_eq!(harness.log.count("a:mount"), 2);
    assert_eq!(harness.fetcher.fetch_count("//a.test"), 1);
    assert_eq!(harness.log.count("hook:after_mount:a"), 2);

    // Router-driven apps run singular by default.
    assert!(!frontend.gate().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_loader_waits_for_start() {
    let harness = harness_with_apps(&["a"]);
    let frontend = harness.frontend();
    let loading = {
        let log = harness.log.clone();
        routed("a").with_loader(move |on| log.push(format!("loader:{on}")))
    };
    frontend
        .register_micro_apps(vec![loading], LifecycleHooks::new())
        .unwrap();

    let router = Arc::clone(&harness.router);
    let navigation = tokio::spawn(async move { router.navigate("/a").await });
    settle().await;
    assert_eq!(harness.router.status("a"), Some(AppStatus::Loading));
    assert_eq!(harness.fetcher.fetch_count("//a.test"), 0);
    assert!(harness.log.contains("loader:true"));

    frontend.start(None).unwrap();
    navigation.await.unwrap();
    assert_eq!(harness.router.status("a"), Some(AppStatus::Mounted));
    assert!(harness.log.before("a:mount", "loader:false"));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_registration_is_ignored() {
    let harness = harness_with_apps(&["a"]);
    let frontend = harness.frontend();

    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();
    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();
    assert_eq!(frontend.registered_apps(), vec!["a"]);
    assert_eq!(harness.router.registered(), vec!["a"]);
}

#[test]
fn test_invalid_registrations_are_router_errors() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();

    let err = frontend
        .register_micro_apps(vec![app("a")], LifecycleHooks::new())
        .unwrap_err();
    assert!(matches!(err, MosaicError::Router(_)));
    assert!(frontend.registered_apps().is_empty());

    harness.router.reject("b");
    let err = frontend
        .register_micro_apps(vec![routed("a"), routed("b")], LifecycleHooks::new())
        .unwrap_err();
    assert!(err.to_string().contains("refused"));
    assert_eq!(frontend.registered_apps(), vec!["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_is_reported_to_router() {
    let harness = harness_with_apps(&["a"]);
    harness.fetcher.fail("//a.test");
    let frontend = harness.frontend();
    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();
    frontend.start(None).unwrap();

    harness.router.navigate("/a").await;
    assert_eq!(harness.router.status("a"), Some(AppStatus::LoadError));
    assert!(matches!(
        harness.router.error("a"),
        Some(MosaicError::EntryFetch { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remove_unregisters_from_router() {
    let harness = harness_with_apps(&["a"]);
    let frontend = harness.frontend();
    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();

    frontend.remove_micro_app("a").unwrap();
    assert!(harness.router.registered().is_empty());
    assert!(frontend.registered_apps().is_empty());

    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();
    assert_eq!(harness.router.registered(), vec!["a"]);
}

#[test]
fn test_start_prefetches_registered_apps() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();
    frontend
        .register_micro_apps(vec![routed("a"), routed("b")], LifecycleHooks::new())
        .unwrap();
    frontend.start(None).unwrap();

    let calls = harness.prefetcher.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].apps, vec!["a", "b"]);
    assert_eq!(calls[0].strategy, PrefetchStrategy::Enabled(true));
}

#[test]
fn test_prefetch_disabled() {
    let harness = harness_with_apps(&["a"]);
    let frontend = harness.frontend_with(Configuration::new(FrameworkConfig {
        prefetch: PrefetchStrategy::Enabled(false),
        ..FrameworkConfig::default()
    }));
    frontend
        .register_micro_apps(vec![routed("a")], LifecycleHooks::new())
        .unwrap();
    frontend.start(None).unwrap();
    assert!(harness.prefetcher.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_router_starts_once() {
    let harness = harness_with_apps(&["a"]);
    let frontend = harness.frontend();

    let handle = frontend
        .load_micro_app(app("a"), None, LifecycleHooks::new())
        .unwrap();
    assert_eq!(harness.router.start_count(), 1);
    handle.mount_promise().await.unwrap();

    frontend.start(None).unwrap();
    frontend.start(None).unwrap();
    assert_eq!(harness.router.start_count(), 1);
}
