//! Singular mode: at most one app active at a time.
//!
//! Covers:
//! - a second app waits at the gate until the first has unmounted
//! - one release admits exactly one waiter
//! - failures in mount or unmount never strand waiters
//! - per-app singular predicates and concurrent mode

mod common;

use common::{app, concurrent, harness_with_apps, settle, singular, wait_for_status};
use mosaic_test::prelude::*;

fn failing_mount_entry(name: &str, log: &EventLog) -> MockEntry {
    let module = recording_module(name, log)
        .with_mount(|_: LifecycleProps| async { Err::<(), _>(anyhow::anyhow!("render crashed")) });
    MockEntry::new(format!("<p>{name}</p>")).exporting(module)
}

#[tokio::test(start_paused = true)]
async fn test_second_app_waits_for_first_to_unmount() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();

    let a = frontend
        .load_micro_app(app("a"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    a.mount_promise().await.unwrap();
    assert!(!frontend.gate().is_idle());

    let b = frontend
        .load_micro_app(app("b"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    wait_for_status(&b, AppStatus::Mounting).await;
    settle().await;

    // Bootstrap is not gated, mount is.
    assert!(harness.log.contains("b:bootstrap"));
    assert!(!harness.log.contains("b:mount"));
    assert_eq!(b.status(), AppStatus::Mounting);

    a.unmount().await.unwrap();
    b.mount_promise().await.unwrap();
    assert!(harness.log.before("a:unmount", "b:mount"));
    assert_eq!(b.status(), AppStatus::Mounted);

    b.unmount().await.unwrap();
    assert!(frontend.gate().is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_one_release_admits_one_waiter() {
    let harness = harness_with_apps(&["a", "b", "c"]);
    let frontend = harness.frontend();

    let a = frontend
        .load_micro_app(app("a"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    a.mount_promise().await.unwrap();

    let b = frontend
        .load_micro_app(app("b"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    let c = frontend
        .load_micro_app(app("c"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    settle().await;
    assert_eq!(b.status(), AppStatus::Mounting);
    assert_eq!(c.status(), AppStatus::Mounting);

    a.unmount().await.unwrap();
    settle().await;

    let mounted: Vec<_> = [&b, &c]
        .into_iter()
        .filter(|h| h.status() == AppStatus::Mounted)
        .collect();
    assert_eq!(mounted.len(), 1, "exactly one waiter may proceed");
    let (first, second) = if b.status() == AppStatus::Mounted {
        (&b, &c)
    } else {
        (&c, &b)
    };
    assert_eq!(second.status(), AppStatus::Mounting);

    first.unmount().await.unwrap();
    second.mount_promise().await.unwrap();
    assert!(harness.log.before(
        &format!("{}:unmount", first.name()),
        &format!("{}:mount", second.name())
    ));
    assert_eq!(harness.log.count("a:mount"), 1);
    assert_eq!(harness.log.count("b:mount"), 1);
    assert_eq!(harness.log.count("c:mount"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_mount_releases_gate() {
    let harness = harness_with_apps(&["b"]);
    harness.container("broken-root");
    harness
        .fetcher
        .register("//broken.test", failing_mount_entry("broken", &harness.log));
    let frontend = harness.frontend();

    let broken = frontend
        .load_micro_app(app("broken"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    let err = broken.mount_promise().await.unwrap_err();
    assert!(matches!(
        err,
        MosaicError::Lifecycle {
            phase: LifecyclePhase::Mount,
            ..
        }
    ));
    assert_eq!(broken.status(), AppStatus::SkipBecauseBroken);
    assert!(frontend.gate().is_idle());

    let b = frontend
        .load_micro_app(app("b"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    b.mount_promise().await.unwrap();
    assert!(harness.log.contains("b:mount"));
}

#[tokio::test(start_paused = true)]
async fn test_failing_unmount_hook_still_releases_gate() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();
    let hooks = LifecycleHooks::new().on(HookStage::AfterUnmount, |_: HookContext| async {
        Err::<(), _>(anyhow::anyhow!("cleanup failed"))
    });

    let a = frontend
        .load_micro_app(app("a"), Some(singular()), hooks)
        .unwrap();
    a.mount_promise().await.unwrap();

    let b = frontend
        .load_micro_app(app("b"), Some(singular()), LifecycleHooks::new())
        .unwrap();
    wait_for_status(&b, AppStatus::Mounting).await;

    let err = a.unmount().await.unwrap_err();
    assert!(matches!(
        err,
        MosaicError::Hook {
            stage: HookStage::AfterUnmount,
            ..
        }
    ));
    assert_eq!(a.status(), AppStatus::SkipBecauseBroken);
    assert_eq!(a.error().unwrap().to_string(), err.to_string());

    b.mount_promise().await.unwrap();
    assert_eq!(b.status(), AppStatus::Mounted);
}

#[tokio::test(start_paused = true)]
async fn test_singular_predicate_exempts_apps() {
    let harness = harness_with_apps(&["a", "widget"]);
    let frontend = harness.frontend();
    let config = singular().with_singular_predicate(|app| app.name != "widget");

    let a = frontend
        .load_micro_app(app("a"), Some(config.clone()), LifecycleHooks::new())
        .unwrap();
    a.mount_promise().await.unwrap();

    let widget = frontend
        .load_micro_app(app("widget"), Some(config), LifecycleHooks::new())
        .unwrap();
    widget.mount_promise().await.unwrap();
    assert_eq!(a.status(), AppStatus::Mounted);
    assert_eq!(widget.status(), AppStatus::Mounted);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_mode_mounts_side_by_side() {
    let harness = harness_with_apps(&["a", "b"]);
    let frontend = harness.frontend();

    let a = frontend
        .load_micro_app(app("a"), Some(concurrent()), LifecycleHooks::new())
        .unwrap();
    let b = frontend
        .load_micro_app(app("b"), Some(concurrent()), LifecycleHooks::new())
        .unwrap();
    a.mount_promise().await.unwrap();
    b.mount_promise().await.unwrap();
    assert!(frontend.gate().is_idle());

    // Ad-hoc loads without a configuration inherit singular = false.
    harness.container("c-root");
    harness
        .fetcher
        .register("//c.test", MockEntry::recording("c", &harness.log));
    let c = frontend
        .load_micro_app(app("c"), None, LifecycleHooks::new())
        .unwrap();
    c.mount_promise().await.unwrap();
    assert_eq!(a.status(), AppStatus::Mounted);
}
