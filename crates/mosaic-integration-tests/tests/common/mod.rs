//! Shared helpers for integration tests.

use std::time::Duration;

use mosaic_config::FrameworkConfig;
use mosaic_test::prelude::*;

/// Let every runnable task finish. Tests run with paused time, so the sleep
/// only completes once the runtime is otherwise idle.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Wait until `handle` reports `status`.
#[allow(dead_code)]
pub async fn wait_for_status(handle: &MicroAppHandle, status: AppStatus) {
    let mut rx = handle.watch_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("{} never reached {status}", handle.name()))
        .expect("status channel closed");
}

/// A harness with one container per app and a recording entry for each.
#[allow(dead_code)]
pub fn harness_with_apps(apps: &[&str]) -> TestHarness {
    let harness = TestHarness::new();
    for name in apps {
        harness.container(&format!("{name}-root"));
        harness
            .fetcher
            .register(format!("//{name}.test"), MockEntry::recording(name, &harness.log));
    }
    harness
}

/// `name` mounted into its own `#{name}-root` container.
#[allow(dead_code)]
pub fn app(name: &str) -> AppDescriptor {
    test_app(name, &format!("{name}-root"))
}

/// Default ad-hoc configuration with singular mode on.
#[allow(dead_code)]
pub fn singular() -> Configuration {
    Configuration::new(FrameworkConfig {
        singular: true,
        ..FrameworkConfig::default()
    })
}

/// Default ad-hoc configuration with singular mode off.
#[allow(dead_code)]
pub fn concurrent() -> Configuration {
    Configuration::new(FrameworkConfig {
        singular: false,
        ..FrameworkConfig::default()
    })
}
