//! Test fixtures: event logs, recording modules and ready-made descriptors.

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use mosaic_runtime::{AppDescriptor, ContainerTarget, Entry, ExportedModule, LifecycleProps};

/// Ordered, shareable log of lifecycle events (`"app:mount"`, ...).
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    /// Snapshot of every event so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `event` was logged.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.entries().iter().any(|e| e == event)
    }

    /// Index of the first occurrence of `event`.
    #[must_use]
    pub fn position(&self, event: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == event)
    }

    /// How many times `event` was logged.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.entries().iter().filter(|e| *e == event).count()
    }

    /// Whether `first` was logged before `second`.
    #[must_use]
    pub fn before(&self, first: &str, second: &str) -> bool {
        matches!(
            (self.position(first), self.position(second)),
            (Some(a), Some(b)) if a < b
        )
    }
}

fn record(
    log: &EventLog,
    name: &str,
    phase: &str,
) -> impl Fn(LifecycleProps) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
    let log = log.clone();
    let event = format!("{name}:{phase}");
    move |_props: LifecycleProps| {
        let log = log.clone();
        let event = event.clone();
        async move {
            tokio::task::yield_now().await;
            log.push(event);
            Ok::<_, anyhow::Error>(())
        }
        .boxed()
    }
}

/// A module whose lifecycles log `"{name}:bootstrap"`, `"{name}:mount"`,
/// `"{name}:unmount"` and `"{name}:update"`, yielding once first.
#[must_use]
pub fn recording_module(name: &str, log: &EventLog) -> ExportedModule {
    ExportedModule::new()
        .with_bootstrap(record(log, name, "bootstrap"))
        .with_mount(record(log, name, "mount"))
        .with_unmount(record(log, name, "unmount"))
        .with_update(record(log, name, "update"))
}

/// `name` served from `//{name}.test` into `#{container_id}`.
#[must_use]
pub fn test_app(name: &str, container_id: &str) -> AppDescriptor {
    AppDescriptor::new(name, Entry::url(format!("//{name}.test")))
        .with_container(ContainerTarget::selector(format!("#{container_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_ordering() {
        let log = EventLog::new();
        log.push("a:mount");
        log.push("b:mount");
        log.push("a:mount");
        assert_eq!(log.count("a:mount"), 2);
        assert!(log.before("a:mount", "b:mount"));
        assert!(!log.before("b:mount", "c:mount"));
    }

    #[tokio::test]
    async fn test_recording_module_logs_phases() {
        let log = EventLog::new();
        let module = recording_module("a", &log);
        let props = LifecycleProps {
            name: "a".to_owned(),
            props: serde_json::json!({}),
            container: None,
            global_state: None,
        };
        (module.mount.unwrap())(props).await.unwrap();
        assert_eq!(log.entries(), vec!["a:mount"]);
    }
}
