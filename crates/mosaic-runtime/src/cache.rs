//! Instance cache for ad-hoc loads.
//!
//! Two maps, both owned by one [`MicroFrontend`](crate::MicroFrontend):
//!
//! - in-flight or finished [`PipelineFactory`] constructions, keyed by app
//!   name and container identity (or by name alone when configured), so the
//!   one-time setup runs at most once per logical instance;
//! - per-container lists of live handles, in load order, so a new instance
//!   can wait for earlier ones to unmount before touching the container.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::debug;

use crate::deferred::Deferred;
use crate::error::MosaicResult;
use crate::handle::AppStatus;
use crate::pipeline::PipelineFactory;

/// A factory construction that any number of loads can await.
pub type SharedFactory = Shared<BoxFuture<'static, MosaicResult<PipelineFactory>>>;

/// Cache key for pipeline factories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    /// One instance per app name, whatever the container.
    Name(String),
    /// One instance per app name and container structural path.
    Container {
        /// App name.
        name: String,
        /// Container structural path.
        path: String,
    },
}

impl InstanceKey {
    /// The app the key belongs to.
    #[must_use]
    pub fn app_name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Container { name, .. } => name,
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Container { name, path } => write!(f, "{name}-{path}"),
        }
    }
}

/// A handle tracked in a container list.
#[derive(Debug, Clone)]
pub(crate) struct TrackedInstance {
    pub(crate) id: u64,
    pub(crate) status: watch::Receiver<AppStatus>,
    pub(crate) unmounted: Deferred,
}

impl TrackedInstance {
    fn is_broken(&self) -> bool {
        matches!(
            *self.status.borrow(),
            AppStatus::LoadError | AppStatus::SkipBecauseBroken
        )
    }
}

/// Factory cache and per-container instance tracking.
#[derive(Default)]
pub struct InstanceCache {
    factories: Mutex<HashMap<InstanceKey, SharedFactory>>,
    containers: Mutex<HashMap<String, Vec<TrackedInstance>>>,
}

impl fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCache")
            .field("factories", &self.factory_count())
            .field("containers", &self.lock_containers().len())
            .finish()
    }
}

impl InstanceCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_factories(&self) -> MutexGuard<'_, HashMap<InstanceKey, SharedFactory>> {
        self.factories.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_containers(&self) -> MutexGuard<'_, HashMap<String, Vec<TrackedInstance>>> {
        self.containers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached construction for `key`, or the one `build` produces,
    /// which is cached. The flag is `true` on a cache hit.
    pub fn get_or_insert_with(
        &self,
        key: &InstanceKey,
        build: impl FnOnce() -> SharedFactory,
    ) -> (SharedFactory, bool) {
        let mut factories = self.lock_factories();
        if let Some(existing) = factories.get(key) {
            debug!(%key, "Reusing cached pipeline factory");
            return (existing.clone(), true);
        }
        let factory = build();
        factories.insert(key.clone(), factory.clone());
        (factory, false)
    }

    /// Drop `key` if it still maps to `factory`. Used when a construction
    /// failed so a later load can try again.
    pub fn evict_if_same(&self, key: &InstanceKey, factory: &SharedFactory) -> bool {
        let mut factories = self.lock_factories();
        if factories.get(key).is_some_and(|f| f.ptr_eq(factory)) {
            factories.remove(key);
            debug!(%key, "Evicted failed pipeline factory");
            return true;
        }
        false
    }

    /// Drop every factory of `app_name`. Returns how many were dropped.
    pub fn evict_app(&self, app_name: &str) -> usize {
        let mut factories = self.lock_factories();
        let before = factories.len();
        factories.retain(|key, _| key.app_name() != app_name);
        before.saturating_sub(factories.len())
    }

    /// Number of cached factories.
    #[must_use]
    pub fn factory_count(&self) -> usize {
        self.lock_factories().len()
    }

    /// Whether a factory is cached under `key`.
    #[must_use]
    pub fn contains(&self, key: &InstanceKey) -> bool {
        self.lock_factories().contains_key(key)
    }

    pub(crate) fn track(&self, path: &str, instance: TrackedInstance) {
        self.lock_containers()
            .entry(path.to_owned())
            .or_default()
            .push(instance);
    }

    pub(crate) fn untrack(&self, path: &str, id: u64) {
        let mut containers = self.lock_containers();
        if let Some(list) = containers.get_mut(path) {
            list.retain(|t| t.id != id);
            if list.is_empty() {
                containers.remove(path);
            }
        }
    }

    /// Unmount signals of the handles tracked in `path` before `id` that are
    /// not broken.
    pub(crate) fn prior_unmounts(&self, path: &str, id: u64) -> Vec<Deferred> {
        self.lock_containers()
            .get(path)
            .map(|list| {
                list.iter()
                    .filter(|t| t.id < id && !t.is_broken())
                    .map(|t| t.unmounted.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of handles tracked for the container at `path`.
    #[must_use]
    pub fn tracked(&self, path: &str) -> usize {
        self.lock_containers().get(path).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MosaicError;
    use futures::FutureExt;

    fn failing() -> SharedFactory {
        async { Err(MosaicError::Router("no".to_owned())) }.boxed().shared()
    }

    fn tracked(id: u64, status: AppStatus) -> (TrackedInstance, watch::Sender<AppStatus>) {
        let (tx, rx) = watch::channel(status);
        (
            TrackedInstance {
                id,
                status: rx,
                unmounted: Deferred::new(),
            },
            tx,
        )
    }

    #[test]
    fn test_get_or_insert_reuses() {
        let cache = InstanceCache::new();
        let key = InstanceKey::Name("a".to_owned());
        let (first, hit) = cache.get_or_insert_with(&key, failing);
        assert!(!hit);
        let (second, hit) = cache.get_or_insert_with(&key, || panic!("must not build"));
        assert!(hit);
        assert!(first.ptr_eq(&second));
    }

    #[test]
    fn test_evict_if_same_ignores_replaced_entries() {
        let cache = InstanceCache::new();
        let key = InstanceKey::Container {
            name: "a".to_owned(),
            path: "/html/body/div".to_owned(),
        };
        let (stale, _) = cache.get_or_insert_with(&key, failing);
        assert!(cache.evict_if_same(&key, &stale));
        let (fresh, _) = cache.get_or_insert_with(&key, failing);
        assert!(!cache.evict_if_same(&key, &stale));
        assert!(cache.contains(&key));
        assert!(cache.evict_if_same(&key, &fresh));
    }

    #[test]
    fn test_evict_app_drops_every_key() {
        let cache = InstanceCache::new();
        for key in [
            InstanceKey::Name("a".to_owned()),
            InstanceKey::Container {
                name: "a".to_owned(),
                path: "/x".to_owned(),
            },
            InstanceKey::Name("b".to_owned()),
        ] {
            let _ = cache.get_or_insert_with(&key, failing);
        }
        assert_eq!(cache.evict_app("a"), 2);
        assert_eq!(cache.factory_count(), 1);
        assert_eq!(InstanceKey::Name("b".to_owned()).to_string(), "b");
    }

    #[test]
    fn test_prior_unmounts_skip_broken_and_later() {
        let cache = InstanceCache::new();
        let (one, _s1) = tracked(1, AppStatus::Mounted);
        let (two, s2) = tracked(2, AppStatus::Loading);
        let (three, _s3) = tracked(3, AppStatus::Loading);
        cache.track("/c", one);
        cache.track("/c", two);
        cache.track("/c", three);

        assert_eq!(cache.prior_unmounts("/c", 3).len(), 2);
        s2.send(AppStatus::LoadError).unwrap();
        assert_eq!(cache.prior_unmounts("/c", 3).len(), 1);
        assert!(cache.prior_unmounts("/c", 1).is_empty());

        cache.untrack("/c", 1);
        assert_eq!(cache.tracked("/c"), 2);
        cache.untrack("/c", 2);
        cache.untrack("/c", 3);
        assert_eq!(cache.tracked("/c"), 0);
    }
}
