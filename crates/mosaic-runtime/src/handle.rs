//! Handles for ad-hoc loaded apps.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, watch};
use tracing::{debug, error};

use crate::app::Props;
use crate::deferred::Deferred;
use crate::error::{MosaicError, MosaicResult};
use crate::pipeline::LifecyclePipeline;

/// Lifecycle status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppStatus {
    /// Created, nothing started yet.
    NotLoaded,
    /// Fetching the entry and executing scripts.
    Loading,
    /// Running `bootstrap`.
    Bootstrapping,
    /// Running the mount sequence.
    Mounting,
    /// Mounted.
    Mounted,
    /// Running `update`.
    Updating,
    /// Running the unmount sequence.
    Unmounting,
    /// Unmounted; may be mounted again.
    Unmounted,
    /// A lifecycle step failed after loading.
    SkipBecauseBroken,
    /// Loading failed.
    LoadError,
}

impl AppStatus {
    /// Whether the handle can no longer be used.
    #[must_use]
    pub fn is_broken(self) -> bool {
        matches!(self, Self::SkipBecauseBroken | Self::LoadError)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotLoaded => "NOT_LOADED",
            Self::Loading => "LOADING",
            Self::Bootstrapping => "BOOTSTRAPPING",
            Self::Mounting => "MOUNTING",
            Self::Mounted => "MOUNTED",
            Self::Updating => "UPDATING",
            Self::Unmounting => "UNMOUNTING",
            Self::Unmounted => "UNMOUNTED",
            Self::SkipBecauseBroken => "SKIP_BECAUSE_BROKEN",
            Self::LoadError => "LOAD_ERROR",
        })
    }
}

type SettledCallback = Box<dyn FnOnce() + Send>;

struct HandleInner {
    id: u64,
    name: String,
    props: Props,
    status: watch::Sender<AppStatus>,
    error: Mutex<Option<MosaicError>>,
    pipeline: Mutex<Option<LifecyclePipeline>>,
    mount_settled: Deferred,
    unmounted: Deferred,
    on_settled: Mutex<Option<SettledCallback>>,
    ops: Arc<AsyncMutex<()>>,
}

/// A caller-driven app instance.
///
/// Operations on one handle are serialized: an `unmount()` issued while the
/// app is still loading waits for the mount to settle first.
#[derive(Clone)]
pub struct MicroAppHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for MicroAppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroAppHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

impl MicroAppHandle {
    pub(crate) fn new(id: u64, name: &str, props: Props) -> Self {
        let (status, _) = watch::channel(AppStatus::NotLoaded);
        Self {
            inner: Arc::new(HandleInner {
                id,
                name: name.to_owned(),
                props,
                status,
                error: Mutex::new(None),
                pipeline: Mutex::new(None),
                mount_settled: Deferred::new(),
                unmounted: Deferred::new(),
                on_settled: Mutex::new(None),
                ops: Arc::new(AsyncMutex::new(())),
            }),
        }
    }

    /// Sequence number of this handle within its orchestrator.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// App name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> AppStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<AppStatus> {
        self.inner.status.subscribe()
    }

    /// The error that broke this handle, if any.
    #[must_use]
    pub fn error(&self) -> Option<MosaicError> {
        self.inner
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait for the initial load and mount to settle.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped loading, bootstrapping or mounting.
    pub async fn mount_promise(&self) -> MosaicResult<()> {
        self.inner.mount_settled.wait().await;
        match self.error() {
            Some(e) if self.status().is_broken() => Err(e),
            _ => Ok(()),
        }
    }

    /// Wait until the handle has unmounted, or broke before it could mount.
    pub async fn unmount_promise(&self) {
        self.inner.unmounted.wait().await;
    }

    /// Unmount the app.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::InvalidStatus`] unless the app is mounted, or
    /// the failing unmount step's error.
    pub async fn unmount(&self) -> MosaicResult<()> {
        let _guard = Arc::clone(&self.inner.ops).lock_owned().await;
        let pipeline = self.expect_status("unmount", AppStatus::Mounted)?;

        self.set_status(AppStatus::Unmounting);
        let result = pipeline.unmount(&self.inner.props).await;
        match &result {
            Ok(()) => self.set_status(AppStatus::Unmounted),
            Err(e) => self.fail(AppStatus::SkipBecauseBroken, e),
        }
        self.settle_unmount();
        result
    }

    /// Mount again after an unmount, reusing the same pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::InvalidStatus`] unless the app is unmounted, or
    /// the failing mount step's error.
    pub async fn mount(&self) -> MosaicResult<()> {
        let _guard = Arc::clone(&self.inner.ops).lock_owned().await;
        let pipeline = self.expect_status("mount", AppStatus::Unmounted)?;

        self.set_status(AppStatus::Mounting);
        let result = pipeline.mount(&self.inner.props).await;
        match &result {
            Ok(()) => self.set_status(AppStatus::Mounted),
            Err(e) => self.fail(AppStatus::SkipBecauseBroken, e),
        }
        result
    }

    /// Pass new props to the app's `update` export.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::InvalidStatus`] unless the app is mounted, or
    /// the update's error.
    pub async fn update(&self, props: Props) -> MosaicResult<()> {
        let _guard = Arc::clone(&self.inner.ops).lock_owned().await;
        let pipeline = self.expect_status("update", AppStatus::Mounted)?;

        self.set_status(AppStatus::Updating);
        let result = pipeline.update(&props).await;
        match &result {
            Ok(()) => self.set_status(AppStatus::Mounted),
            Err(e) => self.fail(AppStatus::SkipBecauseBroken, e),
        }
        result
    }

    fn expect_status(
        &self,
        operation: &'static str,
        expected: AppStatus,
    ) -> MosaicResult<LifecyclePipeline> {
        let status = self.status();
        let pipeline = self
            .inner
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match pipeline {
            Some(pipeline) if status == expected => Ok(pipeline),
            _ => Err(MosaicError::InvalidStatus {
                app: self.inner.name.clone(),
                operation,
                status,
            }),
        }
    }

    pub(crate) fn set_status(&self, status: AppStatus) {
        debug!(app = %self.inner.name, handle = self.inner.id, %status, "Status changed");
        self.inner.status.send_replace(status);
    }

    fn fail(&self, status: AppStatus, e: &MosaicError) {
        error!(app = %self.inner.name, handle = self.inner.id, %status, error = %e, "App failed");
        *self
            .inner
            .error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
        self.set_status(status);
    }

    pub(crate) fn unmounted_signal(&self) -> Deferred {
        self.inner.unmounted.clone()
    }

    /// Run `callback` once the unmount signal resolves.
    pub(crate) fn on_settled(&self, callback: impl FnOnce() + Send + 'static) {
        let mut slot = self
            .inner
            .on_settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.unmounted.is_resolved() {
            drop(slot);
            callback();
        } else {
            *slot = Some(Box::new(callback));
        }
    }

    fn settle_unmount(&self) {
        if self.inner.unmounted.resolve() {
            let callback = self
                .inner
                .on_settled
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(callback) = callback {
                callback();
            }
        }
    }

    /// Claim the operation lock for the initial load before the driver task
    /// is spawned, so no operation can slip in ahead of it.
    pub(crate) fn claim_ops(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.inner.ops).try_lock_owned().ok()
    }

    /// Drive the initial load: await the pipeline, bootstrap, mount.
    pub(crate) async fn drive_initial_mount<F>(
        &self,
        guard: Option<OwnedMutexGuard<()>>,
        pipeline: F,
    ) where
        F: Future<Output = MosaicResult<LifecyclePipeline>> + Send,
    {
        let _guard = match guard {
            Some(guard) => guard,
            None => Arc::clone(&self.inner.ops).lock_owned().await,
        };
        let props = &self.inner.props;

        self.set_status(AppStatus::Loading);
        let pipeline = match pipeline.await {
            Ok(pipeline) => pipeline,
            Err(e) => return self.break_before_mount(AppStatus::LoadError, &e),
        };
        *self
            .inner
            .pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(pipeline.clone());

        self.set_status(AppStatus::Bootstrapping);
        if let Err(e) = pipeline.bootstrap(props).await {
            return self.break_before_mount(AppStatus::SkipBecauseBroken, &e);
        }

        self.set_status(AppStatus::Mounting);
        if let Err(e) = pipeline.mount(props).await {
            return self.break_before_mount(AppStatus::SkipBecauseBroken, &e);
        }

        self.set_status(AppStatus::Mounted);
        self.inner.mount_settled.resolve();
    }

    /// A handle that never mounted releases everyone waiting on it.
    fn break_before_mount(&self, status: AppStatus, e: &MosaicError) {
        self.fail(status, e);
        self.inner.mount_settled.resolve();
        self.settle_unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Step;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, fail: bool) -> Step {
        let counter = Arc::clone(counter);
        Arc::new(move |_: Props| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if fail {
                    Err(MosaicError::Router("step failed".to_owned()))
                } else {
                    Ok(())
                }
            }
            .boxed()
        })
    }

    fn pipeline(counter: &Arc<AtomicUsize>, fail_mount: bool) -> LifecyclePipeline {
        LifecyclePipeline {
            name: "app".to_owned(),
            bootstrap: counting(counter, false),
            mount: vec![counting(counter, fail_mount)],
            unmount: vec![counting(counter, false)],
            update: Some(counting(counter, false)),
        }
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = MicroAppHandle::new(1, "app", Props::Null);
        assert_eq!(handle.status(), AppStatus::NotLoaded);

        let guard = handle.claim_ops();
        assert!(guard.is_some());
        let p = pipeline(&counter, false);
        handle
            .drive_initial_mount(guard, async move { Ok(p) })
            .await;
        handle.mount_promise().await.unwrap();
        assert_eq!(handle.status(), AppStatus::Mounted);

        handle.update(serde_json::json!({"a": 1})).await.unwrap();
        assert_eq!(handle.status(), AppStatus::Mounted);

        let settled = Arc::new(AtomicUsize::new(0));
        handle.on_settled({
            let settled = Arc::clone(&settled);
            move || {
                settled.fetch_add(1, Ordering::SeqCst);
            }
        });
        handle.unmount().await.unwrap();
        handle.unmount_promise().await;
        assert_eq!(handle.status(), AppStatus::Unmounted);
        assert_eq!(settled.load(Ordering::SeqCst), 1);

        handle.mount().await.unwrap();
        assert_eq!(handle.status(), AppStatus::Mounted);
        // bootstrap, mount, update, unmount, mount
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_load_error_settles_everything() {
        let handle = MicroAppHandle::new(2, "app", Props::Null);
        handle
            .drive_initial_mount(None, async {
                Err(MosaicError::EntryFetch {
                    app: "app".to_owned(),
                    message: "404".to_owned(),
                })
            })
            .await;
        assert_eq!(handle.status(), AppStatus::LoadError);
        assert!(matches!(
            handle.mount_promise().await,
            Err(MosaicError::EntryFetch { .. })
        ));
        handle.unmount_promise().await;

        let err = handle.unmount().await.unwrap_err();
        assert!(matches!(
            err,
            MosaicError::InvalidStatus {
                operation: "unmount",
                status: AppStatus::LoadError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mount_failure_is_broken() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = MicroAppHandle::new(3, "app", Props::Null);
        let p = pipeline(&counter, true);
        handle.drive_initial_mount(None, async move { Ok(p) }).await;
        assert_eq!(handle.status(), AppStatus::SkipBecauseBroken);
        assert!(handle.mount_promise().await.is_err());
        assert!(handle.error().is_some());
        handle.unmount_promise().await;
    }

    #[tokio::test]
    async fn test_unmount_waits_for_initial_mount() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = MicroAppHandle::new(4, "app", Props::Null);
        let guard = handle.claim_ops();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let p = pipeline(&counter, false);

        let driver = {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle
                    .drive_initial_mount(guard, async move {
                        let _ = rx.await;
                        Ok(p)
                    })
                    .await;
            })
        };
        let unmount = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.unmount().await })
        };
        tokio::task::yield_now().await;
        assert!(!unmount.is_finished());

        tx.send(()).unwrap();
        driver.await.unwrap();
        unmount.await.unwrap().unwrap();
        assert_eq!(handle.status(), AppStatus::Unmounted);
    }
}
