//! Lifecycle hook chains.
//!
//! Hooks are grouped per [`HookStage`]. A chain runs strictly in order, each
//! hook awaited before the next starts, and the first failure stops it.
//! Merging two hook sets concatenates the chains per stage.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::app::AppDescriptor;
use crate::error::{MosaicError, MosaicResult, render_error};
use crate::host::GlobalScope;

/// Points in an app's life where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before the entry scripts execute.
    BeforeLoad,
    /// Before the exported `mount` runs.
    BeforeMount,
    /// After the exported `mount` ran and the wrapper was rendered.
    AfterMount,
    /// Before the exported `unmount` runs.
    BeforeUnmount,
    /// After the sandbox was unmounted.
    AfterUnmount,
}

impl HookStage {
    /// Every stage, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::BeforeLoad,
        Self::BeforeMount,
        Self::AfterMount,
        Self::BeforeUnmount,
        Self::AfterUnmount,
    ];
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeLoad => "before_load",
            Self::BeforeMount => "before_mount",
            Self::AfterMount => "after_mount",
            Self::BeforeUnmount => "before_unmount",
            Self::AfterUnmount => "after_unmount",
        })
    }
}

/// What a hook is called with.
#[derive(Clone)]
pub struct HookContext {
    /// The app the hook runs for.
    pub app: Arc<AppDescriptor>,
    /// The global object the app executes against.
    pub global: Arc<dyn GlobalScope>,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("app", &self.app.name)
            .finish_non_exhaustive()
    }
}

/// A single hook.
pub type HookFn = Arc<dyn Fn(HookContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Hook chains for every stage.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    before_load: Vec<HookFn>,
    before_mount: Vec<HookFn>,
    after_mount: Vec<HookFn>,
    before_unmount: Vec<HookFn>,
    after_unmount: Vec<HookFn>,
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LifecycleHooks");
        for stage in HookStage::ALL {
            s.field(&stage.to_string(), &self.get(stage).len());
        }
        s.finish()
    }
}

impl LifecycleHooks {
    /// No hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook to `stage`.
    #[must_use]
    pub fn on<F, Fut>(mut self, stage: HookStage, hook: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push(stage, Arc::new(move |ctx| hook(ctx).boxed()));
        self
    }

    /// Append an already boxed hook to `stage`.
    pub fn push(&mut self, stage: HookStage, hook: HookFn) {
        self.chain_mut(stage).push(hook);
    }

    /// The chain for `stage`.
    #[must_use]
    pub fn get(&self, stage: HookStage) -> &[HookFn] {
        match stage {
            HookStage::BeforeLoad => &self.before_load,
            HookStage::BeforeMount => &self.before_mount,
            HookStage::AfterMount => &self.after_mount,
            HookStage::BeforeUnmount => &self.before_unmount,
            HookStage::AfterUnmount => &self.after_unmount,
        }
    }

    fn chain_mut(&mut self, stage: HookStage) -> &mut Vec<HookFn> {
        match stage {
            HookStage::BeforeLoad => &mut self.before_load,
            HookStage::BeforeMount => &mut self.before_mount,
            HookStage::AfterMount => &mut self.after_mount,
            HookStage::BeforeUnmount => &mut self.before_unmount,
            HookStage::AfterUnmount => &mut self.after_unmount,
        }
    }

    /// Concatenate `other`'s chains after this set's, stage by stage.
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        for stage in HookStage::ALL {
            self.chain_mut(stage).extend(other.get(stage).iter().cloned());
        }
        self
    }

    /// Whether no stage has any hook.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        HookStage::ALL.iter().all(|stage| self.get(*stage).is_empty())
    }
}

/// Run one chain in order.
///
/// # Errors
///
/// Returns [`MosaicError::Hook`] for the first hook that fails; later hooks
/// do not run.
pub async fn run_chain(
    hooks: &LifecycleHooks,
    stage: HookStage,
    ctx: &HookContext,
) -> MosaicResult<()> {
    let chain = hooks.get(stage);
    if chain.is_empty() {
        return Ok(());
    }
    debug!(app = %ctx.app.name, %stage, count = chain.len(), "Running hook chain");

    for (index, hook) in chain.iter().enumerate() {
        if let Err(e) = hook(ctx.clone()).await {
            error!(app = %ctx.app.name, %stage, index, error = %e, "Hook failed");
            return Err(MosaicError::Hook {
                app: ctx.app.name.clone(),
                stage,
                message: render_error(&e),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Entry;
    use crate::host::GlobalValue;
    use std::sync::Mutex;

    struct NullGlobal;

    impl GlobalScope for NullGlobal {
        fn get(&self, _key: &str) -> Option<GlobalValue> {
            None
        }
        fn set(&self, _key: &str, _value: GlobalValue) {}
        fn remove(&self, _key: &str) -> Option<GlobalValue> {
            None
        }
    }

    fn ctx() -> HookContext {
        HookContext {
            app: Arc::new(AppDescriptor::new("app", Entry::url("//app"))),
            global: Arc::new(NullGlobal),
        }
    }

    fn recording(
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
    ) -> impl Fn(HookContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_: HookContext| {
            let log = Arc::clone(&log);
            async move {
                tokio::task::yield_now().await;
                log.lock().unwrap().push(label);
                Ok::<_, anyhow::Error>(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = LifecycleHooks::new()
            .on(HookStage::BeforeMount, recording(&log, "first"))
            .on(HookStage::BeforeMount, recording(&log, "second"))
            .on(HookStage::AfterMount, recording(&log, "other"));

        run_chain(&hooks, HookStage::BeforeMount, &ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_merge_concatenates() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let addons = LifecycleHooks::new().on(HookStage::BeforeLoad, recording(&log, "addon"));
        let user = LifecycleHooks::new().on(HookStage::BeforeLoad, recording(&log, "user"));
        let merged = addons.merge(&user);

        assert_eq!(merged.get(HookStage::BeforeLoad).len(), 2);
        run_chain(&merged, HookStage::BeforeLoad, &ctx()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["addon", "user"]);
    }

    #[tokio::test]
    async fn test_failure_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let hooks = LifecycleHooks::new()
            .on(HookStage::AfterUnmount, |_| async { Err(anyhow::anyhow!("nope")) })
            .on(HookStage::AfterUnmount, recording(&log, "never"));

        let err = run_chain(&hooks, HookStage::AfterUnmount, &ctx()).await.unwrap_err();
        assert!(matches!(
            err,
            MosaicError::Hook { stage: HookStage::AfterUnmount, ref message, .. } if message == "nope"
        ));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_empty_and_debug() {
        assert!(LifecycleHooks::new().is_empty());
        let hooks = LifecycleHooks::new().on(HookStage::BeforeLoad, |_| async { Ok(()) });
        assert!(!hooks.is_empty());
        assert!(format!("{hooks:?}").contains("before_load: 1"));
    }
}
