//! Lifecycle exports and their validation.
//!
//! An app's entry script exports (or assigns to a global) an object with
//! `bootstrap`, `mount` and `unmount` functions and an optional `update`.
//! [`validate`] turns that loose shape into [`Lifecycles`] once, at
//! pipeline construction time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::app::Props;
use crate::error::{MosaicError, MosaicResult};
use crate::host::{GlobalScope, GlobalStateActions, NodeId};

/// Which lifecycle function (or script execution) a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Entry script execution.
    Scripts,
    /// `bootstrap`.
    Bootstrap,
    /// `mount`.
    Mount,
    /// `unmount`.
    Unmount,
    /// `update`.
    Update,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scripts => "scripts",
            Self::Bootstrap => "bootstrap",
            Self::Mount => "mount",
            Self::Unmount => "unmount",
            Self::Update => "update",
        })
    }
}

/// Arguments of every lifecycle call.
#[derive(Clone)]
pub struct LifecycleProps {
    /// App name.
    pub name: String,
    /// App props merged with router custom props.
    pub props: Props,
    /// The app's wrapper element, if it currently has one.
    pub container: Option<NodeId>,
    /// Cross-app state actions of this instance.
    pub global_state: Option<Arc<dyn GlobalStateActions>>,
}

impl fmt::Debug for LifecycleProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleProps")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("container", &self.container)
            .field("global_state", &self.global_state.is_some())
            .finish()
    }
}

/// An exported lifecycle function.
pub type LifecycleFn =
    Arc<dyn Fn(LifecycleProps) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> LifecycleFn
where
    F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |props| f(props).boxed())
}

/// The raw exports of an entry script. Any field may be missing.
#[derive(Clone, Default)]
pub struct ExportedModule {
    /// `bootstrap` export.
    pub bootstrap: Option<LifecycleFn>,
    /// `mount` export.
    pub mount: Option<LifecycleFn>,
    /// `unmount` export.
    pub unmount: Option<LifecycleFn>,
    /// `update` export.
    pub update: Option<LifecycleFn>,
}

impl fmt::Debug for ExportedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedModule")
            .field("bootstrap", &self.bootstrap.is_some())
            .field("mount", &self.mount.is_some())
            .field("unmount", &self.unmount.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}

impl ExportedModule {
    /// An empty module.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `bootstrap`.
    #[must_use]
    pub fn with_bootstrap<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.bootstrap = Some(boxed(f));
        self
    }

    /// Set `mount`.
    #[must_use]
    pub fn with_mount<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.mount = Some(boxed(f));
        self
    }

    /// Set `unmount`.
    #[must_use]
    pub fn with_unmount<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.unmount = Some(boxed(f));
        self
    }

    /// Set `update`.
    #[must_use]
    pub fn with_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.update = Some(boxed(f));
        self
    }
}

/// A validated lifecycle.
#[derive(Clone)]
pub struct Lifecycles {
    /// One-time initialization.
    pub bootstrap: LifecycleFn,
    /// Render into the wrapper.
    pub mount: LifecycleFn,
    /// Tear down.
    pub unmount: LifecycleFn,
    /// Optional props update.
    pub update: Option<LifecycleFn>,
}

impl fmt::Debug for Lifecycles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycles")
            .field("update", &self.update.is_some())
            .finish_non_exhaustive()
    }
}

/// Check that `module` has the lifecycle shape.
///
/// # Errors
///
/// Returns the names of the missing functions.
pub fn validate(module: &ExportedModule) -> Result<Lifecycles, String> {
    match (&module.bootstrap, &module.mount, &module.unmount) {
        (Some(bootstrap), Some(mount), Some(unmount)) => Ok(Lifecycles {
            bootstrap: Arc::clone(bootstrap),
            mount: Arc::clone(mount),
            unmount: Arc::clone(unmount),
            update: module.update.clone(),
        }),
        _ => {
            let missing: Vec<&str> = [
                ("bootstrap", module.bootstrap.is_none()),
                ("mount", module.mount.is_none()),
                ("unmount", module.unmount.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, missing)| missing.then_some(name))
            .collect();
            Err(format!("missing {}", missing.join(", ")))
        },
    }
}

/// Find the app's lifecycle: module exports first, then the global the
/// sandbox saw assigned last, then a global named after the app.
///
/// # Errors
///
/// Returns [`MosaicError::LifecycleExport`] if no candidate validates.
pub fn resolve_lifecycles(
    app_name: &str,
    exports: Option<&ExportedModule>,
    global: &dyn GlobalScope,
    latest_set_prop: Option<&str>,
) -> MosaicResult<Lifecycles> {
    let mut reasons = Vec::new();

    match exports.map(validate) {
        Some(Ok(lifecycles)) => return Ok(lifecycles),
        Some(Err(reason)) => reasons.push(format!("module exports: {reason}")),
        None => reasons.push("module exports: none".to_owned()),
    }

    if let Some(prop) = latest_set_prop {
        match global.get(prop).as_ref().and_then(|v| v.as_module()).map(validate) {
            Some(Ok(lifecycles)) => {
                debug!(app = %app_name, prop, "Lifecycle resolved from last assigned global");
                return Ok(lifecycles);
            },
            Some(Err(reason)) => reasons.push(format!("global '{prop}': {reason}")),
            None => reasons.push(format!("global '{prop}': not a module")),
        }
    }

    match global.get(app_name).as_ref().and_then(|v| v.as_module()).map(validate) {
        Some(Ok(lifecycles)) => {
            warn!(
                app = %app_name,
                "Lifecycle not found in entry exports, falling back to the global named after the app"
            );
            Ok(lifecycles)
        },
        Some(Err(reason)) => {
            reasons.push(format!("global '{app_name}': {reason}"));
            Err(export_error(app_name, &reasons))
        },
        None => {
            reasons.push(format!("global '{app_name}': not a module"));
            Err(export_error(app_name, &reasons))
        },
    }
}

fn export_error(app_name: &str, reasons: &[String]) -> MosaicError {
    MosaicError::LifecycleExport {
        app: app_name.to_owned(),
        reason: reasons.join("; "),
    }
}
