//! Lifecycle pipelines.
//!
//! A [`LifecyclePipeline`] is the ordered `{bootstrap, mount[], unmount[],
//! update?}` shape a router (or a [`MicroAppHandle`](crate::MicroAppHandle))
//! drives. Pipelines come from a [`PipelineFactory`], which is built once
//! per app instance by [`load_app`] and invoked again for every remount.

mod builder;
mod factory;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::trace;

use crate::app::Props;
use crate::error::{MosaicError, MosaicResult};

pub use builder::load_app;
pub use factory::PipelineFactory;

/// One async step. Receives the props of the call that runs the sequence.
pub type Step = Arc<dyn Fn(Props) -> BoxFuture<'static, MosaicResult<()>> + Send + Sync>;

/// Ordered lifecycle steps of one app.
#[derive(Clone)]
pub struct LifecyclePipeline {
    /// App name.
    pub name: String,
    /// One-time initialization. A no-op for remounts.
    pub bootstrap: Step,
    /// Mount sequence.
    pub mount: Vec<Step>,
    /// Unmount sequence.
    pub unmount: Vec<Step>,
    /// Props update, if the app exports one.
    pub update: Option<Step>,
}

impl fmt::Debug for LifecyclePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecyclePipeline")
            .field("name", &self.name)
            .field("mount", &self.mount.len())
            .field("unmount", &self.unmount.len())
            .field("update", &self.update.is_some())
            .finish_non_exhaustive()
    }
}

impl LifecyclePipeline {
    /// Run `bootstrap`.
    ///
    /// # Errors
    ///
    /// Returns the step's error.
    pub async fn bootstrap(&self, props: &Props) -> MosaicResult<()> {
        (self.bootstrap)(props.clone()).await
    }

    /// Run the mount sequence.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; later steps do not run.
    pub async fn mount(&self, props: &Props) -> MosaicResult<()> {
        trace!(app = %self.name, steps = self.mount.len(), "Running mount sequence");
        run_steps(&self.mount, props).await
    }

    /// Run the unmount sequence.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; later steps do not run.
    pub async fn unmount(&self, props: &Props) -> MosaicResult<()> {
        trace!(app = %self.name, steps = self.unmount.len(), "Running unmount sequence");
        run_steps(&self.unmount, props).await
    }

    /// Run `update`.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::LifecycleExport`] if the app exports no
    /// `update`, or the step's error.
    pub async fn update(&self, props: &Props) -> MosaicResult<()> {
        match &self.update {
            Some(update) => update(props.clone()).await,
            None => Err(MosaicError::LifecycleExport {
                app: self.name.clone(),
                reason: "update is not exported".to_owned(),
            }),
        }
    }

    /// Insert a step ahead of the mount sequence.
    pub fn prepend_mount(&mut self, step: Step) {
        self.mount.insert(0, step);
    }
}

/// Run `steps` strictly in order.
///
/// # Errors
///
/// Returns the first failing step's error.
pub async fn run_steps(steps: &[Step], props: &Props) -> MosaicResult<()> {
    for step in steps {
        step(props.clone()).await?;
    }
    Ok(())
}

/// Shallow-merge `overlay` into `base` when both are objects; otherwise
/// `overlay` wins unless it is null.
pub(crate) fn merge_props(base: &Props, overlay: &Props) -> Props {
    match (base, overlay) {
        (Props::Object(base), Props::Object(overlay)) => {
            let mut merged = base.clone();
            merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
            Props::Object(merged)
        },
        (base, Props::Null) => base.clone(),
        (_, overlay) => overlay.clone(),
    }
}
