use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::app::{ActivationRule, Props};
use crate::error::MosaicResult;
use crate::pipeline::LifecyclePipeline;

/// Called by the router when an app's activation rule first matches.
pub type AppLoader =
    Arc<dyn Fn() -> BoxFuture<'static, MosaicResult<LifecyclePipeline>> + Send + Sync>;

/// One app as the router sees it.
#[derive(Clone)]
pub struct ApplicationRegistration {
    /// App name.
    pub name: String,
    /// Produces the app's pipeline.
    pub loader: AppLoader,
    /// When the app is active.
    pub activation: ActivationRule,
    /// Props the router passes back into lifecycle calls.
    pub custom_props: Props,
}

impl fmt::Debug for ApplicationRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationRegistration")
            .field("name", &self.name)
            .field("activation", &self.activation)
            .field("custom_props", &self.custom_props)
            .finish_non_exhaustive()
    }
}

/// Options for [`Router::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStartOptions {
    /// Only reroute on actual URL changes.
    pub url_reroute_only: bool,
}

/// The route-driven lifecycle driver.
pub trait Router: Send + Sync {
    /// Register an app.
    ///
    /// # Errors
    ///
    /// Returns an error if the router rejects the registration.
    fn register_application(&self, registration: ApplicationRegistration) -> anyhow::Result<()>;

    /// Stop routing to an app.
    ///
    /// # Errors
    ///
    /// Returns an error if the router does not know the app.
    fn unregister_application(&self, name: &str) -> anyhow::Result<()>;

    /// Start routing.
    fn start(&self, options: RouterStartOptions);
}
