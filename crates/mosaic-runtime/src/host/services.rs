use std::sync::Arc;

use mosaic_config::{FetchOptions, PrefetchStrategy};

use super::document::NodeId;
use crate::app::{AppDescriptor, AppInstanceId};

/// Attribute the CSS scoper tags wrappers with and rewrites selectors
/// against.
pub const SCOPED_CSS_ATTRIBUTE: &str = "data-mosaic";

/// Receives `(state, previous_state)`.
pub type GlobalStateListener = Arc<dyn Fn(&serde_json::Value, &serde_json::Value) + Send + Sync>;

/// Cross-app state actions bound to one app instance.
pub trait GlobalStateActions: Send + Sync {
    /// Subscribe, replacing any previous listener of this instance.
    fn on_global_state_change(&self, listener: GlobalStateListener, fire_immediately: bool);
    /// Shallow-merge `state` into the global state. Returns whether it changed.
    fn set_global_state(&self, state: serde_json::Value) -> bool;
    /// Drop this instance's listener. Returns whether one existed.
    fn off_global_state_change(&self) -> bool;
}

/// Hands out per-instance state actions.
pub trait GlobalStateProvider: Send + Sync {
    /// Actions for `instance`.
    fn actions(&self, instance: &AppInstanceId) -> Arc<dyn GlobalStateActions>;
}

/// Rewrites an app's stylesheets so they only match inside its wrapper.
pub trait CssScoper: Send + Sync {
    /// Rewrite `style`, which lives under `wrapper`.
    fn process(&self, wrapper: NodeId, style: NodeId, app_name: &str);
}

/// Warms entry caches ahead of activation.
pub trait Prefetcher: Send + Sync {
    /// Prefetch according to `strategy`.
    fn prefetch(&self, apps: &[AppDescriptor], strategy: &PrefetchStrategy, options: &FetchOptions);
}
