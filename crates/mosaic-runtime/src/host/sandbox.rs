use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::document::NodeId;
use crate::exports::ExportedModule;

/// A value stored on a global object.
#[derive(Debug, Clone)]
pub enum GlobalValue {
    /// Plain data.
    Data(serde_json::Value),
    /// A lifecycle-shaped object.
    Module(ExportedModule),
}

impl GlobalValue {
    /// The module, if this value is one.
    #[must_use]
    pub fn as_module(&self) -> Option<&ExportedModule> {
        match self {
            Self::Module(module) => Some(module),
            Self::Data(_) => None,
        }
    }

    /// The data, if this value is data.
    #[must_use]
    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data(value) => Some(value),
            Self::Module(_) => None,
        }
    }
}

/// A global object scripts execute against.
pub trait GlobalScope: Send + Sync {
    /// Read a property.
    fn get(&self, key: &str) -> Option<GlobalValue>;
    /// Write a property.
    fn set(&self, key: &str, value: GlobalValue);
    /// Delete a property, returning its previous value.
    fn remove(&self, key: &str) -> Option<GlobalValue>;
}

/// Isolation strategy requested from the sandbox provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxKind {
    /// Writes stay on a per-app proxy.
    Proxy,
    /// Writes go through to the real global and are reverted on unmount.
    Legacy,
    /// The real global is snapshotted on mount and restored on unmount.
    Snapshot,
}

impl fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Proxy => "proxy",
            Self::Legacy => "legacy",
            Self::Snapshot => "snapshot",
        })
    }
}

/// Reads the app's current wrapper element.
pub type ElementGetter = Arc<dyn Fn() -> Option<NodeId> + Send + Sync>;

/// Returns `true` for asset URLs the sandbox must leave alone.
pub type AssetFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Arguments for [`SandboxProvider::create`].
#[derive(Clone)]
pub struct SandboxRequest {
    /// App name.
    pub app_name: String,
    /// Requested isolation.
    pub kind: SandboxKind,
    /// Reads the wrapper element, following remounts.
    pub element_getter: ElementGetter,
    /// Whether dynamically added styles must be scoped.
    pub scoped_css: bool,
    /// Excluded-asset filter.
    pub exclude_asset_filter: Option<AssetFilter>,
}

impl fmt::Debug for SandboxRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxRequest")
            .field("app_name", &self.app_name)
            .field("kind", &self.kind)
            .field("scoped_css", &self.scoped_css)
            .field("exclude_asset_filter", &self.exclude_asset_filter.is_some())
            .finish_non_exhaustive()
    }
}

/// One app's isolated execution context.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// The global object scripts should run against.
    fn proxy(&self) -> Arc<dyn GlobalScope>;

    /// The last property assigned through the proxy, if any.
    fn latest_set_prop(&self) -> Option<String>;

    /// Apply global patches.
    ///
    /// # Errors
    ///
    /// Returns an error if a patch cannot be applied.
    async fn mount(&self) -> anyhow::Result<()>;

    /// Revert global patches.
    ///
    /// # Errors
    ///
    /// Returns an error if a patch cannot be reverted.
    async fn unmount(&self) -> anyhow::Result<()>;
}

/// Builds sandboxes.
pub trait SandboxProvider: Send + Sync {
    /// Whether [`SandboxKind::Proxy`] is available.
    fn supports_proxy(&self) -> bool;

    /// Create a sandbox over `global`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sandbox cannot be built.
    fn create(
        &self,
        request: SandboxRequest,
        global: Arc<dyn GlobalScope>,
    ) -> anyhow::Result<Arc<dyn Sandbox>>;
}
