//! Contracts for the collaborators the runtime drives but does not own.
//!
//! The runtime never touches a real page directly. Document manipulation,
//! entry fetching and script execution, sandbox internals, cross-app state,
//! stylesheet scoping and routing are all reached through the traits in
//! this module, bundled into a [`Host`].

mod document;
mod entry;
mod router;
mod sandbox;
mod services;

use std::fmt;
use std::sync::Arc;

pub use document::{HostDocument, NodeId};
pub use entry::{EntryFetcher, ParsedEntry, ScriptRunner};
pub use router::{AppLoader, ApplicationRegistration, Router, RouterStartOptions};
pub use sandbox::{
    AssetFilter, ElementGetter, GlobalScope, GlobalValue, Sandbox, SandboxKind, SandboxProvider,
    SandboxRequest,
};
pub use services::{
    CssScoper, GlobalStateActions, GlobalStateListener, GlobalStateProvider, Prefetcher,
    SCOPED_CSS_ATTRIBUTE,
};

/// The set of collaborators one [`MicroFrontend`](crate::MicroFrontend)
/// works against.
#[derive(Clone)]
pub struct Host {
    /// The page document.
    pub document: Arc<dyn HostDocument>,
    /// HTML entry fetcher.
    pub fetcher: Arc<dyn EntryFetcher>,
    /// Sandbox factory.
    pub sandbox: Arc<dyn SandboxProvider>,
    /// The shared, unsandboxed global object.
    pub global: Arc<dyn GlobalScope>,
    /// Cross-app state.
    pub global_state: Arc<dyn GlobalStateProvider>,
    /// Stylesheet rewriter for scoped CSS.
    pub css: Arc<dyn CssScoper>,
    /// Route-driven lifecycle driver.
    pub router: Arc<dyn Router>,
    /// Optional prefetcher used by `start()`.
    pub prefetcher: Option<Arc<dyn Prefetcher>>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("supports_proxy", &self.sandbox.supports_proxy())
            .field("supports_shadow_root", &self.document.supports_shadow_root())
            .field("prefetcher", &self.prefetcher.is_some())
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Attach a prefetcher.
    #[must_use]
    pub fn with_prefetcher(mut self, prefetcher: Arc<dyn Prefetcher>) -> Self {
        self.prefetcher = Some(prefetcher);
        self
    }
}
