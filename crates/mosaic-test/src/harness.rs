//! A fully wired in-memory host.

use std::sync::Arc;

use mosaic_runtime::host::{GlobalScope, NodeId};
use mosaic_runtime::{Configuration, Host, MicroFrontend};
use mosaic_telemetry::{LogConfig, LogFormat, setup_logging};

use crate::document::MemoryDocument;
use crate::fixtures::EventLog;
use crate::mocks::{
    MemoryGlobal, MockEntryFetcher, MockGlobalState, MockSandboxProvider, RecordingCssScoper,
    RecordingPrefetcher,
};
use crate::router::MockRouter;

/// Install a test-friendly subscriber once. Later calls are no-ops.
pub fn init_test_logging() {
    let config = LogConfig::new("debug")
        .with_format(LogFormat::Compact)
        .without_ansi()
        .without_timestamps();
    // Another test may have installed the subscriber already.
    let _ = setup_logging(&config);
}

/// Every host collaborator as an in-memory double, plus a shared
/// [`EventLog`].
///
/// The fields are public so tests can script and inspect them directly.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Page document.
    pub document: Arc<MemoryDocument>,
    /// Real global object.
    pub global: Arc<MemoryGlobal>,
    /// Entry fetcher.
    pub fetcher: Arc<MockEntryFetcher>,
    /// Sandbox provider.
    pub sandbox: Arc<MockSandboxProvider>,
    /// Cross-app state.
    pub state: Arc<MockGlobalState>,
    /// Stylesheet scoper.
    pub css: Arc<RecordingCssScoper>,
    /// Router.
    pub router: Arc<MockRouter>,
    /// Prefetcher.
    pub prefetcher: Arc<RecordingPrefetcher>,
    /// Lifecycle event log shared with recording entries.
    pub log: EventLog,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// A host with shadow root and proxy sandbox support.
    #[must_use]
    pub fn new() -> Self {
        Self::with_support(true, true)
    }

    /// A host with the given platform capabilities.
    #[must_use]
    pub fn with_support(shadow_root: bool, proxy_sandbox: bool) -> Self {
        init_test_logging();
        Self {
            document: Arc::new(MemoryDocument::new(shadow_root)),
            global: Arc::new(MemoryGlobal::new()),
            fetcher: Arc::new(MockEntryFetcher::new()),
            sandbox: Arc::new(MockSandboxProvider::new(proxy_sandbox)),
            state: Arc::new(MockGlobalState::new()),
            css: Arc::new(RecordingCssScoper::new()),
            router: Arc::new(MockRouter::new()),
            prefetcher: Arc::new(RecordingPrefetcher::new()),
            log: EventLog::new(),
        }
    }

    /// Add `<div id="{id}">` to the body.
    pub fn container(&self, id: &str) -> NodeId {
        self.document.add_container(id)
    }

    /// The collaborators bundled as a [`Host`].
    #[must_use]
    pub fn host(&self) -> Host {
        Host {
            document: Arc::clone(&self.document) as _,
            fetcher: Arc::clone(&self.fetcher) as _,
            sandbox: Arc::clone(&self.sandbox) as _,
            global: Arc::clone(&self.global) as Arc<dyn GlobalScope>,
            global_state: Arc::clone(&self.state) as _,
            css: Arc::clone(&self.css) as _,
            router: Arc::clone(&self.router) as _,
            prefetcher: None,
        }
        .with_prefetcher(Arc::clone(&self.prefetcher) as _)
    }

    /// A frontend with the default configuration.
    #[must_use]
    pub fn frontend(&self) -> MicroFrontend {
        MicroFrontend::new(self.host())
    }

    /// A frontend with `config`.
    #[must_use]
    pub fn frontend_with(&self, config: Configuration) -> MicroFrontend {
        MicroFrontend::with_config(self.host(), config)
    }
}
