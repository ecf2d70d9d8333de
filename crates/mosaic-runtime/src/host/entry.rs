use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mosaic_config::FetchOptions;

use super::sandbox::GlobalScope;
use crate::app::Entry;
use crate::exports::ExportedModule;

/// A fetched and parsed HTML entry.
#[derive(Clone)]
pub struct ParsedEntry {
    /// The entry's HTML with scripts stripped.
    pub template: String,
    /// Base path for the app's assets.
    pub asset_public_path: String,
    /// Executes the entry's scripts.
    pub scripts: Arc<dyn ScriptRunner>,
}

impl fmt::Debug for ParsedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedEntry")
            .field("template", &self.template)
            .field("asset_public_path", &self.asset_public_path)
            .finish_non_exhaustive()
    }
}

/// Turns an [`Entry`] into a template and an executable script bundle.
#[async_trait]
pub trait EntryFetcher: Send + Sync {
    /// Fetch and parse the entry.
    ///
    /// # Errors
    ///
    /// Returns an error on network or parse failure.
    async fn fetch_and_parse(
        &self,
        entry: &Entry,
        options: &FetchOptions,
    ) -> anyhow::Result<ParsedEntry>;
}

/// The executable half of a parsed entry.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Execute the scripts against `global`. When `strict_global` is set the
    /// scripts must not reach past `global` to the real global object.
    ///
    /// Returns the module exports of the entry script, if it has any.
    ///
    /// # Errors
    ///
    /// Returns an error if a script throws.
    async fn exec_scripts(
        &self,
        global: Arc<dyn GlobalScope>,
        strict_global: bool,
    ) -> anyhow::Result<Option<ExportedModule>>;
}
