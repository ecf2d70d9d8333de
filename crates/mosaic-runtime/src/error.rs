//! Runtime error types.

use thiserror::Error;

use crate::exports::LifecyclePhase;
use crate::handle::AppStatus;
use crate::hooks::HookStage;

/// Errors raised while loading, mounting or unmounting micro apps.
///
/// Errors are `Clone` because a single in-flight pipeline construction can
/// be awaited by several ad-hoc loads at once, and each of them receives the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum MosaicError {
    /// The entry could not be fetched or parsed.
    #[error("Failed to fetch entry for app '{app}': {message}")]
    EntryFetch {
        /// App name.
        app: String,
        /// Rendered collaborator error.
        message: String,
    },

    /// The executed scripts did not export a usable lifecycle.
    #[error("App '{app}' exports no valid lifecycle: {reason}")]
    LifecycleExport {
        /// App name.
        app: String,
        /// Why every candidate was rejected.
        reason: String,
    },

    /// The target container was missing at render time.
    #[error("Container {container} for app '{app}' not found")]
    ContainerNotFound {
        /// App name.
        app: String,
        /// The container as it was requested.
        container: String,
    },

    /// A legacy render function failed.
    #[error("Render failed for app '{app}': {message}")]
    Render {
        /// App name.
        app: String,
        /// Rendered render-function error.
        message: String,
    },

    /// Options that cannot be combined. Raised before any async work.
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// The sandbox provider or a sandbox failed.
    #[error("Sandbox error for app '{app}': {message}")]
    Sandbox {
        /// App name.
        app: String,
        /// Rendered collaborator error.
        message: String,
    },

    /// A hook in a hook chain failed.
    #[error("{stage} hook failed for app '{app}': {message}")]
    Hook {
        /// App name.
        app: String,
        /// The chain the hook belonged to.
        stage: HookStage,
        /// Rendered hook error.
        message: String,
    },

    /// An exported lifecycle function (or script execution) failed.
    #[error("{phase} failed for app '{app}': {message}")]
    Lifecycle {
        /// App name.
        app: String,
        /// Which lifecycle function failed.
        phase: LifecyclePhase,
        /// Rendered app error.
        message: String,
    },

    /// A handle operation was attempted in the wrong status.
    #[error("Cannot {operation} app '{app}' while it is {status}")]
    InvalidStatus {
        /// App name.
        app: String,
        /// The attempted operation.
        operation: &'static str,
        /// Status at the time of the attempt.
        status: AppStatus,
    },

    /// The router collaborator rejected a request.
    #[error("Router error: {0}")]
    Router(String),

    /// Framework configuration failed to load or validate.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<mosaic_config::ConfigError> for MosaicError {
    fn from(e: mosaic_config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for runtime operations.
pub type MosaicResult<T> = Result<T, MosaicError>;

/// Render an `anyhow` error with its context chain.
pub(crate) fn render_error(e: &anyhow::Error) -> String {
    format!("{e:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_app_and_stage() {
        let err = MosaicError::Hook {
            app: "orders".to_owned(),
            stage: HookStage::BeforeMount,
            message: "boom".to_owned(),
        };
        assert_eq!(err.to_string(), "before_mount hook failed for app 'orders': boom");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: MosaicError = mosaic_config::ConfigError::ValidationError {
            field: "fetch.timeout_secs".to_owned(),
            message: "must be positive".to_owned(),
        }
        .into();
        assert!(matches!(err, MosaicError::Config(msg) if msg.contains("fetch.timeout_secs")));
    }

    #[test]
    fn test_render_error_keeps_context() {
        let e = anyhow::anyhow!("socket closed").context("GET //localhost:7100");
        assert_eq!(render_error(&e), "GET //localhost:7100: socket closed");
    }
}
