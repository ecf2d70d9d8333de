#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Framework configuration for the mosaic runtime.
//!
//! This crate provides [`FrameworkConfig`], the serializable half of the
//! options recognised by `start()` and `load_micro_app()`: prefetching,
//! sandboxing, singular mode, excluded assets, entry-fetch passthrough and
//! logging. Options that can only be expressed as closures (a per-app
//! singular predicate, a custom asset filter) live in the runtime crate.
//!
//! # Usage
//!
//! ```rust,no_run
//! use mosaic_config::FrameworkConfig;
//!
//! // Embedded defaults, then ./mosaic.toml, then MOSAIC_* fallbacks.
//! let config = FrameworkConfig::load(Some(std::path::Path::new("mosaic.toml"))).unwrap();
//! println!("singular: {}", config.singular);
//! ```
//!
//! # Precedence
//!
//! 1. **File** (`mosaic.toml` or an explicit path)
//! 2. **Environment variables** (`MOSAIC_*`), fallback only
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Layered TOML merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl FrameworkConfig {
    /// Load configuration: embedded defaults, an optional file overlay, then
    /// `MOSAIC_*` environment fallbacks for fields the file left unset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the merged
    /// configuration fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path, &env::collect_env_vars())
    }

    /// Load configuration from a single file (no layering, no env).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the string is not valid TOML for this
    /// schema or fails validation.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        loader::from_toml_str(content, "<inline>")
    }
}
