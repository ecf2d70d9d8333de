//! Configuration types for the mosaic runtime.
//!
//! Every struct implements [`Default`] so that a bare `[section]` header in
//! TOML produces a working configuration. Several options accept either a
//! boolean shorthand or a table, mirroring how hosts usually write them:
//!
//! ```toml
//! sandbox = true
//! # or
//! [sandbox]
//! experimental_style_isolation = true
//! ```

use std::collections::BTreeMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

// ---------------------------------------------------------------------------
// Top-level FrameworkConfig
// ---------------------------------------------------------------------------

/// Root configuration for a mosaic host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Whether and what to prefetch once the framework starts.
    pub prefetch: PrefetchStrategy,
    /// Execution isolation for micro apps.
    pub sandbox: SandboxSetting,
    /// Only one micro app may be mounted at a time.
    pub singular: bool,
    /// Glob patterns for assets the sandbox must leave untouched.
    pub exclude_assets: Vec<String>,
    /// Options passed through to the entry fetcher.
    pub fetch: FetchOptions,
    /// Start the router automatically on the first ad-hoc load.
    pub auto_start: bool,
    /// Only reroute on actual URL changes.
    pub url_reroute_only: bool,
    /// Experimental: cache lifecycle factories by app name instead of by
    /// `(name, container)`.
    pub cache_lifecycle_by_app_name: bool,
    /// Logging level, format and directives.
    pub logging: LoggingSection,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            prefetch: PrefetchStrategy::default(),
            sandbox: SandboxSetting::default(),
            singular: true,
            exclude_assets: Vec::new(),
            fetch: FetchOptions::default(),
            auto_start: true,
            url_reroute_only: true,
            cache_lifecycle_by_app_name: false,
            logging: LoggingSection::default(),
        }
    }
}

impl FrameworkConfig {
    /// The configuration used for ad-hoc loads that pass no explicit one:
    /// everything inherited, singular mode off.
    #[must_use]
    pub fn for_ad_hoc_load(&self) -> Self {
        Self {
            singular: false,
            ..self.clone()
        }
    }

    /// Compile `exclude_assets` into a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for the first glob that fails
    /// to compile.
    pub fn exclude_asset_matcher(&self) -> ConfigResult<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_assets {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ConfigError::InvalidPattern {
            pattern: self.exclude_assets.join(","),
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Prefetch
// ---------------------------------------------------------------------------

/// Named prefetch modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchMode {
    /// Prefetch every registered app immediately after start.
    All,
}

/// `prefetch = true | false | "all" | ["app-a", "app-b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefetchStrategy {
    /// Prefetch the remaining apps after the first mount (`true`) or never.
    Enabled(bool),
    /// A named mode.
    Mode(PrefetchMode),
    /// Prefetch only the listed apps.
    Apps(Vec<String>),
}

impl Default for PrefetchStrategy {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

impl PrefetchStrategy {
    /// Whether any prefetching happens at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Mode(_) => true,
            Self::Apps(apps) => !apps.is_empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// Fine-grained sandbox options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxOptions {
    /// Render the app inside a shadow root.
    pub strict_style_isolation: bool,
    /// Scope the app's stylesheets with an attribute selector.
    pub experimental_style_isolation: bool,
    /// Use the legacy (loose) sandbox that writes through to the real global.
    pub loose: bool,
}

/// `sandbox = true | false | { ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SandboxSetting {
    /// Sandbox on with default options, or off.
    Toggle(bool),
    /// Sandbox on with explicit options.
    Options(SandboxOptions),
}

impl Default for SandboxSetting {
    fn default() -> Self {
        Self::Toggle(true)
    }
}

impl SandboxSetting {
    /// Whether execution isolation is requested at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Toggle(enabled) => *enabled,
            Self::Options(_) => true,
        }
    }

    /// Whether the wrapper must live in a shadow root.
    #[must_use]
    pub fn strict_style_isolation(&self) -> bool {
        matches!(self, Self::Options(o) if o.strict_style_isolation)
    }

    /// Whether stylesheets are rewritten with a scoping attribute.
    ///
    /// Strict isolation wins when both are set.
    #[must_use]
    pub fn scoped_css(&self) -> bool {
        matches!(
            self,
            Self::Options(o) if o.experimental_style_isolation && !o.strict_style_isolation
        )
    }

    /// Whether the loose (legacy) sandbox is requested.
    #[must_use]
    pub fn loose(&self) -> bool {
        matches!(self, Self::Options(o) if o.loose)
    }

    /// The same setting with `loose` forced to the given value.
    #[must_use]
    pub fn with_loose(self, loose: bool) -> Self {
        match self {
            Self::Toggle(false) => self,
            Self::Toggle(true) => Self::Options(SandboxOptions {
                loose,
                ..SandboxOptions::default()
            }),
            Self::Options(o) => Self::Options(SandboxOptions { loose, ..o }),
        }
    }
}

// ---------------------------------------------------------------------------
// FetchOptions
// ---------------------------------------------------------------------------

/// Options handed to the entry fetcher untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Overrides the asset public path derived from the entry URL.
    pub public_path: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            headers: BTreeMap::new(),
            public_path: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["mosaic_runtime=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_shorthand_and_table() {
        let on: FrameworkConfig = toml::from_str("sandbox = true").unwrap();
        assert!(on.sandbox.is_enabled());
        assert!(!on.sandbox.scoped_css());

        let off: FrameworkConfig = toml::from_str("sandbox = false").unwrap();
        assert!(!off.sandbox.is_enabled());

        let table: FrameworkConfig =
            toml::from_str("[sandbox]\nexperimental_style_isolation = true").unwrap();
        assert!(table.sandbox.is_enabled());
        assert!(table.sandbox.scoped_css());
        assert!(!table.sandbox.strict_style_isolation());
    }

    #[test]
    fn test_strict_isolation_disables_scoped_css() {
        let setting = SandboxSetting::Options(SandboxOptions {
            strict_style_isolation: true,
            experimental_style_isolation: true,
            loose: false,
        });
        assert!(setting.strict_style_isolation());
        assert!(!setting.scoped_css());
    }

    #[test]
    fn test_with_loose_keeps_disabled_sandbox_disabled() {
        assert_eq!(
            SandboxSetting::Toggle(false).with_loose(true),
            SandboxSetting::Toggle(false)
        );
        assert!(SandboxSetting::Toggle(true).with_loose(true).loose());
    }

    #[test]
    fn test_prefetch_variants() {
        let all: FrameworkConfig = toml::from_str("prefetch = \"all\"").unwrap();
        assert_eq!(all.prefetch, PrefetchStrategy::Mode(PrefetchMode::All));

        let list: FrameworkConfig = toml::from_str("prefetch = [\"a\", \"b\"]").unwrap();
        assert!(list.prefetch.is_enabled());

        let none: FrameworkConfig = toml::from_str("prefetch = false").unwrap();
        assert!(!none.prefetch.is_enabled());
    }

    #[test]
    fn test_ad_hoc_config_turns_singular_off() {
        let config = FrameworkConfig::default();
        assert!(config.singular);
        let ad_hoc = config.for_ad_hoc_load();
        assert!(!ad_hoc.singular);
        assert_eq!(ad_hoc.sandbox, config.sandbox);
    }

    #[test]
    fn test_exclude_asset_matcher() {
        let config = FrameworkConfig {
            exclude_assets: vec!["**/vendor/*.js".to_owned()],
            ..FrameworkConfig::default()
        };
        let matcher = config.exclude_asset_matcher().unwrap();
        assert!(matcher.is_match("https://cdn.example.com/vendor/react.js"));
        assert!(!matcher.is_match("https://cdn.example.com/app/main.js"));
    }
}
