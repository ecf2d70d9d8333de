//! Runtime configuration.
//!
//! [`Configuration`] wraps the serializable
//! [`FrameworkConfig`](mosaic_config::FrameworkConfig) and adds the options
//! that can only be closures.

use std::fmt;
use std::sync::Arc;

use globset::GlobSet;
use mosaic_config::FrameworkConfig;
use tracing::warn;

use crate::app::AppDescriptor;
use crate::error::{MosaicError, MosaicResult};
use crate::host::AssetFilter;

/// Whether singular mode applies to an app.
#[derive(Clone)]
pub enum SingularMode {
    /// Fixed for every app.
    Fixed(bool),
    /// Decided per app.
    Predicate(Arc<dyn Fn(&AppDescriptor) -> bool + Send + Sync>),
}

impl fmt::Debug for SingularMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Options for `start()` and `load_micro_app()`.
#[derive(Clone)]
pub struct Configuration {
    /// Serializable options.
    pub framework: FrameworkConfig,
    /// Singular mode. Follows `framework.singular` unless overridden.
    pub singular: SingularMode,
    /// Extra excluded-asset filter, combined with `framework.exclude_assets`.
    pub exclude_asset_filter: Option<AssetFilter>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("framework", &self.framework)
            .field("singular", &self.singular)
            .field("exclude_asset_filter", &self.exclude_asset_filter.is_some())
            .finish()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(FrameworkConfig::default())
    }
}

impl From<FrameworkConfig> for Configuration {
    fn from(framework: FrameworkConfig) -> Self {
        Self::new(framework)
    }
}

impl Configuration {
    /// Wrap a framework config.
    #[must_use]
    pub fn new(framework: FrameworkConfig) -> Self {
        Self {
            singular: SingularMode::Fixed(framework.singular),
            framework,
            exclude_asset_filter: None,
        }
    }

    /// The configuration ad-hoc loads use when the caller passes none:
    /// everything inherited, singular mode off.
    #[must_use]
    pub fn for_ad_hoc_load(&self) -> Self {
        let framework = self.framework.for_ad_hoc_load();
        Self {
            singular: SingularMode::Fixed(framework.singular),
            framework,
            exclude_asset_filter: self.exclude_asset_filter.clone(),
        }
    }

    /// Decide singular mode per app.
    #[must_use]
    pub fn with_singular_predicate(
        mut self,
        predicate: impl Fn(&AppDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.singular = SingularMode::Predicate(Arc::new(predicate));
        self
    }

    /// Add an excluded-asset filter.
    #[must_use]
    pub fn with_exclude_asset_filter(
        mut self,
        filter: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.exclude_asset_filter = Some(Arc::new(filter));
        self
    }

    /// Whether singular mode applies to `app`.
    #[must_use]
    pub fn is_singular(&self, app: &AppDescriptor) -> bool {
        match &self.singular {
            SingularMode::Fixed(value) => *value,
            SingularMode::Predicate(predicate) => predicate(app),
        }
    }

    /// The combined excluded-asset filter, if any is configured.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::Config`] if an `exclude_assets` glob does not
    /// compile.
    pub fn asset_filter(&self) -> MosaicResult<Option<AssetFilter>> {
        let globs: Option<GlobSet> = if self.framework.exclude_assets.is_empty() {
            None
        } else {
            Some(self.framework.exclude_asset_matcher()?)
        };
        let custom = self.exclude_asset_filter.clone();

        Ok(match (globs, custom) {
            (None, None) => None,
            (None, Some(custom)) => Some(custom),
            (Some(globs), custom) => {
                let filter: AssetFilter = Arc::new(move |url: &str| {
                    globs.is_match(url) || custom.as_ref().is_some_and(|f| f(url))
                });
                Some(filter)
            },
        })
    }

    /// Downgrade sandboxing when the host has no proxy support: the
    /// sandbox is forced loose and the provider is asked for a snapshot
    /// sandbox instead.
    #[must_use]
    pub fn auto_downgrade(mut self, proxy_supported: bool) -> Self {
        let sandbox = self.framework.sandbox;
        if !proxy_supported && sandbox.is_enabled() && !sandbox.loose() {
            warn!("Proxy sandbox is not supported by the host, falling back to snapshot sandbox");
            self.framework.sandbox = sandbox.with_loose(true);
        }
        self
    }

    /// Reject option combinations that can never work for `app`.
    ///
    /// # Errors
    ///
    /// Returns [`MosaicError::ConfigurationConflict`] if strict style
    /// isolation is combined with a legacy render function, or if the app
    /// has both or neither of a container and a legacy render function.
    pub fn check_conflicts(&self, app: &AppDescriptor) -> MosaicResult<()> {
        let legacy = app.legacy_render.is_some();
        if legacy && self.framework.sandbox.strict_style_isolation() {
            return Err(MosaicError::ConfigurationConflict(format!(
                "app '{}': strict style isolation cannot be used with a legacy render function",
                app.name
            )));
        }
        match (legacy, app.container.is_some()) {
            (true, true) => Err(MosaicError::ConfigurationConflict(format!(
                "app '{}': container and legacy render function are mutually exclusive",
                app.name
            ))),
            (false, false) => Err(MosaicError::ConfigurationConflict(format!(
                "app '{}': either a container or a legacy render function is required",
                app.name
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{ContainerTarget, Entry};
    use mosaic_config::{SandboxOptions, SandboxSetting};

    fn app() -> AppDescriptor {
        AppDescriptor::new("app", Entry::url("//app")).with_container(ContainerTarget::selector("#c"))
    }

    #[test]
    fn test_singular_follows_framework_and_predicate() {
        let config = Configuration::default();
        assert!(config.is_singular(&app()));
        assert!(!config.for_ad_hoc_load().is_singular(&app()));

        let picky = config.with_singular_predicate(|app| app.name.starts_with("main"));
        assert!(!picky.is_singular(&app()));
        assert!(format!("{picky:?}").contains("Predicate(..)"));
    }

    #[test]
    fn test_asset_filter_combines_globs_and_closure() {
        let none = Configuration::default();
        assert!(none.asset_filter().unwrap().is_none());

        let mut framework = FrameworkConfig::default();
        framework.exclude_assets = vec!["**/*.map".to_owned()];
        let config = Configuration::new(framework).with_exclude_asset_filter(|url| url.contains("cdn"));
        let filter = config.asset_filter().unwrap().unwrap();
        assert!(filter("/static/app.js.map"));
        assert!(filter("https://cdn/x.js"));
        assert!(!filter("/static/app.js"));
    }

    #[test]
    fn test_bad_glob_is_config_error() {
        let mut framework = FrameworkConfig::default();
        framework.exclude_assets = vec!["a/[".to_owned()];
        let err = Configuration::new(framework).asset_filter().err().unwrap();
        assert!(matches!(err, MosaicError::Config(_)));
    }

    #[test]
    fn test_auto_downgrade() {
        let config = Configuration::default().auto_downgrade(false);
        assert!(config.framework.sandbox.loose());

        let kept = Configuration::default().auto_downgrade(true);
        assert!(!kept.framework.sandbox.loose());

        let mut framework = FrameworkConfig::default();
        framework.sandbox = SandboxSetting::Toggle(false);
        let off = Configuration::new(framework).auto_downgrade(false);
        assert!(!off.framework.sandbox.is_enabled());
    }

    #[test]
    fn test_conflicts() {
        let config = Configuration::default();
        assert!(config.check_conflicts(&app()).is_ok());

        let bare = AppDescriptor::new("bare", Entry::url("//bare"));
        assert!(matches!(
            config.check_conflicts(&bare),
            Err(MosaicError::ConfigurationConflict(_))
        ));

        let both = app().with_legacy_render(|_| Ok(()));
        assert!(config.check_conflicts(&both).is_err());

        let mut framework = FrameworkConfig::default();
        framework.sandbox = SandboxSetting::Options(SandboxOptions {
            strict_style_isolation: true,
            ..SandboxOptions::default()
        });
        let strict = Configuration::new(framework);
        let legacy = AppDescriptor::new("legacy", Entry::url("//legacy")).with_legacy_render(|_| Ok(()));
        let err = strict.check_conflicts(&legacy).unwrap_err();
        assert!(err.to_string().contains("strict style isolation"));
    }
}
