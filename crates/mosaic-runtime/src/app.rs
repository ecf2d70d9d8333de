//! App descriptors and identifiers.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::host::NodeId;

/// Props handed to an app's lifecycle functions.
pub type Props = serde_json::Value;

/// Where an app's HTML entry lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    /// A URL whose HTML is fetched and parsed.
    Url(String),
    /// An explicit asset list.
    Config {
        /// Script URLs, executed in order.
        #[serde(default)]
        scripts: Vec<String>,
        /// Stylesheet URLs.
        #[serde(default)]
        styles: Vec<String>,
        /// Optional HTML template.
        #[serde(default)]
        html: Option<String>,
    },
}

impl Entry {
    /// Shorthand for [`Entry::Url`].
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Config { scripts, .. } => write!(f, "<config entry, {} scripts>", scripts.len()),
        }
    }
}

/// The DOM mount point of an app.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerTarget {
    /// A selector resolved against the host document at render time.
    Selector(String),
    /// A node reference held by the caller.
    Node(NodeId),
}

impl ContainerTarget {
    /// Shorthand for [`ContainerTarget::Selector`].
    #[must_use]
    pub fn selector(selector: impl Into<String>) -> Self {
        Self::Selector(selector.into())
    }
}

impl fmt::Display for ContainerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(selector) => f.write_str(selector),
            Self::Node(node) => write!(f, "{node}"),
        }
    }
}

/// Arguments of a legacy render function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRenderProps {
    /// Serialized wrapper markup, empty once the app is unmounted.
    pub app_content: String,
    /// Whether the app is still loading.
    pub loading: bool,
}

/// Caller-supplied render function that replaces container rendering.
pub type LegacyRender = Arc<dyn Fn(LegacyRenderProps) -> anyhow::Result<()> + Send + Sync>;

/// Loading indicator callback.
pub type LoaderFn = Arc<dyn Fn(bool) + Send + Sync>;

/// Decides when the router activates an app.
#[derive(Clone)]
pub enum ActivationRule {
    /// Active when the path starts with this prefix on a segment boundary.
    Prefix(String),
    /// Active when any of the prefixes matches.
    Any(Vec<String>),
    /// Arbitrary predicate over the current path.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl fmt::Debug for ActivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            Self::Any(prefixes) => f.debug_tuple("Any").field(prefixes).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl ActivationRule {
    /// Shorthand for [`ActivationRule::Prefix`].
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Shorthand for [`ActivationRule::Predicate`].
    #[must_use]
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Whether the app should be active at `path`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => prefix_matches(prefix, path),
            Self::Any(prefixes) => prefixes.iter().any(|p| prefix_matches(p, path)),
            Self::Predicate(f) => f(path),
        }
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || prefix.ends_with('/') || rest.starts_with(['/', '?', '#'])
}

/// Everything the runtime needs to know about one micro app.
///
/// Immutable once handed to a load call.
#[derive(Clone)]
pub struct AppDescriptor {
    /// Unique app name.
    pub name: String,
    /// HTML entry.
    pub entry: Entry,
    /// Mount point. Required unless `legacy_render` is set.
    pub container: Option<ContainerTarget>,
    /// Props passed to every lifecycle call.
    pub props: Props,
    /// Router activation rule.
    pub activation: Option<ActivationRule>,
    /// Render function replacing container rendering.
    pub legacy_render: Option<LegacyRender>,
    /// Loading indicator.
    pub loader: Option<LoaderFn>,
}

impl fmt::Debug for AppDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDescriptor")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("container", &self.container)
            .field("props", &self.props)
            .field("activation", &self.activation)
            .field("legacy_render", &self.legacy_render.is_some())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl AppDescriptor {
    /// Create a descriptor with empty props and no container.
    #[must_use]
    pub fn new(name: impl Into<String>, entry: Entry) -> Self {
        Self {
            name: name.into(),
            entry,
            container: None,
            props: Props::Object(serde_json::Map::new()),
            activation: None,
            legacy_render: None,
            loader: None,
        }
    }

    /// Set the container.
    #[must_use]
    pub fn with_container(mut self, container: ContainerTarget) -> Self {
        self.container = Some(container);
        self
    }

    /// Set the props.
    #[must_use]
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Set the activation rule.
    #[must_use]
    pub fn with_activation(mut self, rule: ActivationRule) -> Self {
        self.activation = Some(rule);
        self
    }

    /// Set a legacy render function.
    #[must_use]
    pub fn with_legacy_render(
        mut self,
        render: impl Fn(LegacyRenderProps) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.legacy_render = Some(Arc::new(render));
        self
    }

    /// Set a loading indicator.
    #[must_use]
    pub fn with_loader(mut self, loader: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        if let Some(loader) = &self.loader {
            loader(loading);
        }
    }
}

/// Identifies one loaded occurrence of an app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AppInstanceId(String);

impl AppInstanceId {
    /// Derive a fresh id from the app name, the current time and a salt.
    #[must_use]
    pub fn generate(name: &str) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let salt: u16 = rand::thread_rng().r#gen();
        Self(format!("{name}_{millis}_{salt:04x}"))
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id with every non-alphanumeric character replaced by `_`, safe
    /// for use in element ids.
    #[must_use]
    pub fn snake_case(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for AppInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
