use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::ContainerTarget;

/// Opaque reference to a node in the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The subset of DOM operations the runtime needs.
pub trait HostDocument: Send + Sync {
    /// Parse `html` (a single root element) into a detached element.
    ///
    /// # Errors
    ///
    /// Returns an error if the markup does not describe an element.
    fn create_element(&self, html: &str) -> anyhow::Result<NodeId>;

    /// Resolve a container target to a node, if it is currently attached.
    fn resolve(&self, target: &ContainerTarget) -> Option<NodeId>;

    /// A stable structural path of `node` (for example an XPath-like
    /// `/html/body/div[2]`). Two references to the same physical node
    /// yield the same path.
    fn structural_path(&self, node: NodeId) -> Option<String>;

    /// Whether shadow roots can be attached.
    fn supports_shadow_root(&self) -> bool;

    /// Move `host`'s content into a new shadow root attached to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot attach one.
    fn attach_shadow_root(&self, host: NodeId) -> anyhow::Result<()>;

    /// Set an attribute.
    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    /// Every `<style>` element under `node`, in document order.
    fn style_elements(&self, node: NodeId) -> Vec<NodeId>;

    /// Whether `child` is `parent` or one of its descendants.
    fn contains(&self, parent: NodeId, child: NodeId) -> bool;

    /// Remove every child of `node`.
    fn clear_children(&self, node: NodeId);

    /// Append `child` to `parent`, detaching it from any previous parent.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is unknown.
    fn append_child(&self, parent: NodeId, child: NodeId) -> anyhow::Result<()>;

    /// Serialized markup of `node`.
    fn outer_html(&self, node: NodeId) -> String;
}
