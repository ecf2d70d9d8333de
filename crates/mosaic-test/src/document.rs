//! In-memory host document.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, bail};
use mosaic_runtime::host::{HostDocument, NodeId};
use mosaic_runtime::ContainerTarget;

#[derive(Debug, Clone, Default)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    /// Markup of non-element content, kept verbatim.
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: bool,
}

#[derive(Debug)]
struct Arena {
    nodes: HashMap<NodeId, Node>,
    next: u64,
    root: NodeId,
    body: NodeId,
}

impl Arena {
    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next);
        self.next = self.next.saturating_add(1);
        self.nodes.insert(id, node);
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn detach(&mut self, child: NodeId) {
        let parent = self.nodes.get_mut(&child).and_then(|n| n.parent.take());
        if let Some(parent) = parent
            && let Some(p) = self.nodes.get_mut(&parent)
        {
            p.children.retain(|c| *c != child);
        }
    }

    fn attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.node(node).and_then(|n| n.parent);
        }
        false
    }

    fn descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.node(id) {
            for child in &node.children {
                out.push(*child);
                self.descendants(*child, out);
            }
        }
    }

    fn outer_html(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let attrs: String = node
            .attrs
            .iter()
            .map(|(k, v)| format!(" {k}=\"{}\"", encode_entities(v)))
            .collect();
        let children: String = node.children.iter().map(|c| self.outer_html(*c)).collect();
        format!("<{tag}{attrs}>{text}{children}</{tag}>", tag = node.tag, text = node.text)
    }
}

/// A tiny DOM: elements with attributes, `<style>` children and verbatim
/// text. Good enough to observe what the runtime renders where.
#[derive(Debug)]
pub struct MemoryDocument {
    arena: Mutex<Arena>,
    shadow_support: bool,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MemoryDocument {
    /// A document with `<html><body></body></html>`.
    #[must_use]
    pub fn new(shadow_support: bool) -> Self {
        let mut arena = Arena {
            nodes: HashMap::new(),
            next: 1,
            root: NodeId(0),
            body: NodeId(0),
        };
        let root = arena.alloc(Node {
            tag: "html".to_owned(),
            ..Node::default()
        });
        let body = arena.alloc(Node {
            tag: "body".to_owned(),
            parent: Some(root),
            ..Node::default()
        });
        if let Some(r) = arena.nodes.get_mut(&root) {
            r.children.push(body);
        }
        arena.root = root;
        arena.body = body;
        Self {
            arena: Mutex::new(arena),
            shadow_support,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The `<body>` element.
    #[must_use]
    pub fn body(&self) -> NodeId {
        self.lock().body
    }

    /// Append `<div id="{id}">` to the body.
    pub fn add_container(&self, id: &str) -> NodeId {
        let mut arena = self.lock();
        let body = arena.body;
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_owned(), id.to_owned());
        let node = arena.alloc(Node {
            tag: "div".to_owned(),
            attrs,
            parent: Some(body),
            ..Node::default()
        });
        if let Some(b) = arena.nodes.get_mut(&body) {
            b.children.push(node);
        }
        node
    }

    /// Detach `node` from its parent.
    pub fn remove(&self, node: NodeId) {
        self.lock().detach(node);
    }

    /// Children of `node`.
    #[must_use]
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.lock()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Attribute value.
    #[must_use]
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock().node(node).and_then(|n| n.attrs.get(name).cloned())
    }

    /// Whether a shadow root was attached to `node`.
    #[must_use]
    pub fn has_shadow_root(&self, node: NodeId) -> bool {
        self.lock().node(node).is_some_and(|n| n.shadow_root)
    }

    /// Verbatim text content of `node`.
    #[must_use]
    pub fn text(&self, node: NodeId) -> String {
        self.lock()
            .node(node)
            .map(|n| n.text.clone())
            .unwrap_or_default()
    }

    /// `data-name` of every child of `container`.
    #[must_use]
    pub fn mounted_names(&self, container: NodeId) -> Vec<String> {
        self.children(container)
            .into_iter()
            .filter_map(|c| self.attribute(c, "data-name"))
            .collect()
    }
}

/// Split `<tag a="1" b='2'>inner</tag>` into its parts.
fn parse_element(html: &str) -> anyhow::Result<(String, BTreeMap<String, String>, String)> {
    let html = html.trim();
    let rest = html.strip_prefix('<').context("markup must start with '<'")?;
    let open_end = rest.find('>').context("unterminated opening tag")?;
    let (open, after) = rest.split_at(open_end);
    let after = after.get(1..).unwrap_or_default();

    let mut parts = open.splitn(2, char::is_whitespace);
    let tag = parts.next().unwrap_or_default().to_owned();
    if tag.is_empty() {
        bail!("missing tag name");
    }
    let closing = format!("</{tag}>");
    let inner = after
        .strip_suffix(closing.as_str())
        .with_context(|| format!("missing {closing}"))?
        .to_owned();

    let mut attrs = BTreeMap::new();
    let mut attr_src = parts.next().unwrap_or_default().trim();
    while !attr_src.is_empty() {
        let eq = attr_src.find('=').context("attribute without value")?;
        let name = attr_src[..eq].trim().to_owned();
        let value_src = &attr_src[eq.saturating_add(1)..];
        let quote = value_src.chars().next().context("missing attribute value")?;
        let body = &value_src[quote.len_utf8()..];
        let end = body.find(quote).context("unterminated attribute value")?;
        attrs.insert(name, decode_entities(&body[..end]));
        attr_src = body[end.saturating_add(quote.len_utf8())..].trim_start();
    }
    Ok((tag, attrs, inner))
}

const ENTITIES: [(&str, char); 5] = [
    ("&quot;", '"'),
    ("&#39;", '\''),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&amp;", '&'),
];

/// Decode the character references attribute values may carry.
fn decode_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &tail[entity.len()..];
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

fn encode_entities(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

/// Pull `<style>...</style>` blocks out of `inner`.
fn split_styles(inner: &str) -> (String, Vec<String>) {
    let mut text = String::new();
    let mut styles = Vec::new();
    let mut rest = inner;
    while let Some(start) = rest.find("<style>") {
        text.push_str(&rest[..start]);
        let after = &rest[start.saturating_add("<style>".len())..];
        match after.find("</style>") {
            Some(end) => {
                styles.push(after[..end].to_owned());
                rest = &after[end.saturating_add("</style>".len())..];
            },
            None => {
                text.push_str(&rest[start..]);
                rest = "";
            },
        }
    }
    text.push_str(rest);
    (text, styles)
}

impl HostDocument for MemoryDocument {
    fn create_element(&self, html: &str) -> anyhow::Result<NodeId> {
        let (tag, attrs, inner) = parse_element(html)?;
        let (text, styles) = split_styles(&inner);
        let mut arena = self.lock();
        let element = arena.alloc(Node {
            tag,
            attrs,
            text,
            ..Node::default()
        });
        for css in styles {
            let style = arena.alloc(Node {
                tag: "style".to_owned(),
                text: css,
                parent: Some(element),
                ..Node::default()
            });
            if let Some(e) = arena.nodes.get_mut(&element) {
                e.children.push(style);
            }
        }
        Ok(element)
    }

    fn resolve(&self, target: &ContainerTarget) -> Option<NodeId> {
        let arena = self.lock();
        match target {
            ContainerTarget::Node(node) => arena.attached(*node).then_some(*node),
            ContainerTarget::Selector(selector) => {
                let id = selector.strip_prefix('#')?;
                let mut all = Vec::new();
                arena.descendants(arena.root, &mut all);
                all.into_iter().find(|n| {
                    arena
                        .node(*n)
                        .is_some_and(|node| node.attrs.get("id").map(String::as_str) == Some(id))
                })
            },
        }
    }

    fn structural_path(&self, node: NodeId) -> Option<String> {
        let arena = self.lock();
        if !arena.attached(node) {
            return None;
        }
        let mut segments = Vec::new();
        let mut current = node;
        loop {
            let n = arena.node(current)?;
            let index = match n.parent {
                Some(parent) => {
                    let siblings = &arena.node(parent)?.children;
                    let same_tag = siblings
                        .iter()
                        .filter(|s| arena.node(**s).is_some_and(|sn| sn.tag == n.tag));
                    same_tag.take_while(|s| **s != current).count().saturating_add(1)
                },
                None => 1,
            };
            segments.push(format!("{}[{index}]", n.tag));
            match n.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    fn supports_shadow_root(&self) -> bool {
        self.shadow_support
    }

    fn attach_shadow_root(&self, host: NodeId) -> anyhow::Result<()> {
        if !self.shadow_support {
            bail!("shadow roots are not supported");
        }
        let mut arena = self.lock();
        let node = arena.nodes.get_mut(&host).context("unknown node")?;
        node.shadow_root = true;
        Ok(())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(n) = self.lock().nodes.get_mut(&node) {
            n.attrs.insert(name.to_owned(), value.to_owned());
        }
    }

    fn style_elements(&self, node: NodeId) -> Vec<NodeId> {
        let arena = self.lock();
        let mut all = Vec::new();
        arena.descendants(node, &mut all);
        all.retain(|n| arena.node(*n).is_some_and(|sn| sn.tag == "style"));
        all
    }

    fn contains(&self, parent: NodeId, child: NodeId) -> bool {
        let arena = self.lock();
        let mut current = Some(child);
        while let Some(node) = current {
            if node == parent {
                return true;
            }
            current = arena.node(node).and_then(|n| n.parent);
        }
        false
    }

    fn clear_children(&self, node: NodeId) {
        let mut arena = self.lock();
        let children = arena
            .nodes
            .get_mut(&node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        for child in children {
            if let Some(c) = arena.nodes.get_mut(&child) {
                c.parent = None;
            }
        }
    }

    fn append_child(&self, parent: NodeId, child: NodeId) -> anyhow::Result<()> {
        let mut arena = self.lock();
        if !arena.nodes.contains_key(&parent) || !arena.nodes.contains_key(&child) {
            bail!("unknown node");
        }
        arena.detach(child);
        if let Some(c) = arena.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        if let Some(p) = arena.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        Ok(())
    }

    fn outer_html(&self, node: NodeId) -> String {
        self.lock().outer_html(node)
    }
}
