//! Arena-backed document tree
//!
//! Every node lives in a single `Dom` arena and is addressed by a `NodeId`.
//! Ids are allocated monotonically and never reused, so a handle to a node
//! that has been dropped stays dead instead of silently aliasing a newer
//! node. Async completions rely on this to detect that their target is gone.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Stable handle to a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    /// HTML element; attributes keep their source order
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },

    /// Text node
    Text { content: String },

    /// Comment node
    Comment { content: String },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Dom {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        id
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text {
            content: content.into(),
        })
    }

    pub fn create_comment(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment {
            content: content.into(),
        })
    }

    /// Number of live nodes in the arena (attached or not)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Element { .. }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text { .. }))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).len()
    }

    pub fn child_at(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.children(parent).get(index).copied()
    }

    pub fn last_child(&self, parent: NodeId) -> Option<NodeId> {
        self.children(parent).last().copied()
    }

    /// Position of `id` among its parent's children
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.is_element(c))
    }

    pub fn first_element_child(&self, id: NodeId) -> Option<NodeId> {
        self.element_children(id).next()
    }

    /// Append `child` as the last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.child_count(parent);
        self.insert_child(parent, index, child);
    }

    /// Insert `child` at `index` under `parent` (clamped to the child count)
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return;
        }
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    /// Swap the children at positions `i` and `j`; identities are untouched
    pub fn swap_children(&mut self, parent: NodeId, i: usize, j: usize) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            if i < p.children.len() && j < p.children.len() {
                p.children.swap(i, j);
            }
        }
    }

    /// Unlink a node from its parent. The subtree stays alive in the arena.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|&c| c != id);
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent = None;
        }
    }

    /// Detach and free a node and all of its descendants. Returns the number
    /// of nodes freed.
    pub fn drop_subtree(&mut self, id: NodeId) -> usize {
        self.detach(id);
        let mut stack = vec![id];
        let mut freed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                freed += 1;
            }
        }
        freed
    }

    /// Free every child of `id`
    pub fn clear_children(&mut self, id: NodeId) {
        let children: Vec<NodeId> = self.children(id).to_vec();
        for child in children {
            self.drop_subtree(child);
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Element { attributes, .. }) => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(Node {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            let value = value.into();
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        if let Some(Node {
            kind: NodeKind::Element { attributes, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            let index = attributes.iter().position(|(k, _)| k == name)?;
            return Some(attributes.remove(index).1);
        }
        None
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if !self.is_element(id) || self.has_class(id, class) {
            return;
        }
        let value = match self.attr(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(id, "class", value);
    }

    /// Remove a class; drops the attribute entirely once it is empty
    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let remaining: Vec<&str> = existing
            .split_whitespace()
            .filter(|&c| c != class)
            .collect();
        if remaining.is_empty() {
            self.remove_attr(id, "class");
        } else {
            let joined = remaining.join(" ");
            self.set_attr(id, "class", joined);
        }
    }

    /// Show or hide an element by adding or removing a `display:none`
    /// declaration. Other inline declarations are kept.
    pub fn set_displayed(&mut self, id: NodeId, displayed: bool) {
        let mut declarations: Vec<String> = self
            .attr(id, "style")
            .map(|style| {
                style
                    .split(';')
                    .map(str::trim)
                    .filter(|decl| !decl.is_empty() && !hides(decl))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if !displayed {
            declarations.push("display:none".to_string());
        }

        if declarations.is_empty() {
            self.remove_attr(id, "style");
        } else {
            self.set_attr(id, "style", declarations.join(";"));
        }
    }

    pub fn is_displayed(&self, id: NodeId) -> bool {
        if self.attr(id, "hidden").is_some() {
            return false;
        }
        match self.attr(id, "style") {
            Some(style) => !style.split(';').any(hides),
            None => true,
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Some(NodeKind::Text { content }) = self.kind(id) {
            out.push_str(content);
            return out;
        }
        for node in self.descendants(id) {
            if let Some(NodeKind::Text { content }) = self.kind(node) {
                out.push_str(content);
            }
        }
        out
    }

    /// Replace all children of `id` with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        self.clear_children(id);
        let text = text.into();
        if !text.is_empty() {
            let node = self.create_text(text);
            self.append_child(id, node);
        }
    }

    /// Extend a text node in place; false if `id` is not a text node
    pub fn append_to_text(&mut self, id: NodeId, text: &str) -> bool {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Text { content },
                ..
            }) => {
                content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Pre-order traversal of the subtree below `root` (root excluded)
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(root).to_vec();
        stack.reverse();
        Descendants { dom: self, stack }
    }

    /// First element below `root` whose `id` attribute equals `value`
    pub fn find_by_id_attr(&self, root: NodeId, value: &str) -> Option<NodeId> {
        self.descendants(root)
            .find(|&n| self.attr(n, "id") == Some(value))
    }

    pub fn elements_with_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .filter(|&n| self.has_class(n, class))
            .collect()
    }

    /// Whether `node` hangs (transitively) below `root`
    pub fn is_attached_to(&self, node: NodeId, root: NodeId) -> bool {
        if !self.contains(node) {
            return false;
        }
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            if parent == root {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Structural equality in the sense of DOM `isEqualNode`: same kind, same
    /// tag, same attribute set (order-insensitive) and pairwise equal children
    pub fn is_equal_node(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (Some(na), Some(nb)) = (self.node(a), self.node(b)) else {
            return false;
        };
        let same_payload = match (&na.kind, &nb.kind) {
            (
                NodeKind::Element {
                    tag: tag_a,
                    attributes: attrs_a,
                },
                NodeKind::Element {
                    tag: tag_b,
                    attributes: attrs_b,
                },
            ) => {
                tag_a == tag_b
                    && attrs_a.len() == attrs_b.len()
                    && attrs_a
                        .iter()
                        .all(|(k, v)| attrs_b.iter().any(|(kb, vb)| k == kb && v == vb))
            }
            (NodeKind::Text { content: ca }, NodeKind::Text { content: cb }) => ca == cb,
            (NodeKind::Comment { content: ca }, NodeKind::Comment { content: cb }) => ca == cb,
            _ => false,
        };
        same_payload
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(nb.children.iter())
                .all(|(&ca, &cb)| self.is_equal_node(ca, cb))
    }
}

pub struct Descendants<'a> {
    dom: &'a Dom,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.dom.children(next).iter().rev().copied());
        Some(next)
    }
}

/// Whether an inline style declaration is `display: none`
fn hides(declaration: &str) -> bool {
    let mut parts = declaration.splitn(2, ':').map(str::trim);
    matches!(
        (parts.next(), parts.next()),
        (Some(property), Some(value))
            if property.eq_ignore_ascii_case("display") && value.eq_ignore_ascii_case("none")
    )
}
