//! Scroll targeting
//!
//! After a pass, the first changed block is narrowed down to the first leaf
//! that actually differs from what was displayed before, so that large
//! blocks scroll to the edit rather than to their top.

use crate::config::ScrollConfig;
use crate::dom::{Dom, NodeId};
use serde::{Deserialize, Serialize};

/// First block-level divergence recorded by a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirstChange {
    /// Block now occupying the first changed position
    pub target: NodeId,
    /// Block that occupied it before, if any
    pub compare: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub height: f64,
}

/// Geometry provider. Hosts with a real layout engine supply their own.
pub trait Layout {
    fn bounds(&self, dom: &Dom, node: NodeId) -> Rect;
}

/// Layout-free fallback: a node has extent iff it is displayed and holds
/// visible text or a replaced element
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralLayout;

fn is_replaced(tag: &str) -> bool {
    matches!(tag, "img" | "svg" | "hr" | "math" | "br" | "video" | "iframe")
}

impl Layout for StructuralLayout {
    fn bounds(&self, dom: &Dom, node: NodeId) -> Rect {
        let mut current = Some(node);
        while let Some(n) = current {
            if dom.is_element(n) && !dom.is_displayed(n) {
                return Rect::default();
            }
            current = dom.parent(n);
        }

        let replaced = |n: NodeId| dom.tag(n).map_or(false, is_replaced);
        let visible = replaced(node)
            || !dom.text_content(node).trim().is_empty()
            || dom.descendants(node).any(replaced);
        Rect {
            top: 0.0,
            height: if visible { 1.0 } else { 0.0 },
        }
    }
}

/// Resolve the node to scroll to for `change`
pub fn locate_change(dom: &Dom, change: &FirstChange, layout: &dyn Layout) -> NodeId {
    let block = change.target;
    let Some(compare) = change.compare else {
        return block;
    };
    if dom.child_count(block) == 0 {
        return block;
    }

    let mut target = first_changed_child(dom, block, compare).unwrap_or(block);

    while !dom.is_element(target) {
        match dom.parent(target) {
            Some(parent) => target = parent,
            None => return block,
        }
    }

    while target != block && layout.bounds(dom, target).height == 0.0 {
        match dom.parent(target) {
            Some(parent) => target = parent,
            None => return block,
        }
    }
    target
}

fn first_changed_child(dom: &Dom, current: NodeId, previous: NodeId) -> Option<NodeId> {
    let current_children = dom.children(current);
    let previous_children = dom.children(previous);
    for (k, &child) in current_children.iter().enumerate() {
        let Some(&before) = previous_children.get(k) else {
            return Some(child);
        };
        if !dom.is_equal_node(child, before) {
            if dom.child_count(child) == 0 {
                return Some(child);
            }
            return first_changed_child(dom, child, before);
        }
    }
    current_children.last().copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub scroll_y: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollPlan {
    /// New vertical scroll offset
    pub top: f64,
    pub highlight: bool,
}

impl ScrollPlan {
    /// `target_top` is relative to the viewport. Highlighting only happens
    /// for jumps away from a previous state, never on first display.
    pub fn compute(target_top: f64, viewport: Viewport, had_compare: bool, config: &ScrollConfig) -> Self {
        let top = target_top + viewport.scroll_y - viewport.height * config.anchor_fraction;
        let delta = top - viewport.scroll_y;
        let highlight = had_compare
            && (delta > viewport.height * config.highlight_down_fraction
                || delta < -viewport.height * config.highlight_up_fraction);
        Self { top, highlight }
    }
}
