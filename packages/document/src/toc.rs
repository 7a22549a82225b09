//! Table of contents

use crate::dom::{Dom, NodeId};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocEntry {
    pub level: u8,
    pub heading: NodeId,
    /// Inner html of the heading, so rendered math carries over
    pub label_html: String,
    pub children: Vec<TocEntry>,
}

fn heading_level(tag: &str) -> Option<u8> {
    let digit = tag.strip_prefix('h')?;
    match digit.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

/// Index headings `h1..=h{depth}` below `roots`, in order. `skip` filters
/// out headings that must not appear.
pub fn build_toc(dom: &Dom, roots: &[NodeId], depth: u8, skip: impl Fn(NodeId) -> bool) -> Vec<TocEntry> {
    let headings = roots
        .iter()
        .flat_map(|&root| dom.descendants(root))
        .filter_map(|node| {
            let level = dom.tag(node).and_then(heading_level)?;
            (level <= depth && !skip(node)).then_some((node, level))
        });

    // One frame per open list; each remembers the level of its last entry
    let mut stack: Vec<(Vec<TocEntry>, u8)> = vec![(Vec::new(), 1)];
    for (heading, level) in headings {
        let entry = TocEntry {
            level,
            heading,
            label_html: dom.inner_html(heading),
            children: Vec::new(),
        };

        let last_level = stack.last().map_or(1, |(_, l)| *l);
        let has_last = stack.last().map_or(false, |(entries, _)| !entries.is_empty());
        if level > last_level && has_last {
            // Open at most one nested level, even when levels are skipped
            stack.push((Vec::new(), level));
        } else if level < last_level {
            while stack.len() > 1 && stack[stack.len() - 2].1 >= level {
                close_frame(&mut stack);
            }
        }

        if let Some((entries, last)) = stack.last_mut() {
            entries.push(entry);
            *last = level;
        }
    }
    while stack.len() > 1 {
        close_frame(&mut stack);
    }
    stack.pop().map(|(entries, _)| entries).unwrap_or_default()
}

fn close_frame(stack: &mut Vec<(Vec<TocEntry>, u8)>) {
    if let Some((entries, _)) = stack.pop() {
        if let Some(parent) = stack.last_mut().and_then(|(e, _)| e.last_mut()) {
            parent.children = entries;
        }
    }
}

/// Lazily refreshed table of contents
#[derive(Debug, Clone, Default, Serialize)]
pub struct TocState {
    pub enabled: bool,
    pub title: String,
    pub visible: bool,
    pub stale: bool,
    pub entries: Vec<TocEntry>,
}

impl TocState {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            stale: true,
            ..Self::default()
        }
    }

    /// Whether the next refresh should rebuild
    pub fn needs_rebuild(&self) -> bool {
        self.enabled && self.visible && self.stale
    }

    pub fn set_entries(&mut self, entries: Vec<TocEntry>) {
        self.entries = entries;
        self.stale = false;
    }

    /// Open or close the TOC; returns whether it is now visible
    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }
}
