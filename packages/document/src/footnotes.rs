//! Document-wide footnote list
//!
//! Each block owns one `ol` group in the footnote container, kept parallel to
//! the display list. Entries are moved out of the block's own footnote
//! section at creation time and renumbered incrementally afterwards.
//!
//! Links between an entry, its in-text marker and its back-link live in
//! id-keyed tables rather than in element ids, since the same footnote id
//! (`fn1`, `fnref1`, ...) shows up in every block.

use crate::dom::{Dom, NodeId};
use std::collections::HashMap;
use tracing::debug;

/// Footnote structure found in a freshly created block, before extraction
#[derive(Debug, Clone, Default)]
pub struct FootnoteScan {
    /// The block's own `footnotes` section, removed on extraction
    pub section: Option<NodeId>,
    pub entries: Vec<ScannedEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct ScannedEntry {
    pub entry: NodeId,
    pub marker: Option<NodeId>,
    pub backlink: Option<NodeId>,
}

impl FootnoteScan {
    /// Marker → entry pairs, used to order content nested inside footnotes
    pub fn marker_entries(&self) -> HashMap<NodeId, NodeId> {
        self.entries
            .iter()
            .filter_map(|e| e.marker.map(|m| (m, e.entry)))
            .collect()
    }
}

/// Locate the footnote section of `block` without mutating anything.
///
/// Missing pieces degrade: no section or no list yields an empty scan, and an
/// entry without a matching marker is kept without one.
pub fn scan(dom: &Dom, block: NodeId) -> FootnoteScan {
    let Some(section) = dom.element_children(block).find(|&c| dom.has_class(c, "footnotes")) else {
        return FootnoteScan::default();
    };
    let Some(list) = dom.element_children(section).find(|&c| dom.tag(c) == Some("ol")) else {
        return FootnoteScan::default();
    };

    let entries = dom
        .element_children(list)
        .filter(|&li| dom.tag(li) == Some("li"))
        .map(|entry| {
            let number = dom
                .attr(entry, "id")
                .and_then(|id| id.strip_prefix("fn"))
                .map(str::to_string);
            let (marker, backlink) = match number {
                Some(number) => {
                    let marker_id = format!("fnref{}", number);
                    let marker_href = format!("#{}", marker_id);
                    let backlink = dom
                        .descendants(entry)
                        .find(|&a| dom.tag(a) == Some("a") && dom.attr(a, "href") == Some(marker_href.as_str()));
                    let marker = dom
                        .descendants(block)
                        .find(|&n| dom.attr(n, "id") == Some(marker_id.as_str()));
                    (marker, backlink)
                }
                None => {
                    let backlink = dom
                        .descendants(entry)
                        .find(|&a| dom.has_class(a, "footnote-back"));
                    (None, backlink)
                }
            };
            ScannedEntry {
                entry,
                marker,
                backlink,
            }
        })
        .collect();

    FootnoteScan {
        section: Some(section),
        entries,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootnoteLink {
    pub marker: Option<NodeId>,
    pub backlink: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FootnoteGroup {
    pub owner: NodeId,
    pub list: NodeId,
    pub entries: Vec<NodeId>,
    /// Display number of the first entry, `None` until numbered
    start: Option<usize>,
}

impl FootnoteGroup {
    pub fn start(&self) -> Option<usize> {
        self.start
    }
}

#[derive(Debug)]
pub struct FootnoteRegistry {
    container: NodeId,
    groups: Vec<FootnoteGroup>,
    links: HashMap<NodeId, FootnoteLink>,
    by_marker: HashMap<NodeId, NodeId>,
    by_backlink: HashMap<NodeId, NodeId>,
    dirty_from: Option<usize>,
    dirty_to: usize,
}

impl FootnoteRegistry {
    pub fn new(container: NodeId) -> Self {
        Self {
            container,
            groups: Vec::new(),
            links: HashMap::new(),
            by_marker: HashMap::new(),
            by_backlink: HashMap::new(),
            dirty_from: None,
            dirty_to: 0,
        }
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn groups(&self) -> &[FootnoteGroup] {
        &self.groups
    }

    /// Number of live footnote entries
    pub fn entry_count(&self) -> usize {
        self.links.len()
    }

    pub fn marker_for(&self, entry: NodeId) -> Option<NodeId> {
        self.links.get(&entry).and_then(|link| link.marker)
    }

    pub fn entry_for(&self, marker: NodeId) -> Option<NodeId> {
        self.by_marker.get(&marker).copied()
    }

    /// Where following a footnote link leads: marker → entry, back-link →
    /// marker
    pub fn link_target(&self, node: NodeId) -> Option<NodeId> {
        if let Some(&entry) = self.by_marker.get(&node) {
            return Some(entry);
        }
        self.by_backlink
            .get(&node)
            .and_then(|entry| self.marker_for(*entry))
    }

    fn mark_dirty(&mut self, index: usize) {
        self.dirty_from = Some(self.dirty_from.map_or(index, |from| from.min(index)));
        self.dirty_to = self.dirty_to.max(index);
    }

    /// Create the group for a block inserted at `index` and move the scanned
    /// entries into it. Returns the number of entries extracted.
    pub fn insert_block(&mut self, dom: &mut Dom, index: usize, owner: NodeId, scan: FootnoteScan) -> usize {
        let list = dom.create_element("ol");
        let index = index.min(self.groups.len());
        dom.insert_child(self.container, index, list);

        let mut entries = Vec::with_capacity(scan.entries.len());
        for scanned in &scan.entries {
            dom.remove_attr(scanned.entry, "id");
            if let Some(marker) = scanned.marker {
                dom.remove_attr(marker, "id");
                dom.remove_attr(marker, "href");
                self.by_marker.insert(marker, scanned.entry);
            }
            if let Some(backlink) = scanned.backlink {
                dom.remove_attr(backlink, "href");
                self.by_backlink.insert(backlink, scanned.entry);
            }
            self.links.insert(
                scanned.entry,
                FootnoteLink {
                    marker: scanned.marker,
                    backlink: scanned.backlink,
                },
            );
            dom.append_child(list, scanned.entry);
            entries.push(scanned.entry);
        }
        if let Some(section) = scan.section {
            dom.drop_subtree(section);
        }

        if self.dirty_to >= index && self.dirty_from.is_some() {
            self.dirty_to += 1;
        }
        let extracted = entries.len();
        self.groups.insert(
            index,
            FootnoteGroup {
                owner,
                list,
                entries,
                start: None,
            },
        );
        if extracted > 0 {
            debug!(block = %owner, extracted, "Extracted footnotes");
            self.mark_dirty(index);
        }
        extracted
    }

    /// Swap the groups at `i` and `j` along with their blocks
    pub fn swap(&mut self, dom: &mut Dom, i: usize, j: usize) {
        if i == j || i >= self.groups.len() || j >= self.groups.len() {
            return;
        }
        let numbered = !self.groups[i].entries.is_empty() || !self.groups[j].entries.is_empty();
        self.groups.swap(i, j);
        // A cached start describes its position, not the group that held it
        let start = self.groups[i].start;
        self.groups[i].start = self.groups[j].start;
        self.groups[j].start = start;
        dom.swap_children(self.container, i, j);
        // Swapping two empty groups leaves every display number intact
        if numbered {
            self.mark_dirty(i.min(j));
            self.mark_dirty(i.max(j));
        }
    }

    /// Drop the group at `index` and forget its links
    pub fn remove_block(&mut self, dom: &mut Dom, index: usize) -> Option<FootnoteGroup> {
        if index >= self.groups.len() {
            return None;
        }
        let group = self.groups.remove(index);
        for entry in &group.entries {
            if let Some(link) = self.links.remove(entry) {
                if let Some(marker) = link.marker {
                    self.by_marker.remove(&marker);
                }
                if let Some(backlink) = link.backlink {
                    self.by_backlink.remove(&backlink);
                }
            }
        }
        dom.drop_subtree(group.list);
        if let Some(from) = self.dirty_from {
            if from > index {
                self.dirty_from = Some(from - 1);
            }
            if self.dirty_to > index {
                self.dirty_to -= 1;
            }
        }
        if !group.entries.is_empty() {
            self.mark_dirty(index);
        }
        Some(group)
    }

    /// Write display numbers for the span touched since the last call.
    ///
    /// Numbering resumes from the nearest preceding group that still carries
    /// a valid start, or from 1 when there is none, and stops at the first
    /// group past the touched span whose start already matches. Returns the
    /// number of entries written.
    pub fn renumber(&mut self, dom: &mut Dom) -> usize {
        let Some(from) = self.dirty_from.take() else {
            return 0;
        };
        let dirty_to = std::mem::take(&mut self.dirty_to);
        let from = from.min(self.groups.len());

        let anchor = self.groups[..from]
            .iter()
            .enumerate()
            .rev()
            .find_map(|(k, g)| g.start.map(|start| (k + 1, start + g.entries.len())));
        let (mut index, mut counter) = anchor.unwrap_or((0, 1));

        let mut written = 0;
        while index < self.groups.len() {
            let group = &mut self.groups[index];
            if index > dirty_to && group.start == Some(counter) {
                break;
            }
            group.start = Some(counter);
            for &entry in &group.entries {
                dom.set_attr(entry, "value", counter.to_string());
                if let Some(marker) = self.links.get(&entry).and_then(|l| l.marker) {
                    let label = dom.first_element_child(marker).unwrap_or(marker);
                    dom.set_text_content(label, counter.to_string());
                }
                counter += 1;
                written += 1;
            }
            index += 1;
        }
        debug!(from, dirty_to, written, "Renumbered footnotes");
        written
    }

    /// Display numbers in document order
    pub fn numbers(&self, dom: &Dom) -> Vec<usize> {
        self.groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .filter_map(|&entry| dom.attr(entry, "value").and_then(|v| v.parse().ok()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_fragment;

    fn footnote_block(dom: &mut Dom, text: &str) -> NodeId {
        let block = dom.create_element("div");
        let markup = format!(
            concat!(
                r##"<p>{t}<a href="#fn1" class="footnote-ref" id="fnref1"><sup>1</sup></a></p>"##,
                r##"<section class="footnotes"><hr /><ol>"##,
                r##"<li id="fn1"><p>note {t}<a href="#fnref1" class="footnote-back">↩</a></p></li>"##,
                r##"</ol></section>"##
            ),
            t = text
        );
        parse_fragment(dom, block, &markup).unwrap();
        block
    }

    fn setup() -> (Dom, FootnoteRegistry) {
        let mut dom = Dom::new();
        let container = dom.create_element("div");
        (dom, FootnoteRegistry::new(container))
    }

    #[test]
    fn test_extraction_moves_entries_and_strips_ids() {
        let (mut dom, mut registry) = setup();
        let block = footnote_block(&mut dom, "a");
        let scan = scan(&dom, block);
        assert_eq!(scan.entries.len(), 1);
        let marker = scan.entries[0].marker.unwrap();
        let entry = scan.entries[0].entry;

        assert_eq!(registry.insert_block(&mut dom, 0, block, scan), 1);
        assert!(dom.find_by_id_attr(block, "fnref1").is_none());
        assert!(dom.elements_with_class(block, "footnotes").is_empty());
        assert_eq!(dom.attr(entry, "id"), None);
        assert_eq!(registry.entry_for(marker), Some(entry));
        assert_eq!(registry.marker_for(entry), Some(marker));

        let backlink = dom.elements_with_class(entry, "footnote-back")[0];
        assert_eq!(registry.link_target(backlink), Some(marker));
    }

    #[test]
    fn test_missing_structure_means_no_footnotes() {
        let (mut dom, mut registry) = setup();
        let block = dom.create_element("div");
        parse_fragment(&mut dom, block, r#"<section class="footnotes"><p>no list</p></section>"#).unwrap();
        let scan = scan(&dom, block);
        assert!(scan.entries.is_empty());
        assert_eq!(registry.insert_block(&mut dom, 0, block, scan), 0);
        assert_eq!(registry.entry_count(), 0);
        assert_eq!(registry.renumber(&mut dom), 0);
    }

    #[test]
    fn test_renumber_writes_dense_sequence() {
        let (mut dom, mut registry) = setup();
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let block = footnote_block(&mut dom, text);
            let scan = scan(&dom, block);
            registry.insert_block(&mut dom, i, block, scan);
        }
        assert_eq!(registry.renumber(&mut dom), 3);
        assert_eq!(registry.numbers(&dom), vec![1, 2, 3]);

        let marker = registry.marker_for(registry.groups()[2].entries[0]).unwrap();
        assert_eq!(dom.text_content(marker), "3");
    }

    #[test]
    fn test_swap_renumbers_only_touched_span() {
        let (mut dom, mut registry) = setup();
        for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
            let block = footnote_block(&mut dom, text);
            let scan = scan(&dom, block);
            registry.insert_block(&mut dom, i, block, scan);
        }
        registry.renumber(&mut dom);

        registry.swap(&mut dom, 1, 2);
        assert_eq!(registry.renumber(&mut dom), 2);
        assert_eq!(registry.numbers(&dom), vec![1, 2, 3, 4]);
        assert_eq!(dom.text_content(registry.groups()[1].entries[0]).trim_end_matches('↩'), "note c");
    }

    #[test]
    fn test_empty_swap_keeps_starts_with_positions() {
        let (mut dom, mut registry) = setup();
        let mut blocks = Vec::new();
        for (i, text) in ["plain", "a", "plain"].iter().enumerate() {
            let block = if *text == "plain" {
                let block = dom.create_element("div");
                parse_fragment(&mut dom, block, "<p>no notes</p>").unwrap();
                block
            } else {
                footnote_block(&mut dom, text)
            };
            let scan = scan(&dom, block);
            registry.insert_block(&mut dom, i, block, scan);
            blocks.push(block);
        }
        registry.renumber(&mut dom);
        assert_eq!(registry.groups()[0].start(), Some(1));
        assert_eq!(registry.groups()[2].start(), Some(2));

        // Neither group has entries, so nothing is marked for renumbering
        registry.swap(&mut dom, 0, 2);
        assert_eq!(registry.groups()[0].owner, blocks[2]);
        assert_eq!(registry.groups()[0].start(), Some(1));
        assert_eq!(registry.renumber(&mut dom), 0);

        let inserted = footnote_block(&mut dom, "n");
        let scan = scan(&dom, inserted);
        registry.insert_block(&mut dom, 1, inserted, scan);
        registry.renumber(&mut dom);
        assert_eq!(registry.numbers(&dom), vec![1, 2]);
        let marker = registry.marker_for(registry.groups()[1].entries[0]).unwrap();
        assert_eq!(dom.text_content(marker), "1");
    }

    #[test]
    fn test_remove_renumbers_followers() {
        let (mut dom, mut registry) = setup();
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let block = footnote_block(&mut dom, text);
            let scan = scan(&dom, block);
            registry.insert_block(&mut dom, i, block, scan);
        }
        registry.renumber(&mut dom);
        registry.remove_block(&mut dom, 0);
        assert_eq!(registry.entry_count(), 2);
        assert_eq!(registry.renumber(&mut dom), 2);
        assert_eq!(registry.numbers(&dom), vec![1, 2]);
    }
}
