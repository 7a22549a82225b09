//! Block reconciliation
//!
//! Walks the incoming block list once. At position `i` the uncommitted
//! suffix of the display list is searched for the `i`-th hash:
//!
//! - found at `i`: nothing to do
//! - found at `j > i`: swap `i` and `j` (footnote groups included)
//! - not found: create the block at `i`
//!
//! Whatever is left past the end of the list afterwards is removed. Blocks
//! that survive keep their node identity, so open details, in-flight renders
//! and scroll anchors survive reordering.

use crate::block::Block;
use crate::citations::BibliographyRequest;
use crate::document::Document;
use crate::dom::NodeId;
use crate::index::IdentityIndex;
use crate::locate::FirstChange;
use crate::render::RenderJob;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    /// Surviving blocks whose display position changed
    pub moved: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub footnotes_renumbered: usize,
    pub first_change: Option<FirstChange>,
    pub render_jobs: Vec<RenderJob>,
    pub bibliography_request: Option<BibliographyRequest>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.created + self.moved + self.removed > 0
    }
}

#[instrument(skip_all, fields(blocks = blocks.len()))]
pub(crate) fn reconcile(doc: &mut Document, blocks: &[Block]) -> ReconcileReport {
    let content = doc.content;
    let mut index = IdentityIndex::build(doc.dom.children(content).iter().map(|&node| {
        let hash = doc.hashes.get(&node).cloned().unwrap_or_default();
        (node, hash)
    }));

    let mut report = ReconcileReport::default();
    let mut relocated: HashSet<NodeId> = HashSet::new();

    for (i, block) in blocks.iter().enumerate() {
        match index.take(&block.hash) {
            Some((_, j)) if j == i => {}
            Some((node, j)) => {
                let displaced = doc.dom.child_at(content, i);
                doc.dom.swap_children(content, i, j);
                doc.footnotes.swap(&mut doc.dom, i, j);
                relocated.insert(node);
                if let Some(displaced) = displaced {
                    index.relocate(displaced, j);
                    relocated.insert(displaced);
                }
                debug!(block = %node, from = j, to = i, "Moved block");
                report.first_change.get_or_insert(FirstChange {
                    target: node,
                    compare: displaced,
                });
            }
            None => {
                let previous = doc.dom.child_at(content, i);
                let (node, jobs) = doc.create_block(i, block);
                index.note_insert();
                report.created += 1;
                report.render_jobs.extend(jobs);
                report.first_change.get_or_insert(FirstChange {
                    target: node,
                    compare: previous,
                });
            }
        }
    }

    // Everything past the end is unmatched
    let keep = report.first_change.and_then(|change| change.compare);
    while doc.dom.child_count(content) > blocks.len() {
        let last = doc.dom.child_count(content) - 1;
        let node = doc.dom.child_at(content, last);
        let retain = node.is_some() && node == keep;
        if let Some(node) = doc.remove_block(last, retain) {
            relocated.remove(&node);
        }
        report.removed += 1;
    }

    report.moved = relocated.len();
    report.unchanged = blocks.len() - report.created - report.moved;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Update;

    fn update(blocks: &[(&str, &str)]) -> Update {
        Update::from_blocks(blocks.iter().map(|(h, c)| Block::new(*h, *c)).collect())
    }

    fn hashes(doc: &Document) -> Vec<String> {
        doc.blocks().iter().map(|b| b.hash.to_string()).collect()
    }

    #[test]
    fn test_create_then_noop() {
        let mut doc = Document::default();
        let u = update(&[("a", "<p>A</p>"), ("b", "<p>B</p>")]);
        let first = doc.apply_update(&u);
        assert_eq!(first.created, 2);
        assert_eq!(
            first.first_change.map(|c| c.compare),
            Some(None),
            "nothing to compare against on first display"
        );

        let second = doc.apply_update(&u);
        assert!(!second.changed());
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.first_change, None);
    }

    #[test]
    fn test_duplicates_match_by_position() {
        let mut doc = Document::default();
        doc.apply_update(&update(&[("x", "<hr />"), ("a", "<p>A</p>"), ("x", "<hr />")]));
        let before: Vec<NodeId> = doc.block_nodes();

        let report = doc.apply_update(&update(&[("x", "<hr />"), ("x", "<hr />"), ("a", "<p>A</p>")]));
        assert_eq!(report.created, 0);
        assert_eq!(report.removed, 0);
        assert_eq!(hashes(&doc), vec!["x", "x", "a"]);
        let after = doc.block_nodes();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1], before[2]);
        assert_eq!(after[2], before[1]);
    }

    #[test]
    fn test_insert_in_front_shifts_without_moves() {
        let mut doc = Document::default();
        doc.apply_update(&update(&[("a", "<p>A</p>"), ("b", "<p>B</p>")]));
        let report = doc.apply_update(&update(&[("n", "<p>N</p>"), ("a", "<p>A</p>"), ("b", "<p>B</p>")]));
        assert_eq!(report.created, 1);
        assert_eq!(report.moved, 0);
        assert_eq!(report.unchanged, 2);
        assert_eq!(hashes(&doc), vec!["n", "a", "b"]);
    }

    #[test]
    fn test_removed_compare_block_is_retained_until_next_pass() {
        let mut doc = Document::default();
        doc.apply_update(&update(&[("a", "<p>old</p>")]));
        let old = doc.block_nodes()[0];

        let report = doc.apply_update(&update(&[("b", "<p>new</p>")]));
        let change = report.first_change.unwrap();
        assert_eq!(change.compare, Some(old));
        assert!(doc.dom().contains(old));
        assert!(!doc.dom().is_attached_to(old, doc.root()));

        doc.apply_update(&update(&[("b", "<p>new</p>")]));
        assert!(!doc.dom().contains(old));
    }
}
