//! Footnote extraction and incremental renumbering across passes

mod common;

use common::Sequence;
use pmpm_document::{Block, Document, Update};

fn note_block(label: &str) -> String {
    format!(
        concat!(
            r##"<p>{l}<a href="#fn1" class="footnote-ref" id="fnref1" role="doc-noteref"><sup>1</sup></a></p>"##,
            r##"<section class="footnotes footnotes-end-of-document" role="doc-endnotes"><hr /><ol>"##,
            r##"<li id="fn1"><p>Note {l}.<a href="#fnref1" class="footnote-back" role="doc-backlink">↩︎</a></p></li>"##,
            r##"</ol></section>"##
        ),
        l = label
    )
}

fn two_note_block(label: &str) -> String {
    format!(
        concat!(
            r##"<p>{l}<a href="#fn1" id="fnref1"><sup>1</sup></a> and <a href="#fn2" id="fnref2"><sup>2</sup></a></p>"##,
            r##"<section class="footnotes"><ol>"##,
            r##"<li id="fn1"><p>First {l}.<a href="#fnref1">↩</a></p></li>"##,
            r##"<li id="fn2"><p>Second {l}.<a href="#fnref2">↩</a></p></li>"##,
            r##"</ol></section>"##
        ),
        l = label
    )
}

fn build(order: &[&str]) -> Update {
    Update::from_blocks(
        order
            .iter()
            .map(|&label| match label {
                plain if plain.starts_with("plain") => Block::new(plain, "<p>no notes</p>"),
                "pair" => Block::new("pair", two_note_block("pair").as_str()),
                other => Block::new(other, note_block(other).as_str()),
            })
            .collect(),
    )
}

/// Marker labels in document order
fn marker_labels(doc: &Document) -> Vec<String> {
    let dom = doc.dom();
    doc.footnotes()
        .groups()
        .iter()
        .flat_map(|g| g.entries.iter())
        .filter_map(|&entry| doc.footnotes().marker_for(entry))
        .map(|marker| dom.text_content(marker))
        .collect()
}

#[test]
fn test_numbers_are_dense_in_document_order() {
    let mut doc = Document::default();
    let report = doc.apply_update(&build(&["a", "pair", "plain", "b"]));
    assert_eq!(report.footnotes_renumbered, 4);
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1, 2, 3, 4]);
    assert_eq!(marker_labels(&doc), vec!["1", "2", "3", "4"]);
    assert!(doc.dom().is_displayed(doc.footnote_section()));
}

#[test]
fn test_partial_renumber_leaves_prefix_untouched() {
    let mut doc = Document::default();
    doc.apply_update(&build(&["f0", "f1", "plain", "f2", "f3"]));
    let first_entry = doc.footnotes().groups()[0].entries[0];

    let report = doc.apply_update(&build(&["f0", "f2", "f1", "plain", "f3"]));
    assert_eq!(report.footnotes_renumbered, 2);
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1, 2, 3, 4]);
    assert_eq!(doc.footnotes().groups()[0].entries[0], first_entry);

    // The entry that moved to the front carries the moved block's note
    let second = doc.footnotes().groups()[1].entries[0];
    assert!(doc.dom().text_content(second).starts_with("Note f2."));
}

#[test]
fn test_block_moved_to_front_renumbers_affected_span_only() {
    let mut doc = Document::default();
    doc.apply_update(&build(&["a", "b", "c", "d"]));
    let report = doc.apply_update(&build(&["c", "b", "a", "d"]));
    // a and c swap; d already has the right number
    assert_eq!(report.footnotes_renumbered, 3);
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1, 2, 3, 4]);
}

/// Every entry is numbered 1..N in document order and its marker agrees
fn assert_dense(doc: &Document) {
    let dom = doc.dom();
    let count = doc.footnotes().entry_count();
    assert_eq!(doc.footnotes().numbers(dom), (1..=count).collect::<Vec<_>>());
    for group in doc.footnotes().groups() {
        for &entry in &group.entries {
            let marker = doc.footnotes().marker_for(entry).unwrap();
            assert_eq!(Some(dom.text_content(marker).as_str()), dom.attr(entry, "value"));
        }
    }
}

#[test]
fn test_swapping_plain_blocks_keeps_numbering_anchored() {
    let mut doc = Document::default();
    doc.apply_update(&build(&["plain0", "a", "plain1"]));
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1]);

    doc.apply_update(&build(&["plain1", "plain0", "n"]));
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1]);
    assert_eq!(marker_labels(&doc), vec!["1"]);
    assert_dense(&doc);
}

#[test]
fn test_numbering_stays_dense_over_random_passes() {
    const LABELS: [&str; 6] = ["plain0", "plain1", "a", "b", "c", "pair"];
    for seed in 1..=40u64 {
        let mut seq = Sequence(seed.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        let mut doc = Document::default();
        for _ in 0..8 {
            let len = seq.below(10);
            let order: Vec<&str> = (0..len).map(|_| LABELS[seq.below(LABELS.len())]).collect();
            doc.apply_update(&build(&order));

            let expected: usize = order
                .iter()
                .map(|label| match *label {
                    "pair" => 2,
                    plain if plain.starts_with("plain") => 0,
                    _ => 1,
                })
                .sum();
            assert_eq!(doc.footnotes().entry_count(), expected, "seed {} order {:?}", seed, order);
            assert_eq!(doc.footnotes().groups().len(), len);
            assert_dense(&doc);
        }
    }
}

#[test]
fn test_removal_renumbers_and_hides_empty_section() {
    let mut doc = Document::default();
    doc.apply_update(&build(&["a", "b", "plain"]));
    doc.apply_update(&build(&["b", "plain"]));
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1]);
    assert_eq!(marker_labels(&doc), vec!["1"]);

    doc.apply_update(&build(&["plain"]));
    assert_eq!(doc.footnotes().entry_count(), 0);
    assert!(!doc.dom().is_displayed(doc.footnote_section()));
}

#[test]
fn test_links_resolve_without_ids() {
    let mut doc = Document::default();
    doc.apply_update(&build(&["a", "b"]));
    let dom = doc.dom();
    // Both blocks used fn1/fnref1; none of those ids remain
    assert!(dom.find_by_id_attr(doc.root(), "fn1").is_none());
    assert!(dom.find_by_id_attr(doc.root(), "fnref1").is_none());

    let entry_b = doc.footnotes().groups()[1].entries[0];
    let marker_b = doc.footnotes().marker_for(entry_b).unwrap();
    assert!(dom.is_attached_to(marker_b, doc.block_nodes()[1]));
    assert_eq!(doc.footnotes().link_target(marker_b), Some(entry_b));
}

#[test]
fn test_malformed_footnotes_degrade() {
    let mut doc = Document::default();
    let update = Update::from_blocks(vec![
        Block::new("x", r#"<section class="footnotes"><p>no list here</p></section>"#),
        Block::new("y", r#"<section class="footnotes"><ol><li><p>orphan</p></li></ol></section>"#),
    ]);
    let report = doc.apply_update(&update);
    assert_eq!(report.created, 2);
    assert_eq!(doc.footnotes().entry_count(), 1);
    assert_eq!(doc.footnotes().numbers(doc.dom()), vec![1]);
}
