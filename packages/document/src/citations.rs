//! Inline citations and the bibliography
//!
//! Citations are cached by their as-rendered text (the textcite): distinct
//! citekey sets that render identically share one entry. Rendering happens
//! out of band. The registry issues a [`BibliographyRequest`] whenever a new
//! textcite shows up and correlates the answer back to live citations by
//! document order, refusing responses that no longer match the document.

use crate::dom::{Dom, NodeId};
use crate::error::DocumentError;
use crate::html::parse_fragment;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Id given to the live bibliography list, distinct from a custom `#refs`
pub const REFERENCE_LIST_ID: &str = "pmpmRefs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live citation as sent to the bibliography renderer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    pub textcite: String,
    pub citekeys: Vec<String>,
}

/// Ask the renderer for citation and bibliography html covering every live
/// citation, in document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibliographyRequest {
    pub id: RequestId,
    pub citations: Vec<CitationRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibliographyResponse {
    #[serde(rename = "request-id", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    pub html: String,
}

/// What became of a bibliography response
#[derive(Debug, Clone, PartialEq)]
pub enum BibliographyOutcome {
    Applied {
        /// Citation nodes whose html was rewritten
        updated: usize,
        /// Whether the response carried a reference list
        replaced_list: bool,
    },
    Discarded {
        reason: DocumentError,
        /// A fresh request to send when the document moved on
        reissue: Option<BibliographyRequest>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub block: NodeId,
    pub textcite: String,
    pub citekeys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextciteEntry {
    pub html: Option<String>,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct CitationRegistry {
    citations: HashMap<NodeId, Citation>,
    block_citations: HashMap<NodeId, Vec<NodeId>>,
    textcites: HashMap<String, TextciteEntry>,
    refcounts: HashMap<String, usize>,
    needs_render: bool,
    next_request: u64,
    latest: Option<(RequestId, Vec<NodeId>)>,
    list: Option<NodeId>,
}

/// Citation markers of `block` in reading order. Content of a footnote is
/// read at its marker; `skip` (the block's own footnote section) is not
/// walked directly.
pub fn ordered_citations(
    dom: &Dom,
    block: NodeId,
    notes: &HashMap<NodeId, NodeId>,
    skip: Option<NodeId>,
) -> Vec<NodeId> {
    fn walk(dom: &Dom, node: NodeId, notes: &HashMap<NodeId, NodeId>, skip: Option<NodeId>, out: &mut Vec<NodeId>) {
        for &child in dom.children(node) {
            if Some(child) == skip || !dom.is_element(child) {
                continue;
            }
            if dom.has_class(child, "citation") {
                out.push(child);
            }
            walk(dom, child, notes, skip, out);
            if let Some(&entry) = notes.get(&child) {
                walk(dom, entry, notes, skip, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(dom, block, notes, skip, &mut out);
    out
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn citation(&self, node: NodeId) -> Option<&Citation> {
        self.citations.get(&node)
    }

    pub fn textcite(&self, textcite: &str) -> Option<&TextciteEntry> {
        self.textcites.get(textcite)
    }

    pub fn textcite_count(&self) -> usize {
        self.textcites.len()
    }

    pub fn refcount(&self, citekey: &str) -> usize {
        self.refcounts.get(citekey).copied().unwrap_or(0)
    }

    pub fn live_citekeys(&self) -> impl Iterator<Item = &str> {
        self.refcounts.keys().map(String::as_str)
    }

    pub fn citations_of(&self, block: NodeId) -> &[NodeId] {
        self.block_citations
            .get(&block)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The live bibliography list, if a response has provided one
    pub fn list(&self) -> Option<NodeId> {
        self.list
    }

    pub fn latest_request(&self) -> Option<RequestId> {
        self.latest.as_ref().map(|(id, _)| *id)
    }

    /// Whether every textcite has rendered html
    pub fn resolved(&self) -> bool {
        self.textcites.values().all(|entry| entry.html.is_some())
    }

    /// Register the citations of a new block. `nodes` must be in reading
    /// order.
    pub fn register_block(&mut self, dom: &mut Dom, block: NodeId, nodes: Vec<NodeId>) {
        for &node in &nodes {
            let citekeys: Vec<String> = dom
                .attr(node, "data-cites")
                .map(|keys| keys.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let textcite = dom.text_content(node);

            for key in &citekeys {
                *self.refcounts.entry(key.clone()).or_insert(0) += 1;
            }

            if !self.textcites.contains_key(&textcite) {
                debug!(textcite = %textcite, "New textcite");
                self.needs_render = true;
            }
            let entry = self.textcites.entry(textcite.clone()).or_default();
            entry.nodes.push(node);
            match &entry.html {
                Some(html) => {
                    if let Err(err) = dom.set_inner_html(node, html) {
                        warn!(error = %err, "Cached citation html did not parse");
                    }
                }
                None => dom.add_class(node, "loading"),
            }

            self.citations.insert(
                node,
                Citation {
                    block,
                    textcite,
                    citekeys,
                },
            );
        }
        if !nodes.is_empty() {
            self.block_citations.insert(block, nodes);
        }
    }

    /// Release the citations of a block that is about to be dropped
    pub fn unregister_block(&mut self, dom: &mut Dom, block: NodeId) {
        let Some(nodes) = self.block_citations.remove(&block) else {
            return;
        };
        for node in nodes {
            let Some(citation) = self.citations.remove(&node) else {
                continue;
            };
            for key in &citation.citekeys {
                let remaining = match self.refcounts.get_mut(key) {
                    Some(count) => {
                        *count = count.saturating_sub(1);
                        *count
                    }
                    None => 0,
                };
                if remaining == 0 {
                    self.refcounts.remove(key);
                    self.remove_reference_entry(dom, key);
                }
            }
            if let Some(entry) = self.textcites.get_mut(&citation.textcite) {
                entry.nodes.retain(|&n| n != node);
                if entry.nodes.is_empty() {
                    self.textcites.remove(&citation.textcite);
                }
            }
        }
    }

    fn remove_reference_entry(&self, dom: &mut Dom, citekey: &str) {
        let Some(list) = self.list else {
            return;
        };
        let id = format!("ref-{}", citekey);
        if let Some(entry) = dom.find_by_id_attr(list, &id) {
            debug!(citekey, "Dropping bibliography entry");
            dom.drop_subtree(entry);
        }
    }

    /// Number of entries in the live bibliography list
    pub fn list_entry_count(&self, dom: &Dom) -> usize {
        self.list
            .map(|list| {
                dom.element_children(list)
                    .filter(|&e| dom.attr(e, "id").map_or(false, |id| id.starts_with("ref-")))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Live citation nodes in document order, given blocks in display order
    pub fn live_order(&self, blocks: &[NodeId]) -> Vec<NodeId> {
        blocks
            .iter()
            .flat_map(|block| self.citations_of(*block).iter().copied())
            .collect()
    }

    /// Issue a request if a pass introduced unseen textcites
    pub fn finish_pass(&mut self, blocks: &[NodeId]) -> Option<BibliographyRequest> {
        if !std::mem::take(&mut self.needs_render) {
            return None;
        }
        Some(self.issue_request(self.live_order(blocks)))
    }

    fn issue_request(&mut self, order: Vec<NodeId>) -> BibliographyRequest {
        self.next_request += 1;
        let id = RequestId(self.next_request);
        let citations = order
            .iter()
            .filter_map(|node| self.citations.get(node))
            .map(|c| CitationRef {
                textcite: c.textcite.clone(),
                citekeys: c.citekeys.clone(),
            })
            .collect();
        info!(request = %id, "Requesting bibliography render");
        self.latest = Some((id, order));
        BibliographyRequest { id, citations }
    }

    /// Apply an out-of-band bibliography render.
    ///
    /// Responses that no longer describe the live citations are discarded
    /// whole. When the citations changed since the request went out, a fresh
    /// request comes back with the outcome.
    #[instrument(skip(self, dom, response, blocks), fields(request = ?response.request_id))]
    pub fn apply_bibliography(
        &mut self,
        dom: &mut Dom,
        response: &BibliographyResponse,
        blocks: &[NodeId],
    ) -> BibliographyOutcome {
        let live = self.live_order(blocks);
        let snapshot_changed = self
            .latest
            .as_ref()
            .map_or(false, |(_, snapshot)| *snapshot != live);

        if let Some(received) = response.request_id {
            let reason = match &self.latest {
                None => Some(DocumentError::NoOutstandingRequest),
                Some((expected, _)) if *expected != received => Some(DocumentError::StaleRequest {
                    expected: *expected,
                    received,
                }),
                Some((expected, _)) if snapshot_changed => Some(DocumentError::CitationsChanged(*expected)),
                Some(_) => None,
            };
            if let Some(reason) = reason {
                let reissue = matches!(reason, DocumentError::CitationsChanged(_))
                    .then(|| self.issue_request(live.clone()));
                warn!(error = %reason, "Discarding bibliography response");
                return BibliographyOutcome::Discarded { reason, reissue };
            }
        }

        let scratch = dom.create_element("div");
        if let Err(err) = parse_fragment(dom, scratch, &response.html) {
            warn!(error = %err, "Bibliography html did not parse cleanly");
        }
        let rendered = dom.elements_with_class(scratch, "citation");

        if rendered.len() != live.len() {
            dom.drop_subtree(scratch);
            let reason = DocumentError::CitationCountMismatch {
                live: live.len(),
                received: rendered.len(),
            };
            let reissue = snapshot_changed.then(|| self.issue_request(live.clone()));
            warn!(error = %reason, "Discarding bibliography response");
            return BibliographyOutcome::Discarded { reason, reissue };
        }

        let mut updated = 0;
        let mut seen: HashSet<&str> = HashSet::new();
        for (node, &source) in live.iter().zip(rendered.iter()) {
            let Some(citation) = self.citations.get(node) else {
                continue;
            };
            if !seen.insert(citation.textcite.as_str()) {
                continue;
            }
            for missing in dom.elements_with_class(source, "citeproc-not-found") {
                if let Some(key) = dom.attr(missing, "data-reference-id").map(str::to_string) {
                    dom.set_text_content(missing, key);
                }
            }
            let html = dom.inner_html(source);
            let Some(entry) = self.textcites.get_mut(&citation.textcite) else {
                continue;
            };
            if entry.html.as_deref() != Some(html.as_str()) {
                for &target in &entry.nodes {
                    if let Err(err) = dom.set_inner_html(target, &html) {
                        warn!(error = %err, "Rendered citation did not parse");
                    }
                    updated += 1;
                }
                entry.html = Some(html);
            }
            for &target in &entry.nodes {
                dom.remove_class(target, "loading");
            }
        }

        let list = dom.descendants(scratch).find(|&n| dom.has_class(n, "references"));
        let replaced_list = list.is_some();
        if let Some(list) = list {
            dom.detach(list);
            dom.set_attr(list, "id", REFERENCE_LIST_ID);
            let unreferenced: Vec<NodeId> = dom
                .element_children(list)
                .filter(|&e| {
                    dom.attr(e, "id")
                        .and_then(|id| id.strip_prefix("ref-"))
                        .map_or(false, |key| self.refcount(key) == 0)
                })
                .collect();
            for entry in unreferenced {
                dom.drop_subtree(entry);
            }
            if let Some(previous) = self.list.replace(list) {
                dom.drop_subtree(previous);
            }
        }
        dom.drop_subtree(scratch);

        info!(updated, replaced_list, "Applied bibliography");
        BibliographyOutcome::Applied {
            updated,
            replaced_list,
        }
    }
}
