//! The document context object
//!
//! `Document` owns the displayed tree and every registry that must stay
//! consistent with it. All mutation goes through `apply_update`,
//! `apply_bibliography` and `complete_render`; each runs to completion before
//! the next one starts.
//!
//! Tree layout:
//!
//! ```text
//! body
//! ├── div#content              one wrapper per block, in display order
//! ├── section.footnotes
//! │   ├── hr
//! │   └── div#footnotes        one ol per block, parallel to #content
//! └── section#references
//!     ├── h1#bibliography
//!     └── (reference list, unless mounted in a custom #refs)
//! ```

use crate::block::{Block, BlockHash, PlacedBlock, Update};
use crate::citations::{ordered_citations, BibliographyOutcome, BibliographyResponse, CitationRegistry};
use crate::config::DocumentConfig;
use crate::dom::{Dom, NodeId};
use crate::footnotes::{self, FootnoteRegistry};
use crate::html::parse_fragment;
use crate::locate::{locate_change, FirstChange, Layout, ScrollPlan, Viewport};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::render::{self, RenderJob, TaskId};
use crate::toc::{build_toc, TocState};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

pub const HASH_ATTRIBUTE: &str = "data-hash";

pub struct Document {
    config: DocumentConfig,
    pub(crate) dom: Dom,
    root: NodeId,
    pub(crate) content: NodeId,
    footnote_section: NodeId,
    references: NodeId,
    bibliography_title: NodeId,

    pub(crate) hashes: HashMap<NodeId, BlockHash>,
    sources: HashMap<NodeId, String>,

    pub(crate) footnotes: FootnoteRegistry,
    citations: CitationRegistry,
    toc: TocState,

    suppress_bibliography: bool,
    reference_section_title: String,
    document_identifier: Option<String>,

    /// Detached compare blocks kept alive until the next pass
    retained: Vec<NodeId>,
    last_change: Option<FirstChange>,
    renders: HashMap<TaskId, RenderJob>,
    next_task: u64,
}

impl Document {
    pub fn new(config: DocumentConfig) -> Self {
        let mut dom = Dom::new();
        let root = dom.create_element("body");

        let content = dom.create_element("div");
        dom.set_attr(content, "id", "content");
        dom.append_child(root, content);

        let footnote_section = dom.create_element("section");
        dom.set_attr(footnote_section, "class", "footnotes");
        let rule = dom.create_element("hr");
        dom.append_child(footnote_section, rule);
        let footnote_list = dom.create_element("div");
        dom.set_attr(footnote_list, "id", "footnotes");
        dom.append_child(footnote_section, footnote_list);
        dom.append_child(root, footnote_section);
        dom.set_displayed(footnote_section, false);

        let references = dom.create_element("section");
        dom.set_attr(references, "id", "references");
        let bibliography_title = dom.create_element("h1");
        dom.set_attr(bibliography_title, "id", "bibliography");
        dom.append_child(references, bibliography_title);
        dom.append_child(root, references);
        dom.set_displayed(references, false);
        dom.set_displayed(bibliography_title, false);

        let toc = TocState::new(config.default_toc_title.clone());

        Self {
            config,
            dom,
            root,
            content,
            footnote_section,
            references,
            bibliography_title,
            hashes: HashMap::new(),
            sources: HashMap::new(),
            footnotes: FootnoteRegistry::new(footnote_list),
            citations: CitationRegistry::new(),
            toc,
            suppress_bibliography: false,
            reference_section_title: String::new(),
            document_identifier: None,
            retained: Vec::new(),
            last_change: None,
            renders: HashMap::new(),
            next_task: 0,
        }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn content(&self) -> NodeId {
        self.content
    }

    pub fn footnote_section(&self) -> NodeId {
        self.footnote_section
    }

    pub fn references_section(&self) -> NodeId {
        self.references
    }

    pub fn bibliography_title(&self) -> NodeId {
        self.bibliography_title
    }

    pub fn footnotes(&self) -> &FootnoteRegistry {
        &self.footnotes
    }

    pub fn citations(&self) -> &CitationRegistry {
        &self.citations
    }

    pub fn toc(&self) -> &TocState {
        &self.toc
    }

    pub fn document_identifier(&self) -> Option<&str> {
        self.document_identifier.as_deref()
    }

    pub fn last_change(&self) -> Option<FirstChange> {
        self.last_change
    }

    /// Block wrappers in display order
    pub fn block_nodes(&self) -> Vec<NodeId> {
        self.dom.children(self.content).to_vec()
    }

    /// Current blocks in display order
    pub fn blocks(&self) -> Vec<PlacedBlock> {
        self.dom
            .children(self.content)
            .iter()
            .enumerate()
            .map(|(position, &node)| PlacedBlock {
                node,
                hash: self.hashes.get(&node).cloned().unwrap_or_default(),
                content: self.sources.get(&node).cloned().unwrap_or_default(),
                position,
            })
            .collect()
    }

    /// Serialize the whole displayed tree
    pub fn to_html(&self) -> String {
        self.dom.outer_html(self.root)
    }

    /// Bring the display in line with `update`
    #[instrument(skip(self, update), fields(blocks = update.blocks.len()))]
    pub fn apply_update(&mut self, update: &Update) -> ReconcileReport {
        for node in std::mem::take(&mut self.retained) {
            self.dom.drop_subtree(node);
        }

        self.suppress_bibliography = update.suppress_bibliography;
        self.reference_section_title = update.reference_section_title.clone();
        self.document_identifier = update.document_identifier.clone();
        self.toc.enabled = update.toc;
        self.toc.title = update
            .toc_title
            .clone()
            .unwrap_or_else(|| self.config.default_toc_title.clone());

        let mut report = reconcile(self, &update.blocks);
        report.footnotes_renumbered = self.footnotes.renumber(&mut self.dom);

        if report.changed() {
            self.remount_reference_list();
            self.toc.stale = true;
        }
        self.update_visibility();

        let blocks = self.block_nodes();
        report.bibliography_request = self.citations.finish_pass(&blocks);
        self.last_change = report.first_change;

        if self.renders.is_empty() {
            self.refresh_toc();
        }

        info!(
            created = report.created,
            moved = report.moved,
            removed = report.removed,
            unchanged = report.unchanged,
            renumbered = report.footnotes_renumbered,
            jobs = report.render_jobs.len(),
            "Reconciled document"
        );
        report
    }

    /// Create the block for `block` at display position `index` and run the
    /// creation hooks. Returns the new node and the sub-renders it needs.
    pub(crate) fn create_block(&mut self, index: usize, block: &Block) -> (NodeId, Vec<RenderJob>) {
        let node = self.dom.create_element(self.config.wrapping_tag.clone());
        self.dom.set_attr(node, HASH_ATTRIBUTE, block.hash.as_str());
        if let Err(err) = parse_fragment(&mut self.dom, node, &block.content) {
            warn!(hash = %block.hash, error = %err, "Block markup is malformed; keeping partial content");
        }
        self.dom.insert_child(self.content, index, node);
        self.hashes.insert(node, block.hash.clone());
        self.sources.insert(node, block.content.clone());

        let scan = footnotes::scan(&self.dom, node);
        let citations = ordered_citations(&self.dom, node, &scan.marker_entries(), scan.section);
        self.citations.register_block(&mut self.dom, node, citations);

        let jobs: Vec<RenderJob> = render::discover(&self.dom, node)
            .into_iter()
            .map(|(target, kind)| {
                self.next_task += 1;
                RenderJob {
                    task: TaskId::new(self.next_task),
                    block: node,
                    target,
                    kind,
                }
            })
            .collect();
        for job in &jobs {
            self.renders.insert(job.task, job.clone());
        }

        self.footnotes.insert_block(&mut self.dom, index, node, scan);
        debug!(block = %node, hash = %block.hash, index, "Created block");
        (node, jobs)
    }

    /// Remove the block at display position `index` and run the cleanup
    /// hooks. A `retain`ed block is only detached.
    pub(crate) fn remove_block(&mut self, index: usize, retain: bool) -> Option<NodeId> {
        let node = self.dom.child_at(self.content, index)?;
        self.citations.unregister_block(&mut self.dom, node);
        self.footnotes.remove_block(&mut self.dom, index);
        self.hashes.remove(&node);
        self.sources.remove(&node);

        // A custom #refs mount may be going away with the block
        if let Some(list) = self.citations.list() {
            if self.dom.is_attached_to(list, node) {
                self.dom.detach(list);
            }
        }

        if retain {
            self.dom.detach(node);
            self.retained.push(node);
        } else {
            self.dom.drop_subtree(node);
        }
        debug!(block = %node, index, retain, "Removed block");
        Some(node)
    }

    /// Apply an out-of-band bibliography render
    pub fn apply_bibliography(&mut self, response: &BibliographyResponse) -> BibliographyOutcome {
        let blocks = self.block_nodes();
        let outcome = self.citations.apply_bibliography(&mut self.dom, response, &blocks);
        if let BibliographyOutcome::Applied { replaced_list, .. } = &outcome {
            if *replaced_list {
                self.mount_reference_list();
            }
            if self.update_visibility() {
                self.toc.stale = true;
                self.refresh_toc();
            }
        }
        outcome
    }

    /// Whether every citation has rendered html
    pub fn citations_resolved(&self) -> bool {
        self.citations.resolved()
    }

    fn custom_reference_mount(&self) -> Option<NodeId> {
        self.dom.find_by_id_attr(self.content, "refs")
    }

    fn mount_reference_list(&mut self) {
        let Some(list) = self.citations.list() else {
            return;
        };
        let mount = self.custom_reference_mount().unwrap_or(self.references);
        debug!(custom = mount != self.references, "Mounting reference list");
        self.dom.append_child(mount, list);
    }

    /// Move the reference list when its custom mount went away, or when a
    /// custom mount appeared while it sat in the references section
    fn remount_reference_list(&mut self) {
        let Some(list) = self.citations.list() else {
            return;
        };
        let detached = !self.dom.is_attached_to(list, self.root);
        let at_default = self.dom.parent(list) == Some(self.references);
        if detached || (at_default && self.custom_reference_mount().is_some()) {
            self.mount_reference_list();
        }
    }

    /// Recompute section visibility. Returns whether the references section
    /// changed visibility.
    fn update_visibility(&mut self) -> bool {
        let has_footnotes = self.footnotes.entry_count() > 0;
        self.dom.set_displayed(self.footnote_section, has_footnotes);

        let was_shown = self.dom.is_displayed(self.references);
        let show_references = match self.citations.list() {
            Some(list) => {
                let hidden = self.suppress_bibliography || self.citations.list_entry_count(&self.dom) == 0;
                self.dom.set_displayed(list, !hidden);
                !hidden && self.dom.parent(list) == Some(self.references)
            }
            None => false,
        };
        self.dom.set_displayed(self.references, show_references);

        if self.reference_section_title.is_empty() {
            self.dom.set_displayed(self.bibliography_title, false);
        } else {
            let title = self.reference_section_title.clone();
            self.dom.set_text_content(self.bibliography_title, title);
            self.dom.set_displayed(self.bibliography_title, true);
        }
        was_shown != show_references
    }

    /// Node to scroll to after the last pass, if anything changed
    pub fn change_target(&self, layout: &dyn Layout) -> Option<NodeId> {
        self.last_change
            .map(|change| locate_change(&self.dom, &change, layout))
    }

    /// Full scroll decision for the last pass
    pub fn scroll_plan(&self, layout: &dyn Layout, viewport: Viewport) -> Option<ScrollPlan> {
        let change = self.last_change?;
        let target = locate_change(&self.dom, &change, layout);
        let bounds = layout.bounds(&self.dom, target);
        Some(ScrollPlan::compute(
            bounds.top,
            viewport,
            change.compare.is_some(),
            &self.config.scroll,
        ))
    }

    pub fn pending_renders(&self) -> usize {
        self.renders.len()
    }

    pub fn render_job(&self, task: TaskId) -> Option<&RenderJob> {
        self.renders.get(&task)
    }

    /// Apply a finished sub-render. Unknown tasks and targets that are no
    /// longer displayed are ignored. Returns whether the tree changed.
    pub fn complete_render(&mut self, task: TaskId, result: Result<String, String>) -> bool {
        let Some(job) = self.renders.remove(&task) else {
            debug!(%task, "Render completion for unknown task");
            return false;
        };
        // Footnote content lives outside #content, so attachment is checked
        // against the whole document
        let applied = if self.dom.is_attached_to(job.target, self.root) {
            match result {
                Ok(html) => {
                    if let Err(err) = self.dom.set_inner_html(job.target, &html) {
                        warn!(%task, error = %err, "Rendered output is malformed");
                    }
                }
                Err(message) => {
                    debug!(%task, error = %message, "Sub-render failed");
                    let annotation = self.dom.create_element("span");
                    self.dom.set_attr(annotation, "class", "render-error");
                    self.dom
                        .set_text_content(annotation, format!("{} ({})", job.kind.source(), message));
                    self.dom.append_child(job.target, annotation);
                }
            }
            true
        } else {
            debug!(%task, target = %job.target, "Render target is gone");
            false
        };

        if self.renders.is_empty() {
            self.refresh_toc();
        }
        applied
    }

    fn refresh_toc(&mut self) {
        if !self.toc.needs_rebuild() {
            return;
        }
        let dom = &self.dom;
        let references_hidden = !dom.is_displayed(self.references);
        let skip = |heading: NodeId| {
            if dom.tag(heading) != Some("h1") {
                return false;
            }
            let title = dom.has_class(heading, "title")
                && dom.parent(heading).and_then(|p| dom.tag(p)) == Some("header");
            let bibliography = references_hidden && dom.attr(heading, "id") == Some("bibliography");
            title || bibliography
        };
        let entries = build_toc(dom, &[self.content, self.references], self.config.toc_depth, skip);
        self.toc.set_entries(entries);
    }

    /// Open or close the table of contents; returns whether it is open
    pub fn toggle_toc(&mut self) -> bool {
        let visible = self.toc.toggle();
        if visible {
            self.refresh_toc();
        }
        visible
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DocumentConfig::default())
    }
}
