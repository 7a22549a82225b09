//! # pmpm document core
//!
//! Incremental block reconciliation for a live document preview.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ renderer: markdown → [(hash, html), ...]    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ reconcile: move / create / remove blocks    │
//! │  - footnotes: extract, renumber             │
//! │  - citations: cache, refcount, request      │
//! │  - render jobs: math, graphs                │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ locate: first changed leaf → scroll plan    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pmpm_document::{Block, Document, DocumentConfig, Update};
//!
//! let mut doc = Document::new(DocumentConfig::default());
//! let report = doc.apply_update(&Update::from_blocks(vec![
//!     Block::new("h1", "<p>Hello</p>"),
//! ]));
//! if let Some(request) = report.bibliography_request {
//!     // send to the bibliography renderer, feed the answer to
//!     // doc.apply_bibliography(..)
//! }
//! ```

pub mod block;
pub mod citations;
pub mod config;
pub mod document;
pub mod dom;
pub mod error;
pub mod footnotes;
pub mod html;
pub mod index;
pub mod locate;
pub mod reconcile;
pub mod render;
pub mod toc;

pub use block::{Block, BlockHash, PlacedBlock, Update};
pub use citations::{
    BibliographyOutcome, BibliographyRequest, BibliographyResponse, CitationRef, CitationRegistry, RequestId,
};
pub use config::{DocumentConfig, ScrollConfig};
pub use document::Document;
pub use dom::{Dom, NodeId, NodeKind};
pub use error::{DocumentError, DocumentResult};
pub use footnotes::FootnoteRegistry;
pub use html::{HtmlError, HtmlResult};
pub use index::IdentityIndex;
pub use locate::{locate_change, FirstChange, Layout, Rect, ScrollPlan, StructuralLayout, Viewport};
pub use reconcile::ReconcileReport;
pub use render::{RenderJob, RenderKind, TaskId};
pub use toc::{TocEntry, TocState};
