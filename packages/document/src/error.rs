//! Error types for the document core

use crate::citations::RequestId;
use crate::html::HtmlError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Markup error: {0}")]
    Markup(#[from] HtmlError),

    #[error("Stale bibliography response: expected request {expected}, got {received}")]
    StaleRequest {
        expected: RequestId,
        received: RequestId,
    },

    #[error("Stale bibliography response: {received} citations for {live} live citations")]
    CitationCountMismatch { live: usize, received: usize },

    #[error("Stale bibliography response: citations changed since request {0}")]
    CitationsChanged(RequestId),

    #[error("No bibliography request is outstanding")]
    NoOutstandingRequest,
}

pub type DocumentResult<T> = Result<T, DocumentError>;
