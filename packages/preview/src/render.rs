//! Sub-renderer seam (math, graphs)

use futures::future::BoxFuture;
use futures::FutureExt;
use pmpm_document::html::escape_text;
use pmpm_document::RenderJob;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("{0}")]
    Failed(String),

    #[error("Renderer panicked")]
    Panicked,
}

/// Turns a math or graph job into html. Futures must not borrow the
/// renderer; they run as independent tasks.
pub trait SubRenderer: Send + Sync + 'static {
    fn render(&self, job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>>;
}

impl<T: SubRenderer + ?Sized> SubRenderer for Arc<T> {
    fn render(&self, job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>> {
        (**self).render(job)
    }
}

/// Shows sources as plain text
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl SubRenderer for NoopRenderer {
    fn render(&self, job: &RenderJob) -> BoxFuture<'static, Result<String, RenderError>> {
        let source = escape_text(job.kind.source());
        async move { Ok(source) }.boxed()
    }
}
