//! # Preview session
//!
//! Drives one [`Document`] from a stream of inbound messages.
//!
//! All tree mutation happens on the session task. Sub-renders run as
//! separate tasks in a `JoinSet`; their results come back through the same
//! `select!` loop and are applied only if their target is still displayed.
//! Nothing is cancelled when a block goes away.

use crate::protocol::{Command, Inbound, ProtocolError};
use crate::render::{RenderError, SubRenderer};
use futures::FutureExt;
use pmpm_document::{
    BibliographyOutcome, Document, DocumentConfig, Layout, ReconcileReport, RenderJob, StructuralLayout, TaskId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Session task failed: {0}")]
    Join(#[from] JoinError),

    #[error("Session is no longer accepting messages")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub document: DocumentConfig,

    /// Bounded capacity of the inbound channel
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            document: DocumentConfig::default(),
            inbound_capacity: 16,
        }
    }
}

/// Progress of the latest reconciliation pass
#[derive(Debug, Default)]
struct PassState {
    outstanding: HashSet<TaskId>,
    scroll_pending: bool,
    done_sent: bool,
}

type RenderOutput = (TaskId, Result<String, RenderError>);

pub struct Session {
    document: Document,
    renderer: Arc<dyn SubRenderer>,
    layout: Box<dyn Layout + Send + Sync>,
    commands: mpsc::UnboundedSender<Command>,
    tasks: JoinSet<RenderOutput>,
    pass: Option<PassState>,
    commands_closed: bool,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        renderer: Arc<dyn SubRenderer>,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            document: Document::new(config.document),
            renderer,
            layout: Box::new(StructuralLayout),
            commands,
            tasks: JoinSet::new(),
            pass: None,
            commands_closed: false,
        }
    }

    /// Use host geometry for change targeting
    pub fn with_layout(mut self, layout: Box<dyn Layout + Send + Sync>) -> Self {
        self.layout = layout;
        self
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Process messages until the inbound channel closes, then finish the
    /// outstanding renders and hand back the last good document
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) -> Document {
        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => self.handle_inbound(message),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
            }
        }

        info!(outstanding = self.tasks.len(), "Inbound closed; draining renders");
        while let Some(joined) = self.tasks.join_next().await {
            self.handle_joined(joined);
        }
        self.document
    }

    #[instrument(skip(self, message))]
    pub fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Update(update) => {
                let report = self.document.apply_update(&update);
                self.start_pass(report);
            }
            Inbound::Bibliography(response) => match self.document.apply_bibliography(&response) {
                BibliographyOutcome::Applied { updated, .. } => {
                    debug!(updated, "Bibliography applied");
                }
                BibliographyOutcome::Discarded { reissue, .. } => {
                    if let Some(request) = reissue {
                        self.send(Command::RenderCitations(request));
                    }
                }
            },
        }
        self.settle();
    }

    fn start_pass(&mut self, report: ReconcileReport) {
        if let Some(request) = report.bibliography_request {
            self.send(Command::RenderCitations(request));
        }

        let outstanding = report.render_jobs.iter().map(|job| job.task).collect();
        for job in report.render_jobs {
            self.spawn_render(job);
        }

        // A scroll still waiting on the previous pass is superseded
        self.pass = Some(PassState {
            outstanding,
            scroll_pending: report.first_change.is_some(),
            done_sent: false,
        });
    }

    fn spawn_render(&mut self, job: RenderJob) {
        let task = job.task;
        let render = self.renderer.render(&job);
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(render)
                .catch_unwind()
                .await
                .unwrap_or(Err(RenderError::Panicked));
            (task, result)
        });
    }

    fn handle_joined(&mut self, joined: Result<RenderOutput, JoinError>) {
        match joined {
            Ok((task, result)) => {
                if let Err(err) = &result {
                    warn!(%task, error = %err, "Sub-render failed");
                }
                self.document
                    .complete_render(task, result.map_err(|err| err.to_string()));
                if let Some(pass) = self.pass.as_mut() {
                    pass.outstanding.remove(&task);
                }
            }
            Err(err) => {
                warn!(error = %err, "Render task did not complete");
            }
        }
        self.settle();
    }

    /// Emit the scroll and done signals once the current pass allows it
    fn settle(&mut self) {
        let Some(pass) = self.pass.as_mut() else {
            return;
        };
        if !pass.outstanding.is_empty() {
            return;
        }

        let mut emit = Vec::new();
        if pass.scroll_pending {
            pass.scroll_pending = false;
            if let Some(change) = self.document.last_change() {
                if let Some(node) = self.document.change_target(self.layout.as_ref()) {
                    emit.push(Command::ScrollTo {
                        node,
                        had_compare: change.compare.is_some(),
                    });
                }
            }
        }
        if !pass.done_sent && self.document.citations_resolved() {
            pass.done_sent = true;
            emit.push(Command::RenderingDone);
        }
        for command in emit {
            self.send(command);
        }
    }

    fn send(&mut self, command: Command) {
        if self.commands.send(command).is_err() && !self.commands_closed {
            self.commands_closed = true;
            warn!("Command receiver closed; dropping outgoing commands");
        }
    }
}

/// A session running on its own task
pub struct SessionHandle {
    pub inbound: mpsc::Sender<Inbound>,
    pub commands: UnboundedReceiverStream<Command>,
    pub task: JoinHandle<Document>,
}

impl SessionHandle {
    pub async fn send(&self, message: Inbound) -> SessionResult<()> {
        self.inbound.send(message).await.map_err(|_| SessionError::Closed)
    }

    /// Parse a JSON frame and forward it
    pub async fn send_json(&self, text: &str) -> SessionResult<()> {
        let message = Inbound::from_json(text)?;
        self.send(message).await
    }

    /// Close the inbound side and wait for the final document
    pub async fn finish(self) -> SessionResult<(Document, UnboundedReceiverStream<Command>)> {
        drop(self.inbound);
        let document = self.task.await?;
        Ok((document, self.commands))
    }
}

pub fn spawn(config: SessionConfig, renderer: Arc<dyn SubRenderer>) -> SessionHandle {
    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let session = Session::new(config, renderer, command_tx);
    let task = tokio::spawn(session.run(inbound_rx));
    SessionHandle {
        inbound: inbound_tx,
        commands: UnboundedReceiverStream::new(command_rx),
        task,
    }
}
