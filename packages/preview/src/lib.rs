//! # pmpm preview
//!
//! Asynchronous driver around the document core: wire messages, the session
//! event loop, and math/graph sub-render tasks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pmpm_preview::{spawn, NoopRenderer, SessionConfig};
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! let mut handle = spawn(SessionConfig::default(), Arc::new(NoopRenderer));
//! handle.send_json(r#"{"htmlblocks": [["h1", "<p>Hello</p>"]]}"#).await?;
//! while let Some(command) = handle.commands.next().await {
//!     socket.send(command.to_json()?).await?;
//! }
//! ```

pub mod protocol;
pub mod render;
pub mod session;

pub use protocol::{Command, Inbound, ProtocolError, ProtocolResult};
pub use render::{NoopRenderer, RenderError, SubRenderer};
pub use session::{spawn, Session, SessionConfig, SessionError, SessionHandle, SessionResult};
