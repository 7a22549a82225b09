//! Wire messages between the renderer side and the preview

use pmpm_document::{BibliographyRequest, BibliographyResponse, NodeId, Update};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message is not a JSON object")]
    NotAnObject,

    #[error("Unknown message with fields [{0}]")]
    UnknownMessage(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Messages the preview receives, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Full block list of the current document
    Update(Update),

    /// Out-of-band citation and bibliography render
    Bibliography(BibliographyResponse),
}

impl Inbound {
    /// Classify a JSON frame by its fields: `htmlblocks` is an update, `html`
    /// a bibliography response
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

        if object.contains_key("htmlblocks") {
            Ok(Inbound::Update(serde_json::from_value(value)?))
        } else if object.contains_key("html") {
            Ok(Inbound::Bibliography(serde_json::from_value(value)?))
        } else {
            let fields: Vec<&str> = object.keys().map(String::as_str).collect();
            Err(ProtocolError::UnknownMessage(fields.join(", ")))
        }
    }
}

/// Commands the preview issues outward
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Render citations and bibliography for the live document
    RenderCitations(BibliographyRequest),

    /// Scroll the first change of the last pass into view
    ScrollTo {
        node: NodeId,
        #[serde(rename = "had-compare")]
        had_compare: bool,
    },

    /// Sub-renders and citations of the last pass are complete
    RenderingDone,
}

impl Command {
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
