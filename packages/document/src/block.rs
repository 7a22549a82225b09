//! Blocks and the update message that carries them

use crate::dom::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable content digest of a block. Renderers send either a string or an
/// integer digest; both are normalized to their decimal/string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawHash", into = "String")]
pub struct BlockHash(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHash {
    Signed(i64),
    Unsigned(u64),
    Text(String),
}

impl From<RawHash> for BlockHash {
    fn from(raw: RawHash) -> Self {
        match raw {
            RawHash::Signed(v) => BlockHash(v.to_string()),
            RawHash::Unsigned(v) => BlockHash(v.to_string()),
            RawHash::Text(v) => BlockHash(v),
        }
    }
}

impl From<BlockHash> for String {
    fn from(hash: BlockHash) -> Self {
        hash.0
    }
}

impl BlockHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockHash {
    fn from(hash: &str) -> Self {
        Self(hash.to_string())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One incoming block: `[hash, html]` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(BlockHash, String)", into = "(BlockHash, String)")]
pub struct Block {
    pub hash: BlockHash,
    pub content: String,
}

impl Block {
    pub fn new(hash: impl Into<BlockHash>, content: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            content: content.into(),
        }
    }
}

impl From<(BlockHash, String)> for Block {
    fn from((hash, content): (BlockHash, String)) -> Self {
        Self { hash, content }
    }
}

impl From<Block> for (BlockHash, String) {
    fn from(block: Block) -> Self {
        (block.hash, block.content)
    }
}

/// A block as currently displayed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedBlock {
    pub node: NodeId,
    pub hash: BlockHash,
    /// The markup the block was created from; never mutated in place
    pub content: String,
    pub position: usize,
}

/// A full document update from the rendering pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "htmlblocks")]
    pub blocks: Vec<Block>,

    #[serde(rename = "reference-section-title", default)]
    pub reference_section_title: String,

    #[serde(rename = "suppress-bibliography", default)]
    pub suppress_bibliography: bool,

    #[serde(default)]
    pub toc: bool,

    #[serde(rename = "toc-title", default, skip_serializing_if = "Option::is_none")]
    pub toc_title: Option<String>,

    /// Drives title/history in the host; carried through untouched
    #[serde(rename = "filepath", default, skip_serializing_if = "Option::is_none")]
    pub document_identifier: Option<String>,
}

impl Update {
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Self::default()
        }
    }
}
