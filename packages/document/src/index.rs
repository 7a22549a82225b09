//! Hash → node lookup over the uncommitted suffix of the display list
//!
//! Built once per reconciliation pass. Every uncommitted node is stored under
//! a key relative to an insertion offset: inserting a block at the commit
//! cursor shifts every uncommitted node one position right, which is a single
//! increment of the offset instead of a rewrite of every key.

use crate::block::BlockHash;
use crate::dom::NodeId;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct IdentityIndex {
    by_hash: HashMap<BlockHash, BTreeMap<usize, NodeId>>,
    keys: HashMap<NodeId, (BlockHash, usize)>,
    offset: usize,
}

impl IdentityIndex {
    /// Index `entries` as positions `0..n`
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, BlockHash)>,
    {
        let mut index = Self::default();
        for (position, (node, hash)) in entries.into_iter().enumerate() {
            index
                .by_hash
                .entry(hash.clone())
                .or_default()
                .insert(position, node);
            index.keys.insert(node, (hash, position));
        }
        index
    }

    /// Number of uncommitted nodes
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Current position of an uncommitted node
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.keys.get(&node).map(|(_, key)| key + self.offset)
    }

    /// Commit and return the uncommitted node carrying `hash` with the
    /// smallest current position
    pub fn take(&mut self, hash: &BlockHash) -> Option<(NodeId, usize)> {
        let candidates = self.by_hash.get_mut(hash)?;
        let (key, node) = candidates.pop_first()?;
        if candidates.is_empty() {
            self.by_hash.remove(hash);
        }
        self.keys.remove(&node);
        Some((node, key + self.offset))
    }

    /// Remove `node` from the index without looking it up by hash
    pub fn commit(&mut self, node: NodeId) {
        if let Some((hash, key)) = self.keys.remove(&node) {
            if let Some(candidates) = self.by_hash.get_mut(&hash) {
                candidates.remove(&key);
                if candidates.is_empty() {
                    self.by_hash.remove(&hash);
                }
            }
        }
    }

    /// Record that an uncommitted node now sits at `position`
    pub fn relocate(&mut self, node: NodeId, position: usize) {
        let Some((hash, key)) = self.keys.get_mut(&node) else {
            return;
        };
        let new_key = position.saturating_sub(self.offset);
        if let Some(candidates) = self.by_hash.get_mut(&*hash) {
            candidates.remove(&*key);
            candidates.insert(new_key, node);
        }
        *key = new_key;
    }

    /// A block was inserted at the cursor; every uncommitted node moves one
    /// position right
    pub fn note_insert(&mut self) {
        self.offset += 1;
    }
}
