//! Holding window for recent tip-sets.
//!
//! Heads stay in the cache until `confidence` newer heads arrive, which is when
//! they are considered final enough to index. A head at or below a cached height
//! reverts the cached tip-sets it replaces.

use std::collections::VecDeque;

use crate::chain::types::{ChainEpoch, TipSet};

/// Result of adding a head to the cache.
#[derive(Debug, Default)]
pub struct CacheUpdate {
    /// Cached tip-sets dropped by a reorg, newest first.
    pub reverted: Vec<TipSet>,

    /// Tip-sets that left the window and should be indexed, oldest first.
    pub finalized: Vec<TipSet>,

    /// The head reverts below an already finalized height.
    pub beyond_confidence: bool,
}

#[derive(Debug)]
pub struct TipSetCache {
    confidence: usize,
    entries: VecDeque<TipSet>,
    last_finalized: Option<ChainEpoch>,
}

impl TipSetCache {
    pub fn new(confidence: usize) -> Self {
        Self {
            confidence,
            entries: VecDeque::with_capacity(confidence.min(64) + 1),
            last_finalized: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, ts: TipSet) -> CacheUpdate {
        let mut update = CacheUpdate::default();

        while self.entries.back().is_some_and(|cached| cached.height >= ts.height) {
            if let Some(reverted) = self.entries.pop_back() {
                update.reverted.push(reverted);
            }
        }
        update.beyond_confidence = self.last_finalized.is_some_and(|h| ts.height <= h);

        self.entries.push_back(ts);
        while self.entries.len() > self.confidence {
            match self.entries.pop_front() {
                Some(finalized) => {
                    self.last_finalized = Some(finalized.height);
                    update.finalized.push(finalized);
                }
                None => break,
            }
        }

        update
    }
}
