//! Chain head watcher: the supervised indexing task.

use std::sync::Arc;
use futures_util::future::BoxFuture;

use crate::chain::cache::TipSetCache;
use crate::chain::indexer::TipSetIndexer;
use crate::chain::lens::HeadSource;
use crate::lifecycle::ShutdownSignal;
use crate::schedule::{Task, TaskError};

/// Follows the chain head and indexes tip-sets once they are `confidence` heads
/// deep.
///
/// Each run starts with an empty cache. The indexer (and with it the address
/// filter) is shared across runs.
pub struct HeadWatcher<S> {
    indexer: Arc<TipSetIndexer>,
    source: S,
    confidence: usize,
}

impl<S: HeadSource> HeadWatcher<S> {
    pub fn new(indexer: Arc<TipSetIndexer>, source: S, confidence: usize) -> Self {
        Self {
            indexer,
            source,
            confidence,
        }
    }

    async fn follow(&self, mut shutdown: ShutdownSignal) -> Result<(), TaskError> {
        let mut cache = TipSetCache::new(self.confidence);
        tracing::info!(
            reporter = %self.indexer.name(),
            confidence = self.confidence,
            "Watching chain head"
        );

        loop {
            let head = tokio::select! {
                head = self.source.next_head() => {
                    head.map_err(|e| TaskError::Failed(format!("fetch chain head: {e}")))?
                }
                _ = shutdown.recv() => return Ok(()),
            };

            let Some(ts) = head else {
                tracing::info!("Head source exhausted");
                return Ok(());
            };

            let height = ts.height;
            let update = cache.push(ts);
            if !update.reverted.is_empty() {
                tracing::info!(
                    height,
                    reverted = update.reverted.len(),
                    cached = cache.len(),
                    "Chain reorg"
                );
            }
            if update.beyond_confidence {
                tracing::warn!(height, "Reorg deeper than confidence, indexed data may be stale");
            }

            for finalized in &update.finalized {
                self.indexer
                    .index_tipset(finalized)
                    .map_err(|e| TaskError::Failed(format!("index tip-set {}: {e}", finalized.height)))?;
            }
        }
    }
}

impl<S: HeadSource> Task for HeadWatcher<S> {
    fn run(&self, shutdown: ShutdownSignal) -> BoxFuture<'_, Result<(), TaskError>> {
        Box::pin(self.follow(shutdown))
    }
}
