//! Serialized extension of the persisted chain.

use crate::error::LedgerError;
use crate::store::{BlockStore, ListParams};
use scribe_chain::{Block, Chain};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Owns the append lock and bridges the chain engine to storage.
///
/// The lock covers reading the tail, chaining the new block and persisting
/// it. Holding it for less would let two callers chain onto the same tail.
pub struct AppendCoordinator {
    engine: Arc<Chain>,
    store: Arc<dyn BlockStore>,
    append_lock: Mutex<()>,
}

impl AppendCoordinator {
    pub fn new(engine: Arc<Chain>, store: Arc<dyn BlockStore>) -> Self {
        Self {
            engine,
            store,
            append_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<Chain> {
        &self.engine
    }

    /// Chain `block` after the persisted tail and store it.
    pub async fn append(&self, block: Block) -> Result<Block, LedgerError> {
        self.append_with_deadline(block, None).await
    }

    /// Like [`append`](Self::append), giving up if the lock is not acquired
    /// within `deadline`. Once the lock is held the append runs to completion.
    pub async fn append_with_deadline(
        &self,
        block: Block,
        deadline: Option<Duration>,
    ) -> Result<Block, LedgerError> {
        let _guard = self.acquire(deadline).await?;

        let last = self
            .store
            .list(&ListParams::tail())
            .await?
            .into_iter()
            .next()
            .ok_or(LedgerError::EmptyChain)?;

        let engine = Arc::clone(&self.engine);
        let chained = tokio::task::spawn_blocking(move || engine.chain_blocks(&last, block)).await??;

        let stored = self.store.create(chained).await?;
        info!(
            block_id = %stored.id,
            seq_id = stored.seq_id,
            system_id = %stored.system_id,
            "appended block"
        );
        Ok(stored)
    }

    /// Persisted blocks `[start, end)` in sequence order. `end == 0` reads to
    /// the end of the chain; any other `end` below `start` is rejected.
    pub async fn get_segment(&self, start: u64, end: u64) -> Result<Vec<Block>, LedgerError> {
        if end != 0 && end < start {
            return Err(LedgerError::InvalidRange { start, end });
        }
        let blocks = self.store.list(&ListParams::segment(start, end)).await?;
        debug!(start, end, loaded = blocks.len(), "loaded segment");
        Ok(blocks)
    }

    pub async fn get_all(&self) -> Result<Vec<Block>, LedgerError> {
        self.get_segment(0, 0).await
    }

    async fn acquire(&self, deadline: Option<Duration>) -> Result<MutexGuard<'_, ()>, LedgerError> {
        match deadline {
            Some(limit) => tokio::time::timeout(limit, self.append_lock.lock())
                .await
                .map_err(|_| LedgerError::Timeout(limit)),
            None => Ok(self.append_lock.lock().await),
        }
    }
}
