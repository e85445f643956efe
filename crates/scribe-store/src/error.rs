//! Errors of the append, validation and bootstrap paths.

use crate::store::StoreError;
use scribe_chain::ChainError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// No block is persisted yet; the chain was never bootstrapped.
    #[error("empty chain: no genesis block has been persisted")]
    EmptyChain,

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("segment [{start}, {end}) failed validation after loading {loaded} blocks: {source}")]
    Segment {
        start: u64,
        end: u64,
        loaded: usize,
        #[source]
        source: ChainError,
    },

    #[error("invalid segment range: end {end} is before start {start}")]
    InvalidRange { start: u64, end: u64 },

    #[error("timed out after {0:?} waiting for the append lock")]
    Timeout(Duration),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
