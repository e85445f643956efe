//! Validation of persisted chain segments.

use crate::coordinator::AppendCoordinator;
use crate::error::LedgerError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a successful validation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentReport {
    pub start: u64,
    pub end: u64,
    pub blocks_checked: usize,
}

/// Runs bounded validation passes over persisted blocks.
///
/// Every pass builds its own working set and drops it afterwards, so passes
/// never see each other's state and may run concurrently with appends.
#[derive(Clone)]
pub struct SegmentValidator {
    coordinator: Arc<AppendCoordinator>,
}

impl SegmentValidator {
    pub fn new(coordinator: Arc<AppendCoordinator>) -> Self {
        Self { coordinator }
    }

    pub async fn validate_all(&self) -> Result<SegmentReport, LedgerError> {
        self.validate_segment(0, 0).await
    }

    /// Validate persisted blocks `[start, end)`; `end == 0` means to the end.
    ///
    /// A segment from the start of the chain is checked against the known
    /// genesis. Any other segment is anchored on its first loaded block.
    pub async fn validate_segment(&self, start: u64, end: u64) -> Result<SegmentReport, LedgerError> {
        let blocks = self.coordinator.get_segment(start, end).await?;
        let loaded = blocks.len();
        if blocks.is_empty() {
            info!(start, end, "segment is empty, nothing to validate");
            return Ok(SegmentReport {
                start,
                end,
                blocks_checked: 0,
            });
        }

        let engine = Arc::clone(self.coordinator.engine());
        let outcome = tokio::task::spawn_blocking(move || {
            let mut working = engine.working_set(start == 0);
            working.load_segment(blocks);
            let outcome = working.validate();
            working.clean();
            outcome
        })
        .await?;

        if let Err(source) = outcome {
            warn!(start, end, loaded, error = %source, "segment failed validation");
            return Err(LedgerError::Segment {
                start,
                end,
                loaded,
                source,
            });
        }

        info!(start, end, blocks_checked = loaded, "segment is valid");
        Ok(SegmentReport {
            start,
            end,
            blocks_checked: loaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBlockStore;
    use crate::test_support::{engine, sample_block};
    use scribe_chain::ChainError;

    async fn ledger(appends: usize) -> (SegmentValidator, Arc<AppendCoordinator>, Arc<MemoryBlockStore>) {
        let store = Arc::new(MemoryBlockStore::new());
        let mut chain = engine();
        crate::bootstrap(store.as_ref(), &mut chain).await.unwrap();
        let coordinator = Arc::new(AppendCoordinator::new(Arc::new(chain), store.clone()));
        for _ in 0..appends {
            coordinator.append(sample_block()).await.unwrap();
        }
        (SegmentValidator::new(coordinator.clone()), coordinator, store)
    }

    #[tokio::test]
    async fn test_validate_all() {
        let (validator, _, _) = ledger(3).await;
        let report = validator.validate_all().await.unwrap();
        assert_eq!(report.blocks_checked, 4);
    }

    #[tokio::test]
    async fn test_validate_genesis_only() {
        let (validator, _, _) = ledger(0).await;
        assert_eq!(validator.validate_all().await.unwrap().blocks_checked, 1);
    }

    #[tokio::test]
    async fn test_validate_bounded_segments() {
        let (validator, _, _) = ledger(5).await;

        assert_eq!(validator.validate_segment(0, 3).await.unwrap().blocks_checked, 3);
        // The last loaded block is checked too.
        assert_eq!(validator.validate_segment(2, 6).await.unwrap().blocks_checked, 4);
        assert_eq!(validator.validate_segment(4, 0).await.unwrap().blocks_checked, 2);
    }

    #[tokio::test]
    async fn test_validate_empty_segment() {
        let (validator, _, _) = ledger(1).await;
        let report = validator.validate_segment(10, 20).await.unwrap();
        assert_eq!(report.blocks_checked, 0);
    }

    #[tokio::test]
    async fn test_validate_rejects_inverted_range() {
        let (validator, _, _) = ledger(1).await;
        assert!(matches!(
            validator.validate_segment(5, 2).await,
            Err(LedgerError::InvalidRange { start: 5, end: 2 })
        ));
    }

    #[tokio::test]
    async fn test_tampered_payload_is_a_hash_mismatch() {
        let (validator, coordinator, store) = ledger(2).await;
        let mut target = coordinator.get_segment(1, 2).await.unwrap().remove(0);
        target.payload_raw = target.payload_raw.replace("1234", "9999");
        store.overwrite(target.clone()).await;

        match validator.validate_all().await {
            Err(LedgerError::Segment { source, loaded, .. }) => {
                assert_eq!(loaded, 3);
                match source {
                    ChainError::HashMismatch { block_id, seq_id, .. } => {
                        assert_eq!(block_id, target.id);
                        assert_eq!(seq_id, 1);
                    }
                    other => panic!("expected hash mismatch, got {other:?}"),
                }
            }
            other => panic!("expected segment failure, got {other:?}"),
        }

        // A segment that starts past the tampered block is still sound.
        assert!(validator.validate_segment(2, 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_passes_do_not_share_state() {
        let (validator, coordinator, _) = ledger(2).await;
        validator.validate_all().await.unwrap();
        validator.validate_segment(1, 0).await.unwrap();

        // The engine still holds only the genesis it generated at bootstrap.
        assert_eq!(coordinator.engine().len(), 1);
        assert_eq!(validator.validate_all().await.unwrap().blocks_checked, 3);
    }
}
