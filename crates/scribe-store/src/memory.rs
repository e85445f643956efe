//! In-memory block store.

use crate::store::{BlockStore, Direction, ListParams, OrderField, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use scribe_chain::Block;
use std::cmp::Ordering;
use tokio::sync::RwLock;

/// Block store backed by a vector. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<Vec<Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored block in place, bypassing every check.
    ///
    /// Lets tests simulate tampering with persisted history.
    pub async fn overwrite(&self, block: Block) -> bool {
        let mut blocks = self.blocks.write().await;
        match blocks.iter_mut().find(|stored| stored.id == block.id) {
            Some(stored) => {
                *stored = block;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

fn compare(a: &Block, b: &Block, params: &ListParams) -> Ordering {
    for key in &params.order {
        let ordering = match key.field {
            OrderField::CreatedAt => a.created_at.cmp(&b.created_at),
            OrderField::SeqId => a.seq_id.cmp(&b.seq_id),
        };
        let ordering = match key.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn list(&self, params: &ListParams) -> Result<Vec<Block>, StoreError> {
        let mut blocks = self.blocks.read().await.clone();
        blocks.sort_by(|a, b| compare(a, b, params));

        let offset = usize::try_from(params.offset).unwrap_or(usize::MAX);
        let limit = params
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(blocks.into_iter().skip(offset).take(limit).collect())
    }

    async fn create(&self, mut block: Block) -> Result<Block, StoreError> {
        let mut blocks = self.blocks.write().await;
        if blocks
            .iter()
            .any(|stored| stored.id == block.id || stored.seq_id == block.seq_id)
        {
            return Err(StoreError::Duplicate {
                id: block.id,
                seq_id: block.seq_id,
            });
        }

        let now = Utc::now();
        block.created_at = Some(now);
        block.updated_at = Some(now);

        blocks.push(block.clone());
        Ok(block)
    }

    async fn find_first(&self) -> Result<Option<Block>, StoreError> {
        let blocks = self.blocks.read().await;
        Ok(blocks.iter().min_by_key(|block| block.seq_id).cloned())
    }
}
