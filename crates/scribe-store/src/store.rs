//! Persistence collaborator used by the append and validation paths.

use async_trait::async_trait;
use scribe_chain::Block;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a [`BlockStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A block with the same id or the same position is already stored.
    #[error("block {id} (seq {seq_id}) conflicts with a stored block")]
    Duplicate { id: Uuid, seq_id: u64 },

    /// A stored row could not be turned back into a block.
    #[error("corrupt stored block {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Column a listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderField {
    CreatedAt,
    SeqId,
}

impl OrderField {
    pub(crate) fn column(self) -> &'static str {
        match self {
            OrderField::CreatedAt => "created_at",
            OrderField::SeqId => "seq_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: OrderField,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: OrderField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

/// Ordering and paging of a [`BlockStore::list`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Sort keys, most significant first.
    pub order: Vec<OrderBy>,
    /// `None` means no limit.
    pub limit: Option<u64>,
    pub offset: u64,
}

impl ListParams {
    /// The most recently persisted block.
    ///
    /// Ties on creation time fall back to the highest sequence number.
    pub fn tail() -> Self {
        Self {
            order: vec![
                OrderBy::desc(OrderField::CreatedAt),
                OrderBy::desc(OrderField::SeqId),
            ],
            limit: Some(1),
            offset: 0,
        }
    }

    /// Blocks `[start, end)` in sequence order; `end == 0` reads to the end.
    pub fn segment(start: u64, end: u64) -> Self {
        Self {
            order: vec![OrderBy::asc(OrderField::SeqId)],
            limit: (end != 0).then(|| end.saturating_sub(start)),
            offset: start,
        }
    }
}

/// Durable home of the chain.
///
/// Implementations only store and list; chaining rules live in the engine.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// List blocks by the given ordering and page.
    async fn list(&self, params: &ListParams) -> Result<Vec<Block>, StoreError>;

    /// Insert one new block. `created_at` and `updated_at` are owned by the
    /// store and always stamped from its clock.
    async fn create(&self, block: Block) -> Result<Block, StoreError>;

    /// The block with the lowest sequence number, if any.
    async fn find_first(&self) -> Result<Option<Block>, StoreError>;
}
