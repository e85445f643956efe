//! SQLite block store.

use crate::store::{BlockStore, ListParams, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use scribe_chain::Block;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const INSERT_BLOCK: &str = r#"
    INSERT INTO blocks (
        id, last_block_id, last_block_hash, seq_id, payload_raw, system_id, tags,
        hash, signature, signed_at, hashed_at, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Block store backed by a sqlx SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteBlockStore {
    pool: SqlitePool,
}

impl SqliteBlockStore {
    /// Open (creating if missing) the database at `database_url` and run
    /// pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database is a separate database,
        // and the database is gone once its only connection closes.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(database_url, "opened block store");
        Ok(store)
    }

    /// Wrap an existing pool. Migrations are not run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn order_clause(params: &ListParams) -> String {
    if params.order.is_empty() {
        return String::new();
    }
    let keys = params
        .order
        .iter()
        .map(|key| format!("{} {}", key.field.column(), key.direction.keyword()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {keys}")
}

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn list(&self, params: &ListParams) -> Result<Vec<Block>, StoreError> {
        // SQLite treats a negative limit as unbounded.
        let limit = params
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let offset = i64::try_from(params.offset).unwrap_or(i64::MAX);

        let sql = format!(
            "SELECT * FROM blocks{} LIMIT ? OFFSET ?",
            order_clause(params)
        );
        let rows = sqlx::query_as::<_, BlockRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Block::try_from).collect()
    }

    async fn create(&self, mut block: Block) -> Result<Block, StoreError> {
        let now = Utc::now();
        block.created_at = Some(now);
        block.updated_at = Some(now);

        let seq_id = i64::try_from(block.seq_id).map_err(|_| StoreError::Corrupt {
            id: block.id.to_string(),
            reason: format!("seq_id {} does not fit the seq_id column", block.seq_id),
        })?;

        let result = sqlx::query(INSERT_BLOCK)
            .bind(block.id.to_string())
            .bind(block.last_block_id.to_string())
            .bind(&block.last_block_hash)
            .bind(seq_id)
            .bind(&block.payload_raw)
            .bind(&block.system_id)
            .bind(&block.tags)
            .bind(&block.hash)
            .bind(&block.signature)
            .bind(block.signed_at.map(timestamp))
            .bind(&block.hashed_at)
            .bind(block.created_at.map(timestamp))
            .bind(block.updated_at.map(timestamp))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                debug!(block_id = %block.id, seq_id = block.seq_id, "persisted block");
                Ok(block)
            }
            Err(err) if is_unique_violation(&err) => Err(StoreError::Duplicate {
                id: block.id,
                seq_id: block.seq_id,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_first(&self) -> Result<Option<Block>, StoreError> {
        let row = sqlx::query_as::<_, BlockRow>("SELECT * FROM blocks ORDER BY seq_id ASC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        row.map(Block::try_from).transpose()
    }
}

/// Row of the `blocks` table.
#[derive(sqlx::FromRow)]
struct BlockRow {
    id: String,
    last_block_id: String,
    last_block_hash: String,
    seq_id: i64,
    payload_raw: String,
    system_id: String,
    tags: String,
    hash: String,
    signature: String,
    signed_at: Option<String>,
    hashed_at: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<BlockRow> for Block {
    type Error = StoreError;

    fn try_from(row: BlockRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt(format!("invalid id: {e}")))?;
        let last_block_id = Uuid::parse_str(&row.last_block_id)
            .map_err(|e| corrupt(format!("invalid last_block_id: {e}")))?;
        let seq_id =
            u64::try_from(row.seq_id).map_err(|e| corrupt(format!("invalid seq_id: {e}")))?;
        let parse_time = |field: &str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|time| time.with_timezone(&Utc))
                .map_err(|e| corrupt(format!("invalid {field}: {e}")))
        };
        let signed_at = row
            .signed_at
            .as_deref()
            .map(|value| parse_time("signed_at", value))
            .transpose()?;
        let created_at = parse_time("created_at", &row.created_at)?;
        let updated_at = parse_time("updated_at", &row.updated_at)?;

        let mut block = Block {
            id,
            last_block_id,
            last_block_hash: row.last_block_hash,
            seq_id,
            payload_raw: row.payload_raw,
            payload: Default::default(),
            system_id: row.system_id,
            tags: row.tags,
            hash: row.hash,
            signature: row.signature,
            signed_at,
            hashed_at: row.hashed_at,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
        };
        block.decode_payload().map_err(|e| StoreError::Corrupt {
            id: row.id,
            reason: e.to_string(),
        })?;
        Ok(block)
    }
}
