//! Durable audit log built on `scribe-chain`.
//!
//! [`AppendCoordinator`] is the single writer: it serializes appends so the
//! persisted chain never forks. [`SegmentValidator`] checks persisted ranges,
//! [`bootstrap`] seeds an empty store with the genesis block, and
//! [`LogService`] is the caller-facing surface with stable public error codes.

pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod validator;

pub use bootstrap::{bootstrap, Bootstrap};
pub use config::{ConfigError, ScribeConfig};
pub use coordinator::AppendCoordinator;
pub use error::LedgerError;
pub use memory::MemoryBlockStore;
pub use service::{LogEntry, LogService, PublicError};
pub use sqlite::SqliteBlockStore;
pub use store::{BlockStore, Direction, ListParams, OrderBy, OrderField, StoreError};
pub use validator::{SegmentReport, SegmentValidator};
