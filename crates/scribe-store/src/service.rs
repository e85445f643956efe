//! Log service: the surface callers use to record and validate entries.

use crate::coordinator::AppendCoordinator;
use crate::error::LedgerError;
use crate::validator::{SegmentReport, SegmentValidator};
use scribe_chain::{Block, Payload};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// One caller-submitted log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "data", default)]
    pub payload: Payload,
    pub system_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LogEntry {
    /// Parse a JSON request body.
    pub fn from_json(body: &str) -> Result<Self, PublicError> {
        let entry: LogEntry = serde_json::from_str(body).map_err(|err| {
            error!(error = %err, "parsing log entry body");
            PublicError::invalid_body()
        })?;
        if entry.system_id.trim().is_empty() {
            error!("log entry has no system_id");
            return Err(PublicError::invalid_body());
        }
        Ok(entry)
    }
}

/// Error returned to callers. Carries a stable code and a fixed message; the
/// underlying cause is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message} (code {code})")]
pub struct PublicError {
    pub code: u16,
    pub message: &'static str,
}

impl PublicError {
    pub const INTERNAL: u16 = 10;
    pub const INVALID_BODY: u16 = 20;
    pub const SAVE: u16 = 21;

    pub fn internal() -> Self {
        Self {
            code: Self::INTERNAL,
            message: "internal error",
        }
    }

    pub fn invalid_body() -> Self {
        Self {
            code: Self::INVALID_BODY,
            message: "invalid body",
        }
    }

    pub fn save() -> Self {
        Self {
            code: Self::SAVE,
            message: "error on saving",
        }
    }

    fn invalid_range() -> Self {
        Self {
            code: Self::INVALID_BODY,
            message: "end must be bigger than init",
        }
    }
}

pub struct LogService {
    coordinator: Arc<AppendCoordinator>,
    validator: SegmentValidator,
    request_timeout: Option<Duration>,
}

impl LogService {
    pub fn new(coordinator: Arc<AppendCoordinator>) -> Self {
        Self {
            validator: SegmentValidator::new(Arc::clone(&coordinator)),
            coordinator,
            request_timeout: None,
        }
    }

    /// Give up on a write that cannot take the append lock within `timeout`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Turn `entry` into a signed block and append it to the chain.
    pub async fn record(&self, entry: LogEntry) -> Result<Block, PublicError> {
        let block = Block::new(entry.system_id, entry.payload, entry.tags.as_slice());
        self.coordinator
            .append_with_deadline(block, self.request_timeout)
            .await
            .map_err(|err| {
                error!(error = %err, "saving log entry");
                PublicError::save()
            })
    }

    /// Parse a JSON body and record it.
    pub async fn record_json(&self, body: &str) -> Result<Block, PublicError> {
        self.record(LogEntry::from_json(body)?).await
    }

    pub async fn validate_all(&self) -> Result<SegmentReport, PublicError> {
        self.validator.validate_all().await.map_err(validation_failure)
    }

    pub async fn validate_segment(&self, start: u64, end: u64) -> Result<SegmentReport, PublicError> {
        self.validator
            .validate_segment(start, end)
            .await
            .map_err(validation_failure)
    }
}

fn validation_failure(err: LedgerError) -> PublicError {
    if let LedgerError::InvalidRange { .. } = err {
        return PublicError::invalid_range();
    }
    error!(error = %err, "validating chain");
    PublicError::internal()
}
