//! Block data structure, hashing and payload sealing.

use crate::canonical;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Structured payload of a block.
pub type Payload = Map<String, Value>;

/// Payload key that records which tenant wrote the entry.
pub const SYSTEM_ID_KEY: &str = "system_id";

/// Separator used to store the tag set as a single string.
pub const TAG_SEPARATOR: &str = ";";

/// Reserved id of the well-known genesis block.
pub const GENESIS_BLOCK_ID: Uuid = Uuid::from_u128(0x6ec9d09f_fee4_494c_9309_f603f275f4df);

/// Hash of the well-known genesis block. It depends only on fixed inputs,
/// so every chain shares it whatever its keypair.
pub const GENESIS_BLOCK_HASH: &str =
    "01f4913e4f39713b5d2260b443ff30c2b696256d3488731a8b4587ab3fb6983f";

/// Fixed hashing timestamp of the genesis block.
pub const GENESIS_HASHED_AT: &str = "2023-01-01T01:01:01.000000001Z";

/// System id stamped on the genesis block.
pub const GENESIS_SYSTEM_ID: &str = "genesis";

/// Errors converting a payload to or from its stored form.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("marshaling payload of block {block_id}: {source}")]
    Encode {
        block_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("parsing stored payload of block {block_id}: {source}")]
    Decode {
        block_id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored payload of block {block_id} is not a JSON object")]
    NotAnObject { block_id: Uuid },
}

/// One chained, hashed and signed unit of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: Uuid,

    /// Predecessor id; nil for genesis.
    pub last_block_id: Uuid,

    /// Predecessor hash; empty for genesis.
    pub last_block_hash: String,

    /// Position in the chain. Genesis is 0.
    pub seq_id: u64,

    /// Canonical encoding of `payload`. This exact text is hashed.
    pub payload_raw: String,

    /// Decoded payload for callers.
    #[serde(default)]
    pub payload: Payload,

    pub system_id: String,

    /// `;`-joined labels. Not covered by the hash.
    #[serde(default)]
    pub tags: String,

    pub hash: String,

    /// Armored detached signature over [`Block::signable_representation`].
    pub signature: String,

    pub signed_at: Option<DateTime<Utc>>,

    pub hashed_at: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Block {
    /// Create an unsealed block with a fresh id.
    pub fn new<S: AsRef<str>>(system_id: impl Into<String>, payload: Payload, tags: &[S]) -> Self {
        let tags = tags
            .iter()
            .map(AsRef::as_ref)
            .filter(|tag| !tag.is_empty())
            .collect::<Vec<_>>()
            .join(TAG_SEPARATOR);

        Self {
            id: Uuid::new_v4(),
            last_block_id: Uuid::nil(),
            last_block_hash: String::new(),
            seq_id: 0,
            payload_raw: String::new(),
            payload,
            system_id: system_id.into(),
            tags,
            hash: String::new(),
            signature: String::new(),
            signed_at: None,
            hashed_at: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// The unsealed well-known genesis block.
    pub fn genesis() -> Self {
        let mut payload = Payload::new();
        payload.insert(
            "there was light".to_string(),
            Value::String("and become light".to_string()),
        );

        let mut block = Self::new(GENESIS_SYSTEM_ID, payload, &[] as &[&str]);
        block.id = GENESIS_BLOCK_ID;
        block
    }

    /// The string that is digested into [`Block::hash`].
    pub fn hashable_representation(&self) -> String {
        format!(
            "{}.{}.{}.{}.{}.{}",
            self.seq_id,
            self.id,
            self.last_block_id,
            self.last_block_hash,
            self.payload_raw,
            self.hashed_at
        )
    }

    /// The string that is signed. Only meaningful once the block is sealed.
    pub fn signable_representation(&self) -> String {
        format!("{}.{}", self.id, self.hash)
    }

    /// Lowercase hex SHA-256 of the hashable representation.
    pub fn compute_hash(&self) -> String {
        hex::encode(Sha256::digest(self.hashable_representation().as_bytes()))
    }

    /// Stamp the payload, timestamp and hash.
    ///
    /// Injects `system_id` into the payload, re-encodes `payload_raw`
    /// canonically and recomputes `hash`. The genesis id always hashes with
    /// the fixed genesis timestamp.
    pub fn seal(&mut self) -> Result<(), SerializationError> {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }

        self.payload.insert(
            SYSTEM_ID_KEY.to_string(),
            Value::String(self.system_id.clone()),
        );
        self.payload_raw =
            canonical::encode_object(&self.payload).map_err(|source| SerializationError::Encode {
                block_id: self.id,
                source,
            })?;

        self.hashed_at = if self.id == GENESIS_BLOCK_ID {
            GENESIS_HASHED_AT.to_string()
        } else {
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
        };

        self.hash = self.compute_hash();
        Ok(())
    }

    /// Rebuild `payload` from the stored `payload_raw`.
    pub fn decode_payload(&mut self) -> Result<(), SerializationError> {
        let value: Value =
            serde_json::from_str(&self.payload_raw).map_err(|source| SerializationError::Decode {
                block_id: self.id,
                source,
            })?;

        match value {
            Value::Object(map) => {
                self.payload = map;
                Ok(())
            }
            _ => Err(SerializationError::NotAnObject { block_id: self.id }),
        }
    }

    /// The stored tags as individual labels.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(TAG_SEPARATOR)
            .filter(|tag| !tag.is_empty())
            .collect()
    }

    /// Whether this is the reserved genesis block with its reserved hash.
    pub fn is_well_known_genesis(&self) -> bool {
        self.id == GENESIS_BLOCK_ID && self.hash == GENESIS_BLOCK_HASH
    }
}
