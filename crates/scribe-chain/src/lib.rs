//! Tamper-evident audit chain: signed, hash-linked blocks.
//!
//! Each [`Block`] carries the hash of its predecessor, a SHA-256 digest of its
//! own contents and an Ed25519 signature over `id.hash`. A [`Chain`] holds the
//! keys plus an in-memory working set and can produce new blocks or check an
//! existing run of them. Persistence lives elsewhere.
//!
//! # Example
//!
//! ```no_run
//! use scribe_chain::{signer, Block, Chain, Payload};
//!
//! let keys = signer::generate_keypair("correct horse battery staple").unwrap();
//!
//! let mut chain = Chain::init(keys.public_key.clone(), vec![]);
//! chain.set_auth(keys.private_key.clone(), "correct horse battery staple");
//! chain.generate_genesis().unwrap();
//!
//! let mut payload = Payload::new();
//! payload.insert("table".into(), "user".into());
//! chain.append_block(Block::new("billing", payload, &["audit"])).unwrap();
//!
//! assert!(chain.validate().is_ok());
//! ```

mod block;
mod canonical;
mod chain;
pub mod signer;
mod validate;

pub use block::{
    Block, Payload, SerializationError, GENESIS_BLOCK_HASH, GENESIS_BLOCK_ID, GENESIS_HASHED_AT,
    GENESIS_SYSTEM_ID, SYSTEM_ID_KEY, TAG_SEPARATOR,
};
pub use canonical::{encode_object, to_canonical_string};
pub use chain::{Chain, ChainError, ChainStep};
pub use signer::{
    ArmoredKeyPair, DetachedSignature, KeyError, SignatureError, SigningHandle, VerifyingHandle,
};
pub use validate::validate_block;
