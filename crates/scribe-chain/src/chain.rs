//! Chain engine: genesis creation, block chaining and the in-memory working set.

use crate::block::{Block, SerializationError};
use crate::signer::{self, KeyError, SignatureError, SigningHandle, VerifyingHandle};
use crate::validate::validate_block;
use chrono::Utc;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain not initialized: {0}")]
    NotInitialized(&'static str),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("block {block_id} (seq {seq_id}): {source}")]
    Signature {
        block_id: Uuid,
        seq_id: u64,
        #[source]
        source: SignatureError,
    },

    #[error("invalid hash for block {block_id} (seq {seq_id}): stored {expected}, recomputed {actual}")]
    HashMismatch {
        block_id: Uuid,
        seq_id: u64,
        expected: String,
        actual: String,
    },

    #[error(
        "chain is broken at block {block_id} (seq {seq_id}): last_block_hash [{actual}] \
         does not match [{expected}] of block {last_block_id}"
    )]
    BrokenLink {
        block_id: Uuid,
        seq_id: u64,
        expected: String,
        actual: String,
        last_block_id: Uuid,
    },

    #[error("sequence gap at block {block_id}: expected seq {expected}, found {actual}")]
    SequenceGap {
        block_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("empty chain")]
    EmptyChain,

    #[error("chain has no genesis block")]
    MissingGenesis,

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("{step}: {source}")]
    Step {
        step: ChainStep,
        #[source]
        source: Box<ChainError>,
    },
}

impl ChainError {
    /// The innermost error, skipping step context.
    pub fn root_cause(&self) -> &ChainError {
        match self {
            ChainError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    fn at(step: ChainStep) -> impl FnOnce(ChainError) -> ChainError {
        move |source| ChainError::Step {
            step,
            source: Box::new(source),
        }
    }
}

/// The step of block production that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    ValidatingLastBlock,
    HashingBlock,
    HashingGenesis,
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChainStep::ValidatingLastBlock => "validating last block",
            ChainStep::HashingBlock => "hashing block",
            ChainStep::HashingGenesis => "hashing genesis block",
        };
        f.write_str(text)
    }
}

struct Auth {
    private_key: String,
    passphrase: String,
}

/// Armored keys plus the handles unlocked from them on first use.
struct KeyMaterial {
    public_key: String,
    auth: Option<Auth>,
    verifier: OnceCell<VerifyingHandle>,
    signer: OnceCell<SigningHandle>,
}

impl KeyMaterial {
    fn new(public_key: String, auth: Option<Auth>) -> Self {
        Self {
            public_key,
            auth,
            verifier: OnceCell::new(),
            signer: OnceCell::new(),
        }
    }

    fn has_auth(&self) -> bool {
        self.auth
            .as_ref()
            .is_some_and(|auth| !auth.private_key.is_empty() && !auth.passphrase.is_empty())
    }

    fn verifier(&self) -> Result<&VerifyingHandle, KeyError> {
        self.verifier
            .get_or_try_init(|| signer::load_public_key(&self.public_key))
    }

    fn signer(&self) -> Result<&SigningHandle, ChainError> {
        let auth = self
            .auth
            .as_ref()
            .ok_or(ChainError::NotInitialized("no private key configured"))?;
        let handle = self
            .signer
            .get_or_try_init(|| signer::unlock_private_key(&auth.private_key, &auth.passphrase))?;
        Ok(handle)
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("checkable", &!self.public_key.is_empty())
            .field("has_auth", &self.has_auth())
            .finish_non_exhaustive()
    }
}

/// A possibly partial, ordered sequence of blocks plus the keys needed to
/// check and extend it.
///
/// A chain is a transient working set: durable storage belongs to the
/// caller. Key material is shared between a chain and the working sets
/// derived from it, so a passphrase is only stretched once per process.
#[derive(Debug)]
pub struct Chain {
    keys: Arc<KeyMaterial>,
    genesis_block: Option<Block>,
    blocks: Vec<Block>,
}

impl Chain {
    /// Create a chain that can verify with `public_key`. The first seed block,
    /// if any, becomes the genesis block.
    pub fn init(public_key: impl Into<String>, seed_blocks: Vec<Block>) -> Self {
        Self {
            keys: Arc::new(KeyMaterial::new(public_key.into(), None)),
            genesis_block: seed_blocks.first().cloned(),
            blocks: seed_blocks,
        }
    }

    /// Allow this chain to sign. The key is only unlocked on first use.
    pub fn set_auth(&mut self, private_key: impl Into<String>, passphrase: impl Into<String>) {
        let auth = Auth {
            private_key: private_key.into(),
            passphrase: passphrase.into(),
        };
        self.keys = Arc::new(KeyMaterial::new(self.keys.public_key.clone(), Some(auth)));
    }

    /// Whether a private key and passphrase are configured.
    pub fn has_auth(&self) -> bool {
        self.keys.has_auth()
    }

    /// Whether a public key is configured.
    pub fn is_checkable(&self) -> bool {
        !self.keys.public_key.is_empty()
    }

    pub fn genesis_block(&self) -> Option<&Block> {
        self.genesis_block.as_ref()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Install an already persisted genesis block as this chain's root.
    pub fn adopt_genesis(&mut self, block: Block) {
        self.genesis_block = Some(block);
    }

    /// Append loaded blocks to the working set. When no genesis is known yet,
    /// the first loaded block becomes the anchor.
    pub fn load_segment(&mut self, blocks: Vec<Block>) {
        if self.genesis_block.is_none() {
            self.genesis_block = blocks.first().cloned();
        }
        self.blocks.extend(blocks);
    }

    /// A fresh, empty chain sharing this chain's keys.
    pub fn working_set(&self, inherit_genesis: bool) -> Chain {
        Chain {
            keys: Arc::clone(&self.keys),
            genesis_block: if inherit_genesis {
                self.genesis_block.clone()
            } else {
                None
            },
            blocks: Vec::new(),
        }
    }

    /// Build, seal and sign the well-known genesis block and make it the root
    /// of this chain.
    pub fn generate_genesis(&mut self) -> Result<Block, ChainError> {
        if !self.has_auth() {
            return Err(ChainError::NotInitialized(
                "generating genesis requires a private key and passphrase",
            ));
        }
        let signer = self.keys.signer()?;

        let mut genesis = Block::genesis();
        genesis
            .seal()
            .map_err(ChainError::from)
            .map_err(ChainError::at(ChainStep::HashingGenesis))?;
        sign_block(signer, &mut genesis);

        info!(block_id = %genesis.id, hash = %genesis.hash, "generated genesis block");

        self.genesis_block = Some(genesis.clone());
        self.blocks.push(genesis.clone());
        Ok(genesis)
    }

    /// Link `new_block` after `last_block`: verify the predecessor, copy its
    /// id and hash, take the next sequence number, seal and sign.
    ///
    /// Only the immediate predecessor is needed. On error `new_block` is
    /// dropped; nothing else is mutated.
    pub fn chain_blocks(&self, last_block: &Block, new_block: Block) -> Result<Block, ChainError> {
        if !self.has_auth() || !self.is_checkable() {
            return Err(ChainError::NotInitialized(
                "chaining requires a public key, a private key and a passphrase",
            ));
        }
        let verifier = self.keys.verifier()?;
        let signer = self.keys.signer()?;

        validate_block(verifier, last_block, Utc::now())
            .map_err(ChainError::at(ChainStep::ValidatingLastBlock))?;

        let mut block = new_block;
        block.last_block_hash = last_block.hash.clone();
        block.last_block_id = last_block.id;
        block.seq_id = last_block.seq_id + 1;

        block
            .seal()
            .map_err(ChainError::from)
            .map_err(ChainError::at(ChainStep::HashingBlock))?;
        sign_block(signer, &mut block);

        debug!(
            block_id = %block.id,
            seq_id = block.seq_id,
            last_block_id = %block.last_block_id,
            "chained block"
        );
        Ok(block)
    }

    /// Chain `new_block` after the in-memory tail and append it.
    pub fn append_block(&mut self, new_block: Block) -> Result<Block, ChainError> {
        let tail = self.blocks.last().ok_or(ChainError::EmptyChain)?;
        let block = self.chain_blocks(tail, new_block)?;
        self.blocks.push(block.clone());
        Ok(block)
    }

    /// Drop the working set and its genesis.
    pub fn clean(&mut self) {
        self.blocks.clear();
        self.genesis_block = None;
    }

    pub(crate) fn verifier(&self) -> Result<&VerifyingHandle, KeyError> {
        self.keys.verifier()
    }
}

fn sign_block(signer: &SigningHandle, block: &mut Block) {
    let signature = signer::sign(signer, block.signable_representation().as_bytes());
    block.signature = signature.armor;
    block.signed_at = Some(signature.created_at);
}
