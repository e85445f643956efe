//! Chain validation.

use crate::block::Block;
use crate::chain::{Chain, ChainError};
use crate::signer::{self, VerifyingHandle};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Check one block's signature, then its hash.
///
/// The signature covers `id.hash`, so a payload rewritten without resealing
/// still verifies and is caught by the hash comparison instead.
pub fn validate_block(
    verifier: &VerifyingHandle,
    block: &Block,
    at: DateTime<Utc>,
) -> Result<(), ChainError> {
    signer::verify(
        verifier,
        block.signable_representation().as_bytes(),
        &block.signature,
        at,
    )
    .map_err(|source| ChainError::Signature {
        block_id: block.id,
        seq_id: block.seq_id,
        source,
    })?;

    let actual = block.compute_hash();
    if actual != block.hash {
        return Err(ChainError::HashMismatch {
            block_id: block.id,
            seq_id: block.seq_id,
            expected: block.hash.clone(),
            actual,
        });
    }
    Ok(())
}

impl Chain {
    /// Walk the working set from the genesis block and stop at the first
    /// block whose signature, hash or link does not hold.
    pub fn validate(&self) -> Result<(), ChainError> {
        if !self.is_checkable() {
            return Err(ChainError::NotInitialized("validation requires a public key"));
        }
        let genesis = self.genesis_block().ok_or(ChainError::MissingGenesis)?;
        let verifier = self.verifier()?;
        let now = Utc::now();

        let mut last = genesis;
        for block in self.blocks() {
            if let Err(err) = validate_block(verifier, block, now) {
                warn!(block_id = %block.id, seq_id = block.seq_id, error = %err, "block failed validation");
                return Err(err);
            }

            // Genesis, or the anchor of a loaded segment, has no predecessor to check.
            if block.is_well_known_genesis() || (block.id == genesis.id && block.hash == genesis.hash) {
                last = block;
                continue;
            }

            if block.last_block_hash != last.hash {
                warn!(
                    block_id = %block.id,
                    seq_id = block.seq_id,
                    expected = %last.hash,
                    actual = %block.last_block_hash,
                    "chain is broken"
                );
                return Err(ChainError::BrokenLink {
                    block_id: block.id,
                    seq_id: block.seq_id,
                    expected: last.hash.clone(),
                    actual: block.last_block_hash.clone(),
                    last_block_id: last.id,
                });
            }

            if block.seq_id != last.seq_id + 1 {
                warn!(block_id = %block.id, seq_id = block.seq_id, "sequence gap");
                return Err(ChainError::SequenceGap {
                    block_id: block.id,
                    expected: last.seq_id + 1,
                    actual: block.seq_id,
                });
            }

            last = block;
        }

        Ok(())
    }
}
