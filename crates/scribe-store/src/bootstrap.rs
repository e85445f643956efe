//! First-start protocol: make sure a genesis block is persisted.

use crate::error::LedgerError;
use crate::store::{BlockStore, StoreError};
use scribe_chain::{Block, Chain};
use tracing::{info, warn};

/// What [`bootstrap`] found or did.
#[derive(Debug, Clone, PartialEq)]
pub enum Bootstrap {
    /// This process generated and persisted the genesis block.
    Created(Block),
    /// A genesis block was already stored and has been adopted.
    Existing(Block),
}

impl Bootstrap {
    pub fn genesis(&self) -> &Block {
        match self {
            Bootstrap::Created(block) | Bootstrap::Existing(block) => block,
        }
    }
}

/// Ensure `store` holds a genesis block and install it as `engine`'s root.
///
/// Safe against concurrent starters: the loser of the insert race adopts the
/// winner's genesis. A stored genesis is verified before it is adopted.
pub async fn bootstrap(store: &dyn BlockStore, engine: &mut Chain) -> Result<Bootstrap, LedgerError> {
    if let Some(first) = store.find_first().await? {
        adopt(engine, first.clone())?;
        info!(block_id = %first.id, "found existing genesis block");
        return Ok(Bootstrap::Existing(first));
    }

    let genesis = engine.generate_genesis()?;
    match store.create(genesis).await {
        Ok(stored) => {
            engine.adopt_genesis(stored.clone());
            info!(block_id = %stored.id, hash = %stored.hash, "persisted genesis block");
            Ok(Bootstrap::Created(stored))
        }
        Err(StoreError::Duplicate { .. }) => {
            warn!("another instance persisted the genesis block first");
            let first = store.find_first().await?.ok_or(LedgerError::EmptyChain)?;
            adopt(engine, first.clone())?;
            Ok(Bootstrap::Existing(first))
        }
        Err(err) => Err(err.into()),
    }
}

fn adopt(engine: &mut Chain, first: Block) -> Result<(), LedgerError> {
    let mut check = engine.working_set(false);
    check.load_segment(vec![first.clone()]);
    check.validate()?;
    engine.adopt_genesis(first);
    Ok(())
}
