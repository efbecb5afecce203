//! The Reader's capability set onto the chain.
//!
//! Concrete implementations (an RPC client for a specific chain) live
//! outside this crate; the core only ever calls through this trait.

use async_trait::async_trait;

use crate::error::ReaderError;
use crate::types::{Block, BlockNumber};

/// Everything the Action Reader needs from the chain.
#[async_trait]
pub trait ChainAdapter: Send + Sync + 'static {
    /// The chain's current head block number.
    async fn get_head_block_number(&self) -> Result<BlockNumber, ReaderError>;

    /// The chain's last-irreversible-block number, if the chain exposes one.
    ///
    /// `Ok(None)` means the chain has no LIB concept; callers with
    /// `only_irreversible = true` configured against such a chain get no
    /// blocks (the Reader treats an absent LIB as "nothing is irreversible
    /// yet").
    async fn get_irreversible_block_number(&self) -> Result<Option<BlockNumber>, ReaderError> {
        Ok(None)
    }

    /// Fetch the block at height `n`. `Ok(None)` means the chain does not
    /// yet have a block at that height (distinct from `BlockNotFound`, which
    /// is for a height the chain previously reported and can no longer
    /// produce — an inconsistency, not a race with chain growth).
    async fn get_block(&self, n: BlockNumber) -> Result<Option<Block>, ReaderError>;
}
