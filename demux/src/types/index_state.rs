//! The sole durable cursor the Handler reads and writes.

use serde::{Deserialize, Serialize};

use super::block::Block;
use super::primitives::{BlockNumber, Hash32};

/// Durable cursor pairing `(blockNumber, blockHash, isReplay)`, persisted in
/// the same datastore and transaction as user state. On startup the
/// Handler's cursor IS this value (or its absence, meaning "never applied a
/// block").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    pub block_number: BlockNumber,
    pub block_hash: Hash32,
    pub is_replay: bool,
}

impl IndexState {
    #[must_use]
    pub const fn after_block(block: &Block, is_replay: bool) -> Self {
        Self {
            block_number: block.block_number,
            block_hash: block.block_hash,
            is_replay,
        }
    }
}
