//! The unit of chain advancement.

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::primitives::{BlockNumber, Hash32};

/// A block on the canonical chain, as reported by a [`ChainAdapter`](crate::ports::ChainAdapter).
///
/// `previous_block_hash` must equal the `block_hash` of block `block_number - 1`
/// on the same chain; the Handler enforces this hash link on every apply and
/// the Reader enforces it while walking forward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_number: BlockNumber,
    pub block_hash: Hash32,
    pub previous_block_hash: Hash32,
    /// Actions in the order updaters/effects must observe them.
    pub actions: Vec<Action>,
}

impl Block {
    #[must_use]
    pub fn genesis(block_number: BlockNumber, block_hash: Hash32) -> Self {
        Self {
            block_number,
            block_hash,
            previous_block_hash: Hash32::ZERO,
            actions: Vec::new(),
        }
    }
}
