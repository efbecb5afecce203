//! Error taxonomy.
//!
//! Three layers, mirroring the Kinds table in the error handling design:
//! [`ReaderError`] and [`HandlerError`] are the typed surfaces the Reader and
//! Handler return; [`DemuxError`] is what [`ActionWatcher::watch`](crate::watcher::ActionWatcher::watch)
//! exits with. Fatality is classified once, on `DemuxError`, rather than
//! re-derived at each call site.

use crate::types::BlockNumber;

/// Errors surfaced by the Action Reader.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Transient: the chain adapter could not be reached.
    #[error("chain unreachable: {0}")]
    ChainUnreachable(String),

    /// Protocol: the chain adapter returned an inconsistent response (a
    /// block it previously reported as present is now missing).
    #[error("block not found at height {0}")]
    BlockNotFound(BlockNumber),

    /// Structural: the fork walk exhausted the history window without
    /// finding a matching ancestor.
    #[error("reorg too deep: walked {depth} entries, history window holds {max}")]
    ReorgTooDeep { depth: u32, max: u32 },

    /// Protocol: a returned block's hash link is internally inconsistent.
    #[error("malformed block at height {0}: {1}")]
    MalformedBlock(BlockNumber, String),
}

/// Errors surfaced by the Action Handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Protocol: the block offered does not extend the current cursor.
    #[error("out of order block: expected {expected}, got {found}")]
    OutOfOrderBlock {
        expected: BlockNumber,
        found: BlockNumber,
    },

    /// Protocol: the block's `previous_block_hash` does not match the
    /// cursor's `block_hash`.
    #[error("hash mismatch at block {block_number}: index state has {expected}, block claims {found}")]
    HashMismatch {
        block_number: BlockNumber,
        expected: String,
        found: String,
    },

    /// Transient: the datastore transaction failed to commit.
    #[error("commit failed for block {block_number}: {source}")]
    CommitFailed {
        block_number: BlockNumber,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transient: the datastore could not be reached at all (connection
    /// refused, pool exhausted, etc. — distinct from a failed commit).
    #[error("datastore unavailable: {0}")]
    DatastoreUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// User: a registered updater function returned an error. Fatal for the
    /// block's transaction, which is rolled back in full.
    #[error("updater for action type {action_type:?} failed on block {block_number}: {source}")]
    UpdaterFailed {
        action_type: String,
        block_number: BlockNumber,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Structural, non-fatal by default: a rollback could not unwind effects
    /// already dispatched for blocks at or above `from_block`.
    #[error("effects already dispatched for blocks >= {from_block} cannot be unwound")]
    EffectsNotReversible { from_block: BlockNumber },
}

/// The error type [`ActionWatcher::watch`](crate::watcher::ActionWatcher::watch) exits with.
#[derive(Debug, thiserror::Error)]
pub enum DemuxError {
    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The Watcher exhausted its retry budget for a single block.
    #[error("retry budget exhausted for block {block_number} after {attempts} attempts: {source}")]
    FatalHandlerError {
        block_number: BlockNumber,
        attempts: u32,
        #[source]
        source: Box<DemuxError>,
    },

    /// The Watcher received an external cancellation signal.
    #[error("watcher canceled")]
    Canceled,
}

impl DemuxError {
    /// Whether the Watcher's retry loop should retry this error with
    /// backoff (Transient kind) rather than treat it as immediately fatal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Reader(ReaderError::ChainUnreachable(_))
                | Self::Handler(HandlerError::CommitFailed { .. } | HandlerError::DatastoreUnavailable(_))
        )
    }

    /// Whether this error, once surfaced, ends `watch()` outright.
    ///
    /// `EffectsNotReversible` is a warning by policy default: it does not
    /// make the loop exit on its own, callers observing it decide.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Handler(HandlerError::EffectsNotReversible { .. }))
    }
}

pub type Result<T, E = DemuxError> = std::result::Result<T, E>;
