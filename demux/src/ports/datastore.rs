//! The Handler's capability set onto the datastore.
//!
//! Concrete implementations (a SQL pool, a KV store, ...) live outside this
//! crate. The core opens exactly one transaction per block, applies
//! updaters through it, writes the new [`IndexState`] through it, and
//! commits or rolls it back as a unit.

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::types::{BlockNumber, IndexState};

/// Everything the Action Handler needs from the datastore.
///
/// `Tx` is the adapter's transaction handle (a SQL transaction, a KV batch,
/// ...); `Context<'a>` is whatever query/mutation surface the adapter wants
/// to expose to updater and effect function bodies, scoped to a live `Tx`.
/// Neither type is interpreted by the core.
#[async_trait]
pub trait DatastoreAdapter: Send + Sync + 'static {
    /// A handle to an open, uncommitted transaction.
    type Tx: Send;

    /// The read/write surface updater functions are given, borrowed from an
    /// open transaction.
    type Context<'a>
    where
        Self: 'a;

    /// The read-only surface effect functions are given. Effects never see
    /// `Tx` — they have no access to the datastore transaction.
    type EffectContext: Send + Sync;

    async fn begin_transaction(&self) -> Result<Self::Tx, HandlerError>;
    async fn commit(&self, tx: Self::Tx) -> Result<(), HandlerError>;
    async fn rollback(&self, tx: Self::Tx) -> Result<(), HandlerError>;

    async fn read_index_state(&self, tx: &mut Self::Tx) -> Result<Option<IndexState>, HandlerError>;
    async fn write_index_state(
        &self,
        tx: &mut Self::Tx,
        state: IndexState,
    ) -> Result<(), HandlerError>;

    /// Build the updater-facing context for a live transaction.
    fn context<'a>(&'a self, tx: &'a mut Self::Tx) -> Self::Context<'a>;

    /// Build the effect-facing read-only context. Does not borrow a
    /// transaction: effects run after commit, outside the ingestion lane.
    fn effect_context(&self) -> Self::EffectContext;

    /// Restore derived state to the snapshot as of block `target - 1` and
    /// set `IndexState` accordingly. The core mandates only the post-state
    /// contract (`IndexState.block_number <= target - 1` on return), not the
    /// mechanism: implementations may use reverse migrations, a
    /// schema-snapshot restore, or anything else that gets there.
    async fn rollback_to(&self, target: BlockNumber) -> Result<(), HandlerError>;
}
