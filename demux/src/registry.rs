//! Updater and effect registration, keyed by `actionType`.
//!
//! Payload shape is action-type specific and opaque to the core; no runtime
//! reflection is required. Registration is a plain `Vec` of entries supplied
//! at handler construction — two ordered sequences, no builder DSL.

use std::error::Error as StdError;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::ports::DatastoreAdapter;
use crate::types::{Action, Block};

type BoxedError = Box<dyn StdError + Send + Sync>;

/// A deterministic function mutating the datastore inside a block's
/// transaction.
///
/// Updaters are synchronous with respect to the transaction they're given:
/// they must not perform asynchronous suspension that outlives it.
/// Implemented automatically for any matching closure via the blanket impl
/// below, so callers register plain functions rather than implementing this
/// trait by hand.
pub trait Updater<D: DatastoreAdapter>: Send + Sync {
    fn apply(
        &self,
        ctx: &mut D::Context<'_>,
        payload: &Value,
        block: &Block,
        action: &Action,
    ) -> Result<(), BoxedError>;
}

impl<D, F> Updater<D> for F
where
    D: DatastoreAdapter,
    F: for<'a> Fn(&mut D::Context<'a>, &Value, &Block, &Action) -> Result<(), BoxedError>
        + Send
        + Sync,
{
    fn apply(
        &self,
        ctx: &mut D::Context<'_>,
        payload: &Value,
        block: &Block,
        action: &Action,
    ) -> Result<(), BoxedError> {
        self(ctx, payload, block, action)
    }
}

/// A non-deterministic side-effecting function fired on live blocks only.
///
/// Effects never see the datastore transaction; they receive the adapter's
/// read-only [`DatastoreAdapter::EffectContext`] instead.
pub trait Effect<D: DatastoreAdapter>: Send + Sync {
    fn fire<'a>(
        &'a self,
        payload: Value,
        block: Block,
        action: Action,
        ctx: Arc<D::EffectContext>,
    ) -> BoxFuture<'a, Result<(), BoxedError>>;
}

impl<D, F, Fut> Effect<D> for F
where
    D: DatastoreAdapter,
    F: Fn(Value, Block, Action, Arc<D::EffectContext>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), BoxedError>> + Send + 'static,
{
    fn fire<'a>(
        &'a self,
        payload: Value,
        block: Block,
        action: Action,
        ctx: Arc<D::EffectContext>,
    ) -> BoxFuture<'a, Result<(), BoxedError>> {
        Box::pin(self(payload, block, action, ctx))
    }
}

/// One updater registration: which `actionType` it fires for, and the
/// function itself. Immutable after construction.
pub struct UpdaterEntry<D: DatastoreAdapter> {
    pub(crate) action_type: String,
    pub(crate) updater: Arc<dyn Updater<D>>,
}

impl<D: DatastoreAdapter> UpdaterEntry<D> {
    pub fn new(action_type: impl Into<String>, updater: impl Updater<D> + 'static) -> Self {
        Self {
            action_type: action_type.into(),
            updater: Arc::new(updater),
        }
    }
}

/// One effect registration: which `actionType` it fires for, and the
/// function itself. Immutable after construction.
pub struct EffectEntry<D: DatastoreAdapter> {
    pub(crate) action_type: String,
    pub(crate) effect: Arc<dyn Effect<D>>,
}

impl<D: DatastoreAdapter> EffectEntry<D> {
    pub fn new(action_type: impl Into<String>, effect: impl Effect<D> + 'static) -> Self {
        Self {
            action_type: action_type.into(),
            effect: Arc::new(effect),
        }
    }
}
