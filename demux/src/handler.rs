//! The Action Handler: applies block actions deterministically, atomically
//! with the cursor write, and dispatches effects only for live blocks.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::{EffectRunMode, HandlerConfig};
use crate::error::HandlerError;
use crate::ports::DatastoreAdapter;
use crate::registry::{Effect, EffectEntry, Updater, UpdaterEntry};
use crate::types::{Action, Block, BlockNumber, IndexState};

/// Bound on the per-`actionType` effect channel. Chosen generously: a full
/// channel means effect dispatch is lagging ingestion badly enough that
/// backpressure (a blocked `send`) is preferable to unbounded memory growth.
const EFFECT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug)]
struct TimeoutExceeded;

impl fmt::Display for TimeoutExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "datastore call timed out")
    }
}

impl std::error::Error for TimeoutExceeded {}

struct EffectJob<D: DatastoreAdapter> {
    entries: Arc<Vec<Arc<dyn Effect<D>>>>,
    payload: Value,
    block: Block,
    action: Action,
    ctx: Arc<D::EffectContext>,
    /// The rollback generation in effect when this job was queued.
    generation: u64,
}

/// The applier. Owns the updater/effect registries and drives every
/// transactional apply against the datastore adapter `D`.
pub struct ActionHandler<D: DatastoreAdapter> {
    datastore: D,
    updaters: HashMap<String, Vec<Arc<dyn Updater<D>>>>,
    effects: HashMap<String, Arc<Vec<Arc<dyn Effect<D>>>>>,
    effect_senders: HashMap<String, mpsc::Sender<EffectJob<D>>>,
    /// Shared with every effect worker. Incremented on every rollback; a
    /// worker drops a queued job whose `generation` predates the current
    /// value instead of firing it, so an effect queued for a block that a
    /// later-observed fork discards never runs.
    effect_generation: Arc<AtomicU64>,
    effect_ctx: Arc<D::EffectContext>,
    config: HandlerConfig,
    max_replay_target: BlockNumber,
    live: bool,
}

impl<D: DatastoreAdapter> fmt::Debug for ActionHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandler")
            .field("updater_types", &self.updaters.len())
            .field("effect_types", &self.effects.len())
            .field("max_replay_target", &self.max_replay_target)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl<D: DatastoreAdapter> ActionHandler<D> {
    /// Build a handler. `max_replay_target` is the chain head observed when
    /// the host began ingestion (or a value it chooses); blocks at or below
    /// it are replayed with effects suppressed.
    pub fn new(
        datastore: D,
        updaters: Vec<UpdaterEntry<D>>,
        effects: Vec<EffectEntry<D>>,
        config: HandlerConfig,
        max_replay_target: BlockNumber,
    ) -> Self {
        let mut updater_map: HashMap<String, Vec<Arc<dyn Updater<D>>>> = HashMap::new();
        for entry in updaters {
            updater_map.entry(entry.action_type).or_default().push(entry.updater);
        }

        let mut grouped_effects: HashMap<String, Vec<Arc<dyn Effect<D>>>> = HashMap::new();
        for entry in effects {
            grouped_effects.entry(entry.action_type).or_default().push(entry.effect);
        }

        let effect_ctx = Arc::new(datastore.effect_context());
        let effect_generation = Arc::new(AtomicU64::new(0));
        let mut effect_map = HashMap::new();
        let mut effect_senders = HashMap::new();
        for (action_type, entries) in grouped_effects {
            let entries = Arc::new(entries);
            let (tx, rx) = mpsc::channel(EFFECT_CHANNEL_CAPACITY);
            spawn_effect_worker(action_type.clone(), rx, Arc::clone(&effect_generation));
            effect_senders.insert(action_type.clone(), tx);
            effect_map.insert(action_type, entries);
        }

        Self {
            datastore,
            updaters: updater_map,
            effects: effect_map,
            effect_senders,
            effect_generation,
            effect_ctx,
            config,
            max_replay_target,
            live: false,
        }
    }

    /// Read the persisted cursor without mutating anything.
    pub async fn load_index_state(&self) -> Result<Option<IndexState>, HandlerError> {
        let mut tx = self.with_timeout(self.datastore.begin_transaction()).await?;
        let state = self.datastore.read_index_state(&mut tx).await?;
        self.datastore.rollback(tx).await?;
        Ok(state)
    }

    /// Apply `block`'s actions under a single datastore transaction and
    /// record the resulting `IndexState`. Returns the replay flag that was
    /// written, per the public contract.
    #[instrument(skip(self, block), fields(block_number = %block.block_number))]
    pub async fn handle_block(&mut self, block: Block) -> Result<IndexState, HandlerError> {
        let is_replay = self.derive_is_replay(block.block_number);

        let mut tx = self.with_timeout(self.datastore.begin_transaction()).await?;
        let prior = self.datastore.read_index_state(&mut tx).await?;

        if let Err(e) = Self::validate_sequencing(self.config.start_at_block, prior, &block) {
            let _ = self.datastore.rollback(tx).await;
            return Err(e);
        }

        let mut failed: Option<(String, Box<dyn std::error::Error + Send + Sync>)> = None;
        {
            let mut ctx = self.datastore.context(&mut tx);
            'apply: for action in &block.actions {
                if let Some(updaters) = self.updaters.get(&action.type_) {
                    for updater in updaters {
                        if let Err(source) =
                            updater.apply(&mut ctx, &action.payload, &block, action)
                        {
                            failed = Some((action.type_.clone(), source));
                            break 'apply;
                        }
                    }
                }
            }
        }

        if let Some((action_type, source)) = failed {
            let _ = self.datastore.rollback(tx).await;
            warn!(block_number = %block.block_number, %action_type, "updater failed, block rolled back");
            return Err(HandlerError::UpdaterFailed {
                action_type,
                block_number: block.block_number,
                source,
            });
        }

        let new_state = IndexState::after_block(&block, is_replay);
        self.datastore.write_index_state(&mut tx, new_state).await?;
        self.with_timeout(self.datastore.commit(tx)).await?;

        info!(block_number = %block.block_number, is_replay, "block committed");

        if !is_replay {
            self.dispatch_effects(&block).await;
        }

        Ok(new_state)
    }

    /// Reverse application to and including `target - 1`. Bumps the shared
    /// effect generation first, so any `FireAndForget` job already queued
    /// for a now-orphaned block is dropped by its worker instead of firing;
    /// effects that had already started running before the rollback was
    /// observed cannot be unwound.
    #[instrument(skip(self))]
    pub async fn rollback_to(&mut self, target: BlockNumber) -> Result<(), HandlerError> {
        self.effect_generation.fetch_add(1, Ordering::SeqCst);
        self.datastore.rollback_to(target).await?;
        warn!(%target, "rolled back; effects already running for discarded blocks cannot be unwound");
        Ok(())
    }

    fn derive_is_replay(&mut self, block_number: BlockNumber) -> bool {
        if self.live {
            return false;
        }
        if block_number > self.max_replay_target {
            self.live = true;
            return false;
        }
        true
    }

    fn validate_sequencing(
        start_at_block: BlockNumber,
        prior: Option<IndexState>,
        block: &Block,
    ) -> Result<(), HandlerError> {
        match prior {
            Some(state) => {
                let expected = state.block_number.next();
                if block.block_number != expected {
                    return Err(HandlerError::OutOfOrderBlock {
                        expected,
                        found: block.block_number,
                    });
                }
                if block.previous_block_hash != state.block_hash {
                    return Err(HandlerError::HashMismatch {
                        block_number: block.block_number,
                        expected: state.block_hash.to_string(),
                        found: block.previous_block_hash.to_string(),
                    });
                }
            }
            None => {
                if block.block_number != start_at_block {
                    return Err(HandlerError::OutOfOrderBlock {
                        expected: start_at_block,
                        found: block.block_number,
                    });
                }
            }
        }
        Ok(())
    }

    async fn dispatch_effects(&self, block: &Block) {
        for action in &block.actions {
            let Some(entries) = self.effects.get(&action.type_) else {
                continue;
            };
            match self.config.effect_run_mode {
                EffectRunMode::Await => {
                    for entry in entries.iter() {
                        if let Err(e) = entry
                            .fire(
                                action.payload.clone(),
                                block.clone(),
                                action.clone(),
                                Arc::clone(&self.effect_ctx),
                            )
                            .await
                        {
                            warn!(action_type = %action.type_, error = %e, "effect failed");
                        }
                    }
                }
                EffectRunMode::FireAndForget => {
                    if let Some(sender) = self.effect_senders.get(&action.type_) {
                        let job = EffectJob {
                            entries: Arc::clone(entries),
                            payload: action.payload.clone(),
                            block: block.clone(),
                            action: action.clone(),
                            ctx: Arc::clone(&self.effect_ctx),
                            generation: self.effect_generation.load(Ordering::SeqCst),
                        };
                        if sender.send(job).await.is_err() {
                            warn!(action_type = %action.type_, "effect worker no longer running");
                        }
                    }
                }
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, HandlerError>>,
    ) -> Result<T, HandlerError> {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::DatastoreUnavailable(Box::new(TimeoutExceeded))),
        }
    }
}

fn spawn_effect_worker<D: DatastoreAdapter>(
    action_type: String,
    mut rx: mpsc::Receiver<EffectJob<D>>,
    generation: Arc<AtomicU64>,
) {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            if job.generation < generation.load(Ordering::SeqCst) {
                warn!(
                    %action_type,
                    block_number = %job.block.block_number,
                    "dropping queued effect for block discarded by rollback"
                );
                continue;
            }
            for entry in job.entries.iter() {
                if let Err(e) = entry
                    .fire(job.payload.clone(), job.block.clone(), job.action.clone(), Arc::clone(&job.ctx))
                    .await
                {
                    warn!(%action_type, error = %e, "effect failed");
                }
            }
        }
    });
}
