//! In-memory [`ChainAdapter`]/[`DatastoreAdapter`] implementations.
//!
//! Gated behind the `test-utils` feature: useful for integration tests, the
//! bundled demo binary, and downstream crates exploring the API, but not
//! something a production deployment should reach for.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HandlerError, ReaderError};
use crate::ports::{ChainAdapter, DatastoreAdapter};
use crate::types::{Block, BlockNumber, IndexState};

/// An in-memory chain. Blocks are pushed (or replaced, to simulate a reorg)
/// by the test or demo driving it; `get_head_block_number` reflects whatever
/// height was last pushed or replaced to.
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks: Mutex<HashMap<u64, Block>>,
    head: Mutex<u64>,
}

impl MemoryChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block, advancing the head if it extends past the current tip.
    pub fn push(&self, block: Block) {
        let n = block.block_number.get();
        self.blocks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(n, block);
        let mut head = self.head.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if n > *head {
            *head = n;
        }
    }

    /// Overwrite a block at an existing height and set the head explicitly,
    /// simulating a chain reorg.
    pub fn replace(&self, block: Block, new_head: u64) {
        let n = block.block_number.get();
        self.blocks.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(n, block);
        *self.head.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = new_head;
    }
}

#[async_trait]
impl ChainAdapter for MemoryChain {
    async fn get_head_block_number(&self) -> Result<BlockNumber, ReaderError> {
        Ok(BlockNumber(*self.head.lock().unwrap_or_else(std::sync::PoisonError::into_inner)))
    }

    async fn get_block(&self, n: BlockNumber) -> Result<Option<Block>, ReaderError> {
        Ok(self
            .blocks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&n.get())
            .cloned())
    }
}

struct Snapshot {
    block_number: BlockNumber,
    table: HashMap<String, Value>,
    index_state: Option<IndexState>,
}

struct MemoryInner {
    history: VecDeque<Snapshot>,
}

/// An in-memory key/value datastore with snapshot-based rollback.
///
/// Updaters get a `&mut HashMap<String, Value>` scoped to the open
/// transaction; effects get a handle to the live, committed table (so a long
/// running effect worker always reads current state, not a point-in-time
/// copy taken at handler construction).
pub struct MemoryDatastore {
    table: Arc<Mutex<HashMap<String, Value>>>,
    index_state: Mutex<Option<IndexState>>,
    inner: Mutex<MemoryInner>,
    history_window: usize,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MemoryDatastore {
    #[must_use]
    pub fn new(history_window: usize) -> Self {
        Self {
            table: Arc::new(Mutex::new(HashMap::new())),
            index_state: Mutex::new(None),
            inner: Mutex::new(MemoryInner {
                history: VecDeque::new(),
            }),
            history_window,
        }
    }
}

/// The working copy applied to the live table on commit, discarded on
/// rollback.
pub struct MemoryTx {
    table: HashMap<String, Value>,
    index_state: Option<IndexState>,
}

/// The read/write surface handed to updater functions.
pub struct MemoryContext<'a> {
    table: &'a mut HashMap<String, Value>,
}

impl<'a> MemoryContext<'a> {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.table.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.table.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.table.remove(key)
    }
}

#[async_trait]
impl DatastoreAdapter for MemoryDatastore {
    type Tx = MemoryTx;
    type Context<'a> = MemoryContext<'a>;
    type EffectContext = Arc<Mutex<HashMap<String, Value>>>;

    async fn begin_transaction(&self) -> Result<Self::Tx, HandlerError> {
        Ok(MemoryTx {
            table: self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone(),
            index_state: *self.index_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), HandlerError> {
        let Some(state) = tx.index_state else {
            // Nothing to persist a cursor for; apply the table change anyway.
            *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = tx.table;
            return Ok(());
        };
        *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = tx.table.clone();
        *self.index_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(state);

        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.history.push_back(Snapshot {
            block_number: state.block_number,
            table: tx.table,
            index_state: Some(state),
        });
        while inner.history.len() > self.history_window {
            inner.history.pop_front();
        }
        Ok(())
    }

    async fn rollback(&self, _tx: Self::Tx) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn read_index_state(&self, tx: &mut Self::Tx) -> Result<Option<IndexState>, HandlerError> {
        Ok(tx.index_state)
    }

    async fn write_index_state(
        &self,
        tx: &mut Self::Tx,
        state: IndexState,
    ) -> Result<(), HandlerError> {
        tx.index_state = Some(state);
        Ok(())
    }

    fn context<'a>(&'a self, tx: &'a mut Self::Tx) -> Self::Context<'a> {
        MemoryContext { table: &mut tx.table }
    }

    fn effect_context(&self) -> Self::EffectContext {
        Arc::clone(&self.table)
    }

    async fn rollback_to(&self, target: BlockNumber) -> Result<(), HandlerError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(prev) = target.checked_prev() else {
            inner.history.clear();
            *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = HashMap::new();
            *self.index_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            return Ok(());
        };

        while let Some(snapshot) = inner.history.back() {
            if snapshot.block_number <= prev {
                break;
            }
            inner.history.pop_back();
        }

        match inner.history.back() {
            Some(snapshot) => {
                *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = snapshot.table.clone();
                *self.index_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = snapshot.index_state;
            }
            None => {
                *self.table.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = HashMap::new();
                *self.index_state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            }
        }
        Ok(())
    }
}
