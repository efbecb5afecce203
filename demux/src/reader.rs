//! The Action Reader: walks the chain forward, detects forks, and rewinds.

use std::collections::VecDeque;

use tracing::{debug, instrument, warn};

use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::ports::ChainAdapter;
use crate::types::{Block, BlockNumber, Hash32};

/// What [`ActionReader::get_next_block`] hands the Watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// The next canonical block after the current head.
    NewBlock(Block),
    /// The chain has diverged; the Handler must roll back to and including
    /// `target - 1`, discarding blocks at or above `target`.
    Rollback(BlockNumber),
    /// The chain's head has not advanced past the cursor; back off.
    NoNewBlock,
}

/// The chain walker. Maintains a cursor and a bounded history of recently
/// accepted `(blockNumber, blockHash)` pairs used to locate a fork's
/// divergence point.
pub struct ActionReader<C: ChainAdapter> {
    chain: C,
    config: ReaderConfig,
    head: Option<(BlockNumber, Hash32)>,
    history: VecDeque<(BlockNumber, Hash32)>,
}

impl<C: ChainAdapter> std::fmt::Debug for ActionReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionReader")
            .field("head", &self.head)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl<C: ChainAdapter> ActionReader<C> {
    #[must_use]
    pub fn new(chain: C, config: ReaderConfig) -> Self {
        Self {
            chain,
            config,
            head: None,
            history: VecDeque::new(),
        }
    }

    /// Reset the cursor so the next [`Self::get_next_block`] call returns
    /// block `n`, regardless of hash linkage to whatever was previously
    /// accepted. Clears the history window.
    pub fn seek_to_block(&mut self, n: BlockNumber) {
        self.head = None;
        self.history.clear();
        self.config.start_at_block = n;
    }

    /// The last block number this Reader returned, if any.
    #[must_use]
    pub fn current_head(&self) -> Option<BlockNumber> {
        self.head.map(|(n, _)| n)
    }

    #[instrument(skip(self), fields(head = ?self.head))]
    pub async fn get_next_block(&mut self) -> Result<ReaderEvent, ReaderError> {
        match self.head {
            None => self.initialize().await,
            Some((n, h)) => self.advance(n, h).await,
        }
    }

    async fn chain_tip(&self) -> Result<Option<BlockNumber>, ReaderError> {
        if self.config.only_irreversible {
            self.chain.get_irreversible_block_number().await
        } else {
            self.chain.get_head_block_number().await.map(Some)
        }
    }

    async fn initialize(&mut self) -> Result<ReaderEvent, ReaderError> {
        let start = self.config.start_at_block;
        let Some(tip) = self.chain_tip().await? else {
            return Ok(ReaderEvent::NoNewBlock);
        };
        if tip < start {
            return Ok(ReaderEvent::NoNewBlock);
        }
        let block = self
            .chain
            .get_block(start)
            .await?
            .ok_or(ReaderError::BlockNotFound(start))?;
        self.accept(start, block.block_hash);
        debug!(block_number = %start, "reader initialized");
        Ok(ReaderEvent::NewBlock(block))
    }

    async fn advance(
        &mut self,
        n: BlockNumber,
        h: Hash32,
    ) -> Result<ReaderEvent, ReaderError> {
        let target = n.next();
        let Some(tip) = self.chain_tip().await? else {
            return Ok(ReaderEvent::NoNewBlock);
        };
        if tip < target {
            return Ok(ReaderEvent::NoNewBlock);
        }
        let Some(candidate) = self.chain.get_block(target).await? else {
            return Ok(ReaderEvent::NoNewBlock);
        };
        if candidate.previous_block_hash == h {
            self.accept(target, candidate.block_hash);
            return Ok(ReaderEvent::NewBlock(candidate));
        }
        warn!(at = %n, "fork detected, walking history window");
        self.handle_fork().await
    }

    async fn handle_fork(&mut self) -> Result<ReaderEvent, ReaderError> {
        let candidates: Vec<_> = self.history.iter().rev().copied().collect();
        for (n, h) in candidates {
            let onchain = self
                .chain
                .get_block(n)
                .await?
                .ok_or(ReaderError::BlockNotFound(n))?;
            if onchain.block_hash == h {
                self.truncate_history_to(n);
                self.head = Some((n, h));
                debug!(fork_point = %n, "fork point located");
                return Ok(ReaderEvent::Rollback(n.next()));
            }
        }
        Err(ReaderError::ReorgTooDeep {
            depth: u32::try_from(self.history.len()).unwrap_or(u32::MAX),
            max: self.config.history_window,
        })
    }

    fn accept(&mut self, n: BlockNumber, h: Hash32) {
        self.history.push_back((n, h));
        while self.history.len() > self.config.history_window as usize {
            self.history.pop_front();
        }
        self.head = Some((n, h));
    }

    fn truncate_history_to(&mut self, n: BlockNumber) {
        self.history.retain(|(entry_n, _)| *entry_n <= n);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// An in-memory chain that can be mutated mid-test to simulate growth
    /// and reorgs, mirroring the Mock state stores the reference indexer
    /// uses in its reorg-handling tests.
    struct MockChain {
        blocks: Mutex<HashMap<u64, Block>>,
        head: Mutex<u64>,
    }

    impl MockChain {
        fn new() -> Self {
            Self {
                blocks: Mutex::new(HashMap::new()),
                head: Mutex::new(0),
            }
        }

        fn push(&self, block: Block) {
            let n = block.block_number.get();
            self.blocks.lock().expect("lock").insert(n, block);
            let mut head = self.head.lock().expect("lock");
            if n > *head {
                *head = n;
            }
        }

        /// Overwrite a block (simulating a reorg) without bumping head
        /// beyond what's passed explicitly.
        fn replace(&self, block: Block, new_head: u64) {
            let n = block.block_number.get();
            self.blocks.lock().expect("lock").insert(n, block);
            *self.head.lock().expect("lock") = new_head;
        }
    }

    fn hash(byte: u8) -> Hash32 {
        Hash32::new([byte; 32])
    }

    fn block(n: u64, hash_byte: u8, prev_byte: u8) -> Block {
        Block {
            block_number: BlockNumber(n),
            block_hash: hash(hash_byte),
            previous_block_hash: hash(prev_byte),
            actions: Vec::new(),
        }
    }

    #[async_trait]
    impl ChainAdapter for MockChain {
        async fn get_head_block_number(&self) -> Result<BlockNumber, ReaderError> {
            Ok(BlockNumber(*self.head.lock().expect("lock")))
        }

        async fn get_block(&self, n: BlockNumber) -> Result<Option<Block>, ReaderError> {
            Ok(self.blocks.lock().expect("lock").get(&n.get()).cloned())
        }
    }

    fn reader(chain: MockChain, history_window: u32) -> ActionReader<MockChain> {
        ActionReader::new(
            chain,
            ReaderConfig {
                start_at_block: BlockNumber(100),
                only_irreversible: false,
                history_window,
            },
        )
    }

    #[tokio::test]
    async fn no_new_block_before_start() {
        let chain = MockChain::new();
        chain.push(block(50, 1, 0));
        let mut r = reader(chain, 10);
        assert_eq!(r.get_next_block().await.unwrap(), ReaderEvent::NoNewBlock);
    }

    #[tokio::test]
    async fn happy_path_streams_forward() {
        let chain = MockChain::new();
        for n in 100..=103 {
            chain.push(block(n, n as u8, (n - 1) as u8));
        }
        let mut r = reader(chain, 10);
        for expected in 100u64..=103 {
            let ev = r.get_next_block().await.unwrap();
            assert_eq!(ev, ReaderEvent::NewBlock(block(expected, expected as u8, (expected - 1) as u8)));
        }
        assert_eq!(r.current_head(), Some(BlockNumber(103)));
    }

    #[tokio::test]
    async fn no_new_block_once_caught_up() {
        let chain = MockChain::new();
        chain.push(block(100, 100, 99));
        let mut r = reader(chain, 10);
        assert!(matches!(
            r.get_next_block().await.unwrap(),
            ReaderEvent::NewBlock(_)
        ));
        assert_eq!(r.get_next_block().await.unwrap(), ReaderEvent::NoNewBlock);
    }

    #[tokio::test]
    async fn shallow_fork_emits_single_rollback() {
        let chain = MockChain::new();
        for n in 100..=103u64 {
            chain.push(block(n, n as u8, (n - 1) as u8));
        }
        let mut r = reader(chain, 10);
        for _ in 0..4 {
            assert!(matches!(
                r.get_next_block().await.unwrap(),
                ReaderEvent::NewBlock(_)
            ));
        }
        // Reorg at 102: new 102', 103', 104'.
        let chain = r.chain_tip_test_handle();
        chain.replace(block(102, 202, 101), 104);
        chain.replace(block(103, 203, 202), 104);
        chain.push(block(104, 204, 203));

        let ev = r.get_next_block().await.unwrap();
        assert_eq!(ev, ReaderEvent::Rollback(BlockNumber(102)));
        assert_eq!(r.current_head(), Some(BlockNumber(101)));

        assert_eq!(
            r.get_next_block().await.unwrap(),
            ReaderEvent::NewBlock(block(102, 202, 101))
        );
        assert_eq!(
            r.get_next_block().await.unwrap(),
            ReaderEvent::NewBlock(block(103, 203, 202))
        );
        assert_eq!(
            r.get_next_block().await.unwrap(),
            ReaderEvent::NewBlock(block(104, 204, 203))
        );
    }

    #[tokio::test]
    async fn deep_fork_beyond_window_is_rejected() {
        let chain = MockChain::new();
        for n in 100..=105u64 {
            chain.push(block(n, n as u8, (n - 1) as u8));
        }
        let mut r = reader(chain, 2); // window too shallow for a 5-deep fork
        for _ in 0..6 {
            assert!(matches!(
                r.get_next_block().await.unwrap(),
                ReaderEvent::NewBlock(_)
            ));
        }
        let chain = r.chain_tip_test_handle();
        // Replace everything from 101 onward with a divergent branch, then
        // add one more block past it so the Reader has something to fetch
        // at `head + 1` and notices the hash-link break.
        for n in 101..=105u64 {
            chain.replace(block(n, 100 + n as u8, (99 + n) as u8), 105);
        }
        chain.push(block(106, 206, 205));
        let err = r.get_next_block().await.unwrap_err();
        assert!(matches!(err, ReaderError::ReorgTooDeep { .. }));
    }

    #[tokio::test]
    async fn seek_to_block_clears_history_and_resets_cursor() {
        let chain = MockChain::new();
        for n in 100..=102u64 {
            chain.push(block(n, n as u8, (n - 1) as u8));
        }
        chain.push(block(200, 200, 199));
        let mut r = reader(chain, 10);
        for _ in 0..3 {
            r.get_next_block().await.unwrap();
        }
        r.seek_to_block(BlockNumber(200));
        assert_eq!(r.current_head(), None);
        let ev = r.get_next_block().await.unwrap();
        assert_eq!(ev, ReaderEvent::NewBlock(block(200, 200, 199)));
    }

    impl<C: ChainAdapter> ActionReader<C> {
        /// Test-only escape hatch to reach into the owned chain adapter.
        fn chain_tip_test_handle(&self) -> &C {
            &self.chain
        }
    }
}
