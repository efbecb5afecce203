//! The Action Watcher: polls the Reader, drives the Handler, and owns retry
//! and cancellation policy. The only piece of this crate a host typically
//! drives directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::WatcherConfig;
use crate::error::{DemuxError, HandlerError};
use crate::handler::ActionHandler;
use crate::ports::{ChainAdapter, Clock, DatastoreAdapter, SystemClock};
use crate::reader::{ActionReader, ReaderEvent};

/// Exponential backoff, doubling per attempt and capped at `cap`. `attempt`
/// is zero-indexed (the first retry uses `attempt = 0`).
fn backoff_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Drives ingestion: alternates `reader.get_next_block()` with
/// `handler.handle_block()`, retrying transient failures with backoff and
/// escalating exhausted or structural failures to [`DemuxError`].
pub struct ActionWatcher<C: ChainAdapter, D: DatastoreAdapter, K: Clock = SystemClock> {
    reader: ActionReader<C>,
    handler: ActionHandler<D>,
    config: WatcherConfig,
    clock: K,
    cancellation: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl<C: ChainAdapter, D: DatastoreAdapter> ActionWatcher<C, D, SystemClock> {
    #[must_use]
    pub fn new(reader: ActionReader<C>, handler: ActionHandler<D>, config: WatcherConfig) -> Self {
        Self::with_clock(reader, handler, config, SystemClock)
    }
}

impl<C: ChainAdapter, D: DatastoreAdapter, K: Clock> ActionWatcher<C, D, K> {
    #[must_use]
    pub fn with_clock(
        reader: ActionReader<C>,
        handler: ActionHandler<D>,
        config: WatcherConfig,
        clock: K,
    ) -> Self {
        Self {
            reader,
            handler,
            config,
            clock,
            cancellation: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token the caller can `cancel()` from elsewhere to stop [`Self::watch`].
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Stop advancing the cursor without tearing down the loop. Already
    /// in-flight retries finish; the next poll iteration blocks until
    /// [`Self::resume`].
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Run until cancellation or a fatal error. The typical way to run this
    /// crate: spawn this as a task and hold onto the `CancellationToken`.
    #[instrument(skip(self))]
    pub async fn watch(&mut self) -> Result<(), DemuxError> {
        loop {
            if self.cancellation.is_cancelled() {
                return Err(DemuxError::Canceled);
            }

            if self.is_paused() {
                tokio::select! {
                    () = self.cancellation.cancelled() => return Err(DemuxError::Canceled),
                    () = self.clock.sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            match self.check_for_blocks().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        () = self.cancellation.cancelled() => return Err(DemuxError::Canceled),
                        () = self.clock.sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One poll-and-apply cycle: fetch the next reader event (with retry)
    /// and, if it is a block or rollback, drive it through the handler (with
    /// retry). `Ok(true)` means a block (or rollback) was processed and the
    /// caller should poll again immediately; `Ok(false)` means the chain has
    /// not advanced and the caller should back off. Exposed directly so a
    /// host can drive ingestion one cycle at a time instead of through
    /// [`Self::watch`]'s loop.
    #[instrument(skip(self))]
    pub async fn check_for_blocks(&mut self) -> Result<bool, DemuxError> {
        let event = self.fetch_with_retry().await?;
        match event {
            ReaderEvent::NoNewBlock => Ok(false),
            ReaderEvent::Rollback(target) => {
                self.apply_with_retry(Applied::Rollback(target)).await?;
                Ok(true)
            }
            ReaderEvent::NewBlock(block) => {
                let number = block.block_number;
                self.apply_with_retry(Applied::Block(Box::new(block))).await?;
                info!(block_number = %number, "ingested");
                Ok(true)
            }
        }
    }

    async fn fetch_with_retry(&mut self) -> Result<ReaderEvent, DemuxError> {
        let mut attempt = 0u32;
        loop {
            match tokio::time::timeout(self.config.call_timeout, self.reader.get_next_block()).await {
                Ok(Ok(event)) => return Ok(event),
                Ok(Err(source)) => {
                    let err = DemuxError::from(source);
                    if !err.is_transient() || attempt >= self.config.max_retries {
                        return Err(self.escalate(err, attempt));
                    }
                    self.backoff_and_wait(attempt).await?;
                    attempt += 1;
                }
                Err(_elapsed) => {
                    if attempt >= self.config.max_retries {
                        return Err(self.escalate(
                            DemuxError::Reader(crate::error::ReaderError::ChainUnreachable(
                                "rpc call timed out".to_string(),
                            )),
                            attempt,
                        ));
                    }
                    self.backoff_and_wait(attempt).await?;
                    attempt += 1;
                }
            }
        }
    }

    /// `CommitFailed`/`DatastoreUnavailable` are transient and retry with
    /// backoff unboundedly (capped interval, not capped attempts) — they're
    /// infrastructure hiccups, not evidence the block itself is bad. A
    /// deterministic updater throw gets exactly one retry and then
    /// escalates: a second failure on the same inputs cannot be transient
    /// noise.
    async fn apply_with_retry(&mut self, applied: Applied) -> Result<(), DemuxError> {
        let mut attempt = 0u32;
        let mut gave_extra_try = false;
        loop {
            let outcome = match &applied {
                Applied::Rollback(target) => self.handler.rollback_to(*target).await,
                Applied::Block(block) => self.handler.handle_block((**block).clone()).await.map(|_| ()),
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(source) => {
                    let err = DemuxError::from(source);
                    let is_updater_failure =
                        matches!(err, DemuxError::Handler(HandlerError::UpdaterFailed { .. }));
                    let retryable = err.is_transient() || (!gave_extra_try && is_updater_failure);
                    let attempt_capped = !err.is_transient() || is_updater_failure;

                    if !retryable || (attempt_capped && attempt >= self.config.max_retries) {
                        return Err(self.escalate(err, attempt));
                    }
                    if is_updater_failure {
                        gave_extra_try = true;
                    }
                    self.backoff_and_wait(attempt).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn backoff_and_wait(&self, attempt: u32) -> Result<(), DemuxError> {
        let cap = self.config.poll_interval.saturating_mul(30).max(self.config.poll_interval);
        let delay = backoff_delay(self.config.poll_interval, attempt, cap);
        warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient error");
        tokio::select! {
            () = self.cancellation.cancelled() => Err(DemuxError::Canceled),
            () = self.clock.sleep(delay) => Ok(()),
        }
    }

    fn escalate(&self, source: DemuxError, attempts: u32) -> DemuxError {
        match &source {
            DemuxError::Reader(_) | DemuxError::Handler(_) if source.is_transient() => {
                DemuxError::FatalHandlerError {
                    block_number: self.reader.current_head().unwrap_or(crate::types::BlockNumber(0)),
                    attempts: attempts + 1,
                    source: Box::new(source),
                }
            }
            _ => source,
        }
    }
}

enum Applied {
    Block(Box<crate::types::Block>),
    Rollback(crate::types::BlockNumber),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(base, 0, cap), Duration::from_millis(250));
        assert_eq!(backoff_delay(base, 1, cap), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2, cap), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 20, cap), cap);
    }

    #[test]
    fn backoff_at_zero_attempts_is_base() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0, Duration::from_secs(10)), base);
    }

    #[cfg(feature = "test-utils")]
    mod check_for_blocks {
        use crate::test_utils::{MemoryChain, MemoryDatastore};
        use crate::types::{Block, BlockNumber, Hash32};
        use crate::{ActionHandler, ActionReader, HandlerConfig, ReaderConfig};

        use super::*;

        fn block(n: u64, hash_byte: u8, prev_byte: u8) -> Block {
            Block {
                block_number: BlockNumber(n),
                block_hash: Hash32::new([hash_byte; 32]),
                previous_block_hash: Hash32::new([prev_byte; 32]),
                actions: Vec::new(),
            }
        }

        fn watcher(
            chain: MemoryChain,
        ) -> ActionWatcher<MemoryChain, MemoryDatastore> {
            let reader = ActionReader::new(
                chain,
                ReaderConfig {
                    start_at_block: BlockNumber(1),
                    ..Default::default()
                },
            );
            let handler = ActionHandler::new(
                MemoryDatastore::default(),
                Vec::new(),
                Vec::new(),
                HandlerConfig {
                    start_at_block: BlockNumber(1),
                    ..Default::default()
                },
                BlockNumber(0),
            );
            ActionWatcher::new(reader, handler, WatcherConfig::default())
        }

        #[tokio::test]
        async fn no_new_block_reports_false_without_advancing() {
            let chain = MemoryChain::new();
            let mut w = watcher(chain);

            let advanced = w.check_for_blocks().await.unwrap();

            assert!(!advanced);
            assert!(w.handler.load_index_state().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn one_cycle_ingests_exactly_one_block() {
            let chain = MemoryChain::new();
            chain.push(block(1, 1, 0));
            chain.push(block(2, 2, 1));
            let mut w = watcher(chain);

            let advanced = w.check_for_blocks().await.unwrap();
            assert!(advanced);
            let state = w.handler.load_index_state().await.unwrap().unwrap();
            assert_eq!(state.block_number, BlockNumber(1));

            let advanced = w.check_for_blocks().await.unwrap();
            assert!(advanced);
            let state = w.handler.load_index_state().await.unwrap().unwrap();
            assert_eq!(state.block_number, BlockNumber(2));
        }
    }
}
