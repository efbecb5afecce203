//! Demux: a deterministic action-ingestion and dispatch engine for
//! reorg-capable, append-only chains.
//!
//! Three pieces compose at a host's discretion:
//!
//! - [`reader::ActionReader`] walks a [`ports::ChainAdapter`] forward,
//!   detecting forks against a bounded history window and emitting
//!   [`reader::ReaderEvent`]s.
//! - [`handler::ActionHandler`] applies a block's actions to a
//!   [`ports::DatastoreAdapter`] inside a single transaction, then dispatches
//!   registered effects for live (non-replay) blocks.
//! - [`watcher::ActionWatcher`] drives the two in a loop, with retry,
//!   backoff, pause/resume, and cancellation.
//!
//! None of the three ships a concrete chain client or datastore; callers
//! supply both by implementing the traits in [`ports`].

pub mod config;
pub mod error;
pub mod handler;
pub mod ports;
pub mod reader;
pub mod registry;
pub mod types;
pub mod watcher;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use config::{CoreConfig, EffectRunMode, HandlerConfig, ReaderConfig, WatcherConfig};
pub use error::{DemuxError, HandlerError as HandlerErrorKind, ReaderError, Result};
pub use handler::ActionHandler;
pub use ports::{ChainAdapter, Clock, DatastoreAdapter, FakeClock, SystemClock};
pub use reader::{ActionReader, ReaderEvent};
pub use registry::{Effect, EffectEntry, Updater, UpdaterEntry};
pub use types::{Action, Block, BlockNumber, Hash32, IndexState};
pub use watcher::ActionWatcher;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn public_surface_is_reachable() {
        let _ = ReaderConfig::default();
        let _ = HandlerConfig::default();
        let _ = WatcherConfig::default();
        let _ = CoreConfig::default();
    }
}
