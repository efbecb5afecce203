//! Configuration structs for the reader, handler, and watcher.
//!
//! These are plain data: the core does not load them from a file or the
//! environment (logging and configuration loading are the host process's
//! concern). A host typically builds one of these however it likes — from
//! TOML, from env vars, from a database row — and passes the result in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::BlockNumber;

/// Whether the Watcher blocks on effect completion before advancing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectRunMode {
    /// Enqueue effects and return immediately; a separate lane drains them.
    #[default]
    FireAndForget,
    /// Await the effect queue's acknowledgement before `handle_block` returns.
    Await,
}

/// Configuration for [`crate::reader::ActionReader`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// First block to ingest.
    pub start_at_block: BlockNumber,
    /// Gate on the chain's last-irreversible-block number, eliminating forks
    /// by construction at the cost of lag.
    pub only_irreversible: bool,
    /// Reader fork-detection depth: the maximum number of blocks the fork
    /// walk will search backwards through before surfacing `ReorgTooDeep`.
    pub history_window: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            start_at_block: BlockNumber(1),
            only_irreversible: false,
            history_window: 180,
        }
    }
}

/// Configuration for [`crate::handler::ActionHandler`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// First block to ingest, mirrored from `ReaderConfig` so the Handler
    /// can validate the genesis case (`IndexState` absent) without coupling
    /// to the Reader instance.
    pub start_at_block: BlockNumber,
    /// Whether the Watcher blocks on effect completion.
    pub effect_run_mode: EffectRunMode,
    /// Per-call deadline for datastore transaction open/commit.
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            start_at_block: BlockNumber(1),
            effect_run_mode: EffectRunMode::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Configuration for [`crate::watcher::ActionWatcher`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Sleep between polls when the Reader reports `NoNewBlock` (typical:
    /// half the source chain's block time).
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Retry budget per block before escalating to `FatalHandlerError`.
    pub max_retries: u32,
    /// Per-call deadline for chain RPC.
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            max_retries: 10,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Aggregate configuration for the whole ingestion/dispatch engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub reader: ReaderConfig,
    pub handler: HandlerConfig,
    pub watcher: WatcherConfig,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.reader.start_at_block, BlockNumber(1));
        assert!(!cfg.reader.only_irreversible);
        assert_eq!(cfg.reader.history_window, 180);
        assert_eq!(cfg.handler.effect_run_mode, EffectRunMode::FireAndForget);
        assert_eq!(cfg.watcher.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.watcher.max_retries, 10);
    }

    #[test]
    fn serde_round_trip() {
        let cfg = CoreConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: CoreConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.watcher.poll_interval, cfg.watcher.poll_interval);
    }
}
