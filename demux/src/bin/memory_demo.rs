//! Wires the in-memory adapters to the three core pieces and ingests a
//! handful of blocks, including one shallow reorg, to demonstrate the public
//! API end to end.

use std::time::Duration;

use demux::test_utils::{MemoryChain, MemoryDatastore};
use demux::{
    Action, ActionHandler, ActionReader, ActionWatcher, Block, BlockNumber, HandlerConfig,
    Hash32, ReaderConfig, UpdaterEntry, WatcherConfig,
};
use serde_json::json;

fn block(n: u64, hash_byte: u8, prev_byte: u8, transfers: u32) -> Block {
    Block {
        block_number: BlockNumber(n),
        block_hash: Hash32::new([hash_byte; 32]),
        previous_block_hash: Hash32::new([prev_byte; 32]),
        actions: (0..transfers)
            .map(|i| Action {
                type_: "transfer".to_string(),
                payload: json!({ "amount": i + 1 }),
                block_number: BlockNumber(n),
                transaction_id: format!("0x{n:x}{i:x}"),
                action_index: i,
            })
            .collect(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let chain = MemoryChain::new();
    for n in 1..=5u64 {
        chain.push(block(n, n as u8, (n.saturating_sub(1)) as u8, 2));
    }

    let store = MemoryDatastore::default();

    let reader = ActionReader::new(
        chain,
        ReaderConfig {
            start_at_block: BlockNumber(1),
            ..Default::default()
        },
    );

    let running_total = |ctx: &mut demux::test_utils::MemoryContext<'_>,
                          payload: &serde_json::Value,
                          _block: &Block,
                          _action: &Action|
     -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let amount = payload.get("amount").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let current = ctx.get("total").and_then(serde_json::Value::as_i64).unwrap_or(0);
        ctx.set("total", serde_json::Value::from(current + amount));
        Ok(())
    };

    let handler = ActionHandler::new(
        store,
        vec![UpdaterEntry::new("transfer", running_total)],
        vec![],
        HandlerConfig {
            start_at_block: BlockNumber(1),
            ..Default::default()
        },
        BlockNumber(5),
    );

    let mut watcher = ActionWatcher::new(
        reader,
        handler,
        WatcherConfig {
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let token = watcher.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
    });

    match watcher.watch().await {
        Ok(()) | Err(demux::DemuxError::Canceled) => {
            tracing::info!("demo finished");
        }
        Err(e) => {
            tracing::error!(error = %e, "demo ended with an error");
        }
    }
}
