//! Throughput of the hot ingestion path: `ActionHandler::handle_block`
//! against the in-memory datastore adapter, under a varying action count.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use demux::test_utils::{MemoryContext, MemoryDatastore};
use demux::{Action, ActionHandler, Block, BlockNumber, HandlerConfig, Hash32, UpdaterEntry};
use serde_json::{json, Value};
use tokio::runtime::Runtime;

fn counting_updater(
    ctx: &mut MemoryContext<'_>,
    _payload: &Value,
    _block: &Block,
    _action: &Action,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let current = ctx.get("count").and_then(Value::as_i64).unwrap_or(0);
    ctx.set("count", Value::from(current + 1));
    Ok(())
}

fn block_with_actions(n: u64, action_count: u32) -> Block {
    Block {
        block_number: BlockNumber(n),
        block_hash: Hash32::new([n as u8; 32]),
        previous_block_hash: Hash32::new([n.saturating_sub(1) as u8; 32]),
        actions: (0..action_count)
            .map(|i| Action {
                type_: "tick".to_string(),
                payload: json!({ "i": i }),
                block_number: BlockNumber(n),
                transaction_id: format!("tx{n}-{i}"),
                action_index: i,
            })
            .collect(),
    }
}

fn bench_handle_block(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("handle_block");

    for action_count in [1u32, 50, 500] {
        group.bench_with_input(
            BenchmarkId::from_parameter(action_count),
            &action_count,
            |b, &action_count| {
                b.to_async(&rt).iter_batched(
                    || {
                        ActionHandler::new(
                            MemoryDatastore::default(),
                            vec![UpdaterEntry::new("tick", counting_updater)],
                            vec![],
                            HandlerConfig::default(),
                            BlockNumber(u64::MAX),
                        )
                    },
                    |mut handler| async move {
                        handler
                            .handle_block(block_with_actions(1, action_count))
                            .await
                            .expect("apply succeeds");
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_handle_block);
criterion_main!(benches);
