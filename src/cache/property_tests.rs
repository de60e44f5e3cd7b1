//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache client, the codec and sweep batching
//! against simple models.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{codec, CacheClient, CacheKey, CacheStats, SharedStats};
use crate::clock::{Clock, ManualClock};
use crate::store::{
    BatchOperation, MemoryTableStore, RowRef, TableClient, MAX_BATCH_OPERATIONS,
};
use crate::tasks::{SweepBatch, Sweeper};

// == Test Harness ==
struct Fixture {
    clock: Arc<ManualClock>,
    store: Arc<MemoryTableStore>,
    client: CacheClient,
    sweeper: Sweeper,
    stats: SharedStats,
}

async fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryTableStore::with_clock("proptestcache", clock.clone()));
    let table = Arc::new(TableClient::new(store.clone()));
    table.connect().await.unwrap();
    let stats = CacheStats::shared();
    let client = CacheClient::new(table.clone(), clock.clone(), stats.clone());
    let sweeper = Sweeper::new(table, clock.clone(), stats.clone(), Duration::from_secs(60));
    Fixture {
        clock,
        store,
        client,
        sweeper,
        stats,
    }
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// == Strategies ==
fn segment_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["alpha", "beta", "gamma", "delta"]).prop_map(str::to_string)
}

fn id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,8}"
}

/// JSON values the cache must carry unchanged.
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,32}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::hash_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| json!(map)),
        ]
    })
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { id: String, value: i64 },
    Get { id: String },
    Drop { id: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    let id = "[a-d]";
    prop_oneof![
        (id, any::<i64>()).prop_map(|(id, value)| CacheOp::Set { id, value }),
        id.prop_map(|id| CacheOp::Get { id }),
        id.prop_map(|id| CacheOp::Drop { id }),
    ]
}

#[derive(Debug, Clone)]
struct Seeded {
    segment: String,
    id: String,
    ttl_ms: u64,
    eligible: bool,
}

fn seeded_strategy() -> impl Strategy<Value = Seeded> {
    (segment_strategy(), id_strategy(), 0u64..2_000, any::<bool>()).prop_map(
        |(segment, id, ttl_ms, eligible)| Seeded {
            segment,
            id,
            ttl_ms,
            eligible,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Any JSON value written is read back unchanged, with its ttl.
    #[test]
    fn prop_roundtrip_storage(
        segment in segment_strategy(),
        id in id_strategy(),
        value in value_strategy(),
        ttl in 1u64..10_000_000,
    ) {
        let (read, expected_stored) = block_on(async {
            let fx = fixture().await;
            let key = CacheKey::new(segment, id);
            fx.client.set(&key, &value, ttl, true).await.unwrap();
            (fx.client.get::<Value>(&key).await.unwrap(), fx.clock.now_ms())
        });

        let envelope = read.expect("entry should be present");
        prop_assert_eq!(envelope.item, value);
        prop_assert_eq!(envelope.ttl, ttl);
        prop_assert_eq!(envelope.stored, expected_stored);
    }

    // Hits and misses track a model map across any operation sequence.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..40)) {
        let (stats, mismatches, expected_hits, expected_misses) = block_on(async {
            let fx = fixture().await;
            let mut model: HashMap<String, i64> = HashMap::new();
            let mut mismatches = 0;
            let mut expected_hits: u64 = 0;
            let mut expected_misses: u64 = 0;

            for op in ops {
                match op {
                    CacheOp::Set { id, value } => {
                        let key = CacheKey::new("stats", id.clone());
                        fx.client.set(&key, &value, 60_000, false).await.unwrap();
                        model.insert(id, value);
                    }
                    CacheOp::Get { id } => {
                        let key = CacheKey::new("stats", id.clone());
                        let read = fx.client.get::<i64>(&key).await.unwrap();
                        if model.contains_key(&id) {
                            expected_hits += 1;
                        } else {
                            expected_misses += 1;
                        }
                        if read.map(|envelope| envelope.item) != model.get(&id).copied() {
                            mismatches += 1;
                        }
                    }
                    CacheOp::Drop { id } => {
                        fx.client.remove(&CacheKey::new("stats", id.clone())).await.unwrap();
                        model.remove(&id);
                    }
                }
            }
            let stats = fx.stats.lock().clone();
            (stats, mismatches, expected_hits, expected_misses)
        });

        prop_assert_eq!(mismatches, 0);
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
    }

    // The stamped expiry is the write time plus ttl and the sweep filter is strict.
    #[test]
    fn prop_encode_stamps_expiry(ttl in 0u64..1_000_000_000, now in 0i64..4_000_000_000_000) {
        let fields = codec::encode(&"v", ttl, true, now).unwrap();
        let expire_at = now + ttl as i64;

        prop_assert_eq!(fields.expire_at_ms, Some(expire_at));
        prop_assert!(!fields.is_sweepable(expire_at));
        prop_assert!(fields.is_sweepable(expire_at + 1));
    }

    // Batches are single-partition, bounded, and together hold every input row.
    #[test]
    fn prop_partition_invariants(
        rows in prop::collection::vec((segment_strategy(), id_strategy()), 0..400)
    ) {
        let input: Vec<RowRef> = rows
            .into_iter()
            .map(|(segment, id)| RowRef::new(segment, id))
            .collect();
        let batches = SweepBatch::partition(input.clone());

        let total: usize = batches.iter().map(SweepBatch::len).sum();
        prop_assert_eq!(total, input.len());

        let mut regrouped: HashMap<String, Vec<RowRef>> = HashMap::new();
        for batch in batches {
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= MAX_BATCH_OPERATIONS);
            let segment = batch.segment().to_string();
            for op in batch.into_operations() {
                prop_assert_eq!(op.segment(), segment.as_str());
                let BatchOperation::Delete(row) = op;
                regrouped.entry(segment.clone()).or_default().push(row);
            }
        }

        let mut expected: HashMap<String, Vec<RowRef>> = HashMap::new();
        for row in input {
            expected.entry(row.segment.clone()).or_default().push(row);
        }
        prop_assert_eq!(regrouped, expected);
    }

    // Draining the sweeper removes exactly the eligible rows that have expired.
    #[test]
    fn prop_sweep_removes_only_expired_eligible(
        seeded in prop::collection::vec(seeded_strategy(), 0..150),
        elapsed in 0u64..3_000,
    ) {
        let (survivors, expected) = block_on(async {
            let fx = fixture().await;
            // last write per key wins
            let mut latest: HashMap<(String, String), Seeded> = HashMap::new();
            for entry in seeded {
                let key = CacheKey::new(entry.segment.clone(), entry.id.clone());
                fx.client.set(&key, &1, entry.ttl_ms, entry.eligible).await.unwrap();
                latest.insert((entry.segment.clone(), entry.id.clone()), entry);
            }

            fx.clock.advance(Duration::from_millis(elapsed));
            while fx.sweeper.collect().await.unwrap() > 0 {}

            let expected = latest
                .values()
                .filter(|entry| !(entry.eligible && entry.ttl_ms < elapsed))
                .count();
            (fx.store.len(), expected)
        });

        prop_assert_eq!(survivors, expected);
    }
}
