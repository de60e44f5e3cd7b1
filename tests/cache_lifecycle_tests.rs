//! Integration Tests for the Table Cache
//!
//! Drives the public `TableCache` surface against the in-memory store, with a
//! manual clock for expiry and short real intervals for the sweep loop.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use table_cache::{
    clock::{Clock, ManualClock},
    store::{MemoryTableStore, RowFields, StoreOperation, TableStore, UpsertMode},
    CacheError, CacheKey, Config, SweepError, TableCache, TtlInterval,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

struct Harness {
    cache: TableCache,
    store: Arc<MemoryTableStore>,
    clock: Arc<ManualClock>,
}

async fn harness(ttl_interval: TtlInterval) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryTableStore::with_clock("lifecycletests", clock.clone()));
    let config = Config::new("", "lifecycletests", ttl_interval).unwrap();
    let cache = TableCache::with_clock(config, store.clone(), clock.clone());
    cache.start().await.unwrap();
    Harness {
        cache,
        store,
        clock,
    }
}

/// An interval long enough that the loop never ticks during a test.
fn idle() -> TtlInterval {
    TtlInterval::Every(Duration::from_secs(3600))
}

fn every(ms: u64) -> TtlInterval {
    TtlInterval::Every(Duration::from_millis(ms))
}

async fn seed_expired(h: &Harness, segment: &str, count: usize) {
    for i in 0..count {
        let key = CacheKey::new(segment, format!("item{i:03}"));
        h.cache.set(&key, &i, 10).await.unwrap();
    }
}

// == Request Path ==

#[tokio::test]
async fn test_roundtrip() {
    let h = harness(idle()).await;
    let key = CacheKey::new("users", "42");
    let value = json!({"name": "alice", "roles": ["admin"], "age": 31});

    assert_ok!(h.cache.set(&key, &value, 60_000).await);
    let envelope = h.cache.get::<Value>(&key).await.unwrap().unwrap();

    assert_eq!(envelope.item, value);
    assert_eq!(envelope.ttl, 60_000);
}

#[tokio::test]
async fn test_remove_twice_is_not_an_error() {
    let h = harness(idle()).await;
    let key = CacheKey::new("s", "1");
    h.cache.set(&key, &"v", 1_000).await.unwrap();

    assert_ok!(h.cache.remove(&key).await);
    assert_ok!(h.cache.remove(&key).await);
    assert!(h.cache.get::<String>(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_record_names_segment_and_id() {
    let h = harness(idle()).await;
    h.store
        .upsert_entity(
            "broken",
            "7",
            RowFields {
                item: Some("{not json".to_string()),
                ttl_ms: Some(1_000),
                expire_at_ms: Some(h.clock.now_ms() + 1_000),
                sweep_eligible: Some(true),
            },
            UpsertMode::Replace,
        )
        .await
        .unwrap();

    let err = assert_err!(h.cache.get::<Value>(&CacheKey::new("broken", "7")).await);
    assert!(matches!(err, CacheError::CorruptRecord { .. }));
    let message = err.to_string();
    assert!(message.contains("\"broken\""));
    assert!(message.contains("\"7\""));
}

#[tokio::test]
async fn test_backend_failure_propagates_to_caller() {
    let h = harness(idle()).await;
    h.store.fail_next(
        StoreOperation::Upsert,
        CacheError::backend(409, "Conflict", "row changed"),
    );

    let err = assert_err!(h.cache.set(&CacheKey::new("s", "1"), &1, 1_000).await);
    assert!(matches!(err, CacheError::Backend { status: 409, .. }));
}

// == Sweeping ==

#[tokio::test]
async fn test_ttl_expiry() {
    let h = harness(idle()).await;
    let key = CacheKey::new("s", "1");
    h.cache.set(&key, &json!({"a": 1}), 100).await.unwrap();

    h.clock.advance(Duration::from_millis(200));
    let sweeper = h.cache.sweeper().unwrap();

    assert_eq!(sweeper.collect().await.unwrap(), 1);
    assert!(h.cache.get::<Value>(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_ineligible_entries_survive_sweep() {
    let h = harness(idle()).await;
    let key = CacheKey::new("s", "4");
    h.cache
        .client()
        .set(&key, &"keep me", 50, false)
        .await
        .unwrap();

    h.clock.advance(Duration::from_millis(200));

    assert_eq!(h.cache.sweeper().unwrap().collect().await.unwrap(), 0);
    let envelope = h.cache.get::<String>(&key).await.unwrap().unwrap();
    assert_eq!(envelope.item, "keep me");
}

#[tokio::test]
async fn test_batch_cap_drains_in_two_passes() {
    let h = harness(idle()).await;
    seed_expired(&h, "bulk", 101).await;
    h.clock.advance(Duration::from_millis(100));
    let sweeper = h.cache.sweeper().unwrap();

    assert_eq!(sweeper.collect().await.unwrap(), 100);
    assert_eq!(sweeper.collect().await.unwrap(), 1);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_cross_partition_batching() {
    let h = harness(idle()).await;
    seed_expired(&h, "A", 51).await;
    seed_expired(&h, "B", 51).await;
    h.clock.advance(Duration::from_millis(100));
    let sweeper = h.cache.sweeper().unwrap();

    assert_eq!(sweeper.collect().await.unwrap(), 100);
    assert_eq!(sweeper.collect().await.unwrap(), 2);
    assert_eq!(sweeper.collect().await.unwrap(), 0);
    assert_eq!(h.store.segment_len("A") + h.store.segment_len("B"), 0);
}

#[tokio::test]
async fn test_concurrent_collect_counts_each_entry_once() {
    let h = harness(idle()).await;
    seed_expired(&h, "A", 30).await;
    seed_expired(&h, "B", 40).await;
    h.clock.advance(Duration::from_millis(100));
    let sweeper = h.cache.sweeper().unwrap().clone();
    let other = sweeper.clone();

    let (first, second) = tokio::join!(sweeper.collect(), other.collect());

    assert_eq!(first.unwrap() + second.unwrap(), 70);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_sweep_stats() {
    let h = harness(idle()).await;
    seed_expired(&h, "s", 5).await;
    h.clock.advance(Duration::from_millis(100));

    h.cache.sweeper().unwrap().collect().await.unwrap();

    let stats = h.cache.stats();
    assert_eq!(stats.sets, 5);
    assert_eq!(stats.sweeps, 1);
    assert_eq!(stats.swept, 5);
}

// == Sweep Loop ==

#[tokio::test]
async fn test_loop_emits_collected_counts() {
    let h = harness(every(20)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.cache.sweeper().unwrap().on_collected(move |deleted| {
        let _ = tx.send(deleted);
        Ok(())
    });
    seed_expired(&h, "s", 3).await;
    h.clock.advance(Duration::from_millis(100));

    let mut total = 0;
    while total < 3 {
        total += timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(total, 3);
    assert!(h.cache.is_ready());
    h.cache.stop();
}

#[tokio::test]
async fn test_transient_failure_keeps_loop_running() {
    let h = harness(every(20)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.cache.sweeper().unwrap().on_error(move |err: &SweepError| {
        let _ = tx.send(err.is_fatal());
    });
    h.store.fail_next(
        StoreOperation::Query,
        CacheError::backend(503, "ServerBusy", "try later"),
    );

    let fatal = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert!(!fatal);
    assert!(h.cache.is_ready());
    h.cache.stop();
}

#[tokio::test]
async fn test_handler_failure_stops_loop_until_restart() {
    let h = harness(every(20)).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sweeper = h.cache.sweeper().unwrap();
    sweeper.on_collected(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("handler blew up");
        }
        Ok(())
    });
    sweeper.on_error(move |err: &SweepError| {
        let _ = tx.send(err.is_fatal());
    });

    let fatal = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(fatal);
    assert!(!h.cache.is_ready());

    // stays stopped
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.cache.start().await.unwrap();
    assert!(h.cache.is_ready());
    timeout(Duration::from_secs(2), async {
        while calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    h.cache.stop();
}

#[tokio::test]
async fn test_panicking_handler_stops_loop() {
    let h = harness(every(20)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sweeper = h.cache.sweeper().unwrap();
    sweeper.on_collected(|_| {
        let empty: Vec<usize> = Vec::new();
        let _first = empty[0];
        Ok(())
    });
    sweeper.on_error(move |err: &SweepError| {
        let _ = tx.send(err.is_fatal());
    });

    let fatal = timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(fatal);
    assert!(!h.cache.is_ready());
    assert!(!sweeper.is_ready());
}

#[tokio::test]
async fn test_manual_collect_emits_collected() {
    let h = harness(idle()).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sweeper = h.cache.sweeper().unwrap();
    sweeper.on_collected(move |deleted| {
        let _ = tx.send(deleted);
        Ok(())
    });
    seed_expired(&h, "s", 2).await;
    h.clock.advance(Duration::from_millis(100));

    assert_eq!(sweeper.collect().await.unwrap(), 2);
    assert_eq!(rx.try_recv().ok(), Some(2));
    assert!(h.cache.is_ready());
}

// == Lifecycle ==

#[tokio::test]
async fn test_start_stop_is_ready() {
    let clock = Arc::new(ManualClock::new());
    let store = Arc::new(MemoryTableStore::with_clock("lifecycletests", clock.clone()));
    let config = Config::new("", "lifecycletests", idle()).unwrap();
    let cache = TableCache::with_clock(config, store.clone(), clock);

    assert!(!cache.is_ready());
    cache.stop();

    cache.start().await.unwrap();
    cache.start().await.unwrap();
    assert!(cache.is_ready());
    assert_eq!(store.ensure_table_calls(), 1);

    cache.stop();
    cache.stop();
    assert!(!cache.is_ready());
    assert!(matches!(
        cache.get::<Value>(&CacheKey::new("s", "1")).await,
        Err(CacheError::NotStarted)
    ));
}

#[tokio::test]
async fn test_disabled_sweeping_marks_entries_ineligible() {
    let h = harness(TtlInterval::Disabled).await;
    let key = CacheKey::new("s", "1");
    h.cache.set(&key, &1, 10).await.unwrap();
    h.clock.advance(Duration::from_millis(100));

    assert!(h.cache.sweeper().is_none());
    assert!(h.cache.is_ready());
    assert!(h.cache.get::<i32>(&key).await.unwrap().is_some());
}

#[test]
fn test_configuration_errors() {
    assert!(matches!(
        Config::new("", "", idle()),
        Err(CacheError::Configuration(_))
    ));
    for bad in [json!(true), json!(null), json!(0), json!(-1), json!("100")] {
        let err = Config::from_value(&json!({"partition": "cache", "ttl_interval": bad}))
            .unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
    }
    assert!(TableCache::from_config(
        Config::new("redis://localhost", "cache", TtlInterval::Disabled).unwrap()
    )
    .is_err());
}
