//! Restore pipeline tests.
//!
//! Full runs through `RestoreEngine::run_range` with a memory store and a
//! `MemoryProducer`:
//! - Per-day ordering and record splitting
//! - Empty days and empty buffers
//! - Fatal listing failures
//! - Re-runs duplicating output
//! - Dead-letter capture of undelivered records
//! - Producer close and connection failures

use bytes::Bytes;
use std::sync::Arc;

use kafka_restore_core::{
    DateRange, DeliveryFailurePolicy, Error, MemoryProducer, Producer, ProducerMessage,
    RestoreEngine, RunState, StorageBackend,
};

use super::helpers::{
    date, memory_config, payload_strings, seeded_store, CountingStore, FailingListStore, TOPIC,
};

async fn run_with_memory_producer(
    engine: &RestoreEngine,
    range: DateRange,
) -> (kafka_restore_core::Result<kafka_restore_core::RestoreReport>, Arc<MemoryProducer>) {
    let (producer, reports) = MemoryProducer::new();
    let producer = Arc::new(producer);
    let result = engine.run_range(range, producer.clone(), reports).await;
    (result, producer)
}

// ============================================================================
// Splitting and ordering
// ============================================================================

#[tokio::test]
async fn single_day_two_objects_publishes_three_records() {
    let store = seeded_store(&[(1, "part-0000.log", "a\nb\n"), (1, "part-0001.log", "c")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    let report = result.unwrap();

    // Memory store lists lexicographically, so part-0000 comes first
    assert_eq!(payload_strings(&producer.payloads()), vec!["a", "b", "c"]);
    assert_eq!(report.records, 3);
    assert_eq!(report.objects, 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failed, 0);
    assert!(producer.is_closed());
}

#[tokio::test]
async fn records_keep_line_order_within_a_buffer() {
    let store = seeded_store(&[(1, "part-0000.log", "first\nsecond\nthird\nfourth")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    result.unwrap();

    assert_eq!(
        payload_strings(&producer.payloads()),
        vec!["first", "second", "third", "fourth"]
    );
}

#[tokio::test]
async fn messages_use_destination_topic() {
    let store = seeded_store(&[(1, "part-0000.log", "x\n")]).await;
    let mut config = memory_config(1, 1);
    config.restore.destination_topic = Some("orders-restored".to_string());
    let engine = RestoreEngine::with_storage(config, store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    let report = result.unwrap();

    assert_eq!(report.source_topic, TOPIC);
    assert_eq!(report.destination_topic, "orders-restored");
    assert!(producer
        .messages()
        .iter()
        .all(|m| m.topic == "orders-restored"));
}

#[tokio::test]
async fn days_are_replayed_in_range_order() {
    let store = seeded_store(&[
        (3, "part-0000.log", "day3\n"),
        (1, "part-0000.log", "day1\n"),
        (2, "part-0000.log", "day2\n"),
    ])
    .await;
    let engine = RestoreEngine::with_storage(memory_config(1, 3), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(3))).await;
    let report = result.unwrap();

    assert_eq!(
        payload_strings(&producer.payloads()),
        vec!["day1", "day2", "day3"]
    );
    let dates: Vec<_> = report.days.iter().map(|d| d.partition.date).collect();
    assert_eq!(dates, vec![date(1), date(2), date(3)]);
}

// ============================================================================
// Empty days and buffers
// ============================================================================

#[tokio::test]
async fn empty_day_is_skipped_without_blocking() {
    let store = seeded_store(&[(1, "part-0000.log", "one\n"), (3, "part-0000.log", "three\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 3), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(3))).await;
    let report = result.unwrap();

    let day2 = &report.days[1];
    assert_eq!(day2.partition.date, date(2));
    assert_eq!(day2.announced, 0);
    assert_eq!(day2.objects, 0);
    assert_eq!(day2.records, 0);
    assert_eq!(payload_strings(&producer.payloads()), vec!["one", "three"]);
}

#[tokio::test]
async fn empty_buffer_and_unterminated_buffer() {
    let store = seeded_store(&[
        (1, "part-0000.log", ""),
        (1, "part-0001.log", "no newline here"),
        (1, "part-0002.log", "\n\n\n"),
    ])
    .await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    let report = result.unwrap();

    assert_eq!(payload_strings(&producer.payloads()), vec!["no newline here"]);
    assert_eq!(report.objects, 3);
    assert_eq!(report.records, 1);
}

#[tokio::test]
async fn inverted_range_completes_with_no_days() {
    let store = seeded_store(&[(1, "part-0000.log", "a\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(3), date(1))).await;
    let report = result.unwrap();

    assert!(report.days.is_empty());
    assert_eq!(report.records, 0);
    assert!(producer.payloads().is_empty());
    assert_eq!(engine.state(), RunState::Closed);
}

// ============================================================================
// Counting properties
// ============================================================================

#[tokio::test]
async fn announced_objects_match_consumed_buffers() {
    let store = seeded_store(&[
        (1, "a.log", "1\n2\n"),
        (1, "b.log", "3\n"),
        (2, "a.log", ""),
        (3, "a.log", "4\n5\n6"),
        (3, "b.log", "7"),
        (3, "c.log", "\n8\n"),
    ])
    .await;
    let engine = RestoreEngine::with_storage(memory_config(1, 3), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(3))).await;
    let report = result.unwrap();

    assert_eq!(report.announced_objects(), report.objects);
    for day in &report.days {
        assert_eq!(day.announced, day.objects);
    }
    assert_eq!(report.records, producer.payloads().len() as u64);
    assert_eq!(report.records, 8);
    assert_eq!(report.delivered, 8);
}

#[tokio::test]
async fn records_from_other_topics_are_not_replayed() {
    let store = seeded_store(&[(1, "part-0000.log", "mine\n")]).await;
    store
        .put(
            "orders-archive/year=2020/month=01/day=01/part-0000.log",
            Bytes::from_static(b"not mine\n"),
        )
        .await
        .unwrap();
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    result.unwrap();

    assert_eq!(payload_strings(&producer.payloads()), vec!["mine"]);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn listing_failure_aborts_remaining_days() {
    let inner = seeded_store(&[
        (1, "part-0000.log", "d1\n"),
        (2, "part-0000.log", "d2\n"),
        (3, "part-0000.log", "d3\n"),
    ])
    .await;
    let store = Arc::new(FailingListStore::new(
        inner,
        format!("{}/year=2020/month=01/day=02", TOPIC),
    ));
    let engine = RestoreEngine::with_storage(memory_config(1, 3), store).unwrap();

    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(3))).await;

    let err = result.unwrap_err();
    assert!(err.is_storage(), "unexpected error: {}", err);
    assert_eq!(payload_strings(&producer.payloads()), vec!["d1"]);
    assert_eq!(engine.state(), RunState::Aborted);
    assert!(producer.is_closed());
}

#[tokio::test]
async fn rerun_after_failure_duplicates_completed_days() {
    let inner = seeded_store(&[(1, "part-0000.log", "d1\n"), (2, "part-0000.log", "d2\n")]).await;
    let failing = Arc::new(FailingListStore::new(
        inner.clone(),
        format!("{}/year=2020/month=01/day=02", TOPIC),
    ));
    let range = DateRange::new(date(1), date(2));

    let first = RestoreEngine::with_storage(memory_config(1, 2), failing).unwrap();
    let (result, first_producer) = run_with_memory_producer(&first, range).await;
    assert!(result.is_err());

    let second = RestoreEngine::with_storage(memory_config(1, 2), inner).unwrap();
    let (result, second_producer) = run_with_memory_producer(&second, range).await;
    result.unwrap();

    // Nothing remembers that day 1 was already published
    let mut published = payload_strings(&first_producer.payloads());
    published.extend(payload_strings(&second_producer.payloads()));
    assert_eq!(published, vec!["d1", "d1", "d2"]);
}

#[tokio::test]
async fn rerun_of_same_range_publishes_everything_again() {
    let store = seeded_store(&[(1, "part-0000.log", "x\ny\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();
    let range = DateRange::new(date(1), date(1));

    let (first, first_producer) = run_with_memory_producer(&engine, range).await;
    let (second, second_producer) = run_with_memory_producer(&engine, range).await;

    assert_eq!(first.unwrap().records, 2);
    assert_eq!(second.unwrap().records, 2);
    assert_eq!(first_producer.payloads(), second_producer.payloads());
}

#[tokio::test]
async fn missing_object_aborts_with_storage_error() {
    struct VanishingStore;

    #[async_trait::async_trait]
    impl StorageBackend for VanishingStore {
        async fn list(&self, prefix: &str) -> kafka_restore_core::Result<Vec<String>> {
            Ok(vec![format!("{}/gone.log", prefix)])
        }

        async fn get(&self, key: &str) -> kafka_restore_core::Result<Bytes> {
            Err(kafka_restore_core::error::StorageError::NotFound(key.to_string()).into())
        }

        async fn put(&self, _key: &str, _data: Bytes) -> kafka_restore_core::Result<()> {
            Ok(())
        }
    }

    let engine = RestoreEngine::with_storage(memory_config(1, 2), Arc::new(VanishingStore)).unwrap();
    let (result, producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(2))).await;

    assert!(matches!(result, Err(Error::Storage(_))));
    assert!(producer.payloads().is_empty());
}

// ============================================================================
// Delivery failures
// ============================================================================

#[tokio::test]
async fn rejected_records_are_counted_not_retried() {
    let store = seeded_store(&[(1, "part-0000.log", "ok\nbad\nok\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (producer, reports) = MemoryProducer::rejecting(|m| m.payload.as_ref() == b"bad");
    let producer = Arc::new(producer);
    let report = engine
        .run_range(DateRange::new(date(1), date(1)), producer.clone(), reports)
        .await
        .unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.dead_lettered, 0);
    assert!(report.dead_letter_key.is_none());
    // Submitted once, never re-queued
    assert_eq!(producer.payloads().len(), 3);
}

#[tokio::test]
async fn dead_letter_policy_writes_failed_payloads_to_store() {
    let store = seeded_store(&[(1, "part-0000.log", "keep\ndrop-1\nkeep\ndrop-2")]).await;
    let mut config = memory_config(1, 1);
    config.restore.on_delivery_failure = DeliveryFailurePolicy::DeadLetter {
        prefix: "restore-failures".to_string(),
    };
    let engine = RestoreEngine::with_storage(config, store.clone()).unwrap();

    let (producer, reports) = MemoryProducer::rejecting(|m| m.payload.starts_with(b"drop"));
    let report = engine
        .run_range(DateRange::new(date(1), date(1)), Arc::new(producer), reports)
        .await
        .unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(report.dead_lettered, 2);
    let key = report.dead_letter_key.clone().unwrap();
    assert!(key.starts_with("restore-failures/year="));
    assert!(key.ends_with(".log"));

    let keys = store.list("restore-failures").await.unwrap();
    assert_eq!(keys, vec![key.clone()]);
    let content = store.get(&key).await.unwrap();
    assert_eq!(content.as_ref(), b"drop-1\ndrop-2\n");
}

// ============================================================================
// Run state and dry runs
// ============================================================================

#[tokio::test]
async fn run_state_ends_closed_after_success() {
    let store = seeded_store(&[(1, "part-0000.log", "a\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();
    let mut states = engine.subscribe();
    assert_eq!(*states.borrow_and_update(), RunState::Idle);

    let (result, _producer) =
        run_with_memory_producer(&engine, DateRange::new(date(1), date(1))).await;
    result.unwrap();

    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), RunState::Closed);
    assert!(engine.state().is_terminal());
}

#[tokio::test]
async fn dry_run_counts_without_kafka() {
    let store = seeded_store(&[(1, "part-0000.log", "a\nb\n"), (2, "part-0000.log", "c\n")]).await;
    let mut config = memory_config(1, 2);
    config.restore.dry_run = true;
    let engine = RestoreEngine::with_storage(config, store).unwrap();

    let report = engine.run().await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.start_date, date(1));
    assert_eq!(report.end_date, date(2));
    assert_eq!(report.records, 3);
    assert_eq!(report.delivered, 3);
    assert!(report.close_error.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["records"], 3);
    assert_eq!(json["days"][0]["date"], "2020-01-01");
}

// ============================================================================
// Producer lifecycle failures
// ============================================================================

/// Delivers like `MemoryProducer` but reports a failed final flush.
struct FailingCloseProducer {
    inner: MemoryProducer,
}

#[async_trait::async_trait]
impl Producer for FailingCloseProducer {
    async fn send(&self, message: ProducerMessage) -> kafka_restore_core::Result<()> {
        self.inner.send(message).await
    }

    async fn close(&self) -> kafka_restore_core::Result<()> {
        self.inner.close().await?;
        Err(Error::Pipeline("flush timed out".to_string()))
    }
}

#[tokio::test]
async fn close_error_is_reported_not_fatal() {
    let store = seeded_store(&[(1, "part-0000.log", "a\nb\n")]).await;
    let engine = RestoreEngine::with_storage(memory_config(1, 1), store).unwrap();

    let (inner, reports) = MemoryProducer::new();
    let producer = Arc::new(FailingCloseProducer { inner });
    let report = engine
        .run_range(DateRange::new(date(1), date(1)), producer.clone(), reports)
        .await
        .unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.delivered, 2);
    assert!(report
        .close_error
        .as_deref()
        .is_some_and(|e| e.contains("flush timed out")));
    assert_eq!(engine.state(), RunState::Closed);
    assert!(producer.inner.is_closed());
}

#[tokio::test]
async fn unreachable_cluster_aborts_before_listing() {
    let store = Arc::new(CountingStore::new(
        seeded_store(&[(1, "part-0000.log", "a\n")]).await,
    ));
    let mut config = memory_config(1, 1);
    config.restore.dry_run = false;
    config.target.bootstrap_servers = vec!["127.0.0.1:1".to_string()];
    let engine = RestoreEngine::with_storage(config, store.clone()).unwrap();

    let result = engine.run().await;

    assert!(matches!(result, Err(Error::Kafka(_))), "{:?}", result.err());
    assert_eq!(engine.state(), RunState::Aborted);
    assert_eq!(store.lists(), 0);
}
