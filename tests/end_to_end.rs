//! End-to-end runs: profile resolution feeding pools over the in-memory backends

use std::sync::Arc;
use std::time::Duration;

use streambench_backends::{ConsumeOperation, MemoryBroker, ProduceOperation, SyntheticOperation};
use streambench_core::{
    Compression, Configuration, PoolBuilder, ProfileOverrides, ProfileResolver, WorkerPool,
};

fn fast(config: Configuration) -> Configuration {
    config
        .with_duration(Duration::ZERO)
        .with_warmup(Duration::ZERO)
        .with_shutdown_timeout(Duration::from_secs(2))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resolved_profile_drives_producers() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("ci.json"),
        r#"{"workers": 3, "rate": 0, "payload_size": 256, "queue_size": 5000}"#,
    )
    .unwrap();

    let config = ProfileResolver::new("ci")
        .search_dir(dir.path())
        .overrides(ProfileOverrides {
            total_operations: Some(2_000),
            compression: Some("lz4".into()),
            ..Default::default()
        })
        .resolve()
        .unwrap();
    assert_eq!(config.workers, 3);
    assert_eq!(config.compression, Compression::Lz4);

    let config = fast(config);
    let broker = Arc::new(MemoryBroker::from_config(&config));
    let op = ProduceOperation::new(Arc::clone(&broker), &config);
    let pool = WorkerPool::new(config, Arc::new(op)).unwrap();

    let report = pool.run().await.unwrap();

    assert!(report.is_clean());
    assert_eq!(report.snapshot.successes, 2_000);
    assert_eq!(report.snapshot.bytes, 2_000 * 256);
    assert_eq!(broker.len(), 2_000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_consumers_drain_prefilled_broker() {
    let config = fast(Configuration::default())
        .with_workers(4)
        .with_rate(0)
        .with_total_operations(500);
    let mut config = config;
    config.queue_size = 500;
    config.payload_size = 64;

    let broker = Arc::new(MemoryBroker::from_config(&config));
    assert_eq!(ProduceOperation::new(Arc::clone(&broker), &config).fill(), 500);

    let op = ConsumeOperation::new(Arc::clone(&broker), &config);
    let report = WorkerPool::new(config, Arc::new(op))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.snapshot.successes, 500);
    assert_eq!(report.snapshot.failures, 0);
    assert_eq!(report.snapshot.bytes, 500 * 64);
    assert!(broker.is_empty());
    assert_eq!(broker.delivered(), 500);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producers_and_consumers_share_broker() {
    let mut config = fast(Configuration::default())
        .with_workers(2)
        .with_rate(0)
        .with_total_operations(1_000);
    config.queue_size = 1_000;
    config.payload_size = 32;

    let broker = Arc::new(MemoryBroker::from_config(&config));
    let producer = WorkerPool::new(
        config.clone(),
        Arc::new(ProduceOperation::new(Arc::clone(&broker), &config)),
    )
    .unwrap();
    let consumer = WorkerPool::new(
        config.clone(),
        Arc::new(ConsumeOperation::new(Arc::clone(&broker), &config)),
    )
    .unwrap();

    let (produced, consumed) = tokio::join!(producer.run(), consumer.run());
    let produced = produced.unwrap();
    let consumed = consumed.unwrap();

    assert_eq!(produced.snapshot.successes, 1_000);
    assert_eq!(
        consumed.snapshot.successes + broker.len() as u64,
        1_000,
        "every published message is consumed once or still queued"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_synthetic_failures_still_report() {
    let op = SyntheticOperation::new(10).with_failure_ratio(1.0);
    let pool = PoolBuilder::new()
        .config(fast(Configuration::default()))
        .workers(2)
        .rate(0)
        .total_operations(100)
        .operation(Arc::new(op))
        .build()
        .unwrap();

    let report = pool.run().await.unwrap();

    assert_eq!(report.snapshot.successes, 0);
    assert_eq!(report.snapshot.failures, 100);
    assert_eq!(report.snapshot.error_rate(), 1.0);
    assert_eq!(report.aggregated.total_errors, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_export_written_for_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.jsonl");

    let mut config = fast(Configuration::default())
        .with_workers(2)
        .with_rate(200)
        .with_duration(Duration::from_millis(700));
    config.metrics_interval = Duration::from_millis(200);
    config.export.enabled = true;
    config.export.path = Some(path.clone());

    let op = SyntheticOperation::new(1);
    WorkerPool::new(config, Arc::new(op))
        .unwrap()
        .run()
        .await
        .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = raw
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(lines.len() >= 2);
    assert_eq!(lines.last().unwrap()["kind"], "final");
    assert!(lines.last().unwrap()["successes"].as_u64().unwrap() > 0);
}
