//! Tests for the WorkerPool module

use super::*;
use crate::config::Configuration;
use crate::error::BenchError;
use crate::traits::{Operation, OperationError, OperationOutput};

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// Mock Operation
// ============================================================================

#[derive(Default)]
struct MockOperation {
    delay: Option<Duration>,
    always_fail: bool,
    panic: bool,
    fatal_first: bool,
    calls: AtomicU64,
}

impl MockOperation {
    fn new() -> Self {
        Self::default()
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// The very first call across all workers is fatal
    fn fatal_first(mut self) -> Self {
        self.fatal_first = true;
        self
    }
}

#[async_trait]
impl Operation for MockOperation {
    fn name(&self) -> &str {
        "mock"
    }

    async fn perform(&self) -> Result<OperationOutput, OperationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fatal_first && call == 0 {
            return Err(OperationError::Fatal("simulated fatal error".to_string()));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic {
            panic!("simulated operation panic");
        }
        if self.always_fail {
            return Err(OperationError::Failed("simulated failure".to_string()));
        }
        Ok(OperationOutput::bytes(100))
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn test_config(workers: usize, rate: u64) -> Configuration {
    Configuration::default()
        .with_workers(workers)
        .with_rate(rate)
        .with_duration(Duration::ZERO)
        .with_warmup(Duration::ZERO)
        .with_shutdown_timeout(Duration::from_secs(2))
}

fn create_pool(config: Configuration, operation: MockOperation) -> WorkerPool {
    PoolBuilder::new()
        .config(config)
        .operation(Arc::new(operation))
        .build()
        .expect("Failed to build pool")
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Condition not reached in time");
}

// ============================================================================
// Builder Tests
// ============================================================================

#[test]
fn test_builder_missing_operation() {
    let result = PoolBuilder::new().config(test_config(1, 0)).build();
    assert!(matches!(result, Err(BenchError::MissingConfig("operation"))));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = PoolBuilder::new()
        .config(test_config(1, 0))
        .workers(0)
        .operation(Arc::new(MockOperation::new()))
        .build()
        .unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(err.field(), Some("workers"));
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_state_transitions() {
    let pool = create_pool(
        test_config(2, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    );
    assert_eq!(pool.state(), PoolState::Created);
    assert!(pool.pause().is_err());

    pool.start().expect("Failed to start");
    assert_eq!(pool.state(), PoolState::Running);
    let err = pool.start().unwrap_err();
    assert_eq!(err.to_string(), "cannot start while pool is running");

    pool.pause().expect("Failed to pause");
    assert_eq!(pool.state(), PoolState::Paused);
    assert!(pool.pause().is_err());

    pool.resume().expect("Failed to resume");
    assert_eq!(pool.state(), PoolState::Running);
    assert!(pool.resume().is_err());

    pool.stop().await.expect("Failed to stop");
    assert_eq!(pool.state(), PoolState::Stopped);

    let err = pool.pause().unwrap_err();
    assert_eq!(err.to_string(), "cannot pause while pool is stopped");
    assert!(matches!(
        pool.stop().await,
        Err(BenchError::InvalidState {
            action: "stop",
            state: PoolState::Stopped
        })
    ));
    assert!(pool.scale_up(1).is_err());
    assert!(pool.set_rate(5).is_err());
}

#[tokio::test]
async fn test_stop_before_start() {
    let pool = create_pool(test_config(3, 0), MockOperation::new());
    let report = pool.stop().await.expect("Failed to stop");

    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(report.snapshot.total_operations(), 0);
    assert!(report.worker_stats.is_empty());
    assert!(pool.start().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exact_operation_count() {
    let operation = Arc::new(MockOperation::new());
    let pool = PoolBuilder::new()
        .config(test_config(10, 0))
        .total_operations(10_000)
        .operation(operation.clone())
        .build()
        .expect("Failed to build pool");

    let report = tokio::time::timeout(Duration::from_secs(30), pool.run())
        .await
        .expect("Run did not finish")
        .expect("Run failed");

    assert_eq!(report.snapshot.successes, 10_000);
    assert_eq!(report.snapshot.failures, 0);
    assert_eq!(report.snapshot.bytes, 1_000_000);
    assert_eq!(operation.calls.load(Ordering::SeqCst), 10_000);
    assert_eq!(report.aggregated.total_completed, 10_000);
    assert_eq!(report.aggregated.fatal_workers, 0);
    assert!((report.aggregated.mean_operations - 1_000.0).abs() < 1e-9);
    assert_eq!(report.worker_stats.len(), 10);
    assert!(report.is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duration_bounded_run_respects_rate() {
    let config = test_config(1, 100).with_duration(Duration::from_secs(2));
    let pool = create_pool(config, MockOperation::new());

    let start = Instant::now();
    let report = pool.run().await.expect("Run failed");
    assert!(start.elapsed() >= Duration::from_secs(2));

    // Initial full bucket (100) plus 2s of refill (200), ±30%
    let total = report.snapshot.total_operations();
    assert!((210..=390).contains(&total), "performed {total}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_steady_state_rate_after_burst() {
    let pool = create_pool(test_config(1, 100), MockOperation::new());
    pool.start().expect("Failed to start");

    // Let the initial burst drain, then measure a clean 2s window
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    pool.reset_metrics();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let total = pool.snapshot().total_operations();
    pool.stop().await.expect("Failed to stop");

    assert!((140..=260).contains(&total), "performed {total}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_halts_growth_and_resume_restores() {
    let pool = create_pool(
        test_config(4, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    );
    pool.start().expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    pool.pause().expect("Failed to pause");
    // In-flight operations finish after the pause
    tokio::time::sleep(Duration::from_millis(50)).await;
    let paused = pool.snapshot().total_operations();
    assert!(paused > 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(pool.snapshot().total_operations(), paused);
    assert_eq!(pool.live_workers(), 4);

    pool.resume().expect("Failed to resume");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pool.snapshot().total_operations() > paused);

    pool.stop().await.expect("Failed to stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_halts_rate_limited_workers() {
    let pool = create_pool(test_config(4, 2), MockOperation::new());
    pool.start().expect("Failed to start");

    // Spend the initial burst so every worker is blocked on the bucket
    tokio::time::sleep(Duration::from_millis(300)).await;
    pool.pause().expect("Failed to pause");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let paused = pool.snapshot().total_operations();

    // Several refills happen meanwhile; none of them may turn into work
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(pool.snapshot().total_operations(), paused);
    assert_eq!(pool.live_workers(), 4);

    pool.resume().expect("Failed to resume");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pool.snapshot().total_operations() > paused);

    pool.stop().await.expect("Failed to stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_while_paused() {
    let pool = create_pool(
        test_config(3, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    );
    pool.start().expect("Failed to start");
    pool.pause().expect("Failed to pause");

    let start = Instant::now();
    let report = pool.stop().await.expect("Failed to stop");
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(report.is_clean());
    assert_eq!(report.worker_stats.len(), 3);
    assert_eq!(pool.live_workers(), 0);
}

// ============================================================================
// Scaling Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scale_up_and_down() {
    let pool = create_pool(
        test_config(2, 0),
        MockOperation::new().with_delay(Duration::from_millis(2)),
    );
    pool.start().expect("Failed to start");
    assert_eq!(pool.live_workers(), 2);

    pool.scale_up(3).expect("Failed to scale up");
    assert_eq!(pool.active_workers(), 5);
    assert_eq!(pool.live_workers(), 5);

    let removed = pool.scale_down(2).await.expect("Failed to scale down");
    assert_eq!(removed, 2);
    assert_eq!(pool.active_workers(), 3);
    assert_eq!(pool.live_workers(), 3);

    pool.set_worker_count(6).await.expect("Failed to set count");
    assert_eq!(pool.live_workers(), 6);

    pool.set_worker_count(1).await.expect("Failed to set count");
    assert_eq!(pool.live_workers(), 1);

    // The last worker is never removed
    assert_eq!(pool.scale_down(5).await.unwrap(), 0);
    assert_eq!(pool.live_workers(), 1);

    let err = pool.set_worker_count(0).await.unwrap_err();
    assert_eq!(err.field(), Some("workers"));

    let report = pool.stop().await.expect("Failed to stop");
    // Scaled-down workers still report their stats
    assert_eq!(report.worker_stats.len(), 8);
    assert_eq!(
        report.aggregated.total_operations(),
        report.snapshot.total_operations()
    );
}

#[tokio::test]
async fn test_scale_requires_active_pool() {
    let pool = create_pool(test_config(1, 0), MockOperation::new());
    assert!(matches!(
        pool.scale_up(1),
        Err(BenchError::InvalidState {
            state: PoolState::Created,
            ..
        })
    ));
    assert!(pool.scale_down(1).await.is_err());
}

#[tokio::test]
async fn test_scale_up_respects_worker_limit() {
    let pool = create_pool(
        test_config(1, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    );
    pool.start().expect("Failed to start");

    let err = pool.scale_up(crate::config::MAX_WORKERS).unwrap_err();
    assert_eq!(err.field(), Some("workers"));
    assert_eq!(pool.active_workers(), 1);

    pool.stop().await.expect("Failed to stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_scale_up_respects_worker_limit() {
    let pool = Arc::new(create_pool(
        test_config(1, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    ));
    pool.start().expect("Failed to start");
    // Parked workers keep the spawned tasks cheap
    pool.pause().expect("Failed to pause");

    let half = crate::config::MAX_WORKERS / 2;
    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.scale_up(half) })
        })
        .collect();

    let mut succeeded = 0;
    for attempt in attempts {
        if attempt.await.expect("Scale task panicked").is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(pool.active_workers(), 1 + half);

    let report = pool.stop().await.expect("Failed to stop");
    assert_eq!(report.worker_stats.len(), 1 + half);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_set_worker_count_replaces_exited_worker() {
    let pool = create_pool(
        test_config(4, 0),
        MockOperation::new()
            .with_delay(Duration::from_millis(1))
            .fatal_first(),
    );
    pool.start().expect("Failed to start");

    wait_until(|| pool.active_workers() == 3).await;
    assert_eq!(pool.live_workers(), 3);

    pool.set_worker_count(4).await.expect("Failed to set count");
    assert_eq!(pool.live_workers(), 4);
    assert_eq!(pool.active_workers(), 4);

    let report = pool.stop().await.expect("Failed to stop");
    assert_eq!(report.worker_stats.len(), 5);
    assert_eq!(report.worker_stats.iter().filter(|s| s.fatal).count(), 1);
    assert_eq!(report.aggregated.fatal_workers, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scale_down_counts_only_running_workers() {
    let pool = create_pool(
        test_config(4, 0),
        MockOperation::new()
            .with_delay(Duration::from_millis(1))
            .fatal_first(),
    );
    pool.start().expect("Failed to start");
    wait_until(|| pool.active_workers() == 3).await;

    // Three running workers: two can go, one stays
    let removed = pool.scale_down(3).await.expect("Failed to scale down");
    assert_eq!(removed, 2);
    assert_eq!(pool.live_workers(), 1);
    assert_eq!(pool.active_workers(), 1);

    pool.stop().await.expect("Failed to stop");
}

// ============================================================================
// Rate and Metrics Control Tests
// ============================================================================

#[tokio::test]
async fn test_set_rate() {
    let pool = create_pool(test_config(1, 1_000), MockOperation::new());
    assert_eq!(pool.rate(), Some(1_000));

    pool.set_rate(10).expect("Failed to set rate");
    assert_eq!(pool.rate(), Some(10));

    pool.set_rate(0).expect("Failed to set rate");
    assert_eq!(pool.rate(), None);

    pool.set_rate(250).expect("Failed to set rate");
    assert_eq!(pool.rate(), Some(250));

    let unbounded = create_pool(test_config(1, 0), MockOperation::new());
    assert_eq!(unbounded.rate(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_warmup_resets_metrics() {
    let config = test_config(1, 0).with_warmup(Duration::from_millis(200));
    let pool = create_pool(config, MockOperation::new().with_delay(Duration::from_millis(1)));
    pool.start().expect("Failed to start");

    tokio::time::sleep(Duration::from_millis(150)).await;
    let during = pool.snapshot();
    assert!(during.total_operations() > 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let after = pool.snapshot();
    assert!(after.window_started_at > during.window_started_at);
    assert!(after.elapsed_secs < 0.2);

    pool.stop().await.expect("Failed to stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reset_metrics_restarts_window() {
    let pool = create_pool(
        test_config(2, 0),
        MockOperation::new().with_delay(Duration::from_millis(1)),
    );
    pool.start().expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    pool.pause().expect("Failed to pause");
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.reset_metrics();
    assert_eq!(pool.snapshot().total_operations(), 0);

    pool.stop().await.expect("Failed to stop");
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_bounded_by_shutdown_timeout() {
    let config = test_config(2, 0).with_shutdown_timeout(Duration::from_millis(200));
    let pool = create_pool(config, MockOperation::new().with_delay(Duration::from_secs(5)));
    pool.start().expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let report = pool.stop().await.expect("Failed to stop");
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(report.abandoned_workers, 2);
    assert!(!report.is_clean());
    assert_eq!(pool.state(), PoolState::Stopped);

    // Frozen: later snapshots return the report's final figures
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.snapshot(), report.snapshot);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_shares_one_deadline_with_reporter() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(2, 0).with_shutdown_timeout(Duration::from_millis(300));
    config.export.enabled = true;
    config.export.path = Some(dir.path().join("snapshots.jsonl"));

    let pool = create_pool(config, MockOperation::new().with_delay(Duration::from_secs(5)));
    pool.start().expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let start = Instant::now();
    let report = pool.stop().await.expect("Failed to stop");

    assert_eq!(report.abandoned_workers, 2);
    assert!(
        start.elapsed() < Duration::from_millis(550),
        "stop took {:?}",
        start.elapsed()
    );
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_all_failures_still_produce_snapshot() {
    let pool = PoolBuilder::new()
        .config(test_config(2, 0))
        .total_operations(50)
        .operation(Arc::new(MockOperation::new().failing()))
        .build()
        .expect("Failed to build pool");

    let report = pool.run().await.expect("Run failed");
    assert_eq!(report.snapshot.successes, 0);
    assert_eq!(report.snapshot.failures, 50);
    assert!((report.snapshot.error_rate() - 1.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_worker_is_accounted() {
    let pool = create_pool(test_config(3, 0), MockOperation::new().panicking());
    pool.start().expect("Failed to start");

    tokio::time::timeout(Duration::from_secs(2), pool.wait_for_completion())
        .await
        .expect("Live count did not reach zero");
    assert_eq!(pool.live_workers(), 0);

    let report = pool.stop().await.expect("Failed to stop");
    assert!(report.worker_stats.is_empty());
    assert_eq!(report.abandoned_workers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_control_from_another_task_during_run() {
    let pool = Arc::new(
        PoolBuilder::new()
            .config(test_config(2, 0))
            .total_operations(500)
            .operation(Arc::new(
                MockOperation::new().with_delay(Duration::from_millis(1)),
            ))
            .build()
            .expect("Failed to build pool"),
    );

    let controller = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            pool.pause().expect("Failed to pause");
            tokio::time::sleep(Duration::from_millis(30)).await;
            pool.resume().expect("Failed to resume");
            pool.scale_up(2).expect("Failed to scale up");
        })
    };

    let report = tokio::time::timeout(Duration::from_secs(10), pool.run())
        .await
        .expect("Run did not finish")
        .expect("Run failed");
    controller.await.expect("Controller panicked");

    assert_eq!(report.snapshot.successes, 500);
    assert_eq!(report.worker_stats.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_export_writes_interval_and_final_records() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("snapshots.jsonl");

    let mut config = test_config(1, 0);
    config.metrics_interval = Duration::from_millis(100);
    config.export.enabled = true;
    config.export.path = Some(path.clone());

    let pool = create_pool(config, MockOperation::new().with_delay(Duration::from_millis(1)));
    pool.start().expect("Failed to start");
    tokio::time::sleep(Duration::from_millis(350)).await;
    let report = pool.stop().await.expect("Failed to stop");

    let contents = std::fs::read_to_string(&path).expect("Failed to read export");
    let records: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).expect("Invalid JSON line"))
        .collect();

    assert!(records.len() >= 3, "only {} records", records.len());
    let last = records.last().unwrap();
    assert_eq!(last["kind"], "final");
    assert_eq!(last["successes"], report.snapshot.successes);
    assert!(records[..records.len() - 1]
        .iter()
        .all(|r| r["kind"] == "interval"));
}
