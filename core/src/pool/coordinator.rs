//! Worker pool execution and control

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{Configuration, MAX_WORKERS};
use crate::error::{BenchError, BenchResult};
use crate::metrics::{MetricsCollector, Snapshot};
use crate::traits::Operation;
use crate::worker::{PauseGate, RateLimiter, WorkerBuilder, WorkerStats};

use super::aggregator::{AggregatedStats, aggregate_worker_stats};
use super::reporter::Reporter;
use super::state::{AtomicPoolState, PoolState};

/// Outcome of [`WorkerPool::stop`]
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Frozen final snapshot
    pub snapshot: Snapshot,

    /// Per-worker breakdown over every worker that reported stats
    pub aggregated: AggregatedStats,

    /// Stats of each worker that exited, including scaled-down ones
    pub worker_stats: Vec<WorkerStats>,

    /// Workers still running when the shutdown timeout expired
    pub abandoned_workers: usize,

    /// Time from start to the end of stop
    pub elapsed: Duration,
}

impl StopReport {
    /// True when every worker confirmed exit within the shutdown timeout
    pub fn is_clean(&self) -> bool {
        self.abandoned_workers == 0
    }
}

struct WorkerHandle {
    id: usize,
    cancel: CancellationToken,
    join: JoinHandle<WorkerStats>,
}

/// Count of worker tasks still alive
#[derive(Default)]
struct LiveWorkers {
    count: AtomicUsize,
    changed: Notify,
}

impl LiveWorkers {
    async fn wait_for_zero(&self) {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            changed.await;
        }
    }
}

/// Decrements the live count when the worker task ends, panics included
struct LiveGuard(Arc<LiveWorkers>);

impl LiveGuard {
    fn new(live: Arc<LiveWorkers>) -> Self {
        live.count.fetch_add(1, Ordering::SeqCst);
        Self(live)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.count.fetch_sub(1, Ordering::SeqCst);
        self.0.changed.notify_waiters();
    }
}

/// Owns the workers of one run and exposes runtime control
///
/// Control methods take `&self`; share the pool via `Arc` to drive it from
/// another task while [`run`](Self::run) is in progress.
pub struct WorkerPool {
    config: Configuration,
    operation: Arc<dyn Operation>,
    state: AtomicPoolState,

    limiter: Arc<RateLimiter>,
    metrics: Arc<MetricsCollector>,
    gate: Arc<PauseGate>,

    /// Parent of every worker token
    cancel: CancellationToken,

    /// Stops refill, warm-up and reporter tasks
    background: CancellationToken,

    operation_counter: Arc<AtomicU64>,
    next_worker_id: AtomicUsize,
    live: Arc<LiveWorkers>,

    /// Workers not yet seen to exit; scale operations work on this set
    handles: Mutex<Vec<WorkerHandle>>,
    /// Workers that ended on their own, joined at stop
    exited: Mutex<Vec<WorkerHandle>>,
    retired: Mutex<Vec<WorkerStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    reporter: Mutex<Option<JoinHandle<()>>>,
    started_at: OnceLock<Instant>,
}

impl WorkerPool {
    /// Create a pool for a validated configuration
    ///
    /// Use [`PoolBuilder`](super::PoolBuilder) for a more ergonomic construction.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure of `config`.
    pub fn new(config: Configuration, operation: Arc<dyn Operation>) -> BenchResult<Self> {
        config.validate()?;

        Ok(Self {
            limiter: Arc::new(RateLimiter::for_rate(config.rate)),
            config,
            operation,
            state: AtomicPoolState::new(PoolState::Created),
            metrics: Arc::new(MetricsCollector::new()),
            gate: Arc::new(PauseGate::new()),
            cancel: CancellationToken::new(),
            background: CancellationToken::new(),
            operation_counter: Arc::new(AtomicU64::new(0)),
            next_worker_id: AtomicUsize::new(0),
            live: Arc::new(LiveWorkers::default()),
            handles: Mutex::new(Vec::new()),
            exited: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            reporter: Mutex::new(None),
            started_at: OnceLock::new(),
        })
    }

    /// Spawn the configured workers and background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> BenchResult<()> {
        self.state
            .transition(PoolState::Created, PoolState::Running)
            .map_err(|state| BenchError::InvalidState {
                action: "start",
                state,
            })?;
        let _ = self.started_at.set(Instant::now());

        tracing::info!(
            workers = self.config.workers,
            rate = self.config.rate,
            total_operations = self.config.total_operations,
            duration_secs = self.config.duration.as_secs_f64(),
            operation = self.operation.name(),
            "Starting worker pool"
        );

        let mut tasks = Vec::new();
        if let Some(refill) = self.limiter.start_refill() {
            tasks.push(refill);
        }
        if !self.config.warmup.is_zero() {
            tasks.push(self.spawn_warmup());
        }
        self.tasks.lock().extend(tasks);

        let reporter = Reporter {
            metrics: Arc::clone(&self.metrics),
            interval: self.config.metrics_interval,
            export_path: self
                .config
                .export
                .enabled
                .then(|| self.config.export.path.clone())
                .flatten(),
        };
        *self.reporter.lock() = Some(tokio::spawn(reporter.run(self.background.clone())));

        let spawned = (0..self.config.workers)
            .map(|_| self.spawn_worker())
            .collect::<BenchResult<Vec<_>>>()?;
        self.handles.lock().extend(spawned);

        Ok(())
    }

    /// Park every worker at the pause gate after its current operation
    pub fn pause(&self) -> BenchResult<()> {
        self.state
            .transition(PoolState::Running, PoolState::Paused)
            .map_err(|state| BenchError::InvalidState {
                action: "pause",
                state,
            })?;
        self.gate.pause();
        tracing::info!("Worker pool paused");
        Ok(())
    }

    /// Release paused workers
    pub fn resume(&self) -> BenchResult<()> {
        self.state
            .transition(PoolState::Paused, PoolState::Running)
            .map_err(|state| BenchError::InvalidState {
                action: "resume",
                state,
            })?;
        self.gate.resume();
        tracing::info!("Worker pool resumed");
        Ok(())
    }

    /// Start `k` additional workers
    ///
    /// The limit check and the spawns happen under one lock, so concurrent
    /// calls never exceed [`MAX_WORKERS`] together.
    pub fn scale_up(&self, k: usize) -> BenchResult<()> {
        self.ensure_active("scale up")?;
        if k == 0 {
            return Ok(());
        }

        let mut handles = self.handles.lock();
        self.prune_exited(&mut handles);
        let target = handles.len() + k;
        if target > MAX_WORKERS {
            return Err(BenchError::invalid(
                "workers",
                format!("cannot exceed {MAX_WORKERS}, requested {target}"),
            ));
        }

        for _ in 0..k {
            handles.push(self.spawn_worker()?);
        }
        drop(handles);

        tracing::info!(added = k, workers = target, "Scaled worker pool up");
        Ok(())
    }

    /// Stop the `k` most recently started workers and wait for them to exit
    ///
    /// Only workers that are still running count. At least one is always
    /// kept. Returns how many were stopped.
    pub async fn scale_down(&self, k: usize) -> BenchResult<usize> {
        self.ensure_active("scale down")?;

        let (removed, remaining): (Vec<WorkerHandle>, usize) = {
            let mut handles = self.handles.lock();
            self.prune_exited(&mut handles);
            let k = k.min(handles.len().saturating_sub(1));
            let keep = handles.len() - k;
            (handles.drain(keep..).rev().collect(), keep)
        };
        if removed.is_empty() {
            return Ok(0);
        }
        let count = removed.len();

        for handle in &removed {
            handle.cancel.cancel();
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let (stats, abandoned) = collect_workers(removed, deadline).await;
        self.retired.lock().extend(stats);
        if abandoned > 0 {
            tracing::warn!(abandoned, "Scaled-down workers did not exit in time");
        }

        tracing::info!(
            removed = count,
            workers = remaining,
            "Scaled worker pool down"
        );
        Ok(count)
    }

    /// Scale up or down to exactly `n` running workers
    pub async fn set_worker_count(&self, n: usize) -> BenchResult<()> {
        if n == 0 || n > MAX_WORKERS {
            return Err(BenchError::invalid(
                "workers",
                format!("must be between 1 and {MAX_WORKERS}, got {n}"),
            ));
        }

        let current = self.active_workers();
        if n > current {
            self.scale_up(n - current)
        } else if n < current {
            self.scale_down(current - n).await.map(|_| ())
        } else {
            self.ensure_active("set worker count")
        }
    }

    /// Change the target rate; 0 removes the limit
    pub fn set_rate(&self, rate: u64) -> BenchResult<()> {
        let state = self.state.load();
        if state.is_shutting_down() {
            return Err(BenchError::InvalidState {
                action: "set rate",
                state,
            });
        }

        if rate == 0 {
            self.limiter.set_unbounded(true);
        } else {
            self.limiter.set_rate(rate);
            self.limiter.set_unbounded(false);
        }
        tracing::info!(rate, "Target rate changed");
        Ok(())
    }

    /// Zero the metrics and restart the elapsed baseline
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Current metrics, or the final metrics after stop
    pub fn snapshot(&self) -> Snapshot {
        self.metrics.snapshot()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PoolState {
        self.state.load()
    }

    /// Worker tasks that have not exited yet
    pub fn live_workers(&self) -> usize {
        self.live.count.load(Ordering::SeqCst)
    }

    /// Workers owned by the pool that have not exited
    ///
    /// Workers that ended on their own (fatal error, operation budget used up,
    /// panic) are not counted.
    pub fn active_workers(&self) -> usize {
        let mut handles = self.handles.lock();
        self.prune_exited(&mut handles);
        handles.len()
    }

    /// Tokens per second, or `None` when unbounded
    pub fn rate(&self) -> Option<u64> {
        (!self.limiter.is_unbounded()).then(|| self.limiter.rate())
    }

    /// The configuration the pool was built from
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Wait until every worker task has exited on its own
    pub async fn wait_for_completion(&self) {
        self.live.wait_for_zero().await;
    }

    /// Stop every worker and freeze the final snapshot
    ///
    /// Raises the pool cancel signal and waits up to the shutdown timeout.
    /// Workers still running afterwards are abandoned (left to finish on their
    /// own) and counted in the report. The reporter's final export must land
    /// before the same deadline.
    pub async fn stop(&self) -> BenchResult<StopReport> {
        let previous = self
            .state
            .begin_stop()
            .map_err(|state| BenchError::InvalidState {
                action: "stop",
                state,
            })?;
        tracing::info!(from = %previous, "Stopping worker pool");

        self.cancel.cancel();
        let mut handles = std::mem::take(&mut *self.exited.lock());
        handles.append(&mut *self.handles.lock());
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        let (stats, abandoned) = collect_workers(handles, deadline).await;
        if abandoned > 0 {
            tracing::warn!(
                abandoned,
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Workers did not exit within shutdown timeout"
            );
        }

        self.limiter.stop();
        let snapshot = self.metrics.freeze();

        self.background.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        let reporter = self.reporter.lock().take();
        if let Some(mut reporter) = reporter
            && tokio::time::timeout_at(deadline, &mut reporter)
                .await
                .is_err()
        {
            tracing::warn!("Reporter did not finish final export in time");
        }

        let mut worker_stats = std::mem::take(&mut *self.retired.lock());
        worker_stats.extend(stats);
        let aggregated = aggregate_worker_stats(&worker_stats);
        let elapsed = self
            .started_at
            .get()
            .map(|start| start.elapsed())
            .unwrap_or_default();

        self.state.store(PoolState::Stopped);
        tracing::info!(
            elapsed_secs = elapsed.as_secs_f64(),
            successes = snapshot.successes,
            failures = snapshot.failures,
            ops_per_sec = %format!("{:.1}", snapshot.ops_per_sec),
            abandoned,
            "Worker pool stopped"
        );

        Ok(StopReport {
            snapshot,
            aggregated,
            worker_stats,
            abandoned_workers: abandoned,
            elapsed,
        })
    }

    /// Start, then stop when the duration elapses, every worker finishes, or
    /// Ctrl+C is received
    pub async fn run(&self) -> BenchResult<StopReport> {
        self.start()?;

        let duration = self.config.duration_limit();
        tokio::select! {
            _ = ctrl_c() => {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = sleep_for(duration) => {
                tracing::info!("Test duration reached, initiating shutdown...");
            }
            _ = self.wait_for_completion() => {
                tracing::info!("All workers finished");
            }
        }

        self.stop().await
    }

    fn ensure_active(&self, action: &'static str) -> BenchResult<()> {
        let state = self.state.load();
        if state.is_active() {
            Ok(())
        } else {
            Err(BenchError::InvalidState { action, state })
        }
    }

    /// Move handles of finished workers out of the running set
    fn prune_exited(&self, handles: &mut Vec<WorkerHandle>) {
        if !handles.iter().any(|h| h.join.is_finished()) {
            return;
        }
        let (finished, running): (Vec<_>, Vec<_>) =
            handles.drain(..).partition(|h| h.join.is_finished());
        *handles = running;
        tracing::debug!(exited = finished.len(), "Pruned exited workers");
        self.exited.lock().extend(finished);
    }

    fn spawn_worker(&self) -> BenchResult<WorkerHandle> {
        let id = self.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let mut builder = WorkerBuilder::new(id)
            .operation(Arc::clone(&self.operation))
            .limiter(Arc::clone(&self.limiter))
            .metrics(Arc::clone(&self.metrics))
            .gate(Arc::clone(&self.gate));
        if let Some(total) = self.config.operation_limit() {
            builder = builder.operation_counter(Arc::clone(&self.operation_counter), total);
        }
        let worker = builder.build()?;

        let cancel = self.cancel.child_token();
        let token = cancel.clone();
        let guard = LiveGuard::new(Arc::clone(&self.live));
        let join = tokio::spawn(async move {
            let _guard = guard;
            worker.run(token).await
        });

        Ok(WorkerHandle { id, cancel, join })
    }

    fn spawn_warmup(&self) -> JoinHandle<()> {
        let metrics = Arc::clone(&self.metrics);
        let cancel = self.background.clone();
        let warmup = self.config.warmup;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(warmup) => {
                    metrics.reset();
                    tracing::info!(
                        warmup_secs = warmup.as_secs_f64(),
                        "Warm-up complete, metrics reset"
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("state", &self.state())
            .field("operation", &self.operation.name())
            .field("workers", &self.handles.lock().len())
            .field("live_workers", &self.live_workers())
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.background.cancel();
        self.limiter.stop();
    }
}

/// Await worker exits until `deadline`; returns collected stats and the number abandoned
async fn collect_workers(
    handles: Vec<WorkerHandle>,
    deadline: tokio::time::Instant,
) -> (Vec<WorkerStats>, usize) {
    let mut stats = Vec::with_capacity(handles.len());
    let mut abandoned = 0;

    for mut handle in handles {
        match tokio::time::timeout_at(deadline, &mut handle.join).await {
            Ok(Ok(worker_stats)) => stats.push(worker_stats),
            Ok(Err(e)) => {
                tracing::error!(worker_id = handle.id, error = %e, "Worker task panicked");
            }
            Err(_) => {
                // Dropping the JoinHandle detaches the task
                tracing::debug!(worker_id = handle.id, "Abandoning worker");
                abandoned += 1;
            }
        }
    }

    (stats, abandoned)
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}
