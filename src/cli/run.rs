//! `run` command: wire a backend to worker pools and report the outcome

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use streambench_backends::{
    BackendError, ConsumeOperation, MemoryBroker, ProduceOperation, SyntheticOperation,
};
use streambench_core::{Configuration, Operation, StopReport, WorkerPool};

use super::Mode;

pub struct RunOptions {
    pub mode: Mode,
    pub json: bool,
    pub latency: Duration,
    pub failure_ratio: f64,
}

pub async fn execute(config: Configuration, options: RunOptions) -> Result<()> {
    tracing::info!(
        mode = ?options.mode,
        workers = config.workers,
        rate = config.rate,
        payload_size = config.payload_size,
        "Starting run"
    );

    let reports = match options.mode {
        Mode::Synthetic => {
            let op = SyntheticOperation::new(config.payload_size as u64)
                .with_latency(options.latency)
                .with_failure_ratio(options.failure_ratio);
            vec![("synthetic", run_pool(config, Arc::new(op)).await?)]
        }
        Mode::Produce => {
            let broker = Arc::new(MemoryBroker::from_config(&config));
            // Drain concurrently so producers measure publish cost, not a full queue
            let drain = spawn_drain(Arc::clone(&broker));
            let op = ProduceOperation::new(Arc::clone(&broker), &config);
            let report = run_pool(config, Arc::new(op)).await;
            broker.close();
            drain.abort();
            vec![("produce", report?)]
        }
        Mode::Consume => {
            let broker = Arc::new(MemoryBroker::from_config(&config));
            let filled = ProduceOperation::new(Arc::clone(&broker), &config).fill();
            tracing::info!(messages = filled, "Broker pre-filled");
            let op = ConsumeOperation::new(Arc::clone(&broker), &config);
            vec![("consume", run_pool(config, Arc::new(op)).await?)]
        }
        Mode::Both => {
            let broker = Arc::new(MemoryBroker::from_config(&config));
            let produce_config = for_role(&config, "produce");
            let consume_config = for_role(&config, "consume");
            let producer = ProduceOperation::new(Arc::clone(&broker), &produce_config);
            let consumer = ConsumeOperation::new(Arc::clone(&broker), &consume_config);

            let (produced, consumed) = tokio::join!(
                run_pool(produce_config, Arc::new(producer)),
                run_pool(consume_config, Arc::new(consumer)),
            );
            broker.close();
            tracing::info!(
                published = broker.published(),
                delivered = broker.delivered(),
                backlog = broker.len(),
                "Broker totals"
            );
            vec![("produce", produced?), ("consume", consumed?)]
        }
    };

    for (role, report) in &reports {
        if options.json {
            let json = serde_json::json!({
                "role": role,
                "snapshot": report.snapshot,
                "aggregated": report.aggregated,
                "abandoned_workers": report.abandoned_workers,
                "elapsed_secs": report.elapsed.as_secs_f64(),
            });
            println!("{json}");
        } else {
            print_summary(role, report);
        }
    }
    Ok(())
}

async fn run_pool(config: Configuration, operation: Arc<dyn Operation>) -> Result<StopReport> {
    let name = operation.name().to_string();
    let pool = WorkerPool::new(config, operation)
        .with_context(|| format!("Failed to create {name} pool"))?;
    pool.run()
        .await
        .with_context(|| format!("{name} pool failed"))
}

fn spawn_drain(broker: Arc<MemoryBroker>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match broker.receive(Duration::from_millis(100)).await {
                Ok(_) | Err(BackendError::ReceiveTimeout(_)) => continue,
                Err(_) => break,
            }
        }
    })
}

/// Give each pool of a combined run its own export file
fn for_role(config: &Configuration, role: &str) -> Configuration {
    let mut config = config.clone();
    config.export.path = config.export.path.as_deref().map(|p| role_path(p, role));
    config
}

fn role_path(path: &Path, role: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{role}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{role}"),
    };
    path.with_file_name(name)
}

fn print_summary(role: &str, report: &StopReport) {
    let snap = &report.snapshot;
    println!("== {role} ==");
    println!(
        "  operations   {} ok, {} failed ({:.2}% errors)",
        snap.successes,
        snap.failures,
        snap.error_rate() * 100.0
    );
    println!(
        "  throughput   {:.1} ops/s, {:.2} MB/s",
        snap.ops_per_sec,
        snap.megabytes_per_sec()
    );
    println!(
        "  latency ms   p50 {:.3}  p95 {:.3}  p99 {:.3}  p99.9 {:.3}  max {:.3}",
        snap.latency.p50, snap.latency.p95, snap.latency.p99, snap.latency.p999, snap.latency.max
    );
    let workers = &report.aggregated;
    println!(
        "  workers      {} reported, {} fatal, {} abandoned, {:.1}s elapsed",
        workers.total_workers,
        workers.fatal_workers,
        report.abandoned_workers,
        report.elapsed.as_secs_f64()
    );
    if let (Some(busiest), Some(quietest)) = (workers.busiest, workers.quietest) {
        println!(
            "  spread       {}..{} ops per worker (imbalance {:.2})",
            quietest.operations, busiest.operations, workers.imbalance
        );
    }
}
