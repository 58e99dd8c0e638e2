//! Periodic snapshot reporter

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::export::{RecordKind, SnapshotExporter};
use crate::metrics::{MetricsCollector, Snapshot};

/// Logs (and optionally exports) a snapshot every `interval` until cancelled,
/// then writes one final record
pub(crate) struct Reporter {
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) interval: Duration,
    pub(crate) export_path: Option<PathBuf>,
}

impl Reporter {
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let exporter = match &self.export_path {
            Some(path) => match SnapshotExporter::create(path).await {
                Ok(exporter) => Some(exporter),
                Err(e) => {
                    tracing::warn!(error = %e, "Snapshot export disabled");
                    None
                }
            },
            None => None,
        };

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    log_snapshot(&snapshot);
                    export(exporter.as_ref(), RecordKind::Interval, &snapshot).await;
                }
            }
        }

        // Cancelled after the collector froze, so this is the final snapshot
        let snapshot = self.metrics.snapshot();
        export(exporter.as_ref(), RecordKind::Final, &snapshot).await;
    }
}

async fn export(exporter: Option<&SnapshotExporter>, kind: RecordKind, snapshot: &Snapshot) {
    if let Some(exporter) = exporter
        && let Err(e) = exporter.write(kind, snapshot).await
    {
        tracing::warn!(
            path = %exporter.path().display(),
            error = %e,
            "Failed to export snapshot"
        );
    }
}

fn log_snapshot(snapshot: &Snapshot) {
    tracing::info!(
        ops_per_sec = %format!("{:.1}", snapshot.ops_per_sec),
        mb_per_sec = %format!("{:.2}", snapshot.megabytes_per_sec()),
        p99_ms = %format!("{:.2}", snapshot.latency.p99),
        successes = snapshot.successes,
        failures = snapshot.failures,
        "Metrics"
    );
}
