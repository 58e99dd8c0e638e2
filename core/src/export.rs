//! JSON-lines snapshot export
//!
//! One object per line: every periodic snapshot is written with `"kind": "interval"`
//! and the frozen snapshot taken at stop with `"kind": "final"`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{BenchError, BenchResult};
use crate::metrics::Snapshot;

/// Why a record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Periodic snapshot
    Interval,
    /// Frozen snapshot written at stop
    Final,
}

#[derive(Serialize)]
struct ExportRecord<'a> {
    kind: RecordKind,
    #[serde(flatten)]
    snapshot: &'a Snapshot,
}

/// Appends snapshots to a JSON-lines file
pub struct SnapshotExporter {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl SnapshotExporter {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn create(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| BenchError::Export(format!("failed to open {}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "Snapshot export opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record and flush it
    pub async fn write(&self, kind: RecordKind, snapshot: &Snapshot) -> BenchResult<()> {
        let mut line = serde_json::to_vec(&ExportRecord { kind, snapshot })
            .map_err(|e| BenchError::Export(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Destination file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for SnapshotExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotExporter")
            .field("path", &self.path)
            .finish()
    }
}
