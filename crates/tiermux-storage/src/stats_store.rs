use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tiermux_provider_core::{ModelStats, StatsStore, StatsStoreError};
use tracing::warn;

/// Bumped whenever the on-disk shape of a persisted snapshot changes. A
/// snapshot written by an older or newer schema is discarded rather than
/// misread — health scoring just starts fresh for every model.
pub const STATS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StatsSnapshot {
    schema_version: u32,
    models: Vec<ModelStats>,
}

/// Persists per-model health state to a single JSON snapshot file, written
/// atomically via `write_atomic`. `save_all` is called periodically by the
/// gateway's health-persistence task rather than on every request, so a
/// crash loses at most the last debounce interval of scoring.
pub struct FileStatsStore {
    path: PathBuf,
}

impl FileStatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatsStore for FileStatsStore {
    async fn load_all(&self) -> Result<Vec<ModelStats>, StatsStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StatsStoreError::Read(err.to_string())),
        };

        let snapshot: StatsSnapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(event = "stats_snapshot_unreadable", error = %err);
                return Ok(Vec::new());
            }
        };

        if snapshot.schema_version != STATS_SCHEMA_VERSION {
            warn!(
                event = "stats_snapshot_schema_mismatch",
                found = snapshot.schema_version,
                expected = STATS_SCHEMA_VERSION,
            );
            return Ok(Vec::new());
        }

        Ok(snapshot.models)
    }

    async fn save_all(&self, stats: &[ModelStats]) -> Result<(), StatsStoreError> {
        let snapshot = StatsSnapshot {
            schema_version: STATS_SCHEMA_VERSION,
            models: stats.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| StatsStoreError::Write(err.to_string()))?;
        crate::write_atomic(&self.path, &bytes)
            .await
            .map_err(|err| StatsStoreError::Write(err.to_string()))
    }
}
