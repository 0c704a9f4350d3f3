use async_trait::async_trait;
use tiermux_common::RoutingConfig;

use crate::runtime::{ModelStats, RequestLog};

/// Owns the routing configuration document. The default file-backed impl
/// loads once at startup; a future admin surface can call `reload` to swap
/// the in-memory snapshot without restarting the process.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    fn current(&self) -> std::sync::Arc<RoutingConfig>;

    async fn reload(&self) -> Result<(), ConfigStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("failed to read config: {0}")]
    Read(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Persists terminal request records. Implementations must not block the
/// request path — the default impl is fire-and-forget.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, record: &RequestLog);
}

/// Owns persisted per-model health state across process restarts.
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ModelStats>, StatsStoreError>;

    async fn save_all(&self, stats: &[ModelStats]) -> Result<(), StatsStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StatsStoreError {
    #[error("failed to read model stats: {0}")]
    Read(String),
    #[error("failed to persist model stats: {0}")]
    Write(String),
}

/// No-op `LogSink` for tests and for gateway configurations that don't want
/// request auditing.
pub struct NoopLogSink;

#[async_trait]
impl LogSink for NoopLogSink {
    async fn write(&self, _record: &RequestLog) {}
}

/// No-op `StatsStore`: health scoring still runs in-memory for the life of
/// the process, it just never survives a restart.
pub struct NoopStatsStore;

#[async_trait]
impl StatsStore for NoopStatsStore {
    async fn load_all(&self) -> Result<Vec<ModelStats>, StatsStoreError> {
        Ok(Vec::new())
    }

    async fn save_all(&self, _stats: &[ModelStats]) -> Result<(), StatsStoreError> {
        Ok(())
    }
}
