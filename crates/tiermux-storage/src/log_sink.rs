use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tiermux_provider_core::{LogSink, RequestLog};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

/// Appends terminal `RequestLog` records as newline-delimited JSON. Writes
/// are fire-and-forget from the request path: `write` only pushes onto a
/// bounded channel drained by a single background task, so concurrent
/// requests never contend on the same file handle — the same
/// channel-plus-single-writer-task shape the teacher uses for
/// `StorageTrafficSink`/`StorageBus`.
pub struct FileLogSink {
    tx: mpsc::Sender<RequestLog>,
}

const CHANNEL_CAPACITY: usize = 1024;

impl FileLogSink {
    pub fn spawn(path: impl Into<PathBuf>) -> Arc<Self> {
        let path = path.into();
        let (tx, mut rx) = mpsc::channel::<RequestLog>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            if let Some(parent) = path.parent()
                && let Err(err) = tokio::fs::create_dir_all(parent).await
            {
                warn!(event = "log_sink_init_failed", error = %err, path = %path.display());
                return;
            }

            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(err) => {
                    warn!(event = "log_sink_open_failed", error = %err, path = %path.display());
                    return;
                }
            };

            while let Some(record) = rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&record) else {
                    continue;
                };
                line.push(b'\n');
                if let Err(err) = file.write_all(&line).await {
                    warn!(event = "log_sink_write_failed", error = %err, trace_id = %record.trace_id);
                }
            }
        });

        Arc::new(Self { tx })
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn write(&self, record: &RequestLog) {
        // Best-effort: a full channel means the writer task is behind, which
        // should never hold up the response path.
        if self.tx.try_send(record.clone()).is_err() {
            warn!(event = "log_sink_backpressure_dropped", trace_id = %record.trace_id);
        }
    }
}
