mod cli;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tiermux_core::{AuthProvider, BearerKeyAuth, Engine, HealthRegistry, WreqUpstreamClient};
use tiermux_provider_core::{ConfigStore, LogSink, StatsStore};
use tiermux_router::GatewayState;
use tiermux_storage::{FileConfigStore, FileLogSink, FileStatsStore};
use tracing::info;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config: Arc<dyn ConfigStore> =
        Arc::new(FileConfigStore::load(&cli.config).context("load routing config")?);

    let data_dir = PathBuf::from(&cli.data_dir);
    let stats_store = Arc::new(FileStatsStore::new(data_dir.join("model_stats.json")));
    let seed = stats_store.load_all().await.context("load persisted health stats")?;

    let current = config.current();
    let health = Arc::new(HealthRegistry::load(
        current.health.decay_rate,
        current.health.weight_k,
        seed,
    ));

    let gateway_api_key = cli
        .gateway_api_key
        .clone()
        .or_else(|| current.general.gateway_api_key.clone());
    let auth: Arc<dyn AuthProvider> = Arc::new(BearerKeyAuth::new(gateway_api_key));

    let log_sink: Arc<dyn LogSink> = FileLogSink::spawn(data_dir.join("requests.jsonl"));
    let client = Arc::new(WreqUpstreamClient::new());

    let engine = Arc::new(Engine::new(
        config.clone(),
        health.clone(),
        client,
        log_sink,
    ));

    spawn_stats_flusher(health.clone(), stats_store.clone(), cli.stats_flush_secs);

    let state = GatewayState {
        engine,
        auth,
        config,
        health,
    };
    let app = tiermux_router::router(state);

    let bind = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(event = "listening", addr = %bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    Ok(())
}

/// Periodically debounces `HealthRegistry` snapshots to disk rather than
/// writing on every request, matching the single-background-task
/// persistence shape used elsewhere in this gateway.
fn spawn_stats_flusher(
    health: Arc<HealthRegistry>,
    stats_store: Arc<FileStatsStore>,
    interval_secs: u64,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let snapshot = health.snapshot();
            if let Err(err) = stats_store.save_all(&snapshot).await {
                tracing::warn!(event = "stats_flush_failed", error = %err);
            }
        }
    });
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(event = "shutdown_signal_received");
}
