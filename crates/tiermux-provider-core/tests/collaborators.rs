use tiermux_provider_core::{LogSink, ModelStats, NoopLogSink, NoopStatsStore, RequestLog, OutcomeKind, StatsStore};
use tiermux_common::ModelRef;

fn sample_log() -> RequestLog {
    RequestLog {
        trace_id: "trace-1".to_string(),
        tier: "t1".to_string(),
        chosen_model: Some(ModelRef::new("openai", "gpt-4o-mini")),
        attempts: 1,
        elapsed_ms: 120,
        outcome: OutcomeKind::Success,
        prompt_tokens: Some(42),
        completion_tokens: Some(8),
        events: Vec::new(),
    }
}

#[tokio::test]
async fn noop_log_sink_accepts_any_record_without_erroring() {
    let sink = NoopLogSink;
    sink.write(&sample_log()).await;
}

#[tokio::test]
async fn noop_stats_store_round_trips_to_empty() {
    let store = NoopStatsStore;
    let loaded = store.load_all().await.unwrap();
    assert!(loaded.is_empty());

    let stats = vec![ModelStats::fresh(
        ModelRef::new("openai", "gpt-4o-mini"),
        time::OffsetDateTime::UNIX_EPOCH,
    )];
    store.save_all(&stats).await.unwrap();
}
