//! Ties classification, candidate selection, upstream invocation, and
//! tracing into the single operation the gateway's HTTP layer drives: take a
//! parsed client request, return either a buffered body or a live SSE
//! passthrough, and make sure a `RequestLog` is always committed.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tiermux_common::{RoutingConfig, Tier};
use tiermux_provider_core::{ConfigStore, LogSink, OutcomeKind, UpstreamBody};
use uuid::Uuid;

use crate::classify::classify_tier;
use crate::error::RoutingError;
use crate::health::HealthRegistry;
use crate::orchestrator::{self, classify_status};
use crate::tokens;
use crate::trace::{Stage, TraceRecorder};
use crate::upstream_client::UpstreamClient;
use crate::wire::{DONE_MARKER, SseFrameParser};

/// Recent user turns handed to the classifier.
const CLASSIFIER_HISTORY_TURNS: usize = 3;

/// Caps how much streamed assistant text is retained for the audit log.
/// Overflow truncates the logged text only — the client still gets every
/// original byte.
const STREAM_LOG_BUFFER_CAP: usize = 4 * 1024 * 1024;

pub struct Engine {
    config: Arc<dyn ConfigStore>,
    health: Arc<HealthRegistry>,
    client: Arc<dyn UpstreamClient>,
    log_sink: Arc<dyn LogSink>,
}

/// What the HTTP layer should send back to the client. Both variants carry
/// the upstream's (possibly error) status code and content type; the caller
/// never has to re-derive either.
pub enum GatewayOutcome {
    Buffered {
        status: u16,
        content_type: &'static str,
        body: Bytes,
    },
    Streaming {
        status: u16,
        chunks: tokio::sync::mpsc::Receiver<Bytes>,
    },
}

impl Engine {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        health: Arc<HealthRegistry>,
        client: Arc<dyn UpstreamClient>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            config,
            health,
            client,
            log_sink,
        }
    }

    /// Handles one parsed `POST /v1/chat/completions` request end to end.
    /// Never returns a retryable `RoutingError` to the caller — exhaustion
    /// and non-retryable upstream failures are folded into a `Buffered`
    /// outcome carrying the right HTTP status, matching the gateway's
    /// "every terminal state produces a response" contract.
    pub async fn handle(
        &self,
        mut body: Map<String, Value>,
        requested_stream: bool,
    ) -> GatewayOutcome {
        let trace_id = Uuid::now_v7().to_string();
        let started_at = OffsetDateTime::now_utc();

        let history = match extract_user_history(&body) {
            Ok(history) => history,
            Err(err) => return self.terminal_error(err),
        };

        let config = self.config.current();
        let mut trace = TraceRecorder::new(trace_id, Tier::T1, started_at);
        trace.record(started_at, None, Stage::ReqReceived, None);
        let tier = classify_tier(&config.router, self.client.as_ref(), &history, &mut trace).await;
        trace.set_tier(tier);

        body.remove("stream");
        let request_body = body.clone();

        let result = orchestrator::run(
            self.client.as_ref(),
            &config,
            &self.health,
            tier,
            &body,
            requested_stream,
            &mut trace,
        )
        .await;

        match result {
            Ok(outcome) => {
                self.settle_success(outcome, &request_body, requested_stream, trace)
                    .await
            }
            Err(err) => {
                let now = OffsetDateTime::now_utc();
                trace.record(now, None, Stage::AllFailed, Some(err.to_string()));
                let log_outcome = match &err {
                    RoutingError::Exhausted { .. } => OutcomeKind::Exhausted,
                    RoutingError::UpstreamStatus { code, .. } => classify_status(*code),
                    RoutingError::ConnectTimeout => OutcomeKind::ConnectTimeout,
                    RoutingError::GenerationTimeout => OutcomeKind::GenerationTimeout,
                    _ => OutcomeKind::Transport,
                };
                let log = trace.finish(now, None, log_outcome, None, None);
                self.log_sink.write(&log).await;
                self.terminal_error(err)
            }
        }
    }

    /// A non-retryable `UpstreamStatus` is passed through with the upstream's
    /// exact status and body; every other terminal error is folded
    /// into the gateway's own JSON error envelope.
    fn terminal_error(&self, err: RoutingError) -> GatewayOutcome {
        if let RoutingError::UpstreamStatus { code, body } = err {
            return GatewayOutcome::Buffered {
                status: code,
                content_type: "application/json",
                body,
            };
        }
        let status = err.status_code().as_u16();
        let body = error_envelope(&err);
        GatewayOutcome::Buffered {
            status,
            content_type: "application/json",
            body,
        }
    }

    async fn settle_success(
        &self,
        outcome: orchestrator::Outcome,
        request_body: &Map<String, Value>,
        requested_stream: bool,
        mut trace: TraceRecorder,
    ) -> GatewayOutcome {
        let status = outcome.response.status;
        let model = outcome.model.clone();

        match outcome.response.body {
            UpstreamBody::Bytes(bytes) => {
                let now = OffsetDateTime::now_utc();
                let text = tokens::extract_choice_text(&bytes).unwrap_or_default();
                let upstream_json: Option<Value> = serde_json::from_slice(&bytes).ok();
                let usage = tokens::account(request_body, &text, upstream_json.as_ref());
                let log = trace.finish(
                    now,
                    Some(model),
                    OutcomeKind::Success,
                    Some(usage.prompt_tokens),
                    Some(usage.completion_tokens),
                );
                self.log_sink.write(&log).await;

                let rewritten = rewrite_model_field(&bytes, &log_model_name(&log));
                if requested_stream {
                    GatewayOutcome::Streaming {
                        status,
                        chunks: synthesize_sse_chunk(rewritten),
                    }
                } else {
                    GatewayOutcome::Buffered {
                        status,
                        content_type: "application/json",
                        body: rewritten,
                    }
                }
            }
            UpstreamBody::Stream(upstream_rx) => {
                let (tx, rx) = tokio::sync::mpsc::channel(32);
                let health = self.health.clone();
                let log_sink = self.log_sink.clone();
                let request_body = request_body.clone();
                tokio::spawn(forward_stream(
                    upstream_rx,
                    tx,
                    model,
                    health,
                    log_sink,
                    request_body,
                    trace,
                ));
                GatewayOutcome::Streaming { status, chunks: rx }
            }
        }
    }
}

fn log_model_name(log: &tiermux_provider_core::RequestLog) -> String {
    log.chosen_model
        .as_ref()
        .map(|m| m.model.clone())
        .unwrap_or_default()
}

/// Rewrites the `model` field of a buffered JSON response to the bare model
/// name, per the invariant that successful responses are semantically
/// identical to the upstream's except for that one field.
fn rewrite_model_field(body: &Bytes, bare_model: &str) -> Bytes {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.clone();
    };
    if let Some(obj) = value.as_object_mut() {
        obj.insert("model".to_string(), Value::String(bare_model.to_string()));
    }
    serde_json::to_vec(&value)
        .map(Bytes::from)
        .unwrap_or_else(|_| body.clone())
}

/// Wraps an already-buffered JSON body as a single SSE chunk followed by
/// `[DONE]`, for the "non-streaming upstream, streaming client" case.
fn synthesize_sse_chunk(body: Bytes) -> tokio::sync::mpsc::Receiver<Bytes> {
    let (tx, rx) = tokio::sync::mpsc::channel(2);
    tokio::spawn(async move {
        let mut frame = Vec::with_capacity(body.len() + 8);
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(&body);
        frame.extend_from_slice(b"\n\n");
        let _ = tx.send(Bytes::from(frame)).await;
        let _ = tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await;
    });
    rx
}

/// Tees the upstream SSE byte stream to the client while accumulating the
/// decoded assistant text for the audit log. If the upstream stream ends
/// without a `[DONE]` frame, the attempt is scored as a `stream_abort` —
/// by this point bytes have already reached the client, so there is no
/// retry, only a health penalty and a best-effort partial log.
async fn forward_stream(
    mut upstream_rx: tiermux_provider_core::ByteStream,
    client_tx: tokio::sync::mpsc::Sender<Bytes>,
    model: tiermux_common::ModelRef,
    health: Arc<HealthRegistry>,
    log_sink: Arc<dyn LogSink>,
    request_body: Map<String, Value>,
    mut trace: TraceRecorder,
) {
    let mut parser = SseFrameParser::new();
    let mut text = String::new();
    let mut usage_json: Option<Value> = None;
    let mut saw_done = false;
    let mut first_token_seen = false;

    while let Some(chunk) = upstream_rx.recv().await {
        for frame in parser.push(&chunk) {
            if frame == DONE_MARKER {
                saw_done = true;
                continue;
            }
            if let Ok(value) = serde_json::from_str::<Value>(&frame) {
                if tokens::extract_usage(&value).is_some() {
                    usage_json = Some(value.clone());
                }
                if let Some(delta) = value
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(Value::as_str)
                {
                    if !first_token_seen {
                        first_token_seen = true;
                        let now = OffsetDateTime::now_utc();
                        trace.record(now, Some(model.clone()), Stage::FirstToken, None);
                    }
                    if text.len() < STREAM_LOG_BUFFER_CAP {
                        text.push_str(delta);
                    }
                }
            }
        }
        if client_tx.send(chunk).await.is_err() {
            // Client disconnected — stop reading upstream and do not penalize
            // the model for a problem on the downstream side.
            let now = OffsetDateTime::now_utc();
            trace.record(now, Some(model.clone()), Stage::ClientAbort, None);
            let log = trace.finish(now, Some(model), OutcomeKind::ClientAbort, None, None);
            log_sink.write(&log).await;
            return;
        }
    }

    for frame in parser.finish() {
        if frame == DONE_MARKER {
            saw_done = true;
        }
    }

    let now = OffsetDateTime::now_utc();
    let outcome = if saw_done {
        OutcomeKind::Success
    } else {
        OutcomeKind::StreamAbort
    };
    health.record_outcome(&model, outcome, now);

    if !saw_done {
        // The upstream closed without ever sending `[DONE]` — bytes already
        // reached the client, so there is nothing left to retry. Tell the
        // client the stream ended abnormally with the same error-envelope
        // shape the buffered path uses, then close out with `[DONE]` so
        // clients parsing for that sentinel don't hang.
        let error_frame = serde_json::json!({
            "error": {
                "kind": "stream_abort",
                "attempted": [model.to_string()],
                "last_reason": "stream_abort",
            }
        });
        let mut frame = Vec::new();
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(&serde_json::to_vec(&error_frame).unwrap_or_default());
        frame.extend_from_slice(b"\n\n");
        let _ = client_tx.send(Bytes::from(frame)).await;
        let _ = client_tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await;
    }

    let usage = tokens::account(&request_body, &text, usage_json.as_ref());
    trace.record(now, Some(model.clone()), Stage::FullResponse, None);
    let log = trace.finish(
        now,
        Some(model),
        outcome,
        Some(usage.prompt_tokens),
        Some(usage.completion_tokens),
    );
    log_sink.write(&log).await;
}

fn extract_user_history(body: &Map<String, Value>) -> Result<String, RoutingError> {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| RoutingError::BadRequest("missing `messages` array".to_string()))?;
    if messages.is_empty() {
        return Err(RoutingError::BadRequest("`messages` must not be empty".to_string()));
    }

    let history: Vec<&str> = messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        .filter_map(|m| m.get("content").and_then(Value::as_str))
        .collect();

    Ok(history
        .into_iter()
        .rev()
        .take(CLASSIFIER_HISTORY_TURNS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n"))
}

fn error_envelope(err: &RoutingError) -> Bytes {
    let (kind, attempted, last_reason) = match err {
        RoutingError::Exhausted { attempted, last_reason } => (
            "exhausted",
            Value::from(attempted.clone()),
            last_reason.clone(),
        ),
        other => ("error", Value::Array(Vec::new()), other.to_string()),
    };
    let envelope = serde_json::json!({
        "error": {
            "kind": kind,
            "attempted": attempted,
            "last_reason": last_reason,
        }
    });
    Bytes::from(serde_json::to_vec(&envelope).unwrap_or_default())
}

/// Allows the router's CLI/axum layer to hand us a raw tier name override
/// for debugging without going through the classifier.
pub fn parse_tier_override(raw: &str) -> Option<Tier> {
    raw.parse().ok()
}

/// Exposed for the router's `/healthz` surface: the configured tier names
/// and per-tier candidate counts, read straight off the current snapshot.
pub fn tier_summary(config: &RoutingConfig) -> Vec<(Tier, usize)> {
    Tier::ALL.iter().map(|&t| (t, config.models.pool(t).len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_user_history_takes_last_three_user_turns_in_order() {
        let mut body = Map::new();
        body.insert(
            "messages".to_string(),
            serde_json::json!([
                {"role": "user", "content": "a"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "b"},
                {"role": "user", "content": "c"},
                {"role": "user", "content": "d"},
            ]),
        );
        assert_eq!(extract_user_history(&body).unwrap(), "b\nc\nd");
    }

    #[test]
    fn empty_messages_is_a_bad_request() {
        let mut body = Map::new();
        body.insert("messages".to_string(), Value::Array(Vec::new()));
        assert!(matches!(
            extract_user_history(&body),
            Err(RoutingError::BadRequest(_))
        ));
    }

    #[test]
    fn missing_messages_is_a_bad_request() {
        assert!(matches!(
            extract_user_history(&Map::new()),
            Err(RoutingError::BadRequest(_))
        ));
    }

    #[test]
    fn exhausted_error_envelope_carries_kind_and_attempted_models() {
        let err = RoutingError::Exhausted {
            attempted: vec!["openai/a".to_string(), "openai/b".to_string()],
            last_reason: "http_5xx".to_string(),
        };
        let body = error_envelope(&err);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["kind"], "exhausted");
        assert_eq!(value["error"]["last_reason"], "http_5xx");
        assert_eq!(
            value["error"]["attempted"],
            serde_json::json!(["openai/a", "openai/b"])
        );
    }

    #[tokio::test]
    async fn mid_stream_abort_forwards_received_chunks_and_penalizes_health_without_retry() {
        use tiermux_provider_core::NoopLogSink;

        let (upstream_tx, upstream_rx) = tokio::sync::mpsc::channel::<Bytes>(8);
        let (client_tx, mut client_rx) = tokio::sync::mpsc::channel::<Bytes>(8);
        let health = Arc::new(HealthRegistry::new(0.0, 1.0));
        let model = tiermux_common::ModelRef::new("openai", "gpt-4o-mini");
        let now = OffsetDateTime::now_utc();
        let trace = TraceRecorder::new("abort-test", Tier::T1, now);

        upstream_tx
            .send(Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
            ))
            .await
            .unwrap();
        drop(upstream_tx); // upstream closed mid-stream, no `[DONE]` ever arrived

        forward_stream(
            upstream_rx,
            client_tx,
            model.clone(),
            health.clone(),
            Arc::new(NoopLogSink),
            Map::new(),
            trace,
        )
        .await;

        let forwarded = client_rx.recv().await.unwrap();
        assert!(forwarded.starts_with(b"data: {\"choices\""));

        let error_frame = client_rx.recv().await.unwrap();
        assert!(error_frame.starts_with(b"data: {"));
        let error_value: Value = serde_json::from_slice(&error_frame["data: ".len()..])
            .expect("synthetic error frame is valid JSON");
        assert_eq!(error_value["error"]["kind"], "stream_abort");

        let done_frame = client_rx.recv().await.unwrap();
        assert_eq!(&done_frame[..], b"data: [DONE]\n\n");

        assert!(client_rx.recv().await.is_none());

        // A penalty was recorded (stream_abort), and the attempt cannot be
        // retried — the caller already committed bytes to the client.
        assert!(health.health_percent(&model, now) < 100);
    }
}
