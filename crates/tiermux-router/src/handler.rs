use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;
use tiermux_core::GatewayOutcome;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::state::GatewayState;

/// `POST /v1/chat/completions`. Parses the body just enough to hand it to
/// the engine — request/response shape beyond that is the upstream's
/// concern, not this gateway's.
pub async fn chat_completions(State(state): State<GatewayState>, body: Bytes) -> Response {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => return bad_request(&err.to_string()),
    };
    let Value::Object(map) = parsed else {
        return bad_request("request body must be a JSON object");
    };

    let requested_stream = map
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    match state.engine.handle(map, requested_stream).await {
        GatewayOutcome::Buffered {
            status,
            content_type,
            body,
        } => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            response
                .headers_mut()
                .insert(axum::http::header::CONTENT_TYPE, content_type.parse().unwrap());
            response
        }
        GatewayOutcome::Streaming { status, chunks } => {
            let stream = ReceiverStream::new(chunks).map(Ok::<Bytes, std::convert::Infallible>);
            let mut response = Response::new(Body::from_stream(stream));
            *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            response.headers_mut().insert(
                axum::http::header::CONTENT_TYPE,
                "text/event-stream".parse().unwrap(),
            );
            response
        }
    }
}

fn bad_request(detail: &str) -> Response {
    warn!(event = "request_parse_failed", detail);
    let body = serde_json::json!({"error": {"kind": "bad_request", "detail": detail}});
    let mut response = Response::new(Body::from(serde_json::to_vec(&body).unwrap_or_default()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_TYPE, "application/json".parse().unwrap());
    response
}

/// `GET /healthz`: liveness plus the loaded config's tier/model shape.
/// Unauthenticated by design — it is what a load balancer or orchestrator
/// probes before any caller has a key.
pub async fn healthz(State(state): State<GatewayState>) -> impl IntoResponse {
    let config = state.config.current();
    let tiers: Vec<Value> = tiermux_core::engine::tier_summary(&config)
        .into_iter()
        .map(|(tier, count)| serde_json::json!({"tier": tier.as_str(), "models": count}))
        .collect();
    axum::Json(serde_json::json!({"ok": true, "tiers": tiers}))
}

/// `GET /metrics`: a minimal per-model health summary, gated behind the
/// gateway API key. Not a metrics *system* — just enough text/plain output
/// to eyeball adaptive scoring without standing up a scrape target.
pub async fn metrics(State(state): State<GatewayState>) -> impl IntoResponse {
    let config = state.config.current();
    let registry = tiermux_core::registry::ProviderRegistry::new(&config.providers);
    let now = time::OffsetDateTime::now_utc();
    let mut lines = Vec::new();
    for tier in tiermux_common::Tier::ALL {
        for candidate in config.models.pool(tier) {
            let Ok((_endpoint, model_ref)) = registry.resolve(candidate) else {
                continue;
            };
            let percent = state.health.health_percent(&model_ref, now);
            lines.push(format!("{tier} {model_ref} health_percent={percent}"));
        }
    }
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        lines.join("\n"),
    )
}
