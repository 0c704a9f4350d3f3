use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use time::OffsetDateTime;
use tiermux_common::{RouterConfig, Tier, find_tier_in_text};
use tiermux_provider_core::{HttpMethod, UpstreamBody, UpstreamHttpRequest};

use crate::error::RoutingError;
use crate::trace::{Stage, TraceRecorder};
use crate::upstream_client::UpstreamClient;

const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// The tier the classifier falls back to when its own call fails, times out,
/// or returns a reply with no `t1|t2|t3` token — distinct from the tier used
/// when the router is administratively disabled.
const CLASSIFIER_ERROR_FALLBACK: Tier = Tier::T2;

/// Picks the tier a chat-completion request should be routed to. `history`
/// is the last few user turns, newest last, already joined by the caller.
/// When the classifier is disabled, falls back to a fixed tier — `t1` unless
/// `legacy_random_tier` opts into picking uniformly at random. When enabled
/// but the call itself fails, times out, or yields no recognizable tier
/// token, a `ROUTER_FAIL` trace event is recorded and the tier falls back to
/// `t2`. This function is total: it never propagates an error into the
/// calling pipeline.
pub async fn classify_tier(
    router: &RouterConfig,
    client: &dyn UpstreamClient,
    history: &str,
    trace: &mut TraceRecorder,
) -> Tier {
    if !router.enabled {
        return fallback_tier(router);
    }

    let start = OffsetDateTime::now_utc();
    trace.record(start, None, Stage::RouterStart, None);

    match ask_classifier(router, client, history).await {
        Ok(tier) => {
            let now = OffsetDateTime::now_utc();
            trace.record(now, None, Stage::RouterEnd, Some(tier.to_string()));
            tier
        }
        Err(err) => {
            let now = OffsetDateTime::now_utc();
            trace.record(now, None, Stage::RouterFail, Some(err.to_string()));
            CLASSIFIER_ERROR_FALLBACK
        }
    }
}

fn fallback_tier(router: &RouterConfig) -> Tier {
    if router.legacy_random_tier {
        let idx = rand::rng().random_range(0..Tier::ALL.len());
        Tier::ALL[idx]
    } else {
        Tier::T1
    }
}

async fn ask_classifier(
    router: &RouterConfig,
    client: &dyn UpstreamClient,
    history: &str,
) -> Result<Tier, RoutingError> {
    let prompt = render_prompt(router, history);
    let body = serde_json::json!({
        "model": router.model,
        "messages": [{"role": "user", "content": prompt}],
        "max_tokens": 8,
        "temperature": 0.0,
    });
    let payload = serde_json::to_vec(&body).map_err(|err| RoutingError::BadRequest(err.to_string()))?;

    let request = UpstreamHttpRequest {
        method: HttpMethod::Post,
        url: format!("{}/v1/chat/completions", router.base_url.trim_end_matches('/')),
        headers: vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("authorization".to_string(), format!("Bearer {}", router.api_key)),
        ],
        body: Some(Bytes::from(payload)),
        is_stream: false,
    };

    let response = client
        .send(request, CLASSIFY_TIMEOUT, CLASSIFY_TIMEOUT)
        .await
        .map_err(|err| RoutingError::TransportError(err.to_string()))?;

    let UpstreamBody::Bytes(body) = response.body else {
        return Err(RoutingError::TransportError(
            "classifier returned a streamed response".to_string(),
        ));
    };

    let text = extract_reply_text(&body).ok_or(RoutingError::EmptyResponse)?;
    find_tier_in_text(&text).ok_or(RoutingError::EmptyResponse)
}

fn render_prompt(router: &RouterConfig, history: &str) -> String {
    match &router.prompt_template {
        Some(template) => template.replace("{history}", history),
        None => format!(
            "Classify the complexity of this request as t1, t2, or t3. \
             Reply with exactly one of those tokens.\n\n{history}"
        ),
    }
}

fn extract_reply_text(body: &Bytes) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_defaults_to_t1_when_legacy_flag_is_off() {
        let router = RouterConfig {
            legacy_random_tier: false,
            ..RouterConfig::default()
        };
        assert_eq!(fallback_tier(&router), Tier::T1);
    }

    #[test]
    fn extract_reply_text_reads_chat_completion_shape() {
        let body = Bytes::from_static(
            br#"{"choices":[{"message":{"content":"t2"}}]}"#,
        );
        assert_eq!(extract_reply_text(&body), Some("t2".to_string()));
    }

    struct FailingClient;

    #[async_trait::async_trait]
    impl UpstreamClient for FailingClient {
        async fn send(
            &self,
            _req: UpstreamHttpRequest,
            _connect_timeout: Duration,
            _generation_timeout: Duration,
        ) -> Result<tiermux_provider_core::UpstreamHttpResponse, tiermux_provider_core::UpstreamFailure>
        {
            Err(tiermux_provider_core::UpstreamFailure::Transport {
                kind: tiermux_provider_core::UpstreamTransportErrorKind::Connect,
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn a_failed_classifier_call_falls_back_to_t2_and_records_router_fail() {
        let router = RouterConfig {
            enabled: true,
            ..RouterConfig::default()
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());
        let tier = classify_tier(&router, &FailingClient, "hi", &mut trace).await;
        assert_eq!(tier, Tier::T2);
        let kinds: Vec<&str> = trace.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["ROUTER_START", "ROUTER_FAIL"]);
    }
}
