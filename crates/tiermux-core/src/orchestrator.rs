use serde_json::{Map, Value};
use time::OffsetDateTime;
use tiermux_common::{ModelRef, ProviderEndpoint, RetryConditions, RoutingConfig, Strategy, Tier};
use tiermux_provider_core::{OutcomeKind, UpstreamBody, UpstreamHttpResponse};

use crate::error::RoutingError;
use crate::health::HealthRegistry;
use crate::invoker::invoke;
use crate::registry::ProviderRegistry;
use crate::selector::order_candidates;
use crate::trace::{Stage, TraceRecorder};
use crate::upstream_client::UpstreamClient;

/// The model and response a request ultimately succeeded against.
pub struct Outcome {
    pub response: UpstreamHttpResponse,
    pub model: ModelRef,
}

/// Drives a tier's candidate pool through bounded attempts, recording every
/// attempt's outcome into the health registry and the trace. `sequential`
/// pools are bounded by `rounds * |pool|` (an exact number of full, ordered
/// passes); `random`/`adaptive` pools are bounded by `max_retries` alone,
/// reordering the pool before each attempt regardless of pool size.
pub async fn run(
    client: &dyn UpstreamClient,
    config: &RoutingConfig,
    health: &HealthRegistry,
    tier: Tier,
    body: &Map<String, Value>,
    is_stream: bool,
    trace: &mut TraceRecorder,
) -> Result<Outcome, RoutingError> {
    let registry = ProviderRegistry::new(&config.providers);
    let pool = config.models.pool(tier);
    if pool.is_empty() {
        return Err(RoutingError::ProviderMissing(format!(
            "no candidates configured for tier {tier}"
        )));
    }

    let resolved: Vec<(ProviderEndpoint, ModelRef)> = pool
        .iter()
        .filter_map(|candidate| registry.resolve(candidate).ok())
        .map(|(endpoint, model)| (endpoint.clone(), model))
        .collect();
    if resolved.is_empty() {
        return Err(RoutingError::ProviderMissing(format!(
            "tier {tier} candidates did not resolve to a configured provider"
        )));
    }

    let strategy = config.models.strategy(tier);
    let model_refs: Vec<ModelRef> = resolved.iter().map(|(_, m)| m.clone()).collect();

    let mut attempts = 0u32;
    let mut attempted: Vec<String> = Vec::new();
    let mut last_reason = "no candidates attempted".to_string();

    // `rounds` governs `sequential` alone: the bound on distinct attempts is
    // `rounds * |pool|`, a full ordered pass repeated exactly `rounds` times.
    // `max_retries` governs `random`/`adaptive` alone: the pool is reordered
    // before each attempt and the loop runs until `max_retries` attempts have
    // been made, independent of pool size or round count.
    match strategy {
        Strategy::Sequential => {
            let rounds = config.retries.rounds.get(tier).max(1);
            for _round in 0..rounds {
                let now = OffsetDateTime::now_utc();
                let ordered = order_candidates(strategy, &model_refs, health, now);
                for model in ordered {
                    attempts += 1;
                    attempted.push(model.to_string());
                    match attempt_candidate(
                        client, &resolved, &model, config, tier, body, is_stream, health, trace,
                    )
                    .await
                    {
                        AttemptResult::Success(outcome) => return Ok(outcome),
                        AttemptResult::Stop(err) => return Err(err),
                        AttemptResult::Retry(reason) => last_reason = reason,
                    }
                }
            }
        }
        Strategy::Random | Strategy::Adaptive => {
            let max_attempts = config.retries.max_retries.get(tier).max(1);
            'attempts: loop {
                let now = OffsetDateTime::now_utc();
                let ordered = order_candidates(strategy, &model_refs, health, now);
                for model in ordered {
                    if attempts >= max_attempts {
                        break 'attempts;
                    }
                    attempts += 1;
                    attempted.push(model.to_string());
                    match attempt_candidate(
                        client, &resolved, &model, config, tier, body, is_stream, health, trace,
                    )
                    .await
                    {
                        AttemptResult::Success(outcome) => return Ok(outcome),
                        AttemptResult::Stop(err) => return Err(err),
                        AttemptResult::Retry(reason) => last_reason = reason,
                    }
                }
            }
        }
    }

    Err(RoutingError::Exhausted { attempted, last_reason })
}

/// What to do after one upstream attempt completes: return the response to
/// the caller, stop the orchestrator outright with a non-retryable error, or
/// keep going with the given reason recorded for a possible final exhaustion.
enum AttemptResult {
    Success(Outcome),
    Stop(RoutingError),
    Retry(String),
}

#[allow(clippy::too_many_arguments)]
async fn attempt_candidate(
    client: &dyn UpstreamClient,
    resolved: &[(ProviderEndpoint, ModelRef)],
    model: &ModelRef,
    config: &RoutingConfig,
    tier: Tier,
    body: &Map<String, Value>,
    is_stream: bool,
    health: &HealthRegistry,
    trace: &mut TraceRecorder,
) -> AttemptResult {
    let Some((endpoint, _)) = resolved.iter().find(|(_, m)| m == model) else {
        return AttemptResult::Retry("provider_missing".to_string());
    };

    let attempt_start = OffsetDateTime::now_utc();
    trace.begin_attempt(attempt_start, model);

    let invoked = invoke(
        client,
        endpoint,
        &model.model,
        &config.params,
        &config.timeouts,
        tier,
        body.clone(),
        is_stream,
    )
    .await;

    let now = OffsetDateTime::now_utc();
    match invoked {
        Ok(response) => {
            // A streaming upstream attempt is "successful" here only in the
            // sense that it established a 200 response and began emitting
            // SSE chunks — whether the stream actually completes is decided
            // once it's fully drained, downstream of this loop. Scoring and
            // FULL_RESPONSE for that case are deferred to the gateway's
            // stream forwarder so a mid-stream abort is not double-counted
            // as both a success and a failure.
            if matches!(response.body, UpstreamBody::Stream(_)) {
                return AttemptResult::Success(Outcome {
                    response,
                    model: model.clone(),
                });
            }

            let outcome = judge_outcome(&response, &config.retries.conditions);
            let retryable = is_retryable(outcome, response.status, &config.retries.conditions);
            health.record_outcome(model, outcome, now);
            if outcome.is_success() {
                trace.record(now, Some(model.clone()), Stage::FullResponse, None);
                return AttemptResult::Success(Outcome {
                    response,
                    model: model.clone(),
                });
            }
            if !retryable {
                // A non-retryable failure stops the loop outright and is
                // passed through to the client verbatim.
                trace.record(
                    now,
                    Some(model.clone()),
                    Stage::ModelFail,
                    Some(format!("{} status={}", outcome.as_str(), response.status)),
                );
                let body = match response.body {
                    UpstreamBody::Bytes(bytes) => bytes,
                    UpstreamBody::Stream(_) => bytes::Bytes::new(),
                };
                return AttemptResult::Stop(RoutingError::UpstreamStatus {
                    code: response.status,
                    body,
                });
            }
            trace.record(
                now,
                Some(model.clone()),
                Stage::ModelFail,
                Some(format!("{} status={}", outcome.as_str(), response.status)),
            );
            AttemptResult::Retry(outcome.as_str().to_string())
        }
        Err(err) => {
            let outcome = outcome_for_error(&err);
            health.record_outcome(model, outcome, now);
            trace.record(now, Some(model.clone()), Stage::ModelFail, Some(err.to_string()));
            AttemptResult::Retry(outcome.as_str().to_string())
        }
    }
}

fn judge_outcome(response: &UpstreamHttpResponse, conditions: &RetryConditions) -> OutcomeKind {
    if !(200..300).contains(&response.status) {
        return classify_status(response.status);
    }

    // A streaming upstream has already begun emitting bytes by the time we
    // see it here — there is no buffered content to inspect for emptiness or
    // a keyword match, and nothing left to retry against. The orchestrator's
    // job ends at "the attempt succeeded"; stream-abort detection happens
    // downstream, once the gateway is forwarding chunks to the client.
    let UpstreamBody::Bytes(bytes) = &response.body else {
        return OutcomeKind::Success;
    };
    let body_text = std::str::from_utf8(bytes).ok().map(str::to_string);

    if conditions.retry_on_empty {
        let is_empty = body_text.as_deref().map(str::trim).map(str::is_empty).unwrap_or(true);
        if is_empty {
            return OutcomeKind::EmptyResponse;
        }
    }

    if let Some(text) = &body_text {
        if conditions.matches_body(text) {
            return OutcomeKind::BodyKeyword;
        }
    }

    OutcomeKind::Success
}

pub(crate) fn classify_status(status: u16) -> OutcomeKind {
    match status {
        401 | 403 => OutcomeKind::Http4xxAuth,
        429 => OutcomeKind::Http429,
        500..=599 => OutcomeKind::Http5xx,
        _ => OutcomeKind::Http4xxOther,
    }
}

/// Retry iff the outcome kind is retryable by default policy, or the
/// operator has explicitly opted this exact status code into retries.
fn is_retryable(outcome: OutcomeKind, status: u16, conditions: &RetryConditions) -> bool {
    outcome.retryable_by_default() || conditions.matches_status(status)
}

fn outcome_for_error(err: &RoutingError) -> OutcomeKind {
    match err {
        RoutingError::ConnectTimeout => OutcomeKind::ConnectTimeout,
        RoutingError::GenerationTimeout => OutcomeKind::GenerationTimeout,
        _ => OutcomeKind::Transport,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tiermux_common::{ModelsConfig, Protocol, ProviderEndpoint, ProvidersConfig};
    use tiermux_provider_core::{UpstreamFailure, UpstreamHttpRequest};

    struct ScriptedClient {
        responses: Mutex<Vec<Result<(u16, &'static str), UpstreamFailure>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UpstreamClient for ScriptedClient {
        async fn send(
            &self,
            _req: UpstreamHttpRequest,
            _connect_timeout: Duration,
            _generation_timeout: Duration,
        ) -> Result<UpstreamHttpResponse, UpstreamFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.responses.lock().unwrap();
            let next = guard.remove(0);
            next.map(|(status, body)| UpstreamHttpResponse {
                status,
                headers: Vec::new(),
                body: UpstreamBody::Bytes(Bytes::from_static(body.as_bytes())),
            })
        }
    }

    fn config_with_pool(models: Vec<&str>) -> RoutingConfig {
        let mut config = RoutingConfig::default();
        config.providers = ProvidersConfig {
            upstream: ProviderEndpoint {
                base_url: "https://api.openai.com".to_string(),
                api_key: "key".to_string(),
                protocol: Protocol::OpenAi,
                verify_ssl: true,
            },
            custom: Default::default(),
            map: Default::default(),
        };
        config.models = ModelsConfig {
            t1: models.into_iter().map(str::to_string).collect(),
            ..ModelsConfig::default()
        };
        config
    }

    #[tokio::test]
    async fn succeeds_on_the_first_healthy_candidate() {
        let config = config_with_pool(vec!["gpt-4o-mini"]);
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok((200, "{\"choices\":[]}"))]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let outcome = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap();
        assert_eq!(outcome.model.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn fails_over_to_the_next_candidate_on_upstream_status() {
        let config = config_with_pool(vec!["broken", "healthy"]);
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok((500, "boom")), Ok((200, "ok"))]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let outcome = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap();
        assert_eq!(outcome.response.status, 200);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_when_every_candidate_fails() {
        let mut config = config_with_pool(vec!["only"]);
        config.retries.max_retries.t1 = 2;
        config.retries.rounds.t1 = 2;
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok((500, "boom")), Ok((500, "boom"))]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let err = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap_err();
        match err {
            RoutingError::Exhausted { attempted, last_reason } => {
                assert_eq!(attempted, vec!["upstream/only".to_string(), "upstream/only".to_string()]);
                assert_eq!(last_reason, "http_5xx");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried_and_passes_through_verbatim() {
        let config = config_with_pool(vec!["broken", "healthy"]);
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok((401, "{\"error\":\"unauthorized\"}"))]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let err = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        match err {
            RoutingError::UpstreamStatus { code, body } => {
                assert_eq!(code, 401);
                assert_eq!(&body[..], b"{\"error\":\"unauthorized\"}");
            }
            other => panic!("expected UpstreamStatus passthrough, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_response_is_retried_when_configured() {
        let mut config = config_with_pool(vec!["x", "y"]);
        config.retries.conditions.retry_on_empty = true;
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Ok((200, "{\"choices\":[{\"message\":{\"content\":\"  \"}}]}")),
                Ok((200, "{\"choices\":[{\"message\":{\"content\":\"ok\"}}]}")),
            ]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let outcome = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.model.model, "y");
    }

    #[tokio::test]
    async fn body_matching_a_configured_keyword_is_retried() {
        let mut config = config_with_pool(vec!["x", "y"]);
        config.retries.conditions.error_keywords = vec!["rate limit".to_string()];
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Ok((200, "{\"choices\":[{\"message\":{\"content\":\"sorry, rate limit hit\"}}]}")),
                Ok((200, "{\"choices\":[{\"message\":{\"content\":\"ok\"}}]}")),
            ]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let outcome = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap();
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.model.model, "y");
    }

    #[tokio::test]
    async fn sequential_strategy_is_bounded_by_rounds_times_pool_size_not_max_retries() {
        // rounds=1, pool=5 => 5 distinct attempts expected, even though
        // max_retries=3 would otherwise truncate the pass early.
        let mut config = config_with_pool(vec!["a", "b", "c", "d", "e"]);
        config.retries.rounds.t1 = 1;
        config.retries.max_retries.t1 = 3;
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
            ]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let err = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 5);
        match err {
            RoutingError::Exhausted { attempted, .. } => assert_eq!(attempted.len(), 5),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn random_strategy_is_bounded_by_max_retries_not_rounds() {
        // rounds=1 would stop after one pass over a 2-model pool; max_retries=5
        // must still drive 5 distinct attempts by reordering and looping.
        let mut config = config_with_pool(vec!["a", "b"]);
        config.models.strategies.insert(Tier::T1, tiermux_common::Strategy::Random);
        config.retries.rounds.t1 = 1;
        config.retries.max_retries.t1 = 5;
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
                Ok((500, "boom")),
            ]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let err = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 5);
        match err {
            RoutingError::Exhausted { attempted, .. } => assert_eq!(attempted.len(), 5),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhaustion_attempts_every_candidate_exactly_once_per_round() {
        let config = config_with_pool(vec!["x", "y"]);
        let health = HealthRegistry::new(0.01, 1.0);
        let client = ScriptedClient {
            responses: Mutex::new(vec![Ok((500, "boom")), Ok((500, "boom"))]),
            calls: AtomicUsize::new(0),
        };
        let mut trace = TraceRecorder::new("t", Tier::T1, OffsetDateTime::now_utc());

        let err = run(&client, &config, &health, Tier::T1, &Map::new(), false, &mut trace)
            .await
            .unwrap_err();
        match err {
            RoutingError::Exhausted { attempted, last_reason } => {
                assert_eq!(attempted, vec!["upstream/x".to_string(), "upstream/y".to_string()]);
                assert_eq!(last_reason, "http_5xx");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
