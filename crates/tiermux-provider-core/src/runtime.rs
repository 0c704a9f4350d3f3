use serde::{Deserialize, Serialize};
use tiermux_common::ModelRef;

/// The kind of outcome an upstream attempt produced, as judged against the
/// tier's `RetryConditions`. Feeds both the health scorer's penalty lookup
/// and the trace/log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    /// 401/403 — never retried by default.
    Http4xxAuth,
    Http429,
    Http5xx,
    /// Any other non-2xx status not explicitly opted into retries.
    Http4xxOther,
    ConnectTimeout,
    GenerationTimeout,
    Transport,
    EmptyResponse,
    BodyKeyword,
    StreamAbort,
    ClientAbort,
    /// Terminal record only: every candidate was attempted and exhausted.
    Exhausted,
}

impl OutcomeKind {
    pub fn is_success(self) -> bool {
        matches!(self, OutcomeKind::Success)
    }

    /// Snake-case label used in trace reasons and the exhaustion error
    /// envelope, matching this enum's own serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Success => "success",
            OutcomeKind::Http4xxAuth => "http_4xx_auth",
            OutcomeKind::Http429 => "http_429",
            OutcomeKind::Http5xx => "http_5xx",
            OutcomeKind::Http4xxOther => "http_4xx_other",
            OutcomeKind::ConnectTimeout => "timeout_connect",
            OutcomeKind::GenerationTimeout => "timeout_generation",
            OutcomeKind::Transport => "transport",
            OutcomeKind::EmptyResponse => "empty_response",
            OutcomeKind::BodyKeyword => "body_keyword",
            OutcomeKind::StreamAbort => "stream_abort",
            OutcomeKind::ClientAbort => "client_abort",
            OutcomeKind::Exhausted => "exhausted",
        }
    }

    /// Whether this outcome kind is retried by default policy, independent
    /// of any operator-configured `retry_conditions.status_codes` opt-in.
    pub fn retryable_by_default(self) -> bool {
        matches!(
            self,
            OutcomeKind::ConnectTimeout
                | OutcomeKind::GenerationTimeout
                | OutcomeKind::Transport
                | OutcomeKind::Http5xx
                | OutcomeKind::Http429
                | OutcomeKind::EmptyResponse
                | OutcomeKind::StreamAbort
                | OutcomeKind::BodyKeyword
        )
    }
}

/// Persisted per-model health state. `failure_score` decays toward zero over
/// wall-clock time; `last_updated` anchors that decay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStats {
    pub model: ModelRef,
    pub failure_score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: time::OffsetDateTime,
    pub success_count: u64,
    pub failure_count: u64,
    /// The outcome kind of the most recent failed attempt, if any. `None`
    /// until the first failure, and never cleared by a later success — it
    /// records what last went wrong, not what's currently wrong.
    #[serde(default)]
    pub last_error_kind: Option<OutcomeKind>,
}

impl ModelStats {
    pub fn fresh(model: ModelRef, now: time::OffsetDateTime) -> Self {
        Self {
            model,
            failure_score: 0.0,
            last_updated: now,
            success_count: 0,
            failure_count: 0,
            last_error_kind: None,
        }
    }
}

/// One structured instrumentation event emitted during an attempt. `TraceRecorder`
/// appends these for the lifetime of a request; the default `LogSink` impl persists
/// them as part of the terminal `RequestLog`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub sequence: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub at: time::OffsetDateTime,
    pub model: Option<ModelRef>,
    pub attempt_no: u32,
    pub kind: String,
    pub detail: Option<String>,
}

/// The terminal, request-scoped record written once a response (success or
/// exhaustion) has been decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub trace_id: String,
    pub tier: String,
    pub chosen_model: Option<ModelRef>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub outcome: OutcomeKind,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub events: Vec<TraceEvent>,
}
