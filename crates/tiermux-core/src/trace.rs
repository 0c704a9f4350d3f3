use std::fmt;

use time::OffsetDateTime;
use tiermux_common::{ModelRef, Tier};
use tiermux_provider_core::{OutcomeKind, RequestLog, TraceEvent};

/// The closed set of trace stages a single request can pass through. Names
/// match the data model's stage vocabulary exactly so a log reader never has
/// to reconcile two different vocabularies for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReqReceived,
    RouterStart,
    RouterEnd,
    RouterFail,
    ModelCallStart,
    FirstToken,
    FullResponse,
    ModelFail,
    AllFailed,
    ClientAbort,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ReqReceived => "REQ_RECEIVED",
            Stage::RouterStart => "ROUTER_START",
            Stage::RouterEnd => "ROUTER_END",
            Stage::RouterFail => "ROUTER_FAIL",
            Stage::ModelCallStart => "MODEL_CALL_START",
            Stage::FirstToken => "FIRST_TOKEN",
            Stage::FullResponse => "FULL_RESPONSE",
            Stage::ModelFail => "MODEL_FAIL",
            Stage::AllFailed => "ALL_FAILED",
            Stage::ClientAbort => "CLIENT_ABORT",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates structured trace events for the lifetime of one request, then
/// folds them into a terminal `RequestLog` for the configured `LogSink`.
pub struct TraceRecorder {
    trace_id: String,
    tier: Tier,
    started_at: OffsetDateTime,
    events: Vec<TraceEvent>,
    attempts: u32,
}

impl TraceRecorder {
    pub fn new(trace_id: impl Into<String>, tier: Tier, now: OffsetDateTime) -> Self {
        Self {
            trace_id: trace_id.into(),
            tier,
            started_at: now,
            events: Vec::new(),
            attempts: 0,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Overwrites the tier once the classifier (or its fallback) has decided
    /// one; requests are traced from `REQ_RECEIVED`, before a tier is known.
    pub fn set_tier(&mut self, tier: Tier) {
        self.tier = tier;
    }

    /// Records one attempt-scoped event against the closed stage set.
    /// `detail` carries free-form context for the audit log.
    pub fn record(&mut self, now: OffsetDateTime, model: Option<ModelRef>, stage: Stage, detail: Option<String>) {
        let sequence = self.events.len() as u32;
        self.events.push(TraceEvent {
            trace_id: self.trace_id.clone(),
            sequence,
            at: now,
            model,
            attempt_no: self.attempts,
            kind: stage.as_str().to_string(),
            detail,
        });
    }

    pub fn begin_attempt(&mut self, now: OffsetDateTime, model: &ModelRef) {
        self.attempts += 1;
        self.record(now, Some(model.clone()), Stage::ModelCallStart, None);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Finalizes the recorder into a `RequestLog`, consuming the accumulated
    /// events. `chosen_model` is the model that produced (or last attempted)
    /// the terminal outcome.
    pub fn finish(
        self,
        now: OffsetDateTime,
        chosen_model: Option<ModelRef>,
        outcome: OutcomeKind,
        prompt_tokens: Option<u64>,
        completion_tokens: Option<u64>,
    ) -> RequestLog {
        let elapsed_ms = (now - self.started_at).whole_milliseconds().max(0) as u64;
        RequestLog {
            trace_id: self.trace_id,
            tier: self.tier.to_string(),
            chosen_model,
            attempts: self.attempts,
            elapsed_ms,
            outcome,
            prompt_tokens,
            completion_tokens,
            events: self.events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase_monotonically() {
        let now = OffsetDateTime::now_utc();
        let mut recorder = TraceRecorder::new("trace-1", Tier::T1, now);
        recorder.record(now, None, Stage::ReqReceived, None);
        recorder.begin_attempt(now, &ModelRef::new("openai", "gpt-4o-mini"));
        recorder.record(now, None, Stage::FullResponse, Some("200".to_string()));

        let sequences: Vec<u32> = recorder.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn finish_reports_the_attempt_count_and_outcome() {
        let now = OffsetDateTime::now_utc();
        let mut recorder = TraceRecorder::new("trace-2", Tier::T2, now);
        let model = ModelRef::new("openai", "gpt-4o");
        recorder.begin_attempt(now, &model);
        recorder.begin_attempt(now, &model);

        let later = now + time::Duration::milliseconds(40);
        let log = recorder.finish(later, Some(model.clone()), OutcomeKind::Success, Some(12), Some(34));
        assert_eq!(log.attempts, 2);
        assert_eq!(log.outcome, OutcomeKind::Success);
        assert_eq!(log.chosen_model, Some(model));
        assert!(log.elapsed_ms >= 40);
    }
}
