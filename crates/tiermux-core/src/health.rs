use std::collections::HashMap;
use std::sync::RwLock;

use time::OffsetDateTime;
use tiermux_common::ModelRef;
use tiermux_provider_core::{ModelStats, OutcomeKind};

/// Policy-tunable per-outcome penalty weights, added to a model's
/// `failure_score` on a failed attempt. Larger values push the model out of
/// the adaptive selector's favor faster and for longer. Concrete numbers are
/// policy and may be tuned, but the relative ordering — auth ≥ 5xx >
/// stream_abort ≥ timeout_connect ≥ empty ≥ keyword — must be preserved.
pub mod penalty {
    pub const TIMEOUT_CONNECT: f64 = 2.0;
    pub const TIMEOUT_GENERATION: f64 = 3.0;
    pub const HTTP_4XX_AUTH: f64 = 5.0;
    pub const HTTP_429: f64 = 1.0;
    pub const HTTP_5XX: f64 = 2.0;
    pub const HTTP_4XX_OTHER: f64 = 1.0;
    pub const EMPTY_RESPONSE: f64 = 1.5;
    pub const STREAM_ABORT: f64 = 2.0;
    pub const BODY_KEYWORD: f64 = 1.0;
    pub const TRANSPORT: f64 = 2.0;

    pub fn for_outcome(outcome: super::OutcomeKind) -> f64 {
        use super::OutcomeKind::*;
        match outcome {
            Success | ClientAbort | Exhausted => 0.0,
            ConnectTimeout => TIMEOUT_CONNECT,
            GenerationTimeout => TIMEOUT_GENERATION,
            Http4xxAuth => HTTP_4XX_AUTH,
            Http429 => HTTP_429,
            Http5xx => HTTP_5XX,
            Http4xxOther => HTTP_4XX_OTHER,
            Transport => TRANSPORT,
            EmptyResponse => EMPTY_RESPONSE,
            BodyKeyword => BODY_KEYWORD,
            StreamAbort => STREAM_ABORT,
        }
    }
}

/// Tracks adaptive health state per model: a failure score that decays
/// toward zero over wall-clock time and snaps back to zero on success.
pub struct HealthRegistry {
    decay_rate: f64,
    weight_k: f64,
    stats: RwLock<HashMap<ModelRef, ModelStats>>,
}

impl HealthRegistry {
    pub fn new(decay_rate: f64, weight_k: f64) -> Self {
        Self {
            decay_rate,
            weight_k,
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Seeds the registry from persisted state (e.g. loaded via `StatsStore`
    /// at startup).
    pub fn load(decay_rate: f64, weight_k: f64, seed: Vec<ModelStats>) -> Self {
        let registry = Self::new(decay_rate, weight_k);
        let mut guard = registry.stats.write().unwrap();
        for entry in seed {
            guard.insert(entry.model.clone(), entry);
        }
        drop(guard);
        registry
    }

    pub fn snapshot(&self) -> Vec<ModelStats> {
        self.stats.read().unwrap().values().cloned().collect()
    }

    /// Linear decay at `decay_rate` points per elapsed minute:
    /// `failure_score <- max(0, failure_score - decay_rate * minutes_since_last_update)`.
    fn decayed_score(&self, entry: &ModelStats, now: OffsetDateTime) -> f64 {
        let minutes = (now - entry.last_updated).as_seconds_f64().max(0.0) / 60.0;
        (entry.failure_score - self.decay_rate * minutes).max(0.0)
    }

    /// Records the outcome of a completed attempt, decaying the prior score
    /// first and then applying the outcome: a success snaps the score back
    /// to 20% of its decayed value, a failure adds the outcome's penalty.
    pub fn record_outcome(&self, model: &ModelRef, outcome: OutcomeKind, now: OffsetDateTime) {
        let mut guard = self.stats.write().unwrap();
        let entry = guard
            .entry(model.clone())
            .or_insert_with(|| ModelStats::fresh(model.clone(), now));

        entry.failure_score = self.decayed_score(entry, now);
        if outcome.is_success() {
            entry.failure_score = (entry.failure_score * 0.2).max(0.0);
            entry.success_count += 1;
        } else {
            entry.failure_score += penalty::for_outcome(outcome);
            entry.failure_count += 1;
            entry.last_error_kind = Some(outcome);
        }
        entry.last_updated = now;
    }

    /// `health_percent = round(100 / (1 + score * k))`, in `[0, 100]`.
    pub fn health_percent(&self, model: &ModelRef, now: OffsetDateTime) -> u8 {
        let guard = self.stats.read().unwrap();
        let score = guard
            .get(model)
            .map(|entry| self.decayed_score(entry, now))
            .unwrap_or(0.0);
        let percent = 100.0 / (1.0 + score * self.weight_k);
        percent.round().clamp(0.0, 100.0) as u8
    }

    /// Selection weight used by the adaptive strategy: `1 / (1 + score * k)`.
    pub fn weight(&self, model: &ModelRef, now: OffsetDateTime) -> f64 {
        let guard = self.stats.read().unwrap();
        let score = guard
            .get(model)
            .map(|entry| self.decayed_score(entry, now))
            .unwrap_or(0.0);
        1.0 / (1.0 + score * self.weight_k)
    }
}
