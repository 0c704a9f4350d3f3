use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Per-tier round counts. A "round" is one full pass over the candidate
/// pool; `max_retries` bounds the total number of upstream attempts across
/// all rounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierU32 {
    pub t1: u32,
    pub t2: u32,
    pub t3: u32,
}

impl TierU32 {
    pub fn get(&self, tier: Tier) -> u32 {
        match tier {
            Tier::T1 => self.t1,
            Tier::T2 => self.t2,
            Tier::T3 => self.t3,
        }
    }
}

fn default_rounds() -> TierU32 {
    TierU32 { t1: 1, t2: 2, t3: 2 }
}

fn default_max_retries() -> TierU32 {
    TierU32 { t1: 3, t2: 4, t3: 6 }
}

/// Conditions under which a completed upstream response is treated as a
/// retryable failure rather than a terminal answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConditions {
    #[serde(default)]
    pub status_codes: Vec<u16>,
    #[serde(default)]
    pub error_keywords: Vec<String>,
    #[serde(default)]
    pub retry_on_empty: bool,
}

impl RetryConditions {
    pub fn matches_status(&self, status: u16) -> bool {
        self.status_codes.contains(&status)
    }

    pub fn matches_body(&self, body: &str) -> bool {
        let lowered = body.to_ascii_lowercase();
        self.error_keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_ascii_lowercase()))
    }
}

/// The `retries` section: per-tier round/attempt caps and the shared
/// retry-condition predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetriesConfig {
    #[serde(default = "default_rounds")]
    pub rounds: TierU32,
    #[serde(default = "default_max_retries")]
    pub max_retries: TierU32,
    #[serde(default)]
    pub conditions: RetryConditions,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            max_retries: default_max_retries(),
            conditions: RetryConditions::default(),
        }
    }
}
