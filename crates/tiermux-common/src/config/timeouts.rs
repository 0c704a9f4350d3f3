use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Per-tier millisecond values. Used for both the connect-phase and the
/// generation-phase timeout tables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TierMillis {
    pub t1: u64,
    pub t2: u64,
    pub t3: u64,
}

impl TierMillis {
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::T1 => self.t1,
            Tier::T2 => self.t2,
            Tier::T3 => self.t3,
        }
    }
}

fn default_connect() -> TierMillis {
    TierMillis { t1: 5_000, t2: 5_000, t3: 5_000 }
}

fn default_generation() -> TierMillis {
    TierMillis { t1: 30_000, t2: 60_000, t3: 120_000 }
}

/// The `timeouts` section: the two-phase timeout budget (connect vs.
/// generation) per tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_connect")]
    pub connect_ms: TierMillis,
    #[serde(default = "default_generation")]
    pub generation_ms: TierMillis,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect(),
            generation_ms: default_generation(),
        }
    }
}
