use serde::{Deserialize, Serialize};

/// The `health` section: tuning for the adaptive health scorer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Points of `failure_score` that decay away per elapsed minute.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Scaling constant `k` in `weight = 1 / (1 + score * k)`.
    #[serde(default = "default_weight_k")]
    pub weight_k: f64,
}

fn default_decay_rate() -> f64 {
    1.0
}

fn default_weight_k() -> f64 {
    0.2
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            decay_rate: default_decay_rate(),
            weight_k: default_weight_k(),
        }
    }
}
