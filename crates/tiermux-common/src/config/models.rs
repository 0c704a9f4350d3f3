use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tier::Tier;

/// Candidate-ordering strategy for a tier's model pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Sequential,
    Random,
    Adaptive,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Sequential
    }
}

/// The `models` section: the ordered candidate pool for each tier, plus the
/// per-tier strategy used to order (or reorder) that pool at selection time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub t1: Vec<String>,
    #[serde(default)]
    pub t2: Vec<String>,
    #[serde(default)]
    pub t3: Vec<String>,
    #[serde(default)]
    pub strategies: HashMap<Tier, Strategy>,
}

impl ModelsConfig {
    pub fn pool(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::T1 => &self.t1,
            Tier::T2 => &self.t2,
            Tier::T3 => &self.t3,
        }
    }

    pub fn strategy(&self, tier: Tier) -> Strategy {
        self.strategies.get(&tier).copied().unwrap_or_default()
    }
}
