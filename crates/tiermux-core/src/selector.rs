use rand::Rng;
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tiermux_common::{ModelRef, Strategy};

use crate::health::HealthRegistry;

/// Orders a tier's candidate pool for one request according to its
/// configured strategy. `sequential` is a no-op ordering; `random` shuffles
/// uniformly; `adaptive` draws without replacement, weighted by
/// `1 / (1 + failure_score * k)` so healthier models surface first more
/// often, without ever fully excluding a degraded one.
pub fn order_candidates(
    strategy: Strategy,
    candidates: &[ModelRef],
    health: &HealthRegistry,
    now: OffsetDateTime,
) -> Vec<ModelRef> {
    match strategy {
        Strategy::Sequential => candidates.to_vec(),
        Strategy::Random => {
            let mut ordered = candidates.to_vec();
            ordered.shuffle(&mut rand::rng());
            ordered
        }
        Strategy::Adaptive => adaptive_order(candidates, health, now),
    }
}

fn adaptive_order(
    candidates: &[ModelRef],
    health: &HealthRegistry,
    now: OffsetDateTime,
) -> Vec<ModelRef> {
    let mut remaining: Vec<(ModelRef, f64)> = candidates
        .iter()
        .map(|model| (model.clone(), health.weight(model, now).max(f64::MIN_POSITIVE)))
        .collect();
    let mut ordered = Vec::with_capacity(candidates.len());

    while !remaining.is_empty() {
        let total: f64 = remaining.iter().map(|(_, weight)| weight).sum();
        let mut pick = rand::rng().random_range(0.0..total);
        let mut chosen_idx = remaining.len() - 1;
        for (idx, (_, weight)) in remaining.iter().enumerate() {
            if pick < *weight {
                chosen_idx = idx;
                break;
            }
            pick -= weight;
        }
        let (model, _) = remaining.remove(chosen_idx);
        ordered.push(model);
    }

    ordered
}
