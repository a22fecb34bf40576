//! Seeded random sampling: initial battery levels and uniform-demand
//! generation must all draw from the same seeded stream for reproducibility
//! (specification §4.8 design notes, "Random sources").

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

/// ECS resource wrapping the single seeded RNG stream for the whole engine.
#[derive(Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Samples a truncated normal distribution on `[low, high]` via rejection,
/// matching `DataInterface.get_truncated_normal` in the original
/// implementation (`scipy.stats.truncnorm(mean=0.90, sd=0.3, low=0.05, upp=1.0)`).
/// Used for initial vehicle battery levels so the fleet starts with a
/// realistic, mostly-charged distribution instead of a uniform one.
pub fn sample_truncated_normal(
    rng: &mut StdRng,
    mean: f64,
    std_dev: f64,
    low: f64,
    high: f64,
) -> f64 {
    let normal = Normal::new(mean, std_dev).expect("std_dev must be positive");
    // Bounded retry: a normal(0.90, 0.3) truncated to [0.05, 1.0] accepts the
    // overwhelming majority of draws, so this converges essentially always;
    // the cap only protects against pathological mean/std_dev/bounds input.
    for _ in 0..1000 {
        let sample = rng.sample(normal);
        if sample >= low && sample <= high {
            return sample;
        }
    }
    mean.clamp(low, high)
}

/// Sample a random initial battery level with the engine's default
/// truncated-normal parameters (mean 0.90, sd 0.3, bounds [0.05, 1.0]).
pub fn sample_initial_battery_level(rng: &mut StdRng) -> f64 {
    sample_truncated_normal(rng, 0.90, 0.3, 0.05, 1.0)
}
