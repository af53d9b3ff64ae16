//! Random load balancing strategy.

use std::sync::Mutex;

use crate::load_balancer::{tracker::LoadTracker, LoadBalancer};
use crate::routing::RetryTarget;

/// Uniform random selector.
#[derive(Debug)]
pub struct RandomPick {
    rng: Mutex<fastrand::Rng>,
}

impl RandomPick {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Reproducible selector for simulations.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Default for RandomPick {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for RandomPick {
    fn select(&self, candidates: &[RetryTarget], fanout: usize, _tracker: &LoadTracker) -> Vec<RetryTarget> {
        let mut picked = candidates.to_vec();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.shuffle(&mut picked);
        picked.truncate(fanout);
        picked
    }
}
