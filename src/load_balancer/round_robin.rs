//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::{tracker::LoadTracker, LoadBalancer};
use crate::routing::RetryTarget;

/// Round-robin selector.
/// Each call starts one position further along the candidate list.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn select(&self, candidates: &[RetryTarget], fanout: usize, _tracker: &LoadTracker) -> Vec<RetryTarget> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let len = candidates.len();
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % len;
        (0..fanout.min(len))
            .map(|i| candidates[(start + i) % len].clone())
            .collect()
    }
}
