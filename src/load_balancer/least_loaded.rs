//! Least-loaded load balancing strategy.

use crate::load_balancer::{tracker::LoadTracker, LoadBalancer};
use crate::routing::RetryTarget;

/// Least-loaded selector.
/// Prefers targets with the fewest in-flight attempts.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl LeastLoaded {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastLoaded {
    fn select(&self, candidates: &[RetryTarget], fanout: usize, tracker: &LoadTracker) -> Vec<RetryTarget> {
        let mut ranked: Vec<(usize, &RetryTarget)> = candidates
            .iter()
            .map(|t| (tracker.in_flight(&t.key()), t))
            .collect();
        // Stable: ties keep sequence order.
        ranked.sort_by_key(|(load, _)| *load);
        ranked.into_iter().take(fanout).map(|(_, t)| t.clone()).collect()
    }
}
