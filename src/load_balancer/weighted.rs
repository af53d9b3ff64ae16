//! Success-weighted load balancing strategy.

use std::cmp::Ordering;

use crate::load_balancer::{tracker::LoadTracker, LoadBalancer};
use crate::routing::RetryTarget;

/// Prefers targets with a higher historical success rate.
///
/// Rates are Laplace-smoothed, so a target with no history ranks between a
/// reliable one and a failing one.
#[derive(Debug, Default)]
pub struct Weighted;

impl Weighted {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for Weighted {
    fn select(&self, candidates: &[RetryTarget], fanout: usize, tracker: &LoadTracker) -> Vec<RetryTarget> {
        let mut ranked: Vec<(f64, &RetryTarget)> = candidates
            .iter()
            .map(|t| (tracker.smoothed_success_rate(&t.key()), t))
            .collect();
        ranked.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        ranked.into_iter().take(fanout).map(|(_, t)| t.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tests::{backends, candidates};

    fn record(tracker: &LoadTracker, key: &str, successes: usize, failures: usize) {
        let t = tracker.get(key);
        for _ in 0..successes {
            t.begin().mark_success();
        }
        for _ in 0..failures {
            t.begin().mark_failure();
        }
    }

    #[test]
    fn test_prefers_successful_targets() {
        let lb = Weighted::new();
        let tracker = LoadTracker::new();
        let targets = candidates(3);

        record(&tracker, &targets[0].key(), 1, 9);
        record(&tracker, &targets[2].key(), 9, 1);

        assert_eq!(backends(&lb.select(&targets, 3, &tracker)), vec!["b2", "b1", "b0"]);
        assert_eq!(backends(&lb.select(&targets, 1, &tracker)), vec!["b2"]);
    }

    #[test]
    fn test_ties_keep_sequence_order() {
        let lb = Weighted::new();
        let tracker = LoadTracker::new();
        let targets = candidates(3);
        assert_eq!(backends(&lb.select(&targets, 2, &tracker)), vec!["b0", "b1"]);
    }
}
