//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Batch request → full target sequence
//!     → fanout < candidates? apply balancing policy:
//!         - round_robin.rs (rotate the starting target across requests)
//!         - random.rs (uniform pick)
//!         - least_loaded.rs (fewest in-flight attempts)
//!         - weighted.rs (highest smoothed success rate)
//!     → executor runs the request over the selected targets
//!     → tracker.rs (in-flight guard + outcome counters per attempt)
//! ```
//!
//! # Design Decisions
//! - Balancers are stateless apart from the round-robin counter; tracker.rs owns load
//! - One balancer instance per batch, so round-robin rotation is per batch
//! - Sequence order is the tie-break everywhere

pub mod least_loaded;
pub mod random;
pub mod round_robin;
pub mod tracker;
pub mod weighted;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::routing::RetryTarget;

pub use least_loaded::LeastLoaded;
pub use random::RandomPick;
pub use round_robin::RoundRobin;
pub use tracker::{InFlightGuard, LoadTracker, TargetLoad, TargetLoadSnapshot};
pub use weighted::Weighted;

/// Picks and orders the targets one request will try.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Return at most `fanout` targets from `candidates`, in the order to try them.
    fn select(&self, candidates: &[RetryTarget], fanout: usize, tracker: &LoadTracker) -> Vec<RetryTarget>;
}

/// Target distribution across the requests of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingPolicy {
    #[default]
    RoundRobin,
    Random,
    LeastLoaded,
    Weighted,
}

impl LoadBalancingPolicy {
    /// Build a fresh balancer. `seed` only affects `Random`.
    pub fn build(self, seed: Option<u64>) -> Box<dyn LoadBalancer> {
        match self {
            LoadBalancingPolicy::RoundRobin => Box::new(RoundRobin::new()),
            LoadBalancingPolicy::Random => match seed {
                Some(seed) => Box::new(RandomPick::with_seed(seed)),
                None => Box::new(RandomPick::new()),
            },
            LoadBalancingPolicy::LeastLoaded => Box::new(LeastLoaded::new()),
            LoadBalancingPolicy::Weighted => Box::new(Weighted::new()),
        }
    }
}

/// Targets for one request: the full sequence unless `fanout` is smaller.
pub fn assign_targets(
    balancer: &dyn LoadBalancer,
    candidates: &[RetryTarget],
    fanout: Option<usize>,
    tracker: &LoadTracker,
) -> Vec<RetryTarget> {
    match fanout {
        Some(n) if n < candidates.len() => balancer.select(candidates, n, tracker),
        _ => candidates.to_vec(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn candidates(n: usize) -> Vec<RetryTarget> {
        (0..n).map(|i| RetryTarget::new(format!("b{i}"), "r0", i)).collect()
    }

    pub(crate) fn backends(targets: &[RetryTarget]) -> Vec<String> {
        targets.iter().map(|t| t.backend.clone()).collect()
    }

    #[test]
    fn test_full_sequence_without_fanout() {
        let balancer = LoadBalancingPolicy::LeastLoaded.build(None);
        let tracker = LoadTracker::new();
        let targets = candidates(3);
        assert_eq!(assign_targets(balancer.as_ref(), &targets, None, &tracker), targets);
        assert_eq!(assign_targets(balancer.as_ref(), &targets, Some(3), &tracker), targets);
        assert_eq!(assign_targets(balancer.as_ref(), &targets, Some(9), &tracker), targets);
    }

    #[test]
    fn test_round_robin_spreads_first_target() {
        let balancer = LoadBalancingPolicy::RoundRobin.build(None);
        let tracker = LoadTracker::new();
        let targets = candidates(3);
        let firsts: Vec<String> = (0..6)
            .map(|_| assign_targets(balancer.as_ref(), &targets, Some(1), &tracker)[0].backend.clone())
            .collect();
        assert_eq!(firsts, vec!["b0", "b1", "b2", "b0", "b1", "b2"]);
    }
}
