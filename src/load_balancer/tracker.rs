//! Per-target load and outcome tracking.
//!
//! # Responsibilities
//! - Count in-flight attempts per target (for LeastLoaded)
//! - Count completed attempts, successes and failures per target (for Weighted and statistics)
//! - Count interrupted attempts apart, so cancellations never lower a target's score

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

/// Live counters for one target.
#[derive(Debug)]
pub struct TargetLoad {
    key: String,
    /// Attempts currently waiting on the invoke callback.
    in_flight: AtomicUsize,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    interrupted: AtomicU64,
}

impl TargetLoad {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            in_flight: AtomicUsize::new(0),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn interrupted(&self) -> u64 {
        self.interrupted.load(Ordering::Relaxed)
    }

    /// Mark an attempt as started. The in-flight count drops when the guard does.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard { target: self.clone() }
    }

    pub fn mark_success(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_failure(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// The attempt was abandoned by a deadline or cancellation.
    pub fn mark_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }

    /// Observed success fraction, `None` before the first completed attempt.
    pub fn success_rate(&self) -> Option<f64> {
        let attempts = self.attempts();
        (attempts > 0).then(|| self.successes() as f64 / attempts as f64)
    }

    /// Laplace-smoothed success rate: unknown targets score 0.5.
    pub fn smoothed_success_rate(&self) -> f64 {
        (self.successes() as f64 + 1.0) / (self.attempts() as f64 + 2.0)
    }
}

/// RAII guard that decrements the in-flight count on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    target: Arc<TargetLoad>,
}

impl Deref for InFlightGuard {
    type Target = TargetLoad;
    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.target.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Serializable copy of one target's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetLoadSnapshot {
    pub in_flight: usize,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub interrupted: u64,
    pub success_rate: Option<f64>,
}

/// Registry of target counters, shared by every execution of an engine.
#[derive(Debug, Clone, Default)]
pub struct LoadTracker {
    targets: Arc<DashMap<String, Arc<TargetLoad>>>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for a target key, created on first use.
    pub fn get(&self, key: &str) -> Arc<TargetLoad> {
        if let Some(existing) = self.targets.get(key) {
            return existing.value().clone();
        }
        self.targets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TargetLoad::new(key)))
            .value()
            .clone()
    }

    pub fn in_flight(&self, key: &str) -> usize {
        self.targets.get(key).map_or(0, |t| t.in_flight())
    }

    pub fn smoothed_success_rate(&self, key: &str) -> f64 {
        self.targets.get(key).map_or(0.5, |t| t.smoothed_success_rate())
    }

    pub fn snapshot(&self) -> BTreeMap<String, TargetLoadSnapshot> {
        self.targets
            .iter()
            .map(|r| {
                let t = r.value();
                (
                    r.key().clone(),
                    TargetLoadSnapshot {
                        in_flight: t.in_flight(),
                        attempts: t.attempts(),
                        successes: t.successes(),
                        failures: t.failures(),
                        interrupted: t.interrupted(),
                        success_rate: t.success_rate(),
                    },
                )
            })
            .collect()
    }

    pub fn reset(&self) {
        self.targets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_in_flight() {
        let tracker = LoadTracker::new();
        let target = tracker.get("b@r");
        {
            let g1 = target.begin();
            let g2 = target.begin();
            assert_eq!(tracker.in_flight("b@r"), 2);
            g1.mark_failure();
            g2.mark_success();
        }
        assert_eq!(tracker.in_flight("b@r"), 0);
        assert_eq!(target.attempts(), 2);
        assert_eq!(target.success_rate(), Some(0.5));
    }

    #[test]
    fn test_interrupted_attempts_leave_score_alone() {
        let tracker = LoadTracker::new();
        let target = tracker.get("b@r");
        target.begin().mark_success();
        for _ in 0..5 {
            target.begin().mark_interrupted();
        }
        assert_eq!(target.attempts(), 1);
        assert_eq!(target.interrupted(), 5);
        assert_eq!(target.success_rate(), Some(1.0));
        assert_eq!(tracker.smoothed_success_rate("b@r"), 2.0 / 3.0);
        assert_eq!(tracker.in_flight("b@r"), 0);
    }

    #[test]
    fn test_smoothed_rate() {
        let tracker = LoadTracker::new();
        assert_eq!(tracker.smoothed_success_rate("unknown"), 0.5);
        let t = tracker.get("k");
        for _ in 0..8 {
            let g = t.begin();
            g.mark_success();
        }
        assert_eq!(tracker.smoothed_success_rate("k"), 0.9);
    }

    #[test]
    fn test_concurrent_guards() {
        let tracker = LoadTracker::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let t = tracker.get("shared");
                        let g = t.begin();
                        g.mark_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = tracker.snapshot();
        assert_eq!(snap["shared"].attempts, 8000);
        assert_eq!(snap["shared"].failures, 8000);
        assert_eq!(snap["shared"].in_flight, 0);
    }
}
