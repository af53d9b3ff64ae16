//! Batch failure-handling policies.

use serde::{Deserialize, Serialize};

use crate::config::schema::ParallelConfig;
use crate::executor::ExecutionStatus;

/// Reaction to failed requests within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Run every request to completion.
    #[default]
    ContinueOnFailure,
    /// Cancel in-flight and queued work on the first failure.
    StopOnFirstFailure,
    /// Cancel once the running failure rate exceeds the configured fraction.
    StopOnThreshold,
}

/// Running failure count for one batch.
///
/// Exhausted and timed-out requests are failures. Cancelled ones are not:
/// they are the policy's own doing.
#[derive(Debug, Clone)]
pub struct FailureMonitor {
    policy: FailurePolicy,
    threshold: f64,
    min_completed: usize,
    completed: usize,
    failed: usize,
}

impl FailureMonitor {
    pub fn new(config: &ParallelConfig) -> Self {
        Self {
            policy: config.failure_policy,
            threshold: config.failure_rate_threshold,
            min_completed: config.min_completed_for_threshold.max(1),
            completed: 0,
            failed: 0,
        }
    }

    /// Count a finished request. Returns `true` when the batch should stop.
    pub fn observe(&mut self, status: ExecutionStatus) -> bool {
        if status == ExecutionStatus::Cancelled {
            return false;
        }
        self.completed += 1;
        let failed = matches!(status, ExecutionStatus::Exhausted | ExecutionStatus::TimedOut);
        if failed {
            self.failed += 1;
        }
        match self.policy {
            FailurePolicy::ContinueOnFailure => false,
            FailurePolicy::StopOnFirstFailure => failed,
            FailurePolicy::StopOnThreshold => {
                self.completed >= self.min_completed && self.failure_rate() > self.threshold
            }
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.failed as f64 / self.completed as f64
        }
    }
}
