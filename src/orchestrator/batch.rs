//! Batch results and retry filters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::schema::{ParallelConfig, RetryConfig};
use crate::executor::{ExecutionResult, ExecutionStatus, Request};
use crate::resilience::validation::SharedValidator;

/// Settings a batch ran with, kept so failed requests can be re-run alike.
pub struct BatchPlan<R> {
    pub retry: Arc<RetryConfig>,
    pub parallel: ParallelConfig,
    pub validator: Option<SharedValidator<R>>,
}

impl<R> BatchPlan<R> {
    pub fn new(retry: Arc<RetryConfig>, parallel: ParallelConfig, validator: Option<SharedValidator<R>>) -> Self {
        Self {
            retry,
            parallel,
            validator,
        }
    }
}

impl<R> Clone for BatchPlan<R> {
    fn clone(&self) -> Self {
        Self {
            retry: Arc::clone(&self.retry),
            parallel: self.parallel.clone(),
            validator: self.validator.clone(),
        }
    }
}

impl<R> fmt::Debug for BatchPlan<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchPlan")
            .field("retry", &self.retry)
            .field("parallel", &self.parallel)
            .field("validator", &self.validator.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    /// Requests executed (every request in the batch).
    pub attempted: usize,
    pub succeeded: usize,
    /// Exhausted requests.
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    /// Succeeded, but with content that never passed validation.
    pub validation_flagged: usize,
    /// Invoke calls across all requests.
    pub total_attempts: usize,
    /// Invoke calls per target key.
    pub per_target: BTreeMap<String, usize>,
    /// Delivered responses per target key.
    pub served_by: BTreeMap<String, usize>,
}

impl BatchCounters {
    pub fn from_results<'a, R: 'a>(results: impl IntoIterator<Item = &'a ExecutionResult<R>>) -> Self {
        let mut counters = BatchCounters::default();
        for result in results {
            counters.attempted += 1;
            match result.status {
                ExecutionStatus::Succeeded => counters.succeeded += 1,
                ExecutionStatus::Exhausted => counters.failed += 1,
                ExecutionStatus::TimedOut => counters.timed_out += 1,
                ExecutionStatus::Cancelled => counters.cancelled += 1,
            }
            if result.had_validation_failures {
                counters.validation_flagged += 1;
            }
            for attempt in result.attempts.iter().filter(|a| a.outcome.invoked()) {
                counters.total_attempts += 1;
                *counters.per_target.entry(attempt.target.key()).or_default() += 1;
            }
            if let Some(target) = &result.target {
                *counters.served_by.entry(target.key()).or_default() += 1;
            }
        }
        counters
    }
}

/// Outcome of one batch call.
pub struct BatchResult<P, R> {
    /// Results keyed by request id.
    pub results: BTreeMap<String, ExecutionResult<R>>,
    /// Ids whose deadline elapsed, in submission order.
    pub timed_out: Vec<String>,
    /// Ids stopped by the failure policy, in submission order.
    pub cancelled: Vec<String>,
    pub counters: BatchCounters,
    pub elapsed: Duration,
    order: Vec<String>,
    requests: BTreeMap<String, Request<P>>,
    plan: BatchPlan<R>,
}

impl<P, R> BatchResult<P, R> {
    /// Assemble a result. `requests` is in submission order.
    pub(crate) fn assemble(
        requests: Vec<Request<P>>,
        mut results: BTreeMap<String, ExecutionResult<R>>,
        plan: BatchPlan<R>,
        elapsed: Duration,
    ) -> Self {
        let order: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
        let requests: BTreeMap<String, Request<P>> = requests.into_iter().map(|r| (r.id.clone(), r)).collect();
        results.retain(|id, _| requests.contains_key(id));
        let mut batch = Self {
            results,
            timed_out: Vec::new(),
            cancelled: Vec::new(),
            counters: BatchCounters::default(),
            elapsed,
            order,
            requests,
            plan,
        };
        batch.recount();
        batch
    }

    fn ids_with(&self, status: ExecutionStatus) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.results.get(*id).is_some_and(|r| r.status == status))
            .cloned()
            .collect()
    }

    fn recount(&mut self) {
        let timed_out = self.ids_with(ExecutionStatus::TimedOut);
        let cancelled = self.ids_with(ExecutionStatus::Cancelled);
        self.timed_out = timed_out;
        self.cancelled = cancelled;
        self.counters = BatchCounters::from_results(self.results.values());
    }

    /// Replace results for re-run requests, keeping everything else.
    pub(crate) fn merged(&self, rerun: BatchResult<P, R>) -> Self
    where
        R: Clone,
    {
        let mut results = self.results.clone();
        results.extend(rerun.results);
        let mut merged = Self {
            results,
            timed_out: Vec::new(),
            cancelled: Vec::new(),
            counters: BatchCounters::default(),
            elapsed: rerun.elapsed,
            order: self.order.clone(),
            requests: self.requests.clone(),
            plan: self.plan.clone(),
        };
        merged.recount();
        merged
    }

    pub fn get(&self, request_id: &str) -> Option<&ExecutionResult<R>> {
        self.results.get(request_id)
    }

    /// Request ids in submission order.
    pub fn request_ids(&self) -> &[String] {
        &self.order
    }

    pub fn request(&self, request_id: &str) -> Option<&Request<P>> {
        self.requests.get(request_id)
    }

    pub fn plan(&self) -> &BatchPlan<R> {
        &self.plan
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether every request succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.counters.succeeded == self.counters.attempted
    }

    /// Whether every request ran out of targets, with nothing delivered.
    pub fn exhausted(&self) -> bool {
        !self.is_empty() && self.counters.failed == self.counters.attempted
    }

    /// Requests eligible for a retry: not succeeded, and matching `filter` if given.
    pub fn retry_candidates(&self, filter: Option<&dyn Fn(&ExecutionResult<R>) -> bool>) -> Vec<Request<P>> {
        self.order
            .iter()
            .filter_map(|id| {
                let result = self.results.get(id)?;
                if result.is_success() || !filter.map_or(true, |f| f(result)) {
                    return None;
                }
                self.requests.get(id).cloned()
            })
            .collect()
    }

    /// Serializable summary without responses.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            counters: self.counters.clone(),
            timed_out: self.timed_out.clone(),
            cancelled: self.cancelled.clone(),
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

impl<P, R: Clone> Clone for BatchResult<P, R> {
    fn clone(&self) -> Self {
        Self {
            results: self.results.clone(),
            timed_out: self.timed_out.clone(),
            cancelled: self.cancelled.clone(),
            counters: self.counters.clone(),
            elapsed: self.elapsed,
            order: self.order.clone(),
            requests: self.requests.clone(),
            plan: self.plan.clone(),
        }
    }
}

impl<P, R: fmt::Debug> fmt::Debug for BatchResult<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchResult")
            .field("results", &self.results)
            .field("timed_out", &self.timed_out)
            .field("cancelled", &self.cancelled)
            .field("counters", &self.counters)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

/// Counters and id lists of a batch, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub counters: BatchCounters,
    pub timed_out: Vec<String>,
    pub cancelled: Vec<String>,
    pub elapsed_ms: u64,
}

/// Ready-made predicates for `retry_failed_requests`.
pub mod filters {
    use crate::error::ErrorKind;
    use crate::executor::{ExecutionResult, ExecutionStatus};

    pub fn timed_out<R>(result: &ExecutionResult<R>) -> bool {
        result.status == ExecutionStatus::TimedOut
    }

    /// Failed requests that hit rate limiting along the way.
    pub fn throttled<R>(result: &ExecutionResult<R>) -> bool {
        !result.is_success() && result.saw_error_kind(ErrorKind::RateLimited)
    }

    pub fn failed<R>(result: &ExecutionResult<R>) -> bool {
        result.status == ExecutionStatus::Exhausted
    }

    pub fn cancelled<R>(result: &ExecutionResult<R>) -> bool {
        result.status == ExecutionStatus::Cancelled
    }
}
