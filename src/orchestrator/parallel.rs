//! Bounded parallel execution of many requests.
//!
//! # Responsibilities
//! - Run at most `concurrency_limit` requests at once; the rest queue
//! - Hand each request its targets through the load-balancing policy
//! - Stop the batch when the failure policy says so
//! - Re-run a filtered subset of a previous batch
//!
//! # Design Decisions
//! - One task per request; the semaphore permit is the worker slot
//! - Queue waits race the batch deadline and cancel signal like any other wait
//! - Targets are assigned at dispatch time so LeastLoaded sees live load
//! - Results are collected by request index; each request yields exactly one

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{ClassifiedError, ErrorKind};
use crate::executor::{ExecutionResult, ExecutionStatus, Invoker, Request, RetryExecutor};
use crate::load_balancer::{assign_targets, LoadBalancer};
use crate::observability::metrics;
use crate::orchestrator::batch::{BatchPlan, BatchResult};
use crate::orchestrator::cancel::CancelSignal;
use crate::orchestrator::policy::FailureMonitor;
use crate::resilience::timeouts::{self, Interrupted};
use crate::routing::RetryTarget;

/// Runs batches of requests over a shared executor.
pub struct ParallelOrchestrator<I: Invoker> {
    executor: RetryExecutor<I>,
    seed: Option<u64>,
}

impl<I: Invoker> Clone for ParallelOrchestrator<I> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            seed: self.seed,
        }
    }
}

impl<I: Invoker> ParallelOrchestrator<I> {
    pub fn new(executor: RetryExecutor<I>) -> Self {
        Self { executor, seed: None }
    }

    /// Seed for the `random` balancing policy.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn executor(&self) -> &RetryExecutor<I> {
        &self.executor
    }

    /// Execute every request, never failing as a whole.
    ///
    /// Request ids are expected to be unique; callers check that up front.
    pub async fn execute_batch(
        &self,
        requests: Vec<Request<I::Payload>>,
        targets: &[RetryTarget],
        plan: BatchPlan<I::Response>,
    ) -> BatchResult<I::Payload, I::Response> {
        let start = Instant::now();
        let parallel = &plan.parallel;
        let batch_deadline = parallel.batch_timeout().map(|t| start + t);
        let cancel = CancelSignal::new();
        let semaphore = Arc::new(Semaphore::new(parallel.concurrency_limit.max(1)));
        let balancer: Arc<dyn LoadBalancer> = Arc::from(parallel.load_balancing.build(self.seed));
        let targets: Arc<[RetryTarget]> = Arc::from(targets);
        let fanout = parallel.target_fanout;

        tracing::info!(
            requests = requests.len(),
            concurrency = parallel.concurrency_limit,
            policy = ?parallel.failure_policy,
            balancing = ?parallel.load_balancing,
            "Starting batch"
        );

        let mut set = JoinSet::new();
        let mut task_index = HashMap::new();
        for (index, request) in requests.iter().cloned().enumerate() {
            let executor = self.executor.clone();
            let semaphore = Arc::clone(&semaphore);
            let balancer = Arc::clone(&balancer);
            let targets = Arc::clone(&targets);
            let retry = Arc::clone(&plan.retry);
            let validator = plan.validator.clone();
            let cancel = cancel.clone();

            let handle = set.spawn(async move {
                let permit = match timeouts::interruptible(semaphore.acquire_owned(), batch_deadline, &cancel).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_closed)) => {
                        return (index, ExecutionResult::not_started(&request.id, ExecutionStatus::Cancelled));
                    }
                    Err(interrupted) => {
                        let status = match interrupted {
                            Interrupted::DeadlineElapsed => ExecutionStatus::TimedOut,
                            Interrupted::Cancelled => ExecutionStatus::Cancelled,
                        };
                        metrics::record_request(status.as_str());
                        tracing::debug!(request_id = %request.id, status = %status, "Request never left the queue");
                        return (index, ExecutionResult::not_started(&request.id, status));
                    }
                };

                let assigned = assign_targets(balancer.as_ref(), &targets, fanout, executor.tracker());
                let result = executor
                    .execute(&request, &assigned, &retry, validator.as_deref(), batch_deadline, &cancel)
                    .await;
                drop(permit);
                (index, result)
            });
            task_index.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<ExecutionResult<I::Response>>> = Vec::with_capacity(requests.len());
        slots.resize_with(requests.len(), || None);
        let mut monitor = FailureMonitor::new(parallel);

        while let Some(joined) = set.join_next().await {
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        tracing::error!(error = %e, "Unknown batch task failed");
                        continue;
                    };
                    tracing::error!(request_id = %requests[index].id, error = %e, "Execution task failed");
                    let mut result = ExecutionResult::not_started(&requests[index].id, ExecutionStatus::Exhausted);
                    result.last_error = Some(ClassifiedError::new(ErrorKind::Other, format!("execution task failed: {e}")));
                    (index, result)
                }
            };

            if monitor.observe(result.status) && !cancel.is_triggered() {
                tracing::info!(
                    request_id = %result.request_id,
                    policy = ?parallel.failure_policy,
                    failure_rate = monitor.failure_rate(),
                    "Failure policy triggered, cancelling remaining requests"
                );
                cancel.trigger();
            }
            slots[index] = Some(result);
        }

        let results: BTreeMap<String, ExecutionResult<I::Response>> = slots
            .into_iter()
            .zip(requests.iter())
            .map(|(slot, request)| {
                let result = slot.unwrap_or_else(|| {
                    ExecutionResult::not_started(&request.id, ExecutionStatus::Cancelled)
                });
                (request.id.clone(), result)
            })
            .collect();

        let elapsed = start.elapsed();
        metrics::record_batch(elapsed);
        let batch = BatchResult::assemble(requests, results, plan, elapsed);
        tracing::info!(
            succeeded = batch.counters.succeeded,
            failed = batch.counters.failed,
            timed_out = batch.counters.timed_out,
            cancelled = batch.counters.cancelled,
            attempts = batch.counters.total_attempts,
            elapsed = ?elapsed,
            "Batch complete"
        );
        if batch.exhausted() {
            tracing::warn!(requests = batch.len(), "Every request in the batch exhausted its targets");
        }
        batch
    }

    /// Re-run the non-succeeded requests of `previous` that match `filter`.
    ///
    /// Matching requests start over with an empty attempt history; everything
    /// else is carried over unchanged. With no matches, returns a copy of `previous`.
    pub async fn retry_failed_requests(
        &self,
        previous: &BatchResult<I::Payload, I::Response>,
        targets: &[RetryTarget],
        filter: Option<&dyn Fn(&ExecutionResult<I::Response>) -> bool>,
        plan: Option<BatchPlan<I::Response>>,
    ) -> BatchResult<I::Payload, I::Response>
    where
        I::Response: Clone,
    {
        let candidates = previous.retry_candidates(filter);
        if candidates.is_empty() {
            tracing::debug!("No requests match the retry filter");
            return previous.clone();
        }

        tracing::info!(requests = candidates.len(), "Retrying failed requests");
        let plan = plan.unwrap_or_else(|| previous.plan().clone());
        let rerun = self.execute_batch(candidates, targets, plan).await;
        previous.merged(rerun)
    }
}
