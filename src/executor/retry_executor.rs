//! Single-request retry state machine.
//!
//! # States
//! ```text
//! Pending → Attempting → Succeeded
//!                      → Retrying (backoff, same pair) → Pending
//!                      → next method (routing incompatible or pair budget spent, no delay) → Pending
//!                      → next target (methods used up, circuit open, unresolved) → Pending
//!                      → Exhausted (terminal error, no targets or budget left)
//!          any wait    → TimedOut | Cancelled
//! ```
//!
//! # Design Decisions
//! - Attempts within a request are strictly sequential
//! - Backoff only between retries of the same (target, method) pair
//! - Routing fallbacks use their own per-target budget and never spend the
//!   per-pair or overall budgets
//! - Validation re-invokes the same pair without breaker admission

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::catalog::RoutingMethod;
use crate::config::schema::RetryConfig;
use crate::error::{ClassifiedError, ErrorClass};
use crate::executor::attempt::{AttemptOutcome, AttemptRecord};
use crate::executor::request::{Invoker, Request};
use crate::executor::result::{ExecutionResult, ExecutionStatus, ExecutionWarning};
use crate::load_balancer::LoadTracker;
use crate::observability::metrics;
use crate::orchestrator::cancel::CancelSignal;
use crate::resilience::backoff;
use crate::resilience::circuit_breaker::{BreakerOutcome, CircuitBreakerRegistry};
use crate::resilience::retries::{breaker_outcome, classify, AttemptBudget};
use crate::resilience::timeouts::{self, earliest, expired, Interrupted};
use crate::resilience::validation::{ResponseValidator, ValidationOutcome};
use crate::routing::{AccessResolver, RetryTarget};

/// Drives one request through its targets.
pub struct RetryExecutor<I: Invoker> {
    invoker: Arc<I>,
    resolver: AccessResolver,
    breakers: CircuitBreakerRegistry,
    tracker: LoadTracker,
}

impl<I: Invoker> Clone for RetryExecutor<I> {
    fn clone(&self) -> Self {
        Self {
            invoker: Arc::clone(&self.invoker),
            resolver: self.resolver.clone(),
            breakers: self.breakers.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

/// Per-execution inputs that stay fixed across attempts.
struct Scope<'a, P> {
    request: &'a Request<P>,
    config: &'a RetryConfig,
    start: Instant,
    deadline: Option<Instant>,
    cancel: &'a CancelSignal,
}

#[derive(Debug, Clone, Copy)]
struct Timing {
    started_at: SystemTime,
    offset: Duration,
    duration: Duration,
}

impl Timing {
    fn record(
        self,
        target: &RetryTarget,
        method: &RoutingMethod,
        outcome: AttemptOutcome,
        error: Option<ClassifiedError>,
    ) -> AttemptRecord {
        AttemptRecord {
            target: target.clone(),
            method: Some(method.clone()),
            started_at: self.started_at,
            offset: self.offset,
            duration: self.duration,
            outcome,
            error,
        }
    }
}

type InvokeResult<R> = Result<Result<R, ClassifiedError>, Interrupted>;

struct Delivered<R> {
    response: R,
    target: RetryTarget,
    method: RoutingMethod,
}

/// Mutable bookkeeping for one execution.
struct Run {
    request_id: String,
    start: Instant,
    attempts: Vec<AttemptRecord>,
    warnings: Vec<ExecutionWarning>,
    last_error: Option<ClassifiedError>,
    had_validation_failures: bool,
}

impl Run {
    fn new(request_id: &str, start: Instant) -> Self {
        Self {
            request_id: request_id.to_string(),
            start,
            attempts: Vec::new(),
            warnings: Vec::new(),
            last_error: None,
            had_validation_failures: false,
        }
    }

    fn offset(&self) -> Duration {
        self.start.elapsed()
    }

    fn push(&mut self, record: AttemptRecord) {
        metrics::record_attempt(&record.target.key(), record.outcome.as_str(), record.duration);
        self.attempts.push(record);
    }

    fn finish<R>(self, status: ExecutionStatus, delivered: Option<Delivered<R>>) -> ExecutionResult<R> {
        let elapsed = self.start.elapsed();
        metrics::record_request(status.as_str());
        match status {
            ExecutionStatus::Succeeded => tracing::debug!(
                request_id = %self.request_id,
                attempts = self.attempts.len(),
                elapsed = ?elapsed,
                flagged = self.had_validation_failures,
                "Request succeeded"
            ),
            ExecutionStatus::Exhausted => tracing::warn!(
                request_id = %self.request_id,
                attempts = self.attempts.len(),
                last_error = ?self.last_error.as_ref().map(|e| e.to_string()),
                "Request exhausted"
            ),
            ExecutionStatus::TimedOut => tracing::warn!(
                request_id = %self.request_id,
                attempts = self.attempts.len(),
                elapsed = ?elapsed,
                "Request timed out"
            ),
            ExecutionStatus::Cancelled => tracing::debug!(
                request_id = %self.request_id,
                attempts = self.attempts.len(),
                "Request cancelled"
            ),
        }

        let (response, target, method) = match delivered {
            Some(d) => (Some(d.response), Some(d.target), Some(d.method)),
            None => (None, None, None),
        };
        ExecutionResult {
            request_id: self.request_id,
            status,
            response,
            target,
            method,
            attempts: self.attempts,
            elapsed,
            warnings: self.warnings,
            had_validation_failures: self.had_validation_failures,
            last_error: self.last_error,
        }
    }
}

fn interruption(deadline: Option<Instant>, cancel: &CancelSignal) -> Option<ExecutionStatus> {
    if cancel.is_triggered() {
        Some(ExecutionStatus::Cancelled)
    } else if expired(deadline) {
        Some(ExecutionStatus::TimedOut)
    } else {
        None
    }
}

fn status_for(interrupted: Interrupted) -> ExecutionStatus {
    match interrupted {
        Interrupted::DeadlineElapsed => ExecutionStatus::TimedOut,
        Interrupted::Cancelled => ExecutionStatus::Cancelled,
    }
}

fn with_effective_class(error: ClassifiedError, config: &RetryConfig) -> ClassifiedError {
    let class = classify(&error, config);
    ClassifiedError { class, ..error }
}

impl<I: Invoker> RetryExecutor<I> {
    pub fn new(
        invoker: Arc<I>,
        resolver: AccessResolver,
        breakers: CircuitBreakerRegistry,
        tracker: LoadTracker,
    ) -> Self {
        Self {
            invoker,
            resolver,
            breakers,
            tracker,
        }
    }

    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn tracker(&self) -> &LoadTracker {
        &self.tracker
    }

    /// Run `request` over `targets` in order.
    ///
    /// `outer_deadline` is the batch deadline, if any; the request's own
    /// timeout and `config.request_timeout_ms` are applied on top of it.
    pub async fn execute(
        &self,
        request: &Request<I::Payload>,
        targets: &[RetryTarget],
        config: &RetryConfig,
        validator: Option<&dyn ResponseValidator<I::Response>>,
        outer_deadline: Option<Instant>,
        cancel: &CancelSignal,
    ) -> ExecutionResult<I::Response> {
        let start = Instant::now();
        let own_deadline = earliest(
            request.timeout.map(|t| start + t),
            config.request_timeout().map(|t| start + t),
        );
        let scope = Scope {
            request,
            config,
            start,
            deadline: earliest(own_deadline, outer_deadline),
            cancel,
        };
        let mut run = Run::new(&request.id, start);
        let mut budget = AttemptBudget::new(config);
        let cb = &config.circuit_breaker;

        tracing::debug!(request_id = %request.id, targets = targets.len(), "Executing request");

        'targets: for target in targets {
            if !budget.has_total() {
                break;
            }
            if let Some(status) = interruption(scope.deadline, cancel) {
                return run.finish(status, None);
            }

            let key = target.key();
            let methods = match self.resolver.resolve(target) {
                Ok(methods) => methods,
                Err(e) => {
                    tracing::warn!(request_id = %request.id, target = %target, error = %e, "Target unresolved, skipping");
                    let offset = run.offset();
                    run.push(AttemptRecord::skipped(target, offset, AttemptOutcome::SkippedUnresolved));
                    run.warnings.push(ExecutionWarning::TargetUnresolved { target: key });
                    continue;
                }
            };

            let mut fallbacks = 0u32;
            let mut learned = false;

            'methods: for method in &methods {
                let mut pair_attempts = 0u32;
                loop {
                    if !budget.has_total() {
                        break 'targets;
                    }
                    if !budget.pair_allows(pair_attempts) {
                        continue 'methods;
                    }
                    if let Some(status) = interruption(scope.deadline, cancel) {
                        return run.finish(status, None);
                    }

                    let admission = self.breakers.admit(cb, &key);
                    if !admission.is_allowed() {
                        tracing::debug!(request_id = %request.id, target = %target, "Circuit open, skipping target");
                        let offset = run.offset();
                        run.push(AttemptRecord::skipped(target, offset, AttemptOutcome::SkippedOpenCircuit));
                        run.warnings.push(ExecutionWarning::CircuitOpen { target: key.clone() });
                        continue 'targets;
                    }

                    pair_attempts += 1;
                    let (timing, result) = self.invoke_once(&scope, target, method).await;

                    match result {
                        Err(interrupted) => {
                            self.breakers.record(cb, &key, admission, BreakerOutcome::Neutral);
                            run.push(timing.record(target, method, AttemptOutcome::Interrupted, None));
                            return run.finish(status_for(interrupted), None);
                        }
                        Ok(Ok(response)) => {
                            self.breakers.record(cb, &key, admission, BreakerOutcome::Success);
                            let response = match validator {
                                Some(v) => {
                                    self.validate(&scope, v, target, method, (response, timing), &mut run)
                                        .await
                                }
                                None => {
                                    run.push(timing.record(target, method, AttemptOutcome::Success, None));
                                    response
                                }
                            };
                            self.resolver.record_success(target, method.kind(), learned);
                            if learned {
                                run.warnings.push(ExecutionWarning::RoutingFallbackUsed {
                                    target: key.clone(),
                                    method: method.kind(),
                                });
                            }
                            let delivered = Delivered {
                                response,
                                target: target.clone(),
                                method: method.clone(),
                            };
                            return run.finish(ExecutionStatus::Succeeded, Some(delivered));
                        }
                        Ok(Err(error)) => {
                            let error = with_effective_class(error, config);
                            let class = error.class;
                            if class != ErrorClass::RoutingIncompatible {
                                budget.spend();
                            }
                            self.breakers.record(cb, &key, admission, breaker_outcome(class));
                            tracing::debug!(
                                request_id = %request.id,
                                target = %target,
                                method = %method.kind(),
                                attempt = pair_attempts,
                                error = %error,
                                "Attempt failed"
                            );
                            run.push(timing.record(
                                target,
                                method,
                                AttemptOutcome::from_class(class),
                                Some(error.clone()),
                            ));
                            run.last_error = Some(error);

                            match class {
                                ErrorClass::RetryableTransient => {
                                    if !budget.pair_allows(pair_attempts) {
                                        tracing::debug!(
                                            request_id = %request.id,
                                            target = %target,
                                            method = %method.kind(),
                                            "Pair attempts exhausted, advancing"
                                        );
                                        continue 'methods;
                                    }
                                    let delay = backoff::delay(pair_attempts - 1, config);
                                    tracing::info!(
                                        request_id = %request.id,
                                        target = %target,
                                        attempt = pair_attempts,
                                        delay = ?delay,
                                        "Retrying request"
                                    );
                                    if let Err(interrupted) = timeouts::sleep(delay, scope.deadline, cancel).await {
                                        return run.finish(status_for(interrupted), None);
                                    }
                                }
                                ErrorClass::RoutingIncompatible => {
                                    self.resolver.record_incompatible(target, method.kind());
                                    learned = true;
                                    if budget.fallback_allows(fallbacks) {
                                        fallbacks += 1;
                                        continue 'methods;
                                    }
                                    continue 'targets;
                                }
                                ErrorClass::TerminalRequest => {
                                    return run.finish(ExecutionStatus::Exhausted, None);
                                }
                            }
                        }
                    }
                }
            }
        }

        run.finish(ExecutionStatus::Exhausted, None)
    }

    async fn invoke_once(
        &self,
        scope: &Scope<'_, I::Payload>,
        target: &RetryTarget,
        method: &RoutingMethod,
    ) -> (Timing, InvokeResult<I::Response>) {
        let load = self.tracker.get(&target.key());
        let guard = load.begin();
        let started_at = SystemTime::now();
        let began = Instant::now();

        let call = self
            .invoker
            .invoke(target, method, Arc::clone(&scope.request.payload));
        let attempt_timeout = scope.config.attempt_timeout();
        let result = timeouts::interruptible(
            timeouts::with_attempt_timeout(call, attempt_timeout),
            scope.deadline,
            scope.cancel,
        )
        .await
        .map(|bounded| {
            bounded.unwrap_or_else(|| {
                Err(ClassifiedError::timeout(format!(
                    "attempt exceeded {}ms",
                    attempt_timeout.unwrap_or_default().as_millis()
                )))
            })
        });

        match &result {
            Ok(Ok(_)) => guard.mark_success(),
            Ok(Err(_)) => guard.mark_failure(),
            Err(_) => guard.mark_interrupted(),
        }
        drop(guard);

        let timing = Timing {
            started_at,
            offset: began.duration_since(scope.start),
            duration: began.elapsed(),
        };
        (timing, result)
    }

    /// Validation loop on a delivered response. Always yields a response.
    async fn validate(
        &self,
        scope: &Scope<'_, I::Payload>,
        validator: &dyn ResponseValidator<I::Response>,
        target: &RetryTarget,
        method: &RoutingMethod,
        first: (I::Response, Timing),
        run: &mut Run,
    ) -> I::Response {
        let validation = &scope.config.validation;
        let max = validation.max_attempts.max(1);
        let (mut response, mut timing) = first;
        let mut validated = 1u32;

        loop {
            match validator.validate(&response) {
                ValidationOutcome::Accepted => {
                    run.push(timing.record(target, method, AttemptOutcome::Success, None));
                    if validated > 1 {
                        tracing::info!(
                            request_id = %run.request_id,
                            attempts = validated,
                            "Response accepted after validation retries"
                        );
                        run.warnings.push(ExecutionWarning::ValidationRetried { attempts: validated });
                    }
                    return response;
                }
                ValidationOutcome::Rejected(reason) => {
                    tracing::debug!(
                        request_id = %run.request_id,
                        target = %target,
                        attempt = validated,
                        reason = %reason,
                        "Response rejected by validator"
                    );
                    run.push(timing.record(target, method, AttemptOutcome::ValidationRejected { reason }, None));
                    if validated >= max {
                        tracing::warn!(
                            request_id = %run.request_id,
                            attempts = validated,
                            "Validation attempts exhausted, returning flagged response"
                        );
                        run.had_validation_failures = true;
                        run.warnings.push(ExecutionWarning::ValidationExhausted { attempts: validated });
                        return response;
                    }
                }
            }

            let delay = validation.delay();
            if !delay.is_zero() && timeouts::sleep(delay, scope.deadline, scope.cancel).await.is_err() {
                run.had_validation_failures = true;
                return response;
            }

            let (next_timing, result) = self.invoke_once(scope, target, method).await;
            match result {
                Ok(Ok(next)) => {
                    response = next;
                    timing = next_timing;
                    validated += 1;
                }
                Ok(Err(error)) => {
                    let error = with_effective_class(error, scope.config);
                    tracing::warn!(
                        request_id = %run.request_id,
                        target = %target,
                        error = %error,
                        "Validation re-invoke failed, keeping previous response"
                    );
                    run.warnings.push(ExecutionWarning::ValidationReinvokeFailed {
                        message: error.message.clone(),
                    });
                    let outcome = AttemptOutcome::from_class(error.class);
                    run.push(next_timing.record(target, method, outcome, Some(error)));
                    run.had_validation_failures = true;
                    return response;
                }
                Err(_) => {
                    run.push(next_timing.record(target, method, AttemptOutcome::Interrupted, None));
                    run.had_validation_failures = true;
                    return response;
                }
            }
        }
    }
}
