//! Retry decisions.
//!
//! # Responsibilities
//! - Resolve the effective class of an invoke error against RetryConfig
//! - Track the three budgets of one request: per pair, overall, routing fallbacks
//! - Map outcomes onto circuit breaker health signals
//!
//! # Design Decisions
//! - `terminal_kinds` beats `retryable_kinds`, both beat the callback's class
//! - Routing-method advances never spend the transport budgets
//! - Jittered backoff lives in backoff.rs; this module only decides *whether*

use crate::config::schema::RetryConfig;
use crate::error::{ClassifiedError, ErrorClass, ErrorKind};
use crate::resilience::circuit_breaker::BreakerOutcome;

/// Effective class of an error under a retry configuration.
pub fn classify(error: &ClassifiedError, config: &RetryConfig) -> ErrorClass {
    if error.kind == ErrorKind::RoutingIncompatible {
        return ErrorClass::RoutingIncompatible;
    }
    if config.terminal_kinds.contains(&error.kind) {
        ErrorClass::TerminalRequest
    } else if config.retryable_kinds.contains(&error.kind) {
        ErrorClass::RetryableTransient
    } else {
        error.class
    }
}

/// What an error class tells the circuit breaker about target health.
pub fn breaker_outcome(class: ErrorClass) -> BreakerOutcome {
    match class {
        ErrorClass::RetryableTransient => BreakerOutcome::Failure,
        ErrorClass::RoutingIncompatible | ErrorClass::TerminalRequest => BreakerOutcome::Neutral,
    }
}

/// Attempt budgets for one request.
#[derive(Debug, Clone)]
pub struct AttemptBudget {
    per_pair: u32,
    total: Option<u32>,
    fallbacks_per_target: u32,
    spent_total: u32,
}

impl AttemptBudget {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            per_pair: config.max_attempts,
            total: config.max_total_attempts,
            fallbacks_per_target: config.max_routing_fallbacks,
            spent_total: 0,
        }
    }

    /// Whether another transport attempt fits in the overall budget.
    pub fn has_total(&self) -> bool {
        self.total.map_or(true, |max| self.spent_total < max)
    }

    /// Whether a pair that already ran `pair_attempts` times may run again.
    pub fn pair_allows(&self, pair_attempts: u32) -> bool {
        pair_attempts < self.per_pair && self.has_total()
    }

    /// Whether a target may switch routing method again.
    pub fn fallback_allows(&self, fallbacks_used: u32) -> bool {
        fallbacks_used < self.fallbacks_per_target
    }

    /// Record one failed transport attempt. Routing-incompatible attempts are not recorded.
    pub fn spend(&mut self) {
        self.spent_total += 1;
    }

    pub fn spent(&self) -> u32 {
        self.spent_total
    }
}
