//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (budgets > 0, fractions within (0, 1])
//! - Detect conflicting error classifications
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{EngineConfig, ParallelConfig, RetryConfig, TargetConfig};
use crate::error::ErrorKind;
use crate::resilience::backoff::BackoffStrategy;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{field} lists {value:?} more than once")]
    Duplicate { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} = {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("custom backoff strategy selected but no delay function was provided")]
    MissingCustomBackoff,

    #[error("error kind {0:?} is listed as both retryable and terminal")]
    ConflictingKind(ErrorKind),

    #[error("error kind {0:?} cannot be reclassified")]
    NotReclassifiable(ErrorKind),

    #[error("invalid socket address: {0}")]
    InvalidAddress(String),
}

impl ValidationError {
    /// Dotted path of the configuration field at fault.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Empty(field) | ValidationError::Zero(field) => field,
            ValidationError::Duplicate { field, .. } | ValidationError::OutOfRange { field, .. } => field,
            ValidationError::MissingCustomBackoff => "retry.strategy",
            ValidationError::ConflictingKind(_) => "retry.retryable_kinds",
            ValidationError::NotReclassifiable(_) => "retry.terminal_kinds",
            ValidationError::InvalidAddress(_) => "observability.metrics_address",
        }
    }
}

/// Validate an entire engine configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_targets(&config.targets, &mut errors);
    check_retry(&config.retry, &mut errors);
    check_parallel(&config.parallel, &mut errors);

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    into_result(errors)
}

/// Validate the target lists.
pub fn validate_targets(targets: &TargetConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_targets(targets, &mut errors);
    into_result(errors)
}

/// Validate a retry configuration.
pub fn validate_retry(retry: &RetryConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_retry(retry, &mut errors);
    into_result(errors)
}

/// Validate a batch configuration.
pub fn validate_parallel(parallel: &ParallelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    check_parallel(parallel, &mut errors);
    into_result(errors)
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_names(field: &'static str, names: &[String], errors: &mut Vec<ValidationError>) {
    if names.is_empty() {
        errors.push(ValidationError::Empty(field));
        return;
    }
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            errors.push(ValidationError::Empty(field));
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::Duplicate {
                field,
                value: name.clone(),
            });
        }
    }
}

fn check_targets(targets: &TargetConfig, errors: &mut Vec<ValidationError>) {
    check_names("targets.backends", &targets.backends, errors);
    check_names("targets.regions", &targets.regions, errors);
}

fn check_retry(retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::Zero("retry.max_attempts"));
    }
    if retry.max_total_attempts == Some(0) {
        errors.push(ValidationError::Zero("retry.max_total_attempts"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::OutOfRange {
            field: "retry.max_delay_ms",
            value: retry.max_delay_ms.to_string(),
            expected: ">= retry.base_delay_ms",
        });
    }
    match retry.strategy {
        BackoffStrategy::Exponential if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) => {
            errors.push(ValidationError::OutOfRange {
                field: "retry.multiplier",
                value: retry.multiplier.to_string(),
                expected: ">= 1.0 for exponential backoff",
            });
        }
        BackoffStrategy::Linear if !(retry.multiplier.is_finite() && retry.multiplier >= 0.0) => {
            errors.push(ValidationError::OutOfRange {
                field: "retry.multiplier",
                value: retry.multiplier.to_string(),
                expected: ">= 0.0 for linear backoff",
            });
        }
        BackoffStrategy::Custom if retry.custom_backoff.is_none() => {
            errors.push(ValidationError::MissingCustomBackoff);
        }
        _ => {}
    }
    if retry.attempt_timeout_ms == Some(0) {
        errors.push(ValidationError::Zero("retry.attempt_timeout_ms"));
    }
    if retry.request_timeout_ms == Some(0) {
        errors.push(ValidationError::Zero("retry.request_timeout_ms"));
    }

    for kind in &retry.retryable_kinds {
        if retry.terminal_kinds.contains(kind) {
            errors.push(ValidationError::ConflictingKind(*kind));
        }
    }
    if retry.retryable_kinds.contains(&ErrorKind::RoutingIncompatible)
        || retry.terminal_kinds.contains(&ErrorKind::RoutingIncompatible)
    {
        errors.push(ValidationError::NotReclassifiable(ErrorKind::RoutingIncompatible));
    }

    let cb = &retry.circuit_breaker;
    if cb.enabled {
        if cb.failure_threshold == 0 {
            errors.push(ValidationError::Zero("retry.circuit_breaker.failure_threshold"));
        }
        if cb.failure_window_ms == 0 {
            errors.push(ValidationError::Zero("retry.circuit_breaker.failure_window_ms"));
        }
        if cb.open_duration_ms == 0 {
            errors.push(ValidationError::Zero("retry.circuit_breaker.open_duration_ms"));
        }
        if cb.half_open_probe_count == 0 {
            errors.push(ValidationError::Zero("retry.circuit_breaker.half_open_probe_count"));
        }
    }

    if retry.validation.max_attempts == 0 {
        errors.push(ValidationError::Zero("retry.validation.max_attempts"));
    }
}

fn check_parallel(parallel: &ParallelConfig, errors: &mut Vec<ValidationError>) {
    if parallel.concurrency_limit == 0 {
        errors.push(ValidationError::Zero("parallel.concurrency_limit"));
    }
    if parallel.target_fanout == Some(0) {
        errors.push(ValidationError::Zero("parallel.target_fanout"));
    }
    let rate = parallel.failure_rate_threshold;
    if !(rate > 0.0 && rate <= 1.0) {
        errors.push(ValidationError::OutOfRange {
            field: "parallel.failure_rate_threshold",
            value: rate.to_string(),
            expected: "(0, 1]",
        });
    }
    if parallel.batch_timeout_ms == Some(0) {
        errors.push(ValidationError::Zero("parallel.batch_timeout_ms"));
    }
}
