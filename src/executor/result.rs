//! Single-request outcome.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::catalog::{RoutingKind, RoutingMethod};
use crate::error::{ClassifiedError, ErrorKind};
use crate::executor::attempt::{AttemptOutcome, AttemptRecord};
use crate::routing::RetryTarget;

/// Final state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// A response was delivered (possibly flagged by validation).
    Succeeded,
    /// Targets or budget ran out, or a terminal error stopped the request.
    Exhausted,
    /// The request or batch deadline elapsed first.
    TimedOut,
    /// A batch failure policy stopped the request.
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Succeeded => "succeeded",
            ExecutionStatus::Exhausted => "exhausted",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal conditions worth surfacing to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionWarning {
    RoutingFallbackUsed { target: String, method: RoutingKind },
    ValidationRetried { attempts: u32 },
    ValidationExhausted { attempts: u32 },
    ValidationReinvokeFailed { message: String },
    TargetUnresolved { target: String },
    CircuitOpen { target: String },
}

impl fmt::Display for ExecutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionWarning::RoutingFallbackUsed { target, method } => {
                write!(f, "routing fallback used: {target} via {method}")
            }
            ExecutionWarning::ValidationRetried { attempts } => {
                write!(f, "validation retried: accepted after {attempts} attempts")
            }
            ExecutionWarning::ValidationExhausted { attempts } => {
                write!(f, "validation exhausted after {attempts} attempts")
            }
            ExecutionWarning::ValidationReinvokeFailed { message } => {
                write!(f, "validation re-invoke failed: {message}")
            }
            ExecutionWarning::TargetUnresolved { target } => write!(f, "target unresolved: {target}"),
            ExecutionWarning::CircuitOpen { target } => write!(f, "circuit open, skipped: {target}"),
        }
    }
}

/// Everything known about one executed request.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult<R> {
    pub request_id: String,
    pub status: ExecutionStatus,
    pub response: Option<R>,
    /// Target and method that produced the response.
    pub target: Option<RetryTarget>,
    pub method: Option<RoutingMethod>,
    /// Attempts in start order.
    pub attempts: Vec<AttemptRecord>,
    pub elapsed: Duration,
    pub warnings: Vec<ExecutionWarning>,
    /// Succeeded, but the last response never passed validation.
    pub had_validation_failures: bool,
    pub last_error: Option<ClassifiedError>,
}

impl<R> ExecutionResult<R> {
    /// Result for a request that never reached its first attempt.
    pub(crate) fn not_started(request_id: &str, status: ExecutionStatus) -> Self {
        Self {
            request_id: request_id.to_string(),
            status,
            response: None,
            target: None,
            method: None,
            attempts: Vec::new(),
            elapsed: Duration::ZERO,
            warnings: Vec::new(),
            had_validation_failures: false,
            last_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Records for which the invoke callback ran.
    pub fn invoked_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| a.outcome.invoked()).count()
    }

    pub fn count_outcome(&self, outcome: &AttemptOutcome) -> usize {
        self.attempts.iter().filter(|a| &a.outcome == outcome).count()
    }

    /// Whether any attempt failed with `kind`.
    pub fn saw_error_kind(&self, kind: ErrorKind) -> bool {
        self.attempts
            .iter()
            .any(|a| a.error.as_ref().is_some_and(|e| e.kind == kind))
    }
}
