//! Attempt log entries.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::catalog::RoutingMethod;
use crate::error::{ClassifiedError, ErrorClass};
use crate::routing::RetryTarget;

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Transport succeeded and the response was accepted (or not validated).
    Success,
    /// Transport succeeded, the validator rejected the content.
    ValidationRejected { reason: String },
    /// Retryable error; the same pair may run again after a backoff delay.
    RetryableError,
    /// The target rejected the routing method; the next method runs immediately.
    RoutingIncompatible,
    /// The request itself is invalid; execution stopped.
    TerminalError,
    /// Circuit open, nothing was invoked.
    SkippedOpenCircuit,
    /// Catalog has no entry for the target, nothing was invoked.
    SkippedUnresolved,
    /// The request deadline or batch cancellation ended the invoke early.
    Interrupted,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::ValidationRejected { .. } => "validation_rejected",
            AttemptOutcome::RetryableError => "retryable_error",
            AttemptOutcome::RoutingIncompatible => "routing_incompatible",
            AttemptOutcome::TerminalError => "terminal_error",
            AttemptOutcome::SkippedOpenCircuit => "skipped_open_circuit",
            AttemptOutcome::SkippedUnresolved => "skipped_unresolved",
            AttemptOutcome::Interrupted => "interrupted",
        }
    }

    /// Whether the invoke callback ran for this record.
    pub fn invoked(&self) -> bool {
        !matches!(
            self,
            AttemptOutcome::SkippedOpenCircuit | AttemptOutcome::SkippedUnresolved
        )
    }

    pub(crate) fn from_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::RetryableTransient => AttemptOutcome::RetryableError,
            ErrorClass::RoutingIncompatible => AttemptOutcome::RoutingIncompatible,
            ErrorClass::TerminalRequest => AttemptOutcome::TerminalError,
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub target: RetryTarget,
    /// `None` for skipped targets.
    pub method: Option<RoutingMethod>,
    /// Wall-clock start.
    pub started_at: SystemTime,
    /// Start relative to the beginning of the request.
    pub offset: Duration,
    pub duration: Duration,
    pub outcome: AttemptOutcome,
    /// The error with its effective class, if the invoke failed.
    pub error: Option<ClassifiedError>,
}

impl AttemptRecord {
    pub(crate) fn skipped(target: &RetryTarget, offset: Duration, outcome: AttemptOutcome) -> Self {
        Self {
            target: target.clone(),
            method: None,
            started_at: SystemTime::now(),
            offset,
            duration: Duration::ZERO,
            outcome,
            error: None,
        }
    }

    /// Error class, when the attempt failed.
    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error.as_ref().map(|e| e.class)
    }
}
