//! Error taxonomy for the execution engine.
//!
//! # Layers
//! - `ClassifiedError`: what the invoke callback returns. The class decides
//!   retry vs fast-learn vs abort; the kind is the finer diagnosis.
//! - `EngineError`: raised eagerly, before any request starts. Per-request
//!   failures never surface here; they end up in an `ExecutionResult`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::loader::ConfigError;

/// How the engine reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Retried against the same target/method after a backoff delay.
    RetryableTransient,
    /// The target rejected this routing method; the next method is tried immediately.
    RoutingIncompatible,
    /// The request itself is invalid; no further targets are tried.
    TerminalRequest,
}

/// Finer-grained error kind reported by the invoke callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    ServiceUnavailable,
    Timeout,
    Network,
    RoutingIncompatible,
    Validation,
    Authentication,
    NotFound,
    Other,
}

impl ErrorKind {
    /// The class this kind maps to when nothing overrides it.
    pub fn default_class(self) -> ErrorClass {
        match self {
            ErrorKind::RateLimited
            | ErrorKind::ServiceUnavailable
            | ErrorKind::Timeout
            | ErrorKind::Network
            | ErrorKind::Other => ErrorClass::RetryableTransient,
            ErrorKind::RoutingIncompatible => ErrorClass::RoutingIncompatible,
            ErrorKind::Validation | ErrorKind::Authentication | ErrorKind::NotFound => {
                ErrorClass::TerminalRequest
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RoutingIncompatible => "routing_incompatible",
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Other => "other",
        }
    }
}

/// Error returned by the invoke callback, carrying its classification explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?} ({class:?}): {message}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    /// Build an error whose class follows from its kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            class: kind.default_class(),
            kind,
            message: message.into(),
        }
    }

    /// Build an error with an explicit class.
    pub fn with_class(class: ErrorClass, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            class,
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn routing_incompatible(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RoutingIncompatible, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }
}

/// Errors raised before any execution begins.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A batch must contain at least one request.
    #[error("batch contains no requests")]
    EmptyBatch,

    /// Two requests in one batch share an id.
    #[error("duplicate request id in batch: {0}")]
    DuplicateRequestId(String),
}

/// Result type for engine entry points.
pub type EngineResult<T> = Result<T, EngineError>;
