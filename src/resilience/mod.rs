//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt against a (target, method):
//!     → circuit_breaker.rs (admit, or skip the target)
//!     → timeouts.rs (per-attempt timeout, request deadline, batch cancel)
//!     → On error: retries.rs (effective class, budgets)
//!         → backoff.rs (delay before retrying the same pair)
//!     → On response: validation.rs (content check, same-method re-invoke)
//!     → circuit_breaker.rs (record outcome)
//! ```
//!
//! # Design Decisions
//! - Every wait has a deadline and can be cancelled
//! - Circuit breaker prevents hammering a failing target
//! - Budgets are per request; only breakers are shared

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;
pub mod validation;

pub use backoff::BackoffStrategy;
pub use circuit_breaker::{Admission, BreakerOutcome, BreakerScope, CircuitBreakerRegistry, CircuitState};
pub use validation::{ResponseValidator, SharedValidator, ValidationOutcome};
