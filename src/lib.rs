//! Resilient multi-target execution engine.
//!
//! Runs a logical request against an ordered list of (backend, region)
//! targets, each reachable through one or more routing methods. Transient
//! failures are retried with backoff, routing rejections fall through to the
//! next method immediately and are remembered, unhealthy targets are skipped
//! by a circuit breaker, and batches run with bounded parallelism.
//!
//! # Data Flow
//! ```text
//! Engine::execute_batch
//!     → orchestrator (semaphore, failure policy, batch deadline)
//!         → load_balancer (targets per request)
//!         → executor::RetryExecutor
//!             → routing (target sequence, method order, learned preferences)
//!             → resilience (breaker, backoff, timeouts, validation)
//!             → Invoker (caller-supplied remote call)
//!     → BatchResult / EngineStatistics
//! ```

// Collaborators and configuration
pub mod catalog;
pub mod config;
pub mod error;

// Execution
pub mod engine;
pub mod executor;
pub mod orchestrator;

// Target selection
pub mod load_balancer;
pub mod routing;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use config::schema::EngineConfig;
pub use engine::{Engine, EngineStatistics};
pub use error::{ClassifiedError, EngineError, ErrorClass, ErrorKind};
pub use executor::{ExecutionResult, ExecutionStatus, Invoker, Request};
pub use orchestrator::BatchResult;
