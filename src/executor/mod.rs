//! Single-request execution.
//!
//! # Data Flow
//! ```text
//! Request + ordered targets + RetryConfig
//!     → retry_executor.rs (state machine)
//!         → routing::AccessResolver (methods per target)
//!         → request.rs Invoker (the remote call)
//!         → attempt.rs (one AttemptRecord per attempt)
//!     → result.rs (ExecutionResult)
//! ```

pub mod attempt;
pub mod request;
pub mod result;
pub mod retry_executor;

pub use attempt::{AttemptOutcome, AttemptRecord};
pub use request::{invoker_fn, FnInvoker, Invoker, Request};
pub use result::{ExecutionResult, ExecutionStatus, ExecutionWarning};
pub use retry_executor::RetryExecutor;
