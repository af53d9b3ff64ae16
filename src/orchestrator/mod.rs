//! Batch orchestration.
//!
//! # Data Flow
//! ```text
//! Vec<Request> + targets + BatchPlan
//!     → parallel.rs (semaphore-bounded tasks)
//!         → load_balancer (targets per request)
//!         → executor::RetryExecutor (one request)
//!         → policy.rs (stop decision per completion)
//!     → batch.rs (BatchResult, counters, retry filters)
//! ```

pub mod batch;
pub mod cancel;
pub mod parallel;
pub mod policy;

pub use batch::{filters, BatchCounters, BatchPlan, BatchResult, BatchSummary};
pub use cancel::CancelSignal;
pub use parallel::ParallelOrchestrator;
pub use policy::{FailureMonitor, FailurePolicy};
