//! Deadlines and interruptible waits.
//!
//! # Responsibilities
//! - Race every suspension point (invoke, backoff sleep, queue wait) against
//!   the request deadline and the batch cancel signal
//! - Bound single attempts with an optional per-attempt timeout
//!
//! # Design Decisions
//! - Uses Tokio's timer, so paused-clock tests see exact delays
//! - Cancellation wins ties, then the deadline, then the work itself
//! - A dropped future is the cancellation; nothing else is signalled

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::orchestrator::cancel::CancelSignal;

/// Why an interruptible wait ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    DeadlineElapsed,
    Cancelled,
}

/// The earlier of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Whether `deadline` has already passed.
pub fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Run `fut` unless the deadline passes or the signal fires first.
pub async fn interruptible<F>(
    fut: F,
    deadline: Option<Instant>,
    cancel: &CancelSignal,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        _ = until(deadline) => Err(Interrupted::DeadlineElapsed),
        out = fut => Ok(out),
    }
}

/// Interruptible sleep.
pub async fn sleep(delay: Duration, deadline: Option<Instant>, cancel: &CancelSignal) -> Result<(), Interrupted> {
    interruptible(tokio::time::sleep(delay), deadline, cancel).await
}

/// Bound `fut` by an optional per-attempt timeout. `None` means it timed out.
pub async fn with_attempt_timeout<F>(fut: F, timeout: Option<Duration>) -> Option<F::Output>
where
    F: Future,
{
    match timeout {
        Some(t) => tokio::time::timeout(t, fut).await.ok(),
        None => Some(fut.await),
    }
}
