//! Target routing subsystem.
//!
//! # Data Flow
//! ```text
//! configured backends + regions
//!     → sequencer.rs (ordered RetryTarget list)
//!     → load_balancer (optional fanout selection per request)
//!     → resolver.rs (catalog lookup, methods ordered by preference.rs)
//!     → executor attempts (target, method)
//!
//! On routing-incompatibility:
//!     executor → resolver.record_incompatible → preference.rs
//!     → next method, no backoff
//! On success:
//!     executor → resolver.record_success → preference.rs
//! ```
//!
//! # Design Decisions
//! - Sequencing is pure; all shared mutable state lives in the preference store
//! - Preference store is per-engine, injected, never global

pub mod preference;
pub mod resolver;
pub mod sequencer;

pub use preference::{AccessPreference, AccessPreferenceStore, PreferenceSource};
pub use resolver::{AccessResolver, ResolveError};
pub use sequencer::{RetryTarget, SequencingStrategy, TargetSequencer};
