//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → Engine holds it behind an ArcSwap
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Engine::apply_config swaps the Arc
//!     → new executions observe the new config, running ones keep theirs
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::{
    CatalogConfig, CircuitBreakerConfig, CustomBackoff, EngineConfig, LogFormat,
    ObservabilityConfig, ParallelConfig, RetryConfig, TargetConfig, ValidationConfig,
};
pub use validation::{validate_config, ValidationError};
