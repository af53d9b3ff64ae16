//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::validation::{self, ValidationError};
use crate::error::ErrorKind;
use crate::load_balancer::LoadBalancingPolicy;
use crate::orchestrator::FailurePolicy;
use crate::resilience::backoff::BackoffStrategy;
use crate::resilience::circuit_breaker::BreakerScope;
use crate::routing::sequencer::SequencingStrategy;

/// Root configuration for the execution engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Backends, regions and their ordering.
    pub targets: TargetConfig,

    /// Single-request retry behaviour.
    pub retry: RetryConfig,

    /// Batch execution settings.
    pub parallel: ParallelConfig,

    /// Catalog access settings.
    pub catalog: CatalogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Candidate targets.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TargetConfig {
    /// Backend identifiers in preference order.
    pub backends: Vec<String>,

    /// Region identifiers in preference order.
    pub regions: Vec<String>,

    /// How backends and regions are interleaved.
    pub strategy: SequencingStrategy,
}

/// Injected delay function for `BackoffStrategy::Custom`.
///
/// Receives the zero-based retry index and the active retry configuration.
#[derive(Clone)]
pub struct CustomBackoff(pub Arc<dyn Fn(u32, &RetryConfig) -> Duration + Send + Sync>);

impl fmt::Debug for CustomBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomBackoff(..)")
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay growth between retries of the same target.
    pub strategy: BackoffStrategy,

    /// Maximum transport attempts per (target, method) pair.
    pub max_attempts: u32,

    /// Maximum transport attempts across all targets (unbounded if unset).
    pub max_total_attempts: Option<u32>,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Upper bound for any computed delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor (exponential) or increment in milliseconds (linear).
    pub multiplier: f64,

    /// Randomise exponential delays by a factor in [0.5, 1.5).
    pub jitter: bool,

    /// Routing-method advances allowed per target, separate from `max_attempts`.
    pub max_routing_fallbacks: u32,

    /// Per-attempt timeout in milliseconds; a timed-out attempt is retryable.
    pub attempt_timeout_ms: Option<u64>,

    /// Overall request deadline in milliseconds.
    pub request_timeout_ms: Option<u64>,

    /// Error kinds always treated as retryable.
    pub retryable_kinds: Vec<ErrorKind>,

    /// Error kinds always treated as terminal. Wins over `retryable_kinds`.
    pub terminal_kinds: Vec<ErrorKind>,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Response validation retry settings.
    pub validation: ValidationConfig,

    /// Delay function for the `custom` strategy.
    #[serde(skip)]
    pub custom_backoff: Option<CustomBackoff>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 3,
            max_total_attempts: None,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
            max_routing_fallbacks: 3,
            attempt_timeout_ms: None,
            request_timeout_ms: None,
            retryable_kinds: Vec::new(),
            terminal_kinds: Vec::new(),
            circuit_breaker: CircuitBreakerConfig::default(),
            validation: ValidationConfig::default(),
            custom_backoff: None,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Semantic checks, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validation::validate_retry(self)
    }

    /// Install a custom delay function and switch to the `custom` strategy.
    #[must_use]
    pub fn with_custom_backoff<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, &RetryConfig) -> Duration + Send + Sync + 'static,
    {
        self.strategy = BackoffStrategy::Custom;
        self.custom_backoff = Some(CustomBackoff(Arc::new(f)));
        self
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Disabled breakers pass every request through.
    pub enabled: bool,

    /// One breaker per target, or one shared breaker.
    pub scope: BreakerScope,

    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,

    /// Rolling window for counting failures, in milliseconds.
    pub failure_window_ms: u64,

    /// Time the circuit stays open before probing, in milliseconds.
    pub open_duration_ms: u64,

    /// Probe requests allowed while half-open.
    pub half_open_probe_count: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scope: BreakerScope::PerTarget,
            failure_threshold: 5,
            failure_window_ms: 60_000,
            open_duration_ms: 30_000,
            half_open_probe_count: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn failure_window(&self) -> Duration {
        Duration::from_millis(self.failure_window_ms)
    }

    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

/// Response validation retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Total validated invocations per request, the first one included.
    pub max_attempts: u32,

    /// Fixed delay between validation retries in milliseconds.
    pub delay_ms: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 0,
        }
    }
}

impl ValidationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Batch execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Maximum requests executing at once.
    pub concurrency_limit: usize,

    /// Targets handed to each request (all targets if unset).
    pub target_fanout: Option<usize>,

    /// Target distribution across requests.
    pub load_balancing: LoadBalancingPolicy,

    /// Reaction to failed requests.
    pub failure_policy: FailurePolicy,

    /// Failure fraction that stops the batch under `stop_on_threshold`.
    pub failure_rate_threshold: f64,

    /// Completed requests required before the threshold is evaluated.
    pub min_completed_for_threshold: usize,

    /// Deadline for the whole batch in milliseconds.
    pub batch_timeout_ms: Option<u64>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            target_fanout: None,
            load_balancing: LoadBalancingPolicy::RoundRobin,
            failure_policy: FailurePolicy::ContinueOnFailure,
            failure_rate_threshold: 0.5,
            min_completed_for_threshold: 1,
            batch_timeout_ms: None,
        }
    }
}

impl ParallelConfig {
    /// Semantic checks, returning every problem found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        validation::validate_parallel(self)
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_ms.map(Duration::from_millis)
    }
}

/// Catalog access configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Memoise catalog lookups for the process lifetime.
    pub cache_lookups: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            cache_lookups: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
