//! Backoff delay strategies.
//!
//! The retry index `n` starts at 0 for the delay that precedes the second
//! attempt on a (target, method) pair.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::schema::RetryConfig;

/// How the delay grows between retries of the same pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// `base * multiplier^n`, capped, optionally jittered.
    #[default]
    Exponential,
    /// `base + multiplier * n` milliseconds, capped.
    Linear,
    /// Always `base`.
    Fixed,
    /// Delegated to `RetryConfig::custom_backoff`.
    Custom,
}

impl BackoffStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Fixed => "fixed",
            BackoffStrategy::Custom => "custom",
        }
    }
}

/// Deterministic delay for retry index `n`, before jitter.
pub fn nominal_delay(n: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay_ms as f64;
    let max_ms = config.max_delay_ms as f64;

    let ms = match config.strategy {
        BackoffStrategy::Exponential => {
            let exp = i32::try_from(n).unwrap_or(i32::MAX);
            (base_ms * config.multiplier.powi(exp)).min(max_ms)
        }
        BackoffStrategy::Linear => (base_ms + config.multiplier * f64::from(n)).min(max_ms),
        BackoffStrategy::Fixed => base_ms,
        BackoffStrategy::Custom => {
            return match &config.custom_backoff {
                Some(custom) => (custom.0)(n, config),
                None => config.base_delay(),
            };
        }
    };

    millis(ms)
}

/// Delay to sleep before retry index `n`.
///
/// Exponential delays are multiplied by a factor drawn from `[0.5, 1.5)` when
/// `jitter` is set, then capped at `max_delay` again.
pub fn delay(n: u32, config: &RetryConfig) -> Duration {
    let nominal = nominal_delay(n, config);
    if config.jitter && config.strategy == BackoffStrategy::Exponential {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        nominal.mul_f64(factor).min(config.max_delay())
    } else {
        nominal
    }
}

fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_millis(ms.round() as u64)
    } else {
        Duration::ZERO
    }
}
