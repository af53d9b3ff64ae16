//! Circuit breaker for target protection.
//!
//! # States
//! - Closed: normal operation, attempts pass through
//! - Open: target assumed down, attempts are skipped
//! - Half-Open: a bounded number of probes test whether the target recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures within the rolling window >= threshold
//! Open → Half-Open: after open_duration, on the next admission check
//! Half-Open → Closed: half_open_probe_count probes succeed
//! Half-Open → Open: any probe fails (fresh timer)
//! ```
//!
//! # Design Decisions
//! - Per-target by default, one shared key when scoped globally
//! - Each key's transition runs under its DashMap shard lock
//! - Outcomes that say nothing about target health (routing mismatch, bad
//!   request, cancellation) are neutral and hand the probe permit back
//! - Config is passed per call so one registry serves every RetryConfig

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::observability::metrics;

/// Key used for every target when the breaker is global.
pub const GLOBAL_KEY: &str = "*";

/// Which attempts share a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerScope {
    #[default]
    PerTarget,
    Global,
}

/// Breaker state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Closed circuit (or breaker disabled).
    Allowed,
    /// Half-open probe permit. Must be settled with `record`.
    Probe,
    /// Open circuit, or every probe permit is taken.
    Rejected,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Admission::Rejected)
    }
}

/// What an attempt says about target health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerOutcome {
    Success,
    Failure,
    Neutral,
}

#[derive(Debug)]
struct KeyState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    last_transition: Instant,
    probes_issued: u32,
    probe_successes: u32,
}

impl KeyState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            last_transition: now,
            probes_issued: 0,
            probe_successes: 0,
        }
    }

    fn transition(&mut self, key: &str, to: CircuitState, now: Instant) {
        let from = self.state;
        self.state = to;
        self.last_transition = now;
        self.probes_issued = 0;
        self.probe_successes = 0;
        if to != CircuitState::Open {
            self.failures.clear();
        }
        metrics::record_circuit_transition(key, to.as_str());
        tracing::info!(key = %key, from = %from, to = %to, "Circuit state changed");
    }

    fn prune(&mut self, window: std::time::Duration, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub recent_failures: usize,
    pub since_transition_ms: u64,
}

/// Breakers for every monitored key.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerRegistry {
    states: Arc<DashMap<String, KeyState>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker key for a target key under the configured scope.
    pub fn key_for<'a>(config: &CircuitBreakerConfig, target_key: &'a str) -> &'a str {
        match config.scope {
            BreakerScope::PerTarget => target_key,
            BreakerScope::Global => GLOBAL_KEY,
        }
    }

    /// Decide whether an attempt against `target_key` may proceed.
    pub fn admit(&self, config: &CircuitBreakerConfig, target_key: &str) -> Admission {
        if !config.enabled {
            return Admission::Allowed;
        }
        let key = Self::key_for(config, target_key);
        let now = Instant::now();
        let mut entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));
        let ks = entry.value_mut();

        if ks.state == CircuitState::Open && now.duration_since(ks.last_transition) >= config.open_duration() {
            ks.transition(key, CircuitState::HalfOpen, now);
        }

        match ks.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen => {
                if ks.probes_issued < config.half_open_probe_count {
                    ks.probes_issued += 1;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Feed an attempt outcome back into the breaker.
    pub fn record(
        &self,
        config: &CircuitBreakerConfig,
        target_key: &str,
        admission: Admission,
        outcome: BreakerOutcome,
    ) {
        if !config.enabled || admission == Admission::Rejected {
            return;
        }
        let key = Self::key_for(config, target_key);
        let now = Instant::now();
        let mut entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| KeyState::new(now));
        let ks = entry.value_mut();

        match (ks.state, admission) {
            (CircuitState::Closed, _) => match outcome {
                BreakerOutcome::Success => ks.failures.clear(),
                BreakerOutcome::Failure => {
                    ks.failures.push_back(now);
                    ks.prune(config.failure_window(), now);
                    if ks.failures.len() >= config.failure_threshold as usize {
                        ks.transition(key, CircuitState::Open, now);
                    }
                }
                BreakerOutcome::Neutral => {}
            },
            (CircuitState::HalfOpen, Admission::Probe) => match outcome {
                BreakerOutcome::Success => {
                    ks.probe_successes += 1;
                    if ks.probe_successes >= config.half_open_probe_count {
                        ks.transition(key, CircuitState::Closed, now);
                    }
                }
                BreakerOutcome::Failure => ks.transition(key, CircuitState::Open, now),
                BreakerOutcome::Neutral => {
                    ks.probes_issued = ks.probes_issued.saturating_sub(1);
                }
            },
            // Stale outcome from an attempt admitted before the last transition.
            _ => {}
        }
    }

    /// Current state of the breaker guarding `target_key`.
    ///
    /// An open circuit whose timer has elapsed reports `HalfOpen`.
    pub fn state(&self, config: &CircuitBreakerConfig, target_key: &str) -> CircuitState {
        let key = Self::key_for(config, target_key);
        self.states
            .get(key)
            .map(|ks| effective_state(&ks, config))
            .unwrap_or(CircuitState::Closed)
    }

    /// Every tracked breaker, ordered by key.
    pub fn snapshot(&self, config: &CircuitBreakerConfig) -> BTreeMap<String, CircuitSnapshot> {
        let now = Instant::now();
        self.states
            .iter()
            .map(|r| {
                let ks = r.value();
                (
                    r.key().clone(),
                    CircuitSnapshot {
                        state: effective_state(ks, config),
                        recent_failures: ks.failures.len(),
                        since_transition_ms: now.duration_since(ks.last_transition).as_millis() as u64,
                    },
                )
            })
            .collect()
    }

    /// Close every breaker.
    pub fn reset(&self) {
        self.states.clear();
    }
}

fn effective_state(ks: &KeyState, config: &CircuitBreakerConfig) -> CircuitState {
    if ks.state == CircuitState::Open && ks.last_transition.elapsed() >= config.open_duration() {
        CircuitState::HalfOpen
    } else {
        ks.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            scope: BreakerScope::PerTarget,
            failure_threshold: 3,
            failure_window_ms: 10_000,
            open_duration_ms: 1_000,
            half_open_probe_count: 2,
        }
    }

    fn fail(reg: &CircuitBreakerRegistry, cfg: &CircuitBreakerConfig, key: &str) {
        let admission = reg.admit(cfg, key);
        reg.record(cfg, key, admission, BreakerOutcome::Failure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trips_after_threshold() {
        let cfg = config();
        let reg = CircuitBreakerRegistry::new();
        for _ in 0..2 {
            fail(&reg, &cfg, "b@r");
        }
        assert_eq!(reg.state(&cfg, "b@r"), CircuitState::Closed);
        fail(&reg, &cfg, "b@r");
        assert_eq!(reg.state(&cfg, "b@r"), CircuitState::Open);
        assert_eq!(reg.admit(&cfg, "b@r"), Admission::Rejected);
        // Other targets are unaffected.
        assert_eq!(reg.admit(&cfg, "b@other"), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let cfg = config();
        let reg = CircuitBreakerRegistry::new();
        fail(&reg, &cfg, "k");
        fail(&reg, &cfg, "k");
        let a = reg.admit(&cfg, "k");
        reg.record(&cfg, "k", a, BreakerOutcome::Success);
        fail(&reg, &cfg, "k");
        fail(&reg, &cfg, "k");
        assert_eq!(reg.state(&cfg, "k"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_expire() {
        let cfg = config();
        let reg = CircuitBreakerRegistry::new();
        fail(&reg, &cfg, "k");
        fail(&reg, &cfg, "k");
        tokio::time::advance(Duration::from_millis(10_001)).await;
        fail(&reg, &cfg, "k");
        assert_eq!(reg.state(&cfg, "k"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_allows_exact_probe_count() {
        let cfg = config();
        let reg = CircuitBreakerRegistry::new();
        for _ in 0..3 {
            fail(&reg, &cfg, "k");
        }
        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(reg.admit(&cfg, "k"), Admission::Rejected);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(reg.state(&cfg, "k"), CircuitState::HalfOpen);
        let p1 = reg.admit(&cfg, "k");
        let p2 = reg.admit(&cfg, "k");
        assert_eq!((p1, p2), (Admission::Probe, Admission::Probe));
        assert_eq!(reg.admit(&cfg, "k"), Admission::Rejected);

        reg.record(&cfg, "k", p1, BreakerOutcome::Success);
        assert_eq!(reg.state(&cfg, "k"), CircuitState::HalfOpen);
        reg.record(&cfg, "k", p2, BreakerOutcome::Success);
        assert_eq!(reg.state(&cfg, "k"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_timer() {
        let cfg = config();
        let reg = CircuitBreakerRegistry::new();
        for _ in 0..3 {
            fail(&reg, &cfg, "k");
        }
        tokio::time::advance(Duration::from_millis(1_000)).await;
        let probe = reg.admit(&cfg, "k");
        tokio::time::advance(Duration::from_millis(500)).await;
        reg.record(&cfg, "k", probe, BreakerOutcome::Failure);
        assert_eq!(reg.state(&cfg, "k"), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_eq!(reg.admit(&cfg, "k"), Admission::Rejected);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(reg.admit(&cfg, "k"), Admission::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_neutral_probe_returns_permit() {
        let cfg = CircuitBreakerConfig {
            half_open_probe_count: 1,
            ..config()
        };
        let reg = CircuitBreakerRegistry::new();
        for _ in 0..3 {
            fail(&reg, &cfg, "k");
        }
        tokio::time::advance(Duration::from_millis(1_000)).await;
        let probe = reg.admit(&cfg, "k");
        assert_eq!(reg.admit(&cfg, "k"), Admission::Rejected);
        reg.record(&cfg, "k", probe, BreakerOutcome::Neutral);
        assert_eq!(reg.admit(&cfg, "k"), Admission::Probe);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_scope_shares_state() {
        let cfg = CircuitBreakerConfig {
            scope: BreakerScope::Global,
            ..config()
        };
        let reg = CircuitBreakerRegistry::new();
        fail(&reg, &cfg, "a@r");
        fail(&reg, &cfg, "b@r");
        fail(&reg, &cfg, "c@r");
        assert_eq!(reg.admit(&cfg, "d@r"), Admission::Rejected);
        assert!(reg.snapshot(&cfg).contains_key(GLOBAL_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_is_pass_through() {
        let cfg = CircuitBreakerConfig {
            enabled: false,
            ..config()
        };
        let reg = CircuitBreakerRegistry::new();
        for _ in 0..10 {
            fail(&reg, &cfg, "k");
        }
        assert_eq!(reg.admit(&cfg, "k"), Admission::Allowed);
        assert!(reg.snapshot(&cfg).is_empty());
    }
}
