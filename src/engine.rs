//! Engine entry point.
//!
//! # Responsibilities
//! - Own the state shared by every execution: preferences, breakers, load counters
//! - Validate configuration eagerly, before any request starts
//! - Expose single-request, batch and partial-retry execution
//! - Report statistics
//!
//! # Design Decisions
//! - The default configuration lives in an `ArcSwap`; each call loads it once,
//!   so a reload never changes the settings of work already started
//! - Per-call retry/parallel configs override the default for that call only
//! - Learned state outlives configuration reloads

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::catalog::{CachedCatalog, Catalog};
use crate::config::schema::{EngineConfig, ParallelConfig, RetryConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::config::ConfigError;
use crate::error::{EngineError, EngineResult};
use crate::executor::{ExecutionResult, Invoker, Request, RetryExecutor};
use crate::load_balancer::LoadTracker;
use crate::orchestrator::{BatchPlan, BatchResult, CancelSignal, ParallelOrchestrator};
use crate::resilience::circuit_breaker::{CircuitSnapshot, CircuitState};
use crate::resilience::{CircuitBreakerRegistry, SharedValidator};
use crate::routing::preference::PreferenceSnapshot;
use crate::routing::{AccessPreferenceStore, AccessResolver, RetryTarget, TargetSequencer};

/// Resilient multi-target execution engine.
pub struct Engine<I: Invoker> {
    config: ArcSwap<EngineConfig>,
    catalog_cache: Option<Arc<CachedCatalog>>,
    preferences: AccessPreferenceStore,
    breakers: CircuitBreakerRegistry,
    tracker: LoadTracker,
    orchestrator: ParallelOrchestrator<I>,
}

impl<I: Invoker> Engine<I> {
    /// Build an engine over `catalog` and `invoker`.
    ///
    /// The lookup cache is chosen here from `catalog.cache_lookups`; reloads
    /// do not add or remove it.
    pub fn new(config: EngineConfig, catalog: Arc<dyn Catalog>, invoker: I) -> EngineResult<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let catalog_cache = config
            .catalog
            .cache_lookups
            .then(|| Arc::new(CachedCatalog::new(Arc::clone(&catalog))));
        let lookup: Arc<dyn Catalog> = match &catalog_cache {
            Some(cache) => Arc::clone(cache) as Arc<dyn Catalog>,
            None => catalog,
        };

        let preferences = AccessPreferenceStore::new();
        let breakers = CircuitBreakerRegistry::new();
        let tracker = LoadTracker::new();
        let resolver = AccessResolver::new(lookup, preferences.clone());
        let executor = RetryExecutor::new(Arc::new(invoker), resolver, breakers.clone(), tracker.clone());

        tracing::info!(
            backends = config.targets.backends.len(),
            regions = config.targets.regions.len(),
            strategy = ?config.targets.strategy,
            cache_lookups = config.catalog.cache_lookups,
            "Engine initialized"
        );

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            catalog_cache,
            preferences,
            breakers,
            tracker,
            orchestrator: ParallelOrchestrator::new(executor),
        })
    }

    /// Seed the `random` load-balancing policy for reproducible runs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.orchestrator = self.orchestrator.with_seed(seed);
        self
    }

    /// Current default configuration.
    pub fn config(&self) -> Arc<EngineConfig> {
        self.config.load_full()
    }

    /// Replace the default configuration. Invalid configs are rejected whole.
    pub fn apply_config(&self, config: EngineConfig) -> EngineResult<()> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        tracing::info!(
            backends = config.targets.backends.len(),
            regions = config.targets.regions.len(),
            "Configuration applied"
        );
        self.config.store(Arc::new(config));
        Ok(())
    }

    /// Target sequence under the current configuration.
    pub fn targets(&self) -> Vec<RetryTarget> {
        sequence_for(&self.config.load())
    }

    /// Execute one request over every configured target.
    pub async fn execute(
        &self,
        request: Request<I::Payload>,
        retry: Option<RetryConfig>,
        validator: Option<SharedValidator<I::Response>>,
    ) -> EngineResult<ExecutionResult<I::Response>> {
        let config = self.config.load_full();
        let retry = retry.unwrap_or_else(|| config.retry.clone());
        retry.validate().map_err(ConfigError::Validation)?;

        let targets = sequence_for(&config);
        let cancel = CancelSignal::new();
        Ok(self
            .orchestrator
            .executor()
            .execute(&request, &targets, &retry, validator.as_deref(), None, &cancel)
            .await)
    }

    /// Execute many requests with bounded parallelism.
    ///
    /// Fails only for an empty batch, duplicate request ids or invalid
    /// configuration; per-request failures are reported in the result.
    pub async fn execute_batch(
        &self,
        requests: Vec<Request<I::Payload>>,
        retry: Option<RetryConfig>,
        parallel: Option<ParallelConfig>,
        validator: Option<SharedValidator<I::Response>>,
    ) -> EngineResult<BatchResult<I::Payload, I::Response>> {
        if requests.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        let mut seen = HashSet::with_capacity(requests.len());
        if let Some(dup) = requests.iter().find(|r| !seen.insert(r.id.as_str())) {
            return Err(EngineError::DuplicateRequestId(dup.id.clone()));
        }

        let config = self.config.load_full();
        let retry = retry.unwrap_or_else(|| config.retry.clone());
        let parallel = parallel.unwrap_or_else(|| config.parallel.clone());
        check_all(&[retry.validate(), parallel.validate()])?;

        let targets = sequence_for(&config);
        let plan = BatchPlan::new(Arc::new(retry), parallel, validator);
        Ok(self.orchestrator.execute_batch(requests, &targets, plan).await)
    }

    /// Re-run the failed requests of `previous` that match `filter`, with the
    /// settings the batch originally ran with.
    pub async fn retry_failed_requests(
        &self,
        previous: &BatchResult<I::Payload, I::Response>,
        filter: Option<&dyn Fn(&ExecutionResult<I::Response>) -> bool>,
    ) -> BatchResult<I::Payload, I::Response>
    where
        I::Response: Clone,
    {
        let targets = self.targets();
        self.orchestrator
            .retry_failed_requests(previous, &targets, filter, None)
            .await
    }

    /// Like [`Engine::retry_failed_requests`], with replacement parallel settings.
    pub async fn retry_failed_requests_with(
        &self,
        previous: &BatchResult<I::Payload, I::Response>,
        filter: Option<&dyn Fn(&ExecutionResult<I::Response>) -> bool>,
        parallel: ParallelConfig,
    ) -> EngineResult<BatchResult<I::Payload, I::Response>>
    where
        I::Response: Clone,
    {
        parallel.validate().map_err(ConfigError::Validation)?;
        let mut plan = previous.plan().clone();
        plan.parallel = parallel;
        let targets = self.targets();
        Ok(self
            .orchestrator
            .retry_failed_requests(previous, &targets, filter, Some(plan))
            .await)
    }

    /// Point-in-time view of counters, breakers and learned preferences.
    pub fn get_statistics(&self) -> EngineStatistics {
        let config = self.config.load();
        let breaker_config = &config.retry.circuit_breaker;

        let mut keys: Vec<String> = sequence_for(&config).iter().map(RetryTarget::key).collect();
        let load = self.tracker.snapshot();
        for key in load.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        let targets = keys
            .into_iter()
            .map(|key| {
                let counters = load.get(&key);
                let stats = TargetStatistics {
                    attempts: counters.map_or(0, |c| c.attempts),
                    successes: counters.map_or(0, |c| c.successes),
                    failures: counters.map_or(0, |c| c.failures),
                    interrupted: counters.map_or(0, |c| c.interrupted),
                    success_rate: counters.and_then(|c| c.success_rate),
                    in_flight: counters.map_or(0, |c| c.in_flight),
                    circuit: self.breakers.state(breaker_config, &key),
                };
                (key, stats)
            })
            .collect();

        EngineStatistics {
            targets,
            circuits: self.breakers.snapshot(breaker_config),
            preferences: self.preferences.snapshot(),
            catalog_cache_entries: self.catalog_cache.as_ref().map(|c| c.len()),
        }
    }

    /// Drop memoised catalog lookups, if caching is on.
    pub fn invalidate_catalog_cache(&self) {
        if let Some(cache) = &self.catalog_cache {
            cache.invalidate();
        }
    }

    pub fn preferences(&self) -> &AccessPreferenceStore {
        &self.preferences
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn tracker(&self) -> &LoadTracker {
        &self.tracker
    }
}

fn sequence_for(config: &EngineConfig) -> Vec<RetryTarget> {
    // Validated on every store, so an error here means an empty sequence.
    TargetSequencer::new(
        config.targets.backends.clone(),
        config.targets.regions.clone(),
        config.targets.strategy,
    )
    .map(|s| s.sequence())
    .unwrap_or_default()
}

fn check_all(results: &[Result<(), Vec<ValidationError>>]) -> Result<(), ConfigError> {
    let errors: Vec<ValidationError> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .flatten()
        .cloned()
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors))
    }
}

/// Serializable engine snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatistics {
    /// Per target key, configured targets first.
    pub targets: BTreeMap<String, TargetStatistics>,
    /// Breakers that have seen traffic, by breaker key.
    pub circuits: BTreeMap<String, CircuitSnapshot>,
    /// Learned and declared routing preferences by target key.
    pub preferences: BTreeMap<String, PreferenceSnapshot>,
    /// Memoised catalog lookups; `None` when caching is off.
    pub catalog_cache_entries: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatistics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub interrupted: u64,
    pub success_rate: Option<f64>,
    pub in_flight: usize,
    pub circuit: CircuitState,
}
