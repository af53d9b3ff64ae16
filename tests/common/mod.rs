//! Shared utilities for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;

use failover_engine::catalog::{AccessMethods, RoutingKind, RoutingMethod, StaticCatalog};
use failover_engine::config::{EngineConfig, TargetConfig};
use failover_engine::executor::Invoker;
use failover_engine::routing::RetryTarget;
use failover_engine::ClassifiedError;

/// Behaviour of one scripted call: target, method, payload, and how many
/// times this (target, method) pair was called before.
pub type Script = dyn Fn(&RetryTarget, &RoutingMethod, &str, usize) -> Result<String, ClassifiedError> + Send + Sync;

/// One recorded invoke call.
#[derive(Debug, Clone)]
pub struct Call {
    pub target: String,
    pub method: RoutingKind,
    pub payload: String,
    pub at: Instant,
}

/// Everything the scripted invoker observed.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls running at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn begin(&self, call: Call) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let prior = calls
            .iter()
            .filter(|c| c.target == call.target && c.method == call.method)
            .count();
        calls.push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        prior
    }
}

/// Latency of one scripted call, by payload.
pub type Latency = dyn Fn(&str) -> Duration + Send + Sync;

/// Invoker whose result per call is decided by a closure, after a latency.
pub struct ScriptedInvoker {
    script: Arc<Script>,
    latency: Arc<Latency>,
    log: CallLog,
}

impl ScriptedInvoker {
    pub fn new<F>(script: F) -> (Self, CallLog)
    where
        F: Fn(&RetryTarget, &RoutingMethod, &str, usize) -> Result<String, ClassifiedError> + Send + Sync + 'static,
    {
        let log = CallLog::default();
        let invoker = Self {
            script: Arc::new(script),
            latency: Arc::new(|_| Duration::ZERO),
            log: log.clone(),
        };
        (invoker, log)
    }

    /// Succeeds everywhere with `backend@region`.
    pub fn always_ok() -> (Self, CallLog) {
        Self::new(|target, _, _, _| Ok(target.key()))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Arc::new(move |_| latency);
        self
    }

    pub fn with_payload_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&str) -> Duration + Send + Sync + 'static,
    {
        self.latency = Arc::new(latency);
        self
    }
}

impl Invoker for ScriptedInvoker {
    type Payload = String;
    type Response = String;

    fn invoke(
        &self,
        target: &RetryTarget,
        method: &RoutingMethod,
        payload: Arc<String>,
    ) -> BoxFuture<'static, Result<String, ClassifiedError>> {
        let prior = self.log.begin(Call {
            target: target.key(),
            method: method.kind(),
            payload: payload.to_string(),
            at: Instant::now(),
        });
        let done = Decrement(Arc::clone(&self.log.in_flight));
        let result = (self.script)(target, method, payload.as_str(), prior);
        let latency = (self.latency)(payload.as_str());

        async move {
            let _done = done;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
        .boxed()
    }
}

struct Decrement(Arc<AtomicUsize>);

impl Drop for Decrement {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine config over `backends` × `regions` with deterministic retry timing.
pub fn config(backends: &[&str], regions: &[&str]) -> EngineConfig {
    let mut config = EngineConfig {
        targets: TargetConfig {
            backends: backends.iter().map(|s| s.to_string()).collect(),
            regions: regions.iter().map(|s| s.to_string()).collect(),
            ..TargetConfig::default()
        },
        ..EngineConfig::default()
    };
    config.retry.jitter = false;
    config.retry.circuit_breaker.enabled = false;
    config
}

/// Catalog where every pair exposes the given method kinds.
pub fn catalog(backends: &[&str], regions: &[&str], kinds: &[RoutingKind]) -> Arc<StaticCatalog> {
    let mut catalog = StaticCatalog::new();
    for backend in backends {
        for region in regions {
            let methods = kinds
                .iter()
                .map(|kind| {
                    let id = format!("{}:{backend}:{region}", kind.as_str());
                    match kind {
                        RoutingKind::Direct => RoutingMethod::Direct(id),
                        RoutingKind::RegionalRoute => RoutingMethod::RegionalRoute(id),
                        RoutingKind::GlobalRoute => RoutingMethod::GlobalRoute(id),
                    }
                })
                .collect();
            catalog.insert(*backend, *region, AccessMethods::new(methods, None).unwrap());
        }
    }
    Arc::new(catalog)
}

/// Catalog with a single direct method per pair.
pub fn direct_catalog(backends: &[&str], regions: &[&str]) -> Arc<StaticCatalog> {
    catalog(backends, regions, &[RoutingKind::Direct])
}
