//! Single-request execution through the engine.

use std::sync::Arc;
use std::time::Duration;

use failover_engine::catalog::RoutingKind;
use failover_engine::config::RetryConfig;
use failover_engine::executor::{AttemptOutcome, ExecutionWarning};
use failover_engine::resilience::{BackoffStrategy, CircuitState, SharedValidator, ValidationOutcome};
use failover_engine::routing::SequencingStrategy;
use failover_engine::{ClassifiedError, Engine, ErrorKind, ExecutionStatus, Request};

mod common;
use common::ScriptedInvoker;

fn request() -> Request<String> {
    Request::new("q1", "hello".to_string())
}

#[tokio::test(start_paused = true)]
async fn test_targets_visited_in_region_first_order() {
    let backends = ["b0", "b1"];
    let regions = ["r0", "r1", "r2"];
    let mut config = common::config(&backends, &regions);
    config.retry.max_attempts = 1;

    let (invoker, log) = ScriptedInvoker::new(|_, _, _, _| Err(ClassifiedError::unavailable("down")));
    let engine = Engine::new(config, common::direct_catalog(&backends, &regions), invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Exhausted);
    let visited: Vec<String> = log.calls().into_iter().map(|c| c.target).collect();
    assert_eq!(visited, vec!["b0@r0", "b0@r1", "b0@r2", "b1@r0", "b1@r1", "b1@r2"]);
    // One attempt per target, no delay anywhere.
    assert_eq!(result.elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_model_first_varies_backend_fastest() {
    let backends = ["b0", "b1"];
    let regions = ["r0", "r1"];
    let mut config = common::config(&backends, &regions);
    config.targets.strategy = SequencingStrategy::ModelFirst;

    let (invoker, _log) = ScriptedInvoker::always_ok();
    let engine = Engine::new(config, common::direct_catalog(&backends, &regions), invoker).unwrap();

    let keys: Vec<String> = engine.targets().iter().map(|t| t.key()).collect();
    assert_eq!(keys, vec!["b0@r0", "b1@r0", "b0@r1", "b1@r1"]);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_backoff_exhausts_after_three_attempts() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.strategy = BackoffStrategy::Fixed;
    config.retry.base_delay_ms = 1000;
    config.retry.max_attempts = 3;

    let (invoker, log) = ScriptedInvoker::new(|_, _, _, _| Err(ClassifiedError::rate_limited("slow down")));
    let engine = Engine::new(config, common::direct_catalog(&["b0"], &["r0"]), invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Exhausted);
    assert_eq!(result.attempts.len(), 3);
    assert!(result.attempts.iter().all(|a| a.outcome == AttemptOutcome::RetryableError));
    assert!(result.attempts.iter().all(|a| a.target.key() == "b0@r0"));

    let calls = log.calls();
    assert_eq!(calls[1].at - calls[0].at, Duration::from_secs(1));
    assert_eq!(calls[2].at - calls[1].at, Duration::from_secs(1));
    // Two delays, none after the last attempt.
    assert_eq!(result.elapsed, Duration::from_secs(2));
    assert_eq!(result.last_error.as_ref().map(|e| e.kind), Some(ErrorKind::RateLimited));
}

#[tokio::test(start_paused = true)]
async fn test_routing_incompatible_falls_through_and_is_learned() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.base_delay_ms = 5000;
    let catalog = common::catalog(&["b0"], &["r0"], &[RoutingKind::Direct, RoutingKind::RegionalRoute]);

    let (invoker, log) = ScriptedInvoker::new(|target, method, _, _| match method.kind() {
        RoutingKind::Direct => Err(ClassifiedError::routing_incompatible("direct access disabled")),
        _ => Ok(target.key()),
    });
    let engine = Engine::new(config, catalog, invoker).unwrap();

    let first = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(first.status, ExecutionStatus::Succeeded);
    assert_eq!(first.attempts.len(), 2);
    assert_eq!(first.attempts[0].outcome, AttemptOutcome::RoutingIncompatible);
    assert_eq!(first.attempts[1].outcome, AttemptOutcome::Success);
    assert_eq!(first.attempts[1].offset, first.attempts[0].offset);
    assert_eq!(first.elapsed, Duration::ZERO);
    assert!(first.warnings.contains(&ExecutionWarning::RoutingFallbackUsed {
        target: "b0@r0".into(),
        method: RoutingKind::RegionalRoute,
    }));

    let preference = engine.preferences().get("b0@r0").unwrap();
    assert_eq!(preference.preferred, RoutingKind::RegionalRoute);

    // Learned preference goes first from now on.
    let second = engine.execute(Request::new("q2", "again".to_string()), None, None).await.unwrap();
    assert_eq!(second.attempts.len(), 1);
    assert_eq!(second.method.as_ref().map(|m| m.kind()), Some(RoutingKind::RegionalRoute));
    assert_eq!(log.len(), 3);

    let stats = engine.get_statistics();
    assert_eq!(stats.preferences["b0@r0"].preferred, RoutingKind::RegionalRoute);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_kinds_override_the_callback_class() {
    let regions = ["r0", "r1"];
    let (invoker, log) = ScriptedInvoker::new(|_, _, _, _| Err(ClassifiedError::rate_limited("quota")));
    let engine = Engine::new(
        common::config(&["b0"], &regions),
        common::direct_catalog(&["b0"], &regions),
        invoker,
    )
    .unwrap();

    let retry = RetryConfig {
        terminal_kinds: vec![ErrorKind::RateLimited],
        ..engine.config().retry.clone()
    };
    let result = engine.execute(request(), Some(retry), None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Exhausted);
    assert_eq!(log.len(), 1);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::TerminalError);
}

#[tokio::test(start_paused = true)]
async fn test_open_circuit_skips_target() {
    let regions = ["r0", "r1"];
    let mut config = common::config(&["b0"], &regions);
    config.retry.strategy = BackoffStrategy::Fixed;
    config.retry.base_delay_ms = 100;
    config.retry.max_attempts = 2;
    config.retry.circuit_breaker.enabled = true;
    config.retry.circuit_breaker.failure_threshold = 2;

    let (invoker, log) = ScriptedInvoker::new(|target, _, _, _| {
        if target.region == "r0" {
            Err(ClassifiedError::unavailable("maintenance"))
        } else {
            Ok(target.key())
        }
    });
    let engine = Engine::new(config, common::direct_catalog(&["b0"], &regions), invoker).unwrap();

    let first = engine.execute(request(), None, None).await.unwrap();
    assert_eq!(first.status, ExecutionStatus::Succeeded);
    assert_eq!(first.attempts.len(), 3);

    let second = engine.execute(Request::new("q2", "again".to_string()), None, None).await.unwrap();
    assert_eq!(second.status, ExecutionStatus::Succeeded);
    assert_eq!(second.attempts[0].outcome, AttemptOutcome::SkippedOpenCircuit);
    assert_eq!(second.invoked_attempts(), 1);
    assert_eq!(log.len(), 4);

    let stats = engine.get_statistics();
    assert_eq!(stats.targets["b0@r0"].circuit, CircuitState::Open);
    assert_eq!(stats.targets["b0@r0"].failures, 2);
    assert_eq!(stats.targets["b0@r1"].successes, 2);
}

#[tokio::test(start_paused = true)]
async fn test_request_deadline_interrupts_invoke() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.request_timeout_ms = Some(500);

    let (invoker, _log) = ScriptedInvoker::always_ok();
    let invoker = invoker.with_latency(Duration::from_secs(1));
    let engine = Engine::new(config, common::direct_catalog(&["b0"], &["r0"]), invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Interrupted);
    assert_eq!(result.elapsed, Duration::from_millis(500));
    assert_eq!(engine.tracker().in_flight("b0@r0"), 0);

    let stats = engine.get_statistics();
    assert_eq!(stats.targets["b0@r0"].interrupted, 1);
    assert_eq!(stats.targets["b0@r0"].attempts, 0);
    assert_eq!(stats.targets["b0@r0"].success_rate, None);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_retryable() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.strategy = BackoffStrategy::Fixed;
    config.retry.base_delay_ms = 50;
    config.retry.max_attempts = 2;
    config.retry.attempt_timeout_ms = Some(100);

    let (invoker, log) = ScriptedInvoker::always_ok();
    let invoker = invoker.with_latency(Duration::from_secs(1));
    let engine = Engine::new(config, common::direct_catalog(&["b0"], &["r0"]), invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Exhausted);
    assert_eq!(log.len(), 2);
    assert!(result.saw_error_kind(ErrorKind::Timeout));
    assert_eq!(result.elapsed, Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_validation_retries_same_pair_until_accepted() {
    let regions = ["r0", "r1"];
    let (invoker, log) = ScriptedInvoker::new(|_, _, _, prior| Ok(format!("answer-{prior}")));
    let engine = Engine::new(
        common::config(&["b0"], &regions),
        common::direct_catalog(&["b0"], &regions),
        invoker,
    )
    .unwrap();

    let validator: SharedValidator<String> = Arc::new(|response: &String| {
        if response == "answer-2" {
            ValidationOutcome::Accepted
        } else {
            ValidationOutcome::rejected("incomplete")
        }
    });
    let result = engine.execute(request(), None, Some(validator)).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(!result.had_validation_failures);
    assert_eq!(result.response.as_deref(), Some("answer-2"));
    assert!(log.calls().iter().all(|c| c.target == "b0@r0"));
    assert!(result.warnings.contains(&ExecutionWarning::ValidationRetried { attempts: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_validation_exhaustion_flags_success() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.validation.max_attempts = 2;
    config.retry.validation.delay_ms = 200;

    let (invoker, log) = ScriptedInvoker::new(|_, _, _, prior| Ok(format!("answer-{prior}")));
    let engine = Engine::new(config, common::direct_catalog(&["b0"], &["r0"]), invoker).unwrap();

    let validator: SharedValidator<String> = Arc::new(|_: &String| ValidationOutcome::rejected("never good enough"));
    let result = engine.execute(request(), None, Some(validator)).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(result.had_validation_failures);
    assert_eq!(result.response.as_deref(), Some("answer-1"));
    assert_eq!(log.len(), 2);
    assert_eq!(result.elapsed, Duration::from_millis(200));
    assert!(result.warnings.contains(&ExecutionWarning::ValidationExhausted { attempts: 2 }));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_method_falls_back_to_next_method() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.strategy = BackoffStrategy::Fixed;
    config.retry.base_delay_ms = 10;
    config.retry.max_attempts = 2;
    let catalog = common::catalog(&["b0"], &["r0"], &[RoutingKind::Direct, RoutingKind::RegionalRoute]);

    let (invoker, log) = ScriptedInvoker::new(|target, method, _, _| match method.kind() {
        RoutingKind::Direct => Err(ClassifiedError::unavailable("flaky")),
        _ => Ok(target.key()),
    });
    let engine = Engine::new(config, catalog, invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.method.as_ref().map(|m| m.kind()), Some(RoutingKind::RegionalRoute));
    let methods: Vec<RoutingKind> = log.calls().into_iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![RoutingKind::Direct, RoutingKind::Direct, RoutingKind::RegionalRoute]);
    // One backoff between the Direct retries, none on the method switch.
    assert_eq!(result.elapsed, Duration::from_millis(10));
    // Not a routing fallback, so nothing is learned.
    assert!(result.warnings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_routing_fallback_outside_total_budget() {
    let mut config = common::config(&["b0"], &["r0"]);
    config.retry.max_total_attempts = Some(1);
    let catalog = common::catalog(&["b0"], &["r0"], &[RoutingKind::Direct, RoutingKind::RegionalRoute]);

    let (invoker, log) = ScriptedInvoker::new(|target, method, _, _| match method.kind() {
        RoutingKind::Direct => Err(ClassifiedError::routing_incompatible("profile required")),
        _ => Ok(target.key()),
    });
    let engine = Engine::new(config, catalog, invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(log.len(), 2);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::RoutingIncompatible);
    assert_eq!(result.attempts[1].outcome, AttemptOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn test_routing_fallbacks_are_capped_per_target() {
    let backends = ["b0", "b1"];
    let mut config = common::config(&backends, &["r0"]);
    config.retry.max_routing_fallbacks = 1;
    config.retry.base_delay_ms = 5000;
    let catalog = common::catalog(
        &backends,
        &["r0"],
        &[RoutingKind::Direct, RoutingKind::RegionalRoute, RoutingKind::GlobalRoute],
    );

    let (invoker, log) = ScriptedInvoker::new(|target, _, _, _| {
        if target.backend == "b0" {
            Err(ClassifiedError::routing_incompatible("not routable"))
        } else {
            Ok(target.key())
        }
    });
    let engine = Engine::new(config, catalog, invoker).unwrap();

    let result = engine.execute(request(), None, None).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    let visited: Vec<(String, RoutingKind)> = log.calls().into_iter().map(|c| (c.target, c.method)).collect();
    assert_eq!(
        visited,
        vec![
            ("b0@r0".to_string(), RoutingKind::Direct),
            ("b0@r0".to_string(), RoutingKind::RegionalRoute),
            ("b1@r0".to_string(), RoutingKind::Direct),
        ]
    );
    assert_eq!(result.count_outcome(&AttemptOutcome::RoutingIncompatible), 2);
    assert_eq!(result.elapsed, Duration::ZERO);
}
