//! failover-engine CLI
//!
//! Validates engine configurations and runs simulated batches against an
//! in-process catalog and invoker, printing the batch summary and engine
//! statistics as JSON.
//!
//! ```text
//! failover-engine check --config engine.toml
//! failover-engine simulate --config engine.toml --requests 50 --failure-rate 0.2 --seed 7
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;

use failover_engine::catalog::{AccessMethods, RoutingMethod, StaticCatalog};
use failover_engine::config::watcher::ConfigWatcher;
use failover_engine::config::{load_config, EngineConfig};
use failover_engine::executor::invoker_fn;
use failover_engine::observability::{logging, metrics};
use failover_engine::routing::{RetryTarget, TargetSequencer};
use failover_engine::{ClassifiedError, Engine, Request};

#[derive(Parser)]
#[command(name = "failover-engine")]
#[command(about = "Resilient multi-target execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the target sequence
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run simulated batches against a scripted catalog
    Simulate {
        #[arg(short, long)]
        config: PathBuf,

        /// Requests per batch
        #[arg(short, long, default_value_t = 20)]
        requests: usize,

        /// Number of batches to run
        #[arg(long, default_value_t = 1)]
        rounds: usize,

        /// Probability that an invoke fails with a rate limit
        #[arg(short, long, default_value_t = 0.1)]
        failure_rate: f64,

        /// Seed for simulated failures and the random balancer
        #[arg(short, long)]
        seed: Option<u64>,

        /// Reload the configuration file between rounds when it changes
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(config),
        Commands::Simulate {
            config,
            requests,
            rounds,
            failure_rate,
            seed,
            watch,
        } => simulate(config, requests, rounds, failure_rate, seed, watch).await,
    }
}

fn check(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let targets = TargetSequencer::new(
        config.targets.backends.clone(),
        config.targets.regions.clone(),
        config.targets.strategy,
    )
    .map(|s| s.sequence())
    .unwrap_or_default();

    let report = json!({
        "valid": true,
        "strategy": config.targets.strategy,
        "targets": targets.iter().map(RetryTarget::key).collect::<Vec<_>>(),
        "retry": config.retry,
        "parallel": config.parallel,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn simulate(
    path: PathBuf,
    requests: usize,
    rounds: usize,
    failure_rate: f64,
    seed: Option<u64>,
    watch: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;
    if let Err(e) = logging::init_logging(&config.observability) {
        eprintln!("Logging already initialized: {e}");
    }

    tracing::info!(path = ?path, requests, rounds, failure_rate, "failover-engine simulation starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let catalog = simulated_catalog(&config)?;
    let rng = Arc::new(Mutex::new(match seed {
        Some(s) => fastrand::Rng::with_seed(s),
        None => fastrand::Rng::new(),
    }));
    let failure_rate = failure_rate.clamp(0.0, 1.0);

    let invoker = invoker_fn(move |target: RetryTarget, method: RoutingMethod, prompt: Arc<String>| {
        let (fail, latency_ms) = match rng.lock() {
            Ok(mut rng) => (rng.f64() < failure_rate, rng.u64(5..25)),
            Err(_) => (false, 10),
        };
        async move {
            tokio::time::sleep(Duration::from_millis(latency_ms)).await;
            // Some regions only accept routed traffic.
            if matches!(method, RoutingMethod::Direct(_)) && region_hash(&target) % 2 == 1 {
                return Err(ClassifiedError::routing_incompatible(format!(
                    "{target} requires a routed endpoint"
                )));
            }
            if fail {
                return Err(ClassifiedError::rate_limited(format!("{target} throttled")));
            }
            Ok(format!("{} via {}: {}", target, method.identifier(), prompt))
        }
    });

    let mut engine = Engine::new(config, catalog, invoker)?;
    if let Some(s) = seed {
        engine = engine.with_seed(s);
    }
    let engine = Arc::new(engine);

    // The watcher handle must outlive the rounds.
    let _watcher = if watch {
        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let handle = watcher.run()?;
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while let Some(next) = updates.recv().await {
                if let Err(e) = engine.apply_config(next) {
                    tracing::error!(error = %e, "Rejected reloaded configuration");
                }
            }
        });
        Some(handle)
    } else {
        None
    };

    for round in 0..rounds {
        let batch: Vec<Request<String>> = (0..requests)
            .map(|i| Request::new(format!("r{round}-{i}"), format!("prompt {i}")))
            .collect();

        let result = engine.execute_batch(batch, None, None, None).await?;
        let retried = if result.all_succeeded() {
            result
        } else {
            engine.retry_failed_requests(&result, None).await
        };

        let report = json!({
            "round": round,
            "summary": retried.summary(),
            "statistics": engine.get_statistics(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    tracing::info!("Simulation complete");
    Ok(())
}

/// Every configured target exposes a direct and a regional route.
fn simulated_catalog(config: &EngineConfig) -> Result<Arc<StaticCatalog>, Box<dyn std::error::Error>> {
    let mut catalog = StaticCatalog::new();
    for backend in &config.targets.backends {
        for region in &config.targets.regions {
            let methods = AccessMethods::new(
                vec![
                    RoutingMethod::Direct(format!("{backend}-{region}")),
                    RoutingMethod::RegionalRoute(format!("{region}.{backend}")),
                ],
                None,
            )?;
            catalog.insert(backend.clone(), region.clone(), methods);
        }
    }
    Ok(Arc::new(catalog))
}

fn region_hash(target: &RetryTarget) -> usize {
    target
        .region
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_add(usize::from(b)))
}
