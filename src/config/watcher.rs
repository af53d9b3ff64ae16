//! Hot reload of the engine configuration file.
//!
//! # Responsibilities
//! - Watch the file and re-read it on modify/create events
//! - Drop events whose file content matches the last accepted reload
//! - Report every rejected field, then keep the running configuration
//!
//! Accepted configurations are sent over a channel; the receiver decides when
//! to hand them to `Engine::apply_config`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_config_str, ConfigError};
use crate::config::schema::EngineConfig;
use crate::observability::metrics;

/// Outcome of one reload attempt.
#[derive(Debug)]
pub enum Reload {
    /// New configuration, validated.
    Accepted(Box<EngineConfig>),
    /// Same content as the last accepted reload.
    Unchanged,
    /// Unreadable, unparsable or invalid; the running configuration stays.
    Rejected(ConfigError),
}

impl Reload {
    fn as_str(&self) -> &'static str {
        match self {
            Reload::Accepted(_) => "accepted",
            Reload::Unchanged => "unchanged",
            Reload::Rejected(_) => "rejected",
        }
    }
}

/// Re-reads one configuration file, remembering the last accepted content.
#[derive(Debug)]
pub struct ConfigReloader {
    path: PathBuf,
    last_accepted: Option<String>,
}

impl ConfigReloader {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            last_accepted: None,
        }
    }

    /// Seed with the content the engine was started from.
    pub fn with_current(mut self, content: impl Into<String>) -> Self {
        self.last_accepted = Some(content.into());
        self
    }

    /// Read the file and classify the result.
    pub fn reload(&mut self) -> Reload {
        let outcome = match fs::read_to_string(&self.path) {
            Err(e) => Reload::Rejected(ConfigError::Io(e)),
            Ok(content) if self.last_accepted.as_deref() == Some(content.as_str()) => Reload::Unchanged,
            Ok(content) => match load_config_str(&content) {
                Ok(config) => {
                    self.last_accepted = Some(content);
                    Reload::Accepted(Box::new(config))
                }
                Err(e) => Reload::Rejected(e),
            },
        };
        self.report(&outcome);
        metrics::record_config_reload(outcome.as_str());
        outcome
    }

    fn report(&self, outcome: &Reload) {
        match outcome {
            Reload::Accepted(config) => tracing::info!(
                path = ?self.path,
                backends = config.targets.backends.len(),
                regions = config.targets.regions.len(),
                strategy = ?config.targets.strategy,
                max_attempts = config.retry.max_attempts,
                concurrency_limit = config.parallel.concurrency_limit,
                "Configuration reloaded"
            ),
            Reload::Unchanged => tracing::debug!(path = ?self.path, "Configuration content unchanged, skipping"),
            Reload::Rejected(ConfigError::Validation(errors)) => {
                for error in errors {
                    tracing::error!(
                        path = ?self.path,
                        field = error.field(),
                        error = %error,
                        "Reloaded configuration field is invalid"
                    );
                }
                tracing::warn!(
                    path = ?self.path,
                    errors = errors.len(),
                    "Keeping current configuration"
                );
            }
            Reload::Rejected(e) => tracing::error!(
                path = ?self.path,
                error = %e,
                "Failed to reload configuration, keeping current configuration"
            ),
        }
    }
}

/// Watches the configuration file and forwards accepted reloads.
pub struct ConfigWatcher {
    reloader: ConfigReloader,
    update_tx: mpsc::UnboundedSender<EngineConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<EngineConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let mut reloader = ConfigReloader::new(path);
        // Editors often emit several events per save; the startup content is the baseline.
        if let Ok(current) = fs::read_to_string(path) {
            reloader = reloader.with_current(current);
        }
        (Self { reloader, update_tx }, update_rx)
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.reloader.path.clone();
        let tx = self.update_tx;
        let mut reloader = self.reloader;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if let Reload::Accepted(config) = reloader.reload() {
                        if tx.send(*config).is_err() {
                            tracing::debug!("Config receiver dropped, ignoring reload");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        [targets]
        backends = ["b0"]
        regions = ["r0", "r1"]
    "#;

    fn temp_file(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("failover-reload-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_reload_skips_unchanged_content() {
        let path = temp_file(VALID);
        let mut reloader = ConfigReloader::new(&path);

        match reloader.reload() {
            Reload::Accepted(config) => assert_eq!(config.targets.regions, vec!["r0", "r1"]),
            other => panic!("expected accepted reload, got {other:?}"),
        }
        assert!(matches!(reloader.reload(), Reload::Unchanged));

        fs::write(&path, VALID.replace("\"r1\"", "\"r2\"")).unwrap();
        match reloader.reload() {
            Reload::Accepted(config) => assert_eq!(config.targets.regions, vec!["r0", "r2"]),
            other => panic!("expected accepted reload, got {other:?}"),
        }
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_invalid_reload_reports_every_field() {
        let path = temp_file(VALID);
        let mut reloader = ConfigReloader::new(&path).with_current(VALID);

        fs::write(
            &path,
            "[targets]\nbackends = []\nregions = [\"r0\"]\n[retry]\nmax_attempts = 0\n",
        )
        .unwrap();
        match reloader.reload() {
            Reload::Rejected(ConfigError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field()).collect();
                assert_eq!(fields, vec!["targets.backends", "retry.max_attempts"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        // A rejected reload does not replace the baseline.
        fs::write(&path, VALID).unwrap();
        assert!(matches!(reloader.reload(), Reload::Unchanged));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let mut reloader = ConfigReloader::new(Path::new("/nonexistent/failover.toml"));
        assert!(matches!(reloader.reload(), Reload::Rejected(ConfigError::Io(_))));
    }
}
