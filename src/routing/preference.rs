//! Learned access preferences.
//!
//! # Responsibilities
//! - Remember which routing method worked per (backend, region)
//! - Remember which methods a target rejected as incompatible
//!
//! # Design Decisions
//! - Explicit store object handed to the engine, never a process global
//! - DashMap shards give per-key read-modify-write without a global lock
//! - Last writer wins; preferences are discovered, not negotiated
//! - Process lifetime only, nothing is persisted

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::catalog::RoutingKind;
use crate::observability::metrics;

/// Where a preference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    /// Declared by the catalog (or its default order) at first resolution.
    Declared,
    /// Learned after a routing-incompatibility error at runtime.
    Learned,
}

impl PreferenceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PreferenceSource::Declared => "declared",
            PreferenceSource::Learned => "learned",
        }
    }
}

/// Preference record for one (backend, region) key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPreference {
    pub preferred: RoutingKind,
    pub source: PreferenceSource,
    pub updated_at: SystemTime,
    /// Methods the target rejected, most recent last.
    pub incompatible: Vec<RoutingKind>,
}

impl AccessPreference {
    fn new(preferred: RoutingKind, source: PreferenceSource) -> Self {
        Self {
            preferred,
            source,
            updated_at: SystemTime::now(),
            incompatible: Vec::new(),
        }
    }

    pub fn is_incompatible(&self, kind: RoutingKind) -> bool {
        self.incompatible.contains(&kind)
    }
}

/// Serializable view of a preference for statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceSnapshot {
    pub preferred: RoutingKind,
    pub source: PreferenceSource,
    /// Seconds since the Unix epoch.
    pub updated_at: u64,
    pub incompatible: Vec<RoutingKind>,
}

/// Thread-safe cache of learned routing preferences.
#[derive(Debug, Clone, Default)]
pub struct AccessPreferenceStore {
    inner: Arc<DashMap<String, AccessPreference>>,
}

impl AccessPreferenceStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for a key, if any.
    pub fn get(&self, key: &str) -> Option<AccessPreference> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    /// Return the record for a key, creating it with a declared preference if absent.
    pub fn get_or_declare(&self, key: &str, declared: RoutingKind) -> AccessPreference {
        self.inner
            .entry(key.to_string())
            .or_insert_with(|| AccessPreference::new(declared, PreferenceSource::Declared))
            .value()
            .clone()
    }

    /// Note that a target rejected a routing method.
    ///
    /// A key seen for the first time is seeded with the highest-priority
    /// method other than the rejected one.
    pub fn record_incompatible(&self, key: &str, kind: RoutingKind) {
        let mut entry = self.inner.entry(key.to_string()).or_insert_with(|| {
            let seed = RoutingKind::PRIORITY
                .into_iter()
                .find(|k| *k != kind)
                .unwrap_or(kind);
            AccessPreference::new(seed, PreferenceSource::Declared)
        });
        let pref = entry.value_mut();
        if !pref.incompatible.contains(&kind) {
            pref.incompatible.push(kind);
            pref.updated_at = SystemTime::now();
            tracing::debug!(target_key = %key, method = %kind, "Routing method marked incompatible");
        }
    }

    /// Store the method that just succeeded as preferred.
    ///
    /// Returns `true` if the preferred method changed.
    pub fn record_success(&self, key: &str, kind: RoutingKind, source: PreferenceSource) -> bool {
        let mut entry = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| AccessPreference::new(kind, source));
        let pref = entry.value_mut();
        pref.incompatible.retain(|k| *k != kind);

        if pref.preferred == kind {
            return false;
        }

        let previous = pref.preferred;
        pref.preferred = kind;
        pref.source = source;
        pref.updated_at = SystemTime::now();
        drop(entry);

        metrics::record_preference_update(source.as_str());
        tracing::info!(
            target_key = %key,
            from = %previous,
            to = %kind,
            source = source.as_str(),
            "Routing preference updated"
        );
        true
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Point-in-time copy of every record, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, PreferenceSnapshot> {
        self.inner
            .iter()
            .map(|r| {
                let p = r.value();
                let updated_at = p
                    .updated_at
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                (
                    r.key().clone(),
                    PreferenceSnapshot {
                        preferred: p.preferred,
                        source: p.source,
                        updated_at,
                        incompatible: p.incompatible.clone(),
                    },
                )
            })
            .collect()
    }
}
