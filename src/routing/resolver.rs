//! Access method resolution.
//!
//! # Responsibilities
//! - Ask the catalog which routing methods a target exposes
//! - Order them: preferred first, default priority next, known-incompatible last
//! - Feed outcomes back into the preference store (fast-learn)
//!
//! # Design Decisions
//! - A target missing from the catalog is skipped by the caller, never retried
//! - The first resolution of a key seeds the store with the catalog-declared
//!   preference (or the default priority head)
//! - Incompatible methods are demoted, not removed: the catalog may be right later

use std::sync::Arc;

use thiserror::Error;

use crate::catalog::{Catalog, RoutingKind, RoutingMethod};
use crate::routing::preference::{AccessPreferenceStore, PreferenceSource};
use crate::routing::sequencer::RetryTarget;

/// Resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The catalog has no entry for this pair.
    #[error("no catalog entry for {backend}@{region}")]
    Unresolved { backend: String, region: String },
}

/// Resolves targets into ordered routing methods.
#[derive(Clone)]
pub struct AccessResolver {
    catalog: Arc<dyn Catalog>,
    preferences: AccessPreferenceStore,
}

impl AccessResolver {
    pub fn new(catalog: Arc<dyn Catalog>, preferences: AccessPreferenceStore) -> Self {
        Self {
            catalog,
            preferences,
        }
    }

    pub fn preferences(&self) -> &AccessPreferenceStore {
        &self.preferences
    }

    /// Ordered routing methods for a target.
    pub fn resolve(&self, target: &RetryTarget) -> Result<Vec<RoutingMethod>, ResolveError> {
        let available = self
            .catalog
            .lookup(&target.backend, &target.region)
            .ok_or_else(|| ResolveError::Unresolved {
                backend: target.backend.clone(),
                region: target.region.clone(),
            })?;

        let declared = available.declared_preference().unwrap_or_else(|| {
            RoutingKind::PRIORITY
                .into_iter()
                .find(|k| available.get(*k).is_some())
                .unwrap_or(RoutingKind::Direct)
        });
        let pref = self.preferences.get_or_declare(&target.key(), declared);

        let mut order: Vec<RoutingKind> = Vec::with_capacity(3);
        if available.get(pref.preferred).is_some() && !pref.is_incompatible(pref.preferred) {
            order.push(pref.preferred);
        }
        for kind in RoutingKind::PRIORITY {
            if !order.contains(&kind) && !pref.is_incompatible(kind) {
                order.push(kind);
            }
        }
        // Known-incompatible methods go last, oldest rejection first.
        for kind in &pref.incompatible {
            if !order.contains(kind) {
                order.push(*kind);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|k| available.get(k).cloned())
            .collect())
    }

    /// Record a routing-incompatibility signal for a method.
    pub fn record_incompatible(&self, target: &RetryTarget, kind: RoutingKind) {
        self.preferences.record_incompatible(&target.key(), kind);
    }

    /// Write back the method that succeeded.
    ///
    /// `learned` marks a success reached by advancing past an incompatible method.
    pub fn record_success(&self, target: &RetryTarget, kind: RoutingKind, learned: bool) -> bool {
        let source = if learned {
            PreferenceSource::Learned
        } else {
            PreferenceSource::Declared
        };
        self.preferences.record_success(&target.key(), kind, source)
    }
}
