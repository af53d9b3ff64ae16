//! Lookup caching in front of a catalog.

use std::sync::Arc;

use dashmap::DashMap;

use crate::catalog::{AccessMethods, Catalog};

/// A thread-safe memoising wrapper around any catalog.
///
/// Misses are cached too, so a pair absent from the catalog is not looked up again
/// until `invalidate` is called.
#[derive(Clone)]
pub struct CachedCatalog {
    inner: Arc<dyn Catalog>,
    entries: Arc<DashMap<(String, String), Option<AccessMethods>>>,
}

impl CachedCatalog {
    /// Wrap a catalog with an empty cache.
    pub fn new(inner: Arc<dyn Catalog>) -> Self {
        Self {
            inner,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.entries.clear();
        tracing::debug!("Catalog lookup cache invalidated");
    }

    /// Drop the cached entry for one pair.
    pub fn invalidate_target(&self, backend: &str, region: &str) {
        self.entries.remove(&(backend.to_string(), region.to_string()));
    }

    /// Number of cached pairs (hits and misses).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for CachedCatalog {
    fn lookup(&self, backend: &str, region: &str) -> Option<AccessMethods> {
        let key = (backend.to_string(), region.to_string());
        if let Some(hit) = self.entries.get(&key) {
            return hit.value().clone();
        }
        let found = self.inner.lookup(backend, region);
        self.entries.insert(key, found.clone());
        found
    }
}
