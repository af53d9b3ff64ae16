//! Catalog collaborator interface.
//!
//! # Data Flow
//! ```text
//! external catalog (data acquisition, name correlation)
//!     → AccessMethods::new (rejects empty / duplicate method sets)
//!     → Catalog::lookup(backend, region)
//!     → cache.rs (optional memoisation)
//!     → routing::resolver orders the methods for one attempt sequence
//! ```
//!
//! # Design Decisions
//! - Invalid method sets are rejected when the catalog is built, never at resolution time
//! - `lookup` is synchronous and must be safe to call from many tasks at once
//! - Methods carry the concrete identifier the invoke callback needs

pub mod cache;

pub use cache::CachedCatalog;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing method discriminant, in default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingKind {
    Direct,
    RegionalRoute,
    GlobalRoute,
}

impl RoutingKind {
    /// Default priority: lowest-latency path first.
    pub const PRIORITY: [RoutingKind; 3] = [
        RoutingKind::Direct,
        RoutingKind::RegionalRoute,
        RoutingKind::GlobalRoute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingKind::Direct => "direct",
            RoutingKind::RegionalRoute => "regional_route",
            RoutingKind::GlobalRoute => "global_route",
        }
    }
}

impl fmt::Display for RoutingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way to reach a target, with the identifier the invoke callback uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RoutingMethod {
    /// Direct model identifier.
    Direct(String),
    /// Region-scoped routing profile identifier.
    RegionalRoute(String),
    /// Globally-scoped routing profile identifier.
    GlobalRoute(String),
}

impl RoutingMethod {
    pub fn kind(&self) -> RoutingKind {
        match self {
            RoutingMethod::Direct(_) => RoutingKind::Direct,
            RoutingMethod::RegionalRoute(_) => RoutingKind::RegionalRoute,
            RoutingMethod::GlobalRoute(_) => RoutingKind::GlobalRoute,
        }
    }

    /// The routing identifier handed to the invoke callback.
    pub fn identifier(&self) -> &str {
        match self {
            RoutingMethod::Direct(id)
            | RoutingMethod::RegionalRoute(id)
            | RoutingMethod::GlobalRoute(id) => id,
        }
    }
}

/// Errors raised while building catalog entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A target must expose at least one routing method.
    #[error("target exposes no routing method")]
    EmptyMethodSet,

    /// Each routing kind may appear at most once per target.
    #[error("routing method {0} listed more than once")]
    DuplicateMethod(RoutingKind),

    /// The declared preference must be one of the available methods.
    #[error("declared preference {0} is not an available method")]
    UndeclaredPreference(RoutingKind),
}

/// Validated, non-empty set of routing methods for one (backend, region) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessMethods {
    methods: Vec<RoutingMethod>,
    declared_preference: Option<RoutingKind>,
}

impl AccessMethods {
    /// Build a method set, rejecting empty sets and duplicate kinds.
    pub fn new(
        methods: Vec<RoutingMethod>,
        declared_preference: Option<RoutingKind>,
    ) -> Result<Self, CatalogError> {
        if methods.is_empty() {
            return Err(CatalogError::EmptyMethodSet);
        }
        for (i, method) in methods.iter().enumerate() {
            if methods[..i].iter().any(|m| m.kind() == method.kind()) {
                return Err(CatalogError::DuplicateMethod(method.kind()));
            }
        }
        if let Some(pref) = declared_preference {
            if !methods.iter().any(|m| m.kind() == pref) {
                return Err(CatalogError::UndeclaredPreference(pref));
            }
        }
        Ok(Self {
            methods,
            declared_preference,
        })
    }

    /// Build from the three optional identifiers a catalog row carries.
    pub fn from_identifiers(
        direct: Option<String>,
        regional: Option<String>,
        global: Option<String>,
    ) -> Result<Self, CatalogError> {
        let methods = direct
            .map(RoutingMethod::Direct)
            .into_iter()
            .chain(regional.map(RoutingMethod::RegionalRoute))
            .chain(global.map(RoutingMethod::GlobalRoute))
            .collect();
        Self::new(methods, None)
    }

    pub fn methods(&self) -> &[RoutingMethod] {
        &self.methods
    }

    pub fn declared_preference(&self) -> Option<RoutingKind> {
        self.declared_preference
    }

    pub fn get(&self, kind: RoutingKind) -> Option<&RoutingMethod> {
        self.methods.iter().find(|m| m.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Source of routing methods per (backend, region).
pub trait Catalog: Send + Sync {
    /// Available methods for the pair, or `None` when the catalog has no entry.
    fn lookup(&self, backend: &str, region: &str) -> Option<AccessMethods>;
}

/// In-memory catalog keyed by (backend, region).
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<(String, String), AccessMethods>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the methods for a pair, replacing any previous entry.
    pub fn insert(&mut self, backend: impl Into<String>, region: impl Into<String>, methods: AccessMethods) {
        self.entries.insert((backend.into(), region.into()), methods);
    }

    /// Builder-style variant of `insert`.
    #[must_use]
    pub fn with_entry(mut self, backend: impl Into<String>, region: impl Into<String>, methods: AccessMethods) -> Self {
        self.insert(backend, region, methods);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Catalog for StaticCatalog {
    fn lookup(&self, backend: &str, region: &str) -> Option<AccessMethods> {
        self.entries
            .get(&(backend.to_string(), region.to_string()))
            .cloned()
    }
}
