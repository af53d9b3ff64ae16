//! Target sequence generation.
//!
//! # Responsibilities
//! - Expand configured backends × regions into an ordered candidate list
//! - Preserve configuration order as the stable secondary key
//!
//! # Design Decisions
//! - Pure and deterministic: same input, same order, no randomisation here
//! - Empty backend or region lists are configuration errors, caught before execution

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::validation::ValidationError;

/// Order in which (backend, region) pairs are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingStrategy {
    /// Outer loop over backends, region varies fastest.
    #[default]
    RegionFirst,
    /// Outer loop over regions, backend varies fastest.
    #[serde(alias = "backend_first")]
    ModelFirst,
}

/// One (backend, region) candidate and its position in the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetryTarget {
    pub backend: String,
    pub region: String,
    pub position: usize,
}

impl RetryTarget {
    pub fn new(backend: impl Into<String>, region: impl Into<String>, position: usize) -> Self {
        Self {
            backend: backend.into(),
            region: region.into(),
            position,
        }
    }

    /// Key used by the circuit breaker, load tracker and preference store.
    pub fn key(&self) -> String {
        format!("{}@{}", self.backend, self.region)
    }
}

impl fmt::Display for RetryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.backend, self.region)
    }
}

/// Build the candidate sequence. Returns an empty list if either input is empty.
pub fn sequence(backends: &[String], regions: &[String], strategy: SequencingStrategy) -> Vec<RetryTarget> {
    let mut out = Vec::with_capacity(backends.len() * regions.len());
    match strategy {
        SequencingStrategy::RegionFirst => {
            for backend in backends {
                for region in regions {
                    out.push(RetryTarget::new(backend, region, out.len()));
                }
            }
        }
        SequencingStrategy::ModelFirst => {
            for region in regions {
                for backend in backends {
                    out.push(RetryTarget::new(backend, region, out.len()));
                }
            }
        }
    }
    out
}

/// Validated backend/region lists plus an ordering strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSequencer {
    backends: Vec<String>,
    regions: Vec<String>,
    strategy: SequencingStrategy,
}

impl TargetSequencer {
    /// Create a sequencer, rejecting empty lists up front.
    pub fn new(
        backends: Vec<String>,
        regions: Vec<String>,
        strategy: SequencingStrategy,
    ) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();
        if backends.is_empty() {
            errors.push(ValidationError::Empty("targets.backends"));
        }
        if regions.is_empty() {
            errors.push(ValidationError::Empty("targets.regions"));
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            backends,
            regions,
            strategy,
        })
    }

    pub fn strategy(&self) -> SequencingStrategy {
        self.strategy
    }

    pub fn sequence(&self) -> Vec<RetryTarget> {
        sequence(&self.backends, &self.regions, self.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn pairs(seq: &[RetryTarget]) -> Vec<(String, String)> {
        seq.iter().map(|t| (t.backend.clone(), t.region.clone())).collect()
    }

    #[test]
    fn test_region_first() {
        let seq = sequence(&names("b", 2), &names("r", 3), SequencingStrategy::RegionFirst);
        let expected: Vec<(String, String)> = [
            ("b0", "r0"), ("b0", "r1"), ("b0", "r2"),
            ("b1", "r0"), ("b1", "r1"), ("b1", "r2"),
        ]
        .iter()
        .map(|(b, r)| (b.to_string(), r.to_string()))
        .collect();
        assert_eq!(pairs(&seq), expected);
        assert_eq!(seq.iter().map(|t| t.position).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_model_first() {
        let seq = sequence(&names("b", 2), &names("r", 2), SequencingStrategy::ModelFirst);
        let expected: Vec<(String, String)> = [("b0", "r0"), ("b1", "r0"), ("b0", "r1"), ("b1", "r1")]
            .iter()
            .map(|(b, r)| (b.to_string(), r.to_string()))
            .collect();
        assert_eq!(pairs(&seq), expected);
    }

    #[test]
    fn test_deterministic() {
        let backends = names("b", 4);
        let regions = names("r", 3);
        for strategy in [SequencingStrategy::RegionFirst, SequencingStrategy::ModelFirst] {
            let first = sequence(&backends, &regions, strategy);
            for _ in 0..10 {
                assert_eq!(sequence(&backends, &regions, strategy), first);
            }
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(sequence(&[], &names("r", 2), SequencingStrategy::RegionFirst).is_empty());
        let err = TargetSequencer::new(Vec::new(), Vec::new(), SequencingStrategy::RegionFirst).unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn test_backend_first_alias() {
        #[derive(Deserialize)]
        struct Wrap {
            strategy: SequencingStrategy,
        }
        let w: Wrap = toml::from_str("strategy = \"backend_first\"").unwrap();
        assert_eq!(w.strategy, SequencingStrategy::ModelFirst);
    }

    #[test]
    fn test_target_key() {
        let t = RetryTarget::new("claude", "us-east-1", 0);
        assert_eq!(t.key(), "claude@us-east-1");
        assert_eq!(t.to_string(), "claude@us-east-1");
    }
}
