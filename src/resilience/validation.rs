//! Response validation.
//!
//! A validator inspects a response the transport already delivered. Rejection
//! re-invokes the same target and method; it never re-resolves.

use std::sync::Arc;

/// Verdict on one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(String),
}

impl ValidationOutcome {
    pub fn rejected(reason: impl Into<String>) -> Self {
        ValidationOutcome::Rejected(reason.into())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

/// Caller-supplied content check.
pub trait ResponseValidator<R>: Send + Sync {
    fn validate(&self, response: &R) -> ValidationOutcome;
}

impl<R, F> ResponseValidator<R> for F
where
    F: Fn(&R) -> ValidationOutcome + Send + Sync,
{
    fn validate(&self, response: &R) -> ValidationOutcome {
        self(response)
    }
}

/// Shared validator handle stored in execution plans.
pub type SharedValidator<R> = Arc<dyn ResponseValidator<R>>;

#[cfg(test)]
mod tests {
    use super::*;

    struct MinLength(usize);

    impl ResponseValidator<String> for MinLength {
        fn validate(&self, response: &String) -> ValidationOutcome {
            if response.len() >= self.0 {
                ValidationOutcome::Accepted
            } else {
                ValidationOutcome::rejected(format!("shorter than {}", self.0))
            }
        }
    }

    #[test]
    fn test_struct_validator() {
        let v: SharedValidator<String> = Arc::new(MinLength(3));
        assert!(v.validate(&"abcd".to_string()).is_accepted());
        assert_eq!(
            v.validate(&"ab".to_string()),
            ValidationOutcome::Rejected("shorter than 3".into())
        );
    }

    #[test]
    fn test_closure_validator() {
        let v: SharedValidator<u32> = Arc::new(|n: &u32| {
            if n % 2 == 0 {
                ValidationOutcome::Accepted
            } else {
                ValidationOutcome::rejected("odd")
            }
        });
        assert!(v.validate(&4).is_accepted());
        assert!(!v.validate(&5).is_accepted());
    }
}
