//! Errors raised while building domain values.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejection of a value before it reaches storage.
///
/// Only input and arithmetic failures live here. Missing rows, ownership and
/// concurrent writers are decided against stored state and are reported by
/// the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input (empty field, negative price, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation would break a cart rule, e.g. a quantity overflow.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An id string did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
