//! Domain error model and the boundary error taxonomy.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error classification shared by every layer.
///
/// The presentation layer keys its responses on this; finer-grained codes
/// travel alongside it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No resolvable principal.
    Unauthenticated,
    /// Principal's role not permitted for the operation.
    Forbidden,
    /// Malformed or out-of-range input.
    Validation,
    /// Referenced entity does not exist.
    NotFound,
    /// State-machine, uniqueness or concurrency violation.
    Conflict,
    /// Underlying persisted-store failure.
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Deterministic business failures only (validation, invariants, state
/// machine). Storage and transport concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested state transition is not legal from the current state.
    #[error("cannot {action} an order that is {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    /// A stock decrease would take the on-hand quantity below zero.
    #[error("insufficient stock: {available} on hand, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },
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

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::NotFound => ErrorKind::NotFound,
            DomainError::InvariantViolation(_)
            | DomainError::Conflict(_)
            | DomainError::InvalidTransition { .. }
            | DomainError::InsufficientStock { .. } => ErrorKind::Conflict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(DomainError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::invalid_id("x").kind(), ErrorKind::Validation);
        assert_eq!(DomainError::not_found().kind(), ErrorKind::NotFound);
        assert_eq!(
            DomainError::InvalidTransition { from: "delivered", action: "cancel" }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            DomainError::InsufficientStock { available: 1, requested: 2 }.kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn transition_message_names_state_and_action() {
        let err = DomainError::InvalidTransition { from: "cancelled", action: "confirm" };
        assert_eq!(err.to_string(), "cannot confirm an order that is cancelled");
    }
}
