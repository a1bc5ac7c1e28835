//! Coordinator error types.

use thiserror::Error;
use weft_context::ContextError;
use weft_core::TokenId;

/// Errors raised by the coordinator.
///
/// Start-time errors (`Definition`, `InputValidation`) surface to the
/// caller before any token exists -- the run is not created. Everything
/// else is an internal invariant violation that halts the run with a
/// failed outcome; ordinary action failures are *not* errors, they are
/// terminal token statuses routed by the planner.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The workflow definition referenced something that does not exist.
    #[error("definition error: {0}")]
    Definition(String),

    /// The run input does not match the workflow's input schema.
    #[error("input validation: {0}")]
    InputValidation(String),

    /// A token status transition is not legal.
    #[error("invalid transition from {from} to {to} for token {token}")]
    InvalidTransition {
        /// The token whose status was being changed.
        token: TokenId,
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A referenced token does not exist in the token store.
    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    /// A token spec violated a store invariant (branch index out of
    /// range, sibling-group mismatch).
    #[error("invalid token spec: {0}")]
    InvalidTokenSpec(String),

    /// A context store operation failed.
    #[error("context: {0}")]
    Context(#[from] ContextError),

    /// A resource lookup came back empty.
    #[error("resource not found: {kind} {key}")]
    ResourceNotFound {
        /// What kind of resource was requested.
        kind: &'static str,
        /// The requested identifier (and version, where applicable).
        key: String,
    },

    /// An action's implementation value does not fit its kind.
    #[error("invalid {kind} implementation: {reason}")]
    InvalidImplementation {
        /// The action kind whose shape was violated.
        kind: &'static str,
        /// What is missing or malformed.
        reason: String,
    },

    /// A serialization or deserialization error.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_display() {
        let err = CoordinatorError::Definition("unknown node `collect`".into());
        assert_eq!(err.to_string(), "definition error: unknown node `collect`");
    }

    #[test]
    fn invalid_transition_display() {
        let err = CoordinatorError::InvalidTransition {
            token: TokenId::new(3),
            from: "completed".into(),
            to: "pending".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid transition from completed to pending for token 3"
        );
    }

    #[test]
    fn token_not_found_display() {
        let err = CoordinatorError::TokenNotFound(TokenId::new(9));
        assert_eq!(err.to_string(), "token not found: 9");
    }

    #[test]
    fn from_context_error() {
        let ctx_err = ContextError::MissingValue {
            path: "state.x".into(),
        };
        let err = CoordinatorError::from(ctx_err);
        assert!(err.to_string().starts_with("context:"));
    }

    #[test]
    fn from_serde_error() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = CoordinatorError::from(serde_err);
        assert!(err.to_string().starts_with("serialization:"));
    }

    #[test]
    fn resource_not_found_display() {
        let err = CoordinatorError::ResourceNotFound {
            kind: "task",
            key: "abc@3".into(),
        };
        assert_eq!(err.to_string(), "resource not found: task abc@3");
    }
}
