//! Context store error types.

use thiserror::Error;
use weft_workflow::SchemaError;

/// Errors raised by the context store.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A path string could not be parsed.
    #[error("invalid context path `{path}`: {reason}")]
    PathSyntax {
        /// The offending path string.
        path: String,
        /// Why parsing failed.
        reason: &'static str,
    },

    /// A path addressed a region the store does not know.
    #[error("unknown context region in `{path}` (expected input, state, output or _branches)")]
    UnknownRegion {
        /// The offending path string.
        path: String,
    },

    /// A write targeted the immutable `input` region after start.
    #[error("`{path}` is in the immutable input region")]
    ImmutableRegion {
        /// The offending path string.
        path: String,
    },

    /// Path traversal hit a scalar where a container was needed.
    #[error("cannot traverse `{path}`: {reason}")]
    Traversal {
        /// The offending path string.
        path: String,
        /// What went wrong.
        reason: &'static str,
    },

    /// A merge target was expected to be an array.
    #[error("merge target `{path}` is not an array")]
    NotAnArray {
        /// The target path.
        path: String,
    },

    /// A merge target was expected to be an object.
    #[error("merge target `{path}` is not an object")]
    NotAnObject {
        /// The target path.
        path: String,
    },

    /// A `keyed` merge saw the same key from two contributors.
    #[error("keyed merge conflict on key `{key}`")]
    MergeConflict {
        /// The duplicated key.
        key: String,
    },

    /// A `keyed` merge source did not resolve to a `{key, value}` object.
    #[error("keyed merge source for token {token} is not a {{key, value}} object")]
    InvalidKeyedSource {
        /// The contributing token.
        token: weft_core::TokenId,
    },

    /// A mapping or merge source path resolved to nothing.
    #[error("no value at `{path}`")]
    MissingValue {
        /// The unresolved path.
        path: String,
    },

    /// A value failed shape validation.
    #[error("validation: {0}")]
    Validation(#[from] SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = ContextError::PathSyntax {
            path: "state..x".into(),
            reason: "empty segment",
        };
        assert_eq!(
            err.to_string(),
            "invalid context path `state..x`: empty segment"
        );

        let err = ContextError::MergeConflict { key: "a".into() };
        assert_eq!(err.to_string(), "keyed merge conflict on key `a`");

        let err = ContextError::MissingValue {
            path: "state.results".into(),
        };
        assert_eq!(err.to_string(), "no value at `state.results`");
    }

    #[test]
    fn from_schema_error() {
        let schema_err = weft_workflow::ValueSchema::Integer
            .validate(&serde_json::json!(1.5))
            .unwrap_err();
        let err = ContextError::from(schema_err);
        assert!(err.to_string().starts_with("validation:"));
    }
}
