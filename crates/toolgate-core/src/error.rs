//! # Error Hierarchy
//!
//! Structured error types shared across the workspace, built with
//! `thiserror`. Each variant carries enough context for an operator to
//! diagnose the failure without reading the source.

use thiserror::Error;

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for identifier newtypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Tool name is empty after canonicalization.
    #[error("invalid tool name: \"{0}\" (expected [a-z0-9._-], non-empty)")]
    InvalidToolName(String),

    /// Actor identifier is empty.
    #[error("invalid actor ID: must be non-empty")]
    InvalidActorId,

    /// Entity identifier is not a positive integer.
    #[error("invalid entity ID: {0} (expected a positive integer)")]
    InvalidEntityId(i64),
}

/// Errors loading runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable or config field held an unparseable value.
    #[error("invalid value for {key}: \"{value}\" ({reason})")]
    InvalidValue {
        /// The variable or field name.
        key: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let msg = ValidationError::InvalidToolName("!!".into()).to_string();
        assert!(msg.contains("invalid tool name"));
        assert!(msg.contains("!!"));
    }

    #[test]
    fn entity_id_error_display() {
        assert!(ValidationError::InvalidEntityId(-4).to_string().contains("-4"));
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "TOOLGATE_STORE_FAILURE_MODE".into(),
            value: "sideways".into(),
            reason: "expected open or closed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("TOOLGATE_STORE_FAILURE_MODE"));
        assert!(msg.contains("sideways"));
    }
}
