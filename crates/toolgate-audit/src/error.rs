//! Audit log errors.

use thiserror::Error;
use toolgate_core::CanonicalizationError;

/// Errors from [`AuditLog`](crate::AuditLog) operations.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The sink could not be read or written.
    #[error("audit sink unavailable: {0}")]
    Sink(String),

    /// An entry or payload could not be canonicalized for hashing.
    #[error("audit hashing failed: {0}")]
    Hashing(#[from] CanonicalizationError),

    /// An entry could not be converted to JSON.
    #[error("audit serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
