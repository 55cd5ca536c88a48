//! # Content and Chain Hashing
//!
//! All hashes are lowercase hex SHA-256 over [`CanonicalBytes`] (sorted
//! keys, compact separators).
//!
//! - [`content_hash`]: change-detection digest of an entity's content
//!   fields. Not a snapshot.
//! - [`proposed_after_hash`]: the digest of the proposed fields merged over
//!   the current state. It is computed before the mutation is applied and
//!   describes the intended state, not a re-read of the stored one.
//! - [`entry_hash`]: the audit chain link, covering every field of an entry
//!   except the hash itself.

use serde_json::Value;
use toolgate_core::{sha256_hex, CanonicalBytes, CanonicalizationError};

use crate::entry::AuditEntry;
use crate::error::AuditError;

/// `previous_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Digest of an entity's content fields.
pub fn content_hash(fields: &Value) -> Result<String, CanonicalizationError> {
    Ok(sha256_hex(&CanonicalBytes::new(fields)?))
}

/// Digest of `proposed` merged over `current` at the top level.
///
/// A non-object `current` is treated as empty; a non-object `proposed`
/// changes nothing.
pub fn proposed_after_hash(
    current: &Value,
    proposed: &Value,
) -> Result<String, CanonicalizationError> {
    let mut merged = current.as_object().cloned().unwrap_or_default();
    if let Some(changes) = proposed.as_object() {
        for (k, v) in changes {
            merged.insert(k.clone(), v.clone());
        }
    }
    content_hash(&Value::Object(merged))
}

/// The chain hash of `entry`, ignoring its stored `entry_hash`.
pub fn entry_hash(entry: &AuditEntry) -> Result<String, AuditError> {
    let mut value = serde_json::to_value(entry)?;
    if let Some(map) = value.as_object_mut() {
        map.remove("entry_hash");
    }
    Ok(sha256_hex(&CanonicalBytes::new(&value)?))
}
