#![deny(missing_docs)]

//! # toolgate-audit: Audit Trail for Agent Tool Decisions
//!
//! An append-only record of every decision and its outcome.
//!
//! - **Entries** (`entry.rs`): caller input and the persisted, immutable
//!   entry.
//! - **Redaction** (`redact.rs`): sensitive payload keys are replaced
//!   before anything is stored.
//! - **Hashing** (`hash.rs`): content hashes for change detection and the
//!   SHA-256 hash chain linking entries.
//! - **Log** (`log.rs`): recording, queries, metrics and chain
//!   verification over an [`AuditSink`].

pub mod entry;
pub mod error;
pub mod hash;
pub mod log;
pub mod query;
pub mod redact;
pub mod sink;

pub use entry::{
    AuditEntry, AuditEntryId, AuditEntryInput, AuditMode, AuditStatus, ErrorCategory,
    VerdictOutcome,
};
pub use error::AuditError;
pub use hash::{content_hash, proposed_after_hash, GENESIS_HASH};
pub use log::AuditLog;
pub use query::{AuditFilter, AuditMetrics, AuditPage, ChainIntegrity};
pub use redact::{is_sensitive, redact, REDACTED_MARKER, SENSITIVE_KEYS};
pub use sink::{AuditSink, InMemoryAuditSink};
