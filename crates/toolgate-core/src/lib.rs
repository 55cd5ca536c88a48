#![deny(missing_docs)]

//! # toolgate-core: Foundational Types for toolgate
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`ToolName`] is always in its
//!    canonical form. Policy lookups, rate-limit keys, approval keys and
//!    audit actions all flow through the same type, so they can never
//!    disagree on how a tool is spelled.
//!
//! 2. **[`CanonicalBytes`] is the sole path to digest computation.** Content
//!    hashes in the audit log and the audit hash chain are computed from
//!    canonical JSON (sorted keys, compact separators).
//!
//! 3. **Sanitize, don't raise.** Untrusted request fields are cleaned by
//!    [`sanitize`] rather than rejected with an error.
//!
//! 4. **Structured errors.** Each concern has its own `thiserror` enum in
//!    [`error`]; no `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod digest;
pub mod error;
pub mod identity;
pub mod sanitize;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use config::{GateConfig, StoreFailureMode};
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, ConfigError, ValidationError};
pub use identity::{ActorContext, ActorId, EntityId, ToolName};
pub use sanitize::FieldSanitizer;
pub use temporal::{Clock, FixedClock, SystemClock};
