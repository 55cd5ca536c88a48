#![deny(missing_docs)]

//! # toolgate-policy: Policy Engine for Agent Tool Calls
//!
//! Decides whether an AI-agent-proposed tool invocation may run, based on
//! a per-tool policy document.
//!
//! ## Architecture
//!
//! - **Document** (`document.rs`): typed policy sections, load-time
//!   validation and compilation into matchers.
//!
//! - **Store** (`store.rs`): versioned policies with an explicit
//!   active-policy cache and rollback.
//!
//! - **Evaluation** (`evaluation.rs`): the ordered decision pipeline that
//!   produces a [`PolicyVerdict`].
//!
//! - **Rate limiting** (`rate_limit.rs`): fixed-window counters with an
//!   atomic compare-and-increment.
//!
//! - **Approvals** (`approval.rs`): workflow conditions, the approval
//!   ledger and admin bypass.
//!
//! - **Diff** (`diff.rs`): shallow comparison of two documents.
//!
//! ## Crate Policy
//!
//! - Depends on `toolgate-core` only.
//! - Every persistence concern sits behind a trait (`VersionRepository`,
//!   `CounterStore`, `ApprovalLedger`) with an in-memory implementation.
//! - `decide` never returns an error; internal failures deny.

pub mod approval;
pub mod diff;
pub mod document;
pub mod evaluation;
pub mod rate_limit;
pub mod store;
pub mod verdict;
pub mod version;

pub use approval::{
    ApprovalKey, ApprovalLedger, ApprovalLedgerError, ApprovalRecord, ApprovalWorkflowEngine,
    CapabilityProvider, InMemoryApprovalLedger, NoBypass, StaticCapabilities,
};
pub use diff::{PolicyDiff, PolicyDiffer, ValueChange};
pub use document::{
    ApprovalCondition, ApprovalWorkflow, BlackoutWindow, CompiledPolicy, ContentRestrictions,
    EntityRules, InvalidPolicy, PolicyDocument, PolicyParseError, PolicyValidationError,
    RateLimits, Severity, TimeWindows,
};
pub use evaluation::{EntityLookup, EntitySnapshot, PolicyEvaluator};
pub use rate_limit::{
    CounterOutcome, CounterStore, CounterStoreError, InMemoryCounterStore, RateLimitOutcome,
    RateLimitScope, RateLimiter,
};
pub use store::{
    ActivePolicy, InMemoryVersionRepository, PolicyStore, PolicyStoreError, RepositoryError,
    VersionRepository,
};
pub use verdict::{PolicyVerdict, ReasonCode};
pub use version::{PolicyVersion, PolicyVersionId, VersionNumber};
