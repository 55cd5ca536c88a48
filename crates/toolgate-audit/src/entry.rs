//! # Audit Entries
//!
//! An [`AuditEntryInput`] is what callers hand to the log; an [`AuditEntry`]
//! is what the log persists after redaction, timestamping and chaining.
//! Entries are never updated or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_core::{ActorContext, ActorId, EntityId, ToolName};
use toolgate_policy::{PolicyVerdict, ReasonCode};
use uuid::Uuid;

/// Identifier of a persisted audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(pub Uuid);

impl AuditEntryId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The action ran and succeeded.
    Success,
    /// The action ran and failed.
    Error,
    /// The policy denied the action.
    Denied,
    /// The action awaits approval.
    Pending,
}

impl AuditStatus {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Denied => "denied",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the action was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    /// Applied to the host.
    #[default]
    Execute,
    /// Evaluated without mutating anything.
    DryRun,
    /// Proposed to a human, not applied.
    Suggest,
}

impl AuditMode {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::DryRun => "dry_run",
            Self::Suggest => "suggest",
        }
    }
}

/// Coarse classification of a failed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad input.
    Validation,
    /// The actor lacked a capability.
    Permission,
    /// The policy engine denied the action.
    Policy,
    /// The target entity does not exist.
    NotFound,
    /// The target changed concurrently.
    Conflict,
    /// A rate limit was hit.
    RateLimit,
    /// A dependency outside the host failed.
    External,
    /// Anything else.
    Internal,
}

impl ErrorCategory {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::Policy => "policy",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimit => "rate_limit",
            Self::External => "external",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the policy allowed the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    /// The verdict permitted the action.
    Allowed,
    /// The verdict denied the action.
    Denied,
}

impl VerdictOutcome {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

/// What a caller records.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntryInput {
    /// The tool that was invoked.
    pub action: ToolName,
    /// Who invoked it.
    pub actor: ActorId,
    /// Host entity type (`post`, `product`, ...).
    pub entity_type: String,
    /// Target entity, if any.
    pub entity_id: Option<EntityId>,
    /// Invocation mode.
    pub mode: AuditMode,
    /// Request payload. Redacted before persistence.
    pub payload: Value,
    /// Content hash before the action.
    pub before_hash: Option<String>,
    /// Content hash of the proposed state.
    pub after_hash: Option<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Evaluated policy version.
    pub policy_version: Option<String>,
    /// Verdict outcome.
    pub policy_verdict: Option<VerdictOutcome>,
    /// Verdict reason.
    pub policy_reason: Option<ReasonCode>,
    /// Verdict detail.
    pub policy_details: Option<String>,
    /// Host error code, for failed actions.
    pub error_code: Option<String>,
    /// Error classification, for failed actions.
    pub error_category: Option<ErrorCategory>,
    /// Client IP.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl AuditEntryInput {
    /// Start an entry for `action` by `actor` on an entity of `entity_type`.
    pub fn new(
        action: ToolName,
        actor: ActorId,
        entity_type: impl Into<String>,
        status: AuditStatus,
    ) -> Self {
        Self {
            action,
            actor,
            entity_type: entity_type.into(),
            entity_id: None,
            mode: AuditMode::default(),
            payload: Value::Object(Default::default()),
            before_hash: None,
            after_hash: None,
            status,
            policy_version: None,
            policy_verdict: None,
            policy_reason: None,
            policy_details: None,
            error_code: None,
            error_category: None,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Builder: set the target entity. Non-positive ids are dropped.
    pub fn with_entity_id(mut self, entity_id: Option<i64>) -> Self {
        self.entity_id = EntityId::clamp(entity_id);
        self
    }

    /// Builder: set the invocation mode.
    pub fn with_mode(mut self, mode: AuditMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: set the request payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builder: set the before/after content hashes.
    pub fn with_hashes(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before_hash = before;
        self.after_hash = after;
        self
    }

    /// Builder: attach a policy verdict.
    pub fn with_verdict(mut self, verdict: &PolicyVerdict) -> Self {
        self.policy_verdict = Some(if verdict.allowed {
            VerdictOutcome::Allowed
        } else {
            VerdictOutcome::Denied
        });
        self.policy_reason = Some(verdict.reason);
        self.policy_details = Some(verdict.details.clone());
        self.policy_version = verdict.policy_version.clone();
        self
    }

    /// Builder: record a failure.
    pub fn with_error(mut self, code: impl Into<String>, category: ErrorCategory) -> Self {
        self.error_code = Some(code.into());
        self.error_category = Some(category);
        self
    }

    /// Builder: take actor, IP and user agent from a request context.
    pub fn with_actor_context(mut self, ctx: &ActorContext) -> Self {
        self.actor = ctx.id.clone();
        self.ip_address = ctx.ip.clone();
        self.user_agent = ctx.user_agent.clone();
        self
    }
}

/// A persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// Position in the chain, starting at 1.
    pub sequence: u64,
    /// The tool that was invoked.
    pub action: ToolName,
    /// Who invoked it.
    pub user_id: ActorId,
    /// Host entity type.
    pub entity_type: String,
    /// Target entity, if any.
    pub entity_id: Option<EntityId>,
    /// Invocation mode.
    pub mode: AuditMode,
    /// Redacted request payload.
    pub data: Value,
    /// Content hash before the action.
    pub before_hash: Option<String>,
    /// Content hash of the proposed state.
    pub after_hash: Option<String>,
    /// Outcome.
    pub status: AuditStatus,
    /// Evaluated policy version.
    pub policy_version: Option<String>,
    /// Verdict outcome.
    pub policy_verdict: Option<VerdictOutcome>,
    /// Verdict reason.
    pub policy_reason: Option<ReasonCode>,
    /// Verdict detail.
    pub policy_details: Option<String>,
    /// Host error code.
    pub error_code: Option<String>,
    /// Error classification.
    pub error_category: Option<ErrorCategory>,
    /// Client IP.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// `entry_hash` of the preceding entry.
    pub previous_hash: String,
    /// Chain hash of this entry.
    pub entry_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> AuditEntryInput {
        AuditEntryInput::new(
            ToolName::new("posts.create").unwrap(),
            ActorId::anonymous(),
            "post",
            AuditStatus::Success,
        )
    }

    #[test]
    fn verdict_fields_are_copied() {
        let verdict =
            toolgate_policy::PolicyVerdict::deny(ReasonCode::BlockedTerm, "Blocked term 'x'")
                .with_policy_version(Some("0.0.2".into()));
        let entry = input().with_verdict(&verdict);
        assert_eq!(entry.policy_verdict, Some(VerdictOutcome::Denied));
        assert_eq!(entry.policy_reason, Some(ReasonCode::BlockedTerm));
        assert_eq!(entry.policy_version.as_deref(), Some("0.0.2"));
    }

    #[test]
    fn actor_context_fields_are_copied() {
        let ctx = ActorContext::new(ActorId::new("9").unwrap())
            .with_ip("10.1.1.1")
            .with_user_agent("agent");
        let entry = input().with_actor_context(&ctx);
        assert_eq!(entry.actor.as_str(), "9");
        assert_eq!(entry.ip_address.as_deref(), Some("10.1.1.1"));
        assert_eq!(entry.user_agent.as_deref(), Some("agent"));
    }

    #[test]
    fn entity_id_is_clamped() {
        assert!(input().with_entity_id(Some(0)).entity_id.is_none());
        assert_eq!(input().with_entity_id(Some(5)).entity_id.map(|e| e.get()), Some(5));
    }

    #[test]
    fn enum_names() {
        assert_eq!(serde_json::to_value(AuditMode::DryRun).unwrap(), json!("dry_run"));
        assert_eq!(serde_json::to_value(ErrorCategory::NotFound).unwrap(), json!("not_found"));
        assert_eq!(AuditStatus::Denied.to_string(), "denied");
        assert_eq!(VerdictOutcome::Allowed.as_str(), "allowed");
    }
}
