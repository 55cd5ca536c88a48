//! # Verdicts
//!
//! The immutable outcome of one policy decision. The evaluator never
//! persists a verdict; callers attach it to the audit entry for the action.

use serde::{Deserialize, Serialize};

/// Machine-readable reason attached to every verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The tool name was empty or canonicalized to nothing.
    InvalidTool,
    /// No active policy is registered for the tool.
    NoPolicy,
    /// A rate-limit scope is exhausted for the current bucket.
    RateLimitExceeded,
    /// The current hour is not in `allowed_hours`.
    TimeRestriction,
    /// The current weekday is not in `allowed_days`.
    DayRestriction,
    /// The current time falls in a blackout window.
    BlackoutWindow,
    /// A string field contains a blocked term.
    BlockedTerm,
    /// A string field matches a blocked pattern.
    BlockedPattern,
    /// The target entity's type is not allowed.
    PostTypeRestriction,
    /// The target entity's status is not allowed.
    StatusRestriction,
    /// An approval workflow fired and no approval is recorded.
    ApprovalRequired,
    /// Allowed because the actor holds admin bypass.
    AdminBypass,
    /// Allowed; every check passed.
    Approved,
    /// Denied because an internal dependency failed.
    UnknownError,
}

impl ReasonCode {
    /// Every reason code, in evaluation order.
    pub const ALL: [ReasonCode; 14] = [
        Self::InvalidTool,
        Self::NoPolicy,
        Self::RateLimitExceeded,
        Self::TimeRestriction,
        Self::DayRestriction,
        Self::BlackoutWindow,
        Self::BlockedTerm,
        Self::BlockedPattern,
        Self::PostTypeRestriction,
        Self::StatusRestriction,
        Self::ApprovalRequired,
        Self::AdminBypass,
        Self::Approved,
        Self::UnknownError,
    ];

    /// The canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTool => "invalid_tool",
            Self::NoPolicy => "no_policy",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::TimeRestriction => "time_restriction",
            Self::DayRestriction => "day_restriction",
            Self::BlackoutWindow => "blackout_window",
            Self::BlockedTerm => "blocked_term",
            Self::BlockedPattern => "blocked_pattern",
            Self::PostTypeRestriction => "post_type_restriction",
            Self::StatusRestriction => "status_restriction",
            Self::ApprovalRequired => "approval_required",
            Self::AdminBypass => "admin_bypass",
            Self::Approved => "approved",
            Self::UnknownError => "unknown_error",
        }
    }

    /// Whether a verdict with this reason permits the action.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::AdminBypass | Self::Approved)
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of [`PolicyEvaluator::decide`](crate::PolicyEvaluator::decide).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    /// Whether the action may proceed.
    pub allowed: bool,
    /// Why.
    pub reason: ReasonCode,
    /// Human-readable detail.
    pub details: String,
    /// The rule that produced a denial (scope, window, term, workflow).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggering_rule: Option<String>,
    /// The version of the policy that was evaluated, if versioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
}

impl PolicyVerdict {
    /// A permitting verdict.
    pub fn allow(reason: ReasonCode, details: impl Into<String>) -> Self {
        debug_assert!(reason.is_allowed());
        Self {
            allowed: true,
            reason,
            details: details.into(),
            triggering_rule: None,
            policy_version: None,
        }
    }

    /// A denying verdict.
    pub fn deny(reason: ReasonCode, details: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            details: details.into(),
            triggering_rule: None,
            policy_version: None,
        }
    }

    /// Builder: name the rule that produced this verdict.
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.triggering_rule = Some(rule.into());
        self
    }

    /// Builder: record the evaluated policy version.
    pub fn with_policy_version(mut self, version: Option<String>) -> Self {
        self.policy_version = version;
        self
    }
}
