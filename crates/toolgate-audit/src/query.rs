//! # Audit Queries and Metrics
//!
//! Filters combine with AND. Every filter field left `None` matches all
//! entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolgate_core::{ActorId, ToolName};

use crate::entry::{AuditEntry, AuditStatus, ErrorCategory, VerdictOutcome};

/// Default page size for [`AuditLog::query`](crate::AuditLog::query).
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Largest page [`AuditLog::query`](crate::AuditLog::query) will return.
pub const MAX_PAGE_SIZE: usize = 500;

/// Combinable audit filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Entries by this actor.
    pub actor: Option<ActorId>,
    /// Entries for this tool.
    pub action: Option<ToolName>,
    /// Entries on this entity type.
    pub entity_type: Option<String>,
    /// Entries with this status.
    pub status: Option<AuditStatus>,
    /// Entries created at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Entries created before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Entries with this error category.
    pub error_category: Option<ErrorCategory>,
    /// Entries with this verdict outcome.
    pub policy_verdict: Option<VerdictOutcome>,
}

impl AuditFilter {
    /// A filter that matches everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder: restrict to one actor.
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Builder: restrict to one tool.
    pub fn with_action(mut self, action: ToolName) -> Self {
        self.action = Some(action);
        self
    }

    /// Builder: restrict to one entity type.
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Builder: restrict to one status.
    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Builder: restrict to `[from, to)`.
    pub fn with_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Builder: restrict to one error category.
    pub fn with_error_category(mut self, category: ErrorCategory) -> Self {
        self.error_category = Some(category);
        self
    }

    /// Builder: restrict to one verdict outcome.
    pub fn with_policy_verdict(mut self, verdict: VerdictOutcome) -> Self {
        self.policy_verdict = Some(verdict);
        self
    }

    /// Whether `entry` passes every set filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_ref().map_or(true, |a| a == &entry.user_id)
            && self.action.as_ref().map_or(true, |a| a == &entry.action)
            && self
                .entity_type
                .as_deref()
                .map_or(true, |t| t == entry.entity_type)
            && self.status.map_or(true, |s| s == entry.status)
            && self.from.map_or(true, |from| entry.created_at >= from)
            && self.to.map_or(true, |to| entry.created_at < to)
            && self
                .error_category
                .map_or(true, |c| Some(c) == entry.error_category)
            && self
                .policy_verdict
                .map_or(true, |v| Some(v) == entry.policy_verdict)
    }
}

/// One page of query results, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    /// Entries on this page.
    pub entries: Vec<AuditEntry>,
    /// Number of entries matching the filter across all pages.
    pub total: usize,
    /// Effective page size.
    pub limit: usize,
    /// Entries skipped before this page.
    pub offset: usize,
}

/// Aggregate counts over matching entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetrics {
    /// Number of matching entries.
    pub total: u64,
    /// Counts per status.
    pub by_status: BTreeMap<String, u64>,
    /// Counts per error category (entries with a category only).
    pub by_error_category: BTreeMap<String, u64>,
    /// Counts per tool.
    pub by_action: BTreeMap<String, u64>,
    /// Counts per UTC day, `YYYY-MM-DD`.
    pub by_day: BTreeMap<String, u64>,
    /// Entries whose verdict allowed the action.
    pub allowed: u64,
    /// Entries whose verdict denied the action.
    pub denied: u64,
}

impl AuditMetrics {
    /// Fold one entry into the counts.
    pub fn add(&mut self, entry: &AuditEntry) {
        self.total += 1;
        *self.by_status.entry(entry.status.as_str().to_string()).or_default() += 1;
        if let Some(category) = entry.error_category {
            *self
                .by_error_category
                .entry(category.as_str().to_string())
                .or_default() += 1;
        }
        *self.by_action.entry(entry.action.to_string()).or_default() += 1;
        *self
            .by_day
            .entry(entry.created_at.format("%Y-%m-%d").to_string())
            .or_default() += 1;
        match entry.policy_verdict {
            Some(VerdictOutcome::Allowed) => self.allowed += 1,
            Some(VerdictOutcome::Denied) => self.denied += 1,
            None => {}
        }
    }
}

/// Result of [`AuditLog::verify_chain`](crate::AuditLog::verify_chain).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIntegrity {
    /// Entries examined.
    pub total_entries: usize,
    /// Entries whose `previous_hash` does not match the preceding entry.
    pub broken_links: usize,
    /// Entries whose stored hash does not match their content.
    pub tampered_entries: Vec<u64>,
    /// Whether the whole chain verified.
    pub chain_valid: bool,
}
