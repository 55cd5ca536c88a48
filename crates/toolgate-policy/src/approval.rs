//! # Approval Workflows
//!
//! A workflow names a set of trigger conditions over the request fields.
//! When any condition holds the action needs a recorded approval for the
//! exact `(tool, entity, actor)` triple, unless the actor holds admin
//! bypass.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use toolgate_core::{ActorId, Clock, EntityId, ToolName};

use crate::document::{ApprovalCondition, ApprovalWorkflow};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Answers whether an actor may skip approval workflows.
pub trait CapabilityProvider: Send + Sync {
    /// Whether `actor` holds admin bypass.
    fn has_admin_bypass(&self, actor: &ActorId) -> bool;
}

/// Nobody has admin bypass.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBypass;

impl CapabilityProvider for NoBypass {
    fn has_admin_bypass(&self, _actor: &ActorId) -> bool {
        false
    }
}

/// A fixed set of admin actors.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    admins: HashSet<ActorId>,
}

impl StaticCapabilities {
    /// Grant admin bypass to the given actors.
    pub fn with_admins(admins: impl IntoIterator<Item = ActorId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn has_admin_bypass(&self, actor: &ActorId) -> bool {
        self.admins.contains(actor)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Key of an approval record. A missing entity is recorded as entity `0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalKey {
    /// Canonical tool name.
    pub tool: ToolName,
    /// Entity id, or `0` when the action targets no entity.
    pub entity_id: u64,
    /// The actor the approval applies to.
    pub actor: ActorId,
}

impl ApprovalKey {
    /// Build a key.
    pub fn new(tool: ToolName, entity_id: Option<EntityId>, actor: ActorId) -> Self {
        Self {
            tool,
            entity_id: entity_id.map_or(0, |e| e.get()),
            actor,
        }
    }
}

/// A stored approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Whether the action was approved.
    pub approved: bool,
    /// When the decision was recorded.
    pub decided_at: DateTime<Utc>,
}

/// Failure of the approval ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalLedgerError {
    /// The ledger could not be read or written.
    #[error("approval ledger unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for approval records.
pub trait ApprovalLedger: Send + Sync {
    /// Read the record at `key`.
    fn get(&self, key: &ApprovalKey) -> Result<Option<ApprovalRecord>, ApprovalLedgerError>;
    /// Write (or overwrite) the record at `key`.
    fn put(&self, key: ApprovalKey, record: ApprovalRecord) -> Result<(), ApprovalLedgerError>;
    /// Delete the record at `key`. Returns whether one existed.
    fn remove(&self, key: &ApprovalKey) -> Result<bool, ApprovalLedgerError>;
}

/// In-process approval ledger.
#[derive(Debug, Default)]
pub struct InMemoryApprovalLedger {
    records: DashMap<ApprovalKey, ApprovalRecord>,
}

impl InMemoryApprovalLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ApprovalLedger for InMemoryApprovalLedger {
    fn get(&self, key: &ApprovalKey) -> Result<Option<ApprovalRecord>, ApprovalLedgerError> {
        Ok(self.records.get(key).map(|r| *r))
    }

    fn put(&self, key: ApprovalKey, record: ApprovalRecord) -> Result<(), ApprovalLedgerError> {
        self.records.insert(key, record);
        Ok(())
    }

    fn remove(&self, key: &ApprovalKey) -> Result<bool, ApprovalLedgerError> {
        Ok(self.records.remove(key).is_some())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Evaluates workflow conditions and manages approval records.
#[derive(Clone)]
pub struct ApprovalWorkflowEngine {
    ledger: Arc<dyn ApprovalLedger>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ApprovalWorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalWorkflowEngine").finish_non_exhaustive()
    }
}

impl ApprovalWorkflowEngine {
    /// Create an engine over `ledger`.
    pub fn new(ledger: Arc<dyn ApprovalLedger>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// The first workflow with a condition that holds, if any.
    pub fn requires_approval<'a>(
        &self,
        workflows: &'a [ApprovalWorkflow],
        tool: &ToolName,
        fields: &Value,
    ) -> Option<&'a ApprovalWorkflow> {
        workflows.iter().find(|wf| {
            wf.conditions
                .iter()
                .any(|c| condition_holds(c, tool, fields))
        })
    }

    /// Whether an approval is recorded for the triple.
    pub fn has_approval(
        &self,
        tool: &ToolName,
        entity_id: Option<EntityId>,
        actor: &ActorId,
    ) -> Result<bool, ApprovalLedgerError> {
        let key = ApprovalKey::new(tool.clone(), entity_id, actor.clone());
        Ok(self.ledger.get(&key)?.is_some_and(|r| r.approved))
    }

    /// Record an approval decision for the triple.
    pub fn set_approval(
        &self,
        tool: &ToolName,
        entity_id: Option<EntityId>,
        actor: &ActorId,
        approved: bool,
    ) -> Result<(), ApprovalLedgerError> {
        let key = ApprovalKey::new(tool.clone(), entity_id, actor.clone());
        self.ledger.put(
            key,
            ApprovalRecord {
                approved,
                decided_at: self.clock.now(),
            },
        )?;
        tracing::info!(
            %tool,
            entity = ?entity_id.map(|e| e.get()),
            %actor,
            approved,
            "approval recorded"
        );
        Ok(())
    }

    /// Remove any approval for the triple. Returns whether one existed.
    pub fn revoke_approval(
        &self,
        tool: &ToolName,
        entity_id: Option<EntityId>,
        actor: &ActorId,
    ) -> Result<bool, ApprovalLedgerError> {
        let key = ApprovalKey::new(tool.clone(), entity_id, actor.clone());
        let removed = self.ledger.remove(&key)?;
        if removed {
            tracing::info!(%tool, entity = ?entity_id.map(|e| e.get()), %actor, "approval revoked");
        }
        Ok(removed)
    }
}

/// Look up a field by exact key, then by dotted path.
pub fn lookup_field<'a>(fields: &'a Value, field: &str) -> Option<&'a Value> {
    if let Some(v) = fields.get(field) {
        return Some(v);
    }
    let mut current = fields;
    for part in field.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether one condition holds for the request.
pub fn condition_holds(condition: &ApprovalCondition, tool: &ToolName, fields: &Value) -> bool {
    match condition {
        ApprovalCondition::FieldEquals { field, value } => {
            lookup_field(fields, field).is_some_and(|actual| {
                actual == value
                    || match (scalar_text(actual), scalar_text(value)) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                    || matches!((as_number(actual), as_number(value)), (Some(a), Some(b)) if a == b)
            })
        }
        ApprovalCondition::FieldContains { field, value } => lookup_field(fields, field)
            .and_then(scalar_text)
            .is_some_and(|text| text.to_lowercase().contains(&value.to_lowercase())),
        ApprovalCondition::FieldLengthGreater { field, value } => lookup_field(fields, field)
            .and_then(scalar_text)
            .is_some_and(|text| text.chars().count() as u64 > *value),
        ApprovalCondition::FieldNumericGreater { field, value } => lookup_field(fields, field)
            .and_then(as_number)
            .is_some_and(|n| n > *value),
        ApprovalCondition::ToolEquals { value } => {
            ToolName::new(value).is_ok_and(|expected| &expected == tool)
        }
    }
}
