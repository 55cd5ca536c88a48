//! # Audit Sinks
//!
//! Append-only persistence for audit entries. The log serializes appends,
//! so a sink only needs to store entries in the order it receives them.

use parking_lot::RwLock;

use crate::entry::AuditEntry;
use crate::error::AuditError;

/// Append-only storage for audit entries.
pub trait AuditSink: Send + Sync {
    /// Persist `entry` after every entry already stored.
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// The most recently appended entry.
    fn last(&self) -> Result<Option<AuditEntry>, AuditError>;

    /// Every entry, in append order.
    fn entries(&self) -> Result<Vec<AuditEntry>, AuditError>;
}

/// In-process audit sink.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Replace the stored entry at `index`.
    #[cfg(test)]
    pub(crate) fn overwrite(&self, index: usize, entry: AuditEntry) -> bool {
        match self.entries.write().get_mut(index) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => false,
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry);
        Ok(())
    }

    fn last(&self) -> Result<Option<AuditEntry>, AuditError> {
        Ok(self.entries.read().last().cloned())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(self.entries.read().clone())
    }
}
