//! # Policy Diff
//!
//! Shallow comparison of two policy documents over their top-level keys.
//! A section that changed anywhere inside is reported as modified with its
//! whole old and new values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::PolicyDocument;

/// Old and new value of a modified key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    /// Value in the first document.
    pub old: Value,
    /// Value in the second document.
    pub new: Value,
}

/// The difference between two documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDiff {
    /// Keys present only in the second document.
    pub added: BTreeMap<String, Value>,
    /// Keys present only in the first document.
    pub removed: BTreeMap<String, Value>,
    /// Keys present in both with unequal values.
    pub modified: BTreeMap<String, ValueChange>,
}

impl PolicyDiff {
    /// Whether the two documents were identical.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Computes [`PolicyDiff`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyDiffer;

impl PolicyDiffer {
    /// Diff two JSON values. Non-object values are treated as empty objects.
    pub fn diff(a: &Value, b: &Value) -> PolicyDiff {
        let empty = serde_json::Map::new();
        let a = a.as_object().unwrap_or(&empty);
        let b = b.as_object().unwrap_or(&empty);

        let mut diff = PolicyDiff::default();
        for (key, new) in b {
            match a.get(key) {
                None => {
                    diff.added.insert(key.clone(), new.clone());
                }
                Some(old) if old != new => {
                    diff.modified.insert(
                        key.clone(),
                        ValueChange {
                            old: old.clone(),
                            new: new.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }
        for (key, old) in a {
            if !b.contains_key(key) {
                diff.removed.insert(key.clone(), old.clone());
            }
        }
        diff
    }

    /// Diff two typed documents.
    pub fn diff_documents(a: &PolicyDocument, b: &PolicyDocument) -> PolicyDiff {
        Self::diff(&a.to_value(), &b.to_value())
    }
}
