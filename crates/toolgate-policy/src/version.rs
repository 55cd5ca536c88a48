//! # Policy Versions
//!
//! Every change to a tool's policy produces a new [`PolicyVersion`] record.
//! Version numbers are `major.minor.patch` and only the patch component is
//! ever incremented by the store; the first version of a tool is `0.0.1`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolgate_core::{ActorId, ToolName};
use uuid::Uuid;

use crate::document::PolicyDocument;

/// A `major.minor.patch` version number, ordered numerically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct VersionNumber {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component.
    pub patch: u32,
}

impl VersionNumber {
    /// The version a tool has before its first stored version.
    pub const INITIAL: Self = Self::new(0, 0, 0);

    /// Construct from components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The next patch version.
    pub fn next_patch(&self) -> Self {
        Self {
            patch: self.patch.saturating_add(1),
            ..*self
        }
    }
}

/// Error parsing a version string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version \"{0}\": expected major.minor.patch")]
pub struct InvalidVersion(pub String);

impl FromStr for VersionNumber {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(InvalidVersion(s.to_string()));
        };
        let parse = |p: &str| p.parse::<u32>().map_err(|_| InvalidVersion(s.to_string()));
        Ok(Self::new(parse(major)?, parse(minor)?, parse(patch)?))
    }
}

impl TryFrom<String> for VersionNumber {
    type Error = InvalidVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionNumber> for String {
    fn from(value: VersionNumber) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Identifier of a stored policy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyVersionId(pub Uuid);

impl PolicyVersionId {
    /// A fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PolicyVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PolicyVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One stored version of a tool's policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVersion {
    /// Record identifier.
    pub id: PolicyVersionId,
    /// The tool this policy governs.
    pub tool: ToolName,
    /// Version number, unique per tool.
    pub version: VersionNumber,
    /// The policy document.
    pub document: PolicyDocument,
    /// When the version was stored.
    pub created_at: DateTime<Utc>,
    /// Who stored it.
    pub created_by: ActorId,
    /// Whether this is the tool's active version.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let v: VersionNumber = "1.2.3".parse().unwrap();
        assert_eq!(v, VersionNumber::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_malformed() {
        assert!("1.2".parse::<VersionNumber>().is_err());
        assert!("1.2.3.4".parse::<VersionNumber>().is_err());
        assert!("a.b.c".parse::<VersionNumber>().is_err());
        assert!("".parse::<VersionNumber>().is_err());
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let v9: VersionNumber = "0.0.9".parse().unwrap();
        let v10: VersionNumber = "0.0.10".parse().unwrap();
        assert!(v10 > v9);
    }

    #[test]
    fn next_patch_from_initial() {
        assert_eq!(VersionNumber::INITIAL.next_patch().to_string(), "0.0.1");
        assert_eq!(VersionNumber::new(2, 1, 9).next_patch().to_string(), "2.1.10");
    }

    #[test]
    fn serde_as_string() {
        let v = VersionNumber::new(0, 0, 4);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"0.0.4\"");
        let back: VersionNumber = serde_json::from_str("\"0.0.4\"").unwrap();
        assert_eq!(back, v);
    }
}
