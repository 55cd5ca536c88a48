//! # Identity Newtypes
//!
//! Identifiers that flow through every decision. Each is a distinct type:
//! a [`ToolName`] cannot be passed where an [`ActorId`] is expected.
//!
//! ## Canonical tool naming
//!
//! Tool names are lowercased and restricted to `[a-z0-9._-]`. Dots are
//! preserved (`posts.create` stays `posts.create`). The same canonical form
//! keys policy lookups, rate-limit counters, approval records and audit
//! actions, so a tool registered under one spelling is always found under
//! every other spelling that canonicalizes to it.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Maximum length of a canonical tool name.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// A canonical tool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolName(String);

impl ToolName {
    /// Canonicalize and validate a raw tool name.
    ///
    /// Leading/trailing whitespace is trimmed, ASCII letters are lowercased,
    /// and every character outside `[a-z0-9._-]` is dropped. The result is
    /// truncated to [`MAX_TOOL_NAME_LEN`]. Fails if nothing remains.
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let canonical: String = raw
            .trim()
            .chars()
            .map(|c| c.to_ascii_lowercase())
            .filter(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
            })
            .take(MAX_TOOL_NAME_LEN)
            .collect();
        let canonical = canonical.trim_matches('.').to_string();
        if canonical.is_empty() {
            return Err(ValidationError::InvalidToolName(raw.to_string()));
        }
        Ok(Self(canonical))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ToolName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ToolName> for String {
    fn from(value: ToolName) -> Self {
        value.0
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identifier of the user (or agent principal) requesting an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor identifier. Fails on empty input.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidActorId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The identifier used for requests with no authenticated actor.
    pub fn anonymous() -> Self {
        Self("anonymous".to_string())
    }

    /// Access the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A positive host-CMS entity identifier (post, product, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Validate a raw entity identifier.
    pub fn new(raw: i64) -> Result<Self, ValidationError> {
        if raw <= 0 {
            return Err(ValidationError::InvalidEntityId(raw));
        }
        Ok(Self(raw as u64))
    }

    /// Clamp an optional raw identifier: non-positive values become `None`.
    pub fn clamp(raw: Option<i64>) -> Option<Self> {
        raw.and_then(|r| Self::new(r).ok())
    }

    /// The numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is asking, threaded explicitly into every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// The requesting actor.
    pub id: ActorId,
    /// Client IP address, if known.
    pub ip: Option<String>,
    /// Client user agent, if known.
    pub user_agent: Option<String>,
}

impl ActorContext {
    /// Create a context with no network metadata.
    pub fn new(id: ActorId) -> Self {
        Self {
            id,
            ip: None,
            user_agent: None,
        }
    }

    /// Builder: set the client IP.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Builder: set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}
