//! # Policy Store
//!
//! Versioned per-tool policy documents with an in-process active-policy
//! cache.
//!
//! ## Consistency
//!
//! - Version creation and rollback are serialized by a store-wide mutex, so
//!   version numbers never race.
//! - The active pointer for each tool is an `Arc<ActivePolicy>` behind a
//!   `parking_lot::RwLock`. Readers clone the `Arc` and see either the old
//!   or the new policy, never a partial one.
//! - Persistence goes through [`VersionRepository`]. Failures are returned,
//!   never swallowed.
//! - The cache is explicit: [`PolicyStore::reload`], [`PolicyStore::invalidate`]
//!   and [`PolicyStore::invalidate_all`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use toolgate_core::{ActorId, Clock, ToolName};

use crate::diff::{PolicyDiff, PolicyDiffer};
use crate::document::{CompiledPolicy, InvalidPolicy, PolicyDocument};
use crate::version::{PolicyVersion, PolicyVersionId, VersionNumber};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of the version repository.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backing store could not be read or written.
    #[error("policy repository unavailable: {0}")]
    Unavailable(String),

    /// A version with this number already exists for the tool.
    #[error("version {version} already exists for tool {tool}")]
    DuplicateVersion {
        /// Tool name.
        tool: String,
        /// Conflicting version.
        version: String,
    },
}

/// Errors from [`PolicyStore`] operations.
#[derive(Error, Debug)]
pub enum PolicyStoreError {
    /// The document failed validation.
    #[error(transparent)]
    Invalid(#[from] InvalidPolicy),

    /// The repository failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// No such version for the tool.
    #[error("tool {tool} has no version {version}")]
    VersionNotFound {
        /// Tool name.
        tool: String,
        /// Requested version.
        version: String,
    },

    /// A stored document no longer compiles.
    #[error("stored version {version} of {tool} is invalid: {source}")]
    CorruptVersion {
        /// Tool name.
        tool: String,
        /// Offending version.
        version: String,
        /// Validation failure.
        source: InvalidPolicy,
    },
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Persistence for policy versions.
pub trait VersionRepository: Send + Sync {
    /// All versions of `tool`, in any order.
    fn list(&self, tool: &ToolName) -> Result<Vec<PolicyVersion>, RepositoryError>;

    /// Store `version` and make it the only active version of its tool.
    fn append_and_activate(&self, version: PolicyVersion) -> Result<(), RepositoryError>;

    /// Make `version` the only active version of `tool`. Returns whether the
    /// version exists.
    fn activate(&self, tool: &ToolName, version: &VersionNumber) -> Result<bool, RepositoryError>;
}

/// In-process version repository.
#[derive(Debug, Default)]
pub struct InMemoryVersionRepository {
    versions: RwLock<HashMap<ToolName, Vec<PolicyVersion>>>,
}

impl InMemoryVersionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

impl VersionRepository for InMemoryVersionRepository {
    fn list(&self, tool: &ToolName) -> Result<Vec<PolicyVersion>, RepositoryError> {
        Ok(self.versions.read().get(tool).cloned().unwrap_or_default())
    }

    fn append_and_activate(&self, version: PolicyVersion) -> Result<(), RepositoryError> {
        let mut guard = self.versions.write();
        let entries = guard.entry(version.tool.clone()).or_default();
        if entries.iter().any(|v| v.version == version.version) {
            return Err(RepositoryError::DuplicateVersion {
                tool: version.tool.to_string(),
                version: version.version.to_string(),
            });
        }
        for existing in entries.iter_mut() {
            existing.active = false;
        }
        entries.push(PolicyVersion {
            active: true,
            ..version
        });
        Ok(())
    }

    fn activate(&self, tool: &ToolName, version: &VersionNumber) -> Result<bool, RepositoryError> {
        let mut guard = self.versions.write();
        let Some(entries) = guard.get_mut(tool) else {
            return Ok(false);
        };
        if !entries.iter().any(|v| &v.version == version) {
            return Ok(false);
        }
        for entry in entries.iter_mut() {
            entry.active = &entry.version == version;
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// PolicyStore
// ---------------------------------------------------------------------------

/// The policy currently in force for a tool.
#[derive(Debug, Clone)]
pub struct ActivePolicy {
    /// The tool.
    pub tool: ToolName,
    /// Stored version, or `None` for an in-memory override.
    pub version: Option<VersionNumber>,
    /// The compiled document.
    pub policy: CompiledPolicy,
}

impl ActivePolicy {
    /// The source document.
    pub fn document(&self) -> &PolicyDocument {
        &self.policy.document
    }
}

/// Versioned policy store with an active-policy cache.
pub struct PolicyStore {
    repository: Arc<dyn VersionRepository>,
    clock: Arc<dyn Clock>,
    active: RwLock<HashMap<ToolName, Arc<ActivePolicy>>>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("cached_tools", &self.active.read().len())
            .finish_non_exhaustive()
    }
}

impl PolicyStore {
    /// Create a store over `repository`.
    pub fn new(repository: Arc<dyn VersionRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            clock,
            active: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store over a fresh in-memory repository.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(InMemoryVersionRepository::new()), clock)
    }

    /// Validate `document`, store it as the next patch version of `tool`
    /// and make it active.
    pub fn create_version(
        &self,
        tool: &ToolName,
        document: PolicyDocument,
        author: &ActorId,
    ) -> Result<PolicyVersionId, PolicyStoreError> {
        let compiled = document.compile()?;
        let _guard = self.write_lock.lock();

        let latest = self
            .repository
            .list(tool)?
            .into_iter()
            .map(|v| v.version)
            .max()
            .unwrap_or(VersionNumber::INITIAL);
        let next = latest.next_patch();
        let id = PolicyVersionId::new();

        self.repository.append_and_activate(PolicyVersion {
            id,
            tool: tool.clone(),
            version: next,
            document,
            created_at: self.clock.now(),
            created_by: author.clone(),
            active: true,
        })?;

        self.swap_active(ActivePolicy {
            tool: tool.clone(),
            version: Some(next),
            policy: compiled,
        });
        tracing::info!(%tool, version = %next, %author, "policy version created");
        Ok(id)
    }

    /// The active policy for `tool`, loading it from the repository on a
    /// cache miss.
    pub fn get_active(
        &self,
        tool: &ToolName,
    ) -> Result<Option<Arc<ActivePolicy>>, PolicyStoreError> {
        if let Some(hit) = self.active.read().get(tool) {
            return Ok(Some(Arc::clone(hit)));
        }
        let Some(loaded) = self.load_active(tool)? else {
            return Ok(None);
        };
        let mut guard = self.active.write();
        let entry = guard.entry(tool.clone()).or_insert(loaded);
        Ok(Some(Arc::clone(entry)))
    }

    /// All stored versions of `tool`, newest first.
    pub fn get_versions(&self, tool: &ToolName) -> Result<Vec<PolicyVersion>, PolicyStoreError> {
        let mut versions = self.repository.list(tool)?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    /// Reactivate a stored version. Later versions are kept.
    pub fn rollback(
        &self,
        tool: &ToolName,
        version: &VersionNumber,
    ) -> Result<(), PolicyStoreError> {
        let _guard = self.write_lock.lock();
        let target = self
            .repository
            .list(tool)?
            .into_iter()
            .find(|v| &v.version == version)
            .ok_or_else(|| PolicyStoreError::VersionNotFound {
                tool: tool.to_string(),
                version: version.to_string(),
            })?;
        let compiled = compile_stored(&target)?;

        if !self.repository.activate(tool, version)? {
            return Err(PolicyStoreError::VersionNotFound {
                tool: tool.to_string(),
                version: version.to_string(),
            });
        }
        self.swap_active(ActivePolicy {
            tool: tool.clone(),
            version: Some(*version),
            policy: compiled,
        });
        tracing::info!(%tool, %version, "policy rolled back");
        Ok(())
    }

    /// Install `document` as the active policy without storing a version.
    ///
    /// The override lasts until the next version is created, the tool is
    /// reloaded, or the cache is invalidated.
    pub fn update_active(
        &self,
        tool: &ToolName,
        document: PolicyDocument,
    ) -> Result<(), PolicyStoreError> {
        let compiled = document.compile()?;
        let _guard = self.write_lock.lock();
        self.swap_active(ActivePolicy {
            tool: tool.clone(),
            version: None,
            policy: compiled,
        });
        tracing::info!(%tool, "active policy overridden in memory");
        Ok(())
    }

    /// Re-read the active version of `tool` from the repository.
    pub fn reload(&self, tool: &ToolName) -> Result<Option<Arc<ActivePolicy>>, PolicyStoreError> {
        let _guard = self.write_lock.lock();
        let loaded = self.load_active(tool)?;
        let mut guard = self.active.write();
        match &loaded {
            Some(policy) => {
                guard.insert(tool.clone(), Arc::clone(policy));
            }
            None => {
                guard.remove(tool);
            }
        }
        tracing::debug!(%tool, found = loaded.is_some(), "policy reloaded");
        Ok(loaded)
    }

    /// Drop the cached policy for `tool`.
    pub fn invalidate(&self, tool: &ToolName) {
        self.active.write().remove(tool);
    }

    /// Drop every cached policy.
    pub fn invalidate_all(&self) {
        self.active.write().clear();
    }

    /// Diff two stored versions of `tool`.
    pub fn diff_versions(
        &self,
        tool: &ToolName,
        from: &VersionNumber,
        to: &VersionNumber,
    ) -> Result<PolicyDiff, PolicyStoreError> {
        let versions = self.repository.list(tool)?;
        let find = |wanted: &VersionNumber| {
            versions
                .iter()
                .find(|v| &v.version == wanted)
                .ok_or_else(|| PolicyStoreError::VersionNotFound {
                    tool: tool.to_string(),
                    version: wanted.to_string(),
                })
        };
        let a = find(from)?;
        let b = find(to)?;
        Ok(PolicyDiffer::diff_documents(&a.document, &b.document))
    }

    fn swap_active(&self, policy: ActivePolicy) {
        self.active
            .write()
            .insert(policy.tool.clone(), Arc::new(policy));
    }

    fn load_active(&self, tool: &ToolName) -> Result<Option<Arc<ActivePolicy>>, PolicyStoreError> {
        let Some(version) = self.repository.list(tool)?.into_iter().find(|v| v.active) else {
            return Ok(None);
        };
        let compiled = compile_stored(&version)?;
        Ok(Some(Arc::new(ActivePolicy {
            tool: tool.clone(),
            version: Some(version.version),
            policy: compiled,
        })))
    }
}

fn compile_stored(version: &PolicyVersion) -> Result<CompiledPolicy, PolicyStoreError> {
    version
        .document
        .compile()
        .map_err(|source| PolicyStoreError::CorruptVersion {
            tool: version.tool.to_string(),
            version: version.version.to_string(),
            source,
        })
}
