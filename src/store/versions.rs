//! Snapshot-then-commit version manager.

use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::atomic::{write_atomic, write_new};
use super::layout::{parse_snapshot_name, Layout};
use super::locks::{ProjectGuard, ProjectLocks};
use crate::container::extract::{extract_description, extract_title};
use crate::domain::{ProjectId, SnapshotReason, VersionId, VersionInfo};
use crate::error::{BundleError, Result};
use crate::validate::{ValidationResult, Validator};

/// What a commit did
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// Snapshot of the replaced state; `None` on the first commit
    pub snapshot: Option<VersionId>,

    /// Validation of the candidate (tells whether it was auto-fixed)
    pub validation: ValidationResult,

    /// SHA-256 of the document now active
    pub sha256: String,
}

/// What a restore did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub restored: VersionId,

    /// Snapshot of the state that the restore replaced
    pub snapshot: Option<VersionId>,
}

/// Owns every write to active containers and the version store
#[derive(Debug, Clone)]
pub struct VersionManager {
    layout: Layout,
    validator: Validator,
    locks: ProjectLocks,
}

impl VersionManager {
    pub fn new(layout: Layout, validator: Validator, locks: ProjectLocks) -> Self {
        Self {
            layout,
            validator,
            locks,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// The lock table shared with other mutating components
    pub fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Copy the active container into the version store.
    ///
    /// Returns `None` without touching the disk when no active state exists.
    #[instrument(skip(self), fields(project = %id))]
    pub async fn snapshot(&self, id: &ProjectId) -> Result<Option<VersionId>> {
        let _guard = self.locks.try_acquire(id)?;
        self.snapshot_locked(id, SnapshotReason::Commit).await
    }

    /// Validate `candidate` (auto-fixing if needed), snapshot the current
    /// state, then atomically make the candidate active.
    ///
    /// A candidate that does not validate leaves both the active state and
    /// the version store untouched.
    #[instrument(skip(self, candidate), fields(project = %id, len = candidate.len()))]
    pub async fn commit(&self, id: &ProjectId, candidate: &str) -> Result<CommitOutcome> {
        let guard = self.locks.try_acquire(id)?;
        self.commit_locked(&guard, id, candidate).await
    }

    /// [`commit`](Self::commit), then cache `source_text` next to the
    /// container while still holding the lock.
    ///
    /// The cache write cannot fail the call: the commit has already happened.
    #[instrument(skip(self, candidate, source_text), fields(project = %id))]
    pub async fn commit_with_source(
        &self,
        id: &ProjectId,
        candidate: &str,
        source_text: &str,
    ) -> Result<CommitOutcome> {
        let guard = self.locks.try_acquire(id)?;
        let outcome = self.commit_locked(&guard, id, candidate).await?;
        self.cache_source_text(&guard, id, source_text).await;
        Ok(outcome)
    }

    /// Repair the active container in place.
    ///
    /// Returns `None` when it already validates as stored. A repaired
    /// document goes through the normal commit path, so the broken state is
    /// snapshotted before it is replaced.
    #[instrument(skip(self), fields(project = %id))]
    pub async fn repair_active(&self, id: &ProjectId) -> Result<Option<CommitOutcome>> {
        let guard = self.locks.try_acquire(id)?;

        let Some(active) = self.active(id).await? else {
            return Err(BundleError::Validation {
                errors: vec!["project has no single-file container".to_string()],
            });
        };

        let validation = self.validator.validate(&active);
        if !validation.valid {
            warn!(errors = ?validation.errors, "Active container cannot be repaired");
            return Err(BundleError::Validation {
                errors: validation.errors,
            });
        }
        let Some(fixed) = validation.fixed_document.as_deref() else {
            debug!("Active container already valid");
            return Ok(None);
        };

        let outcome = self.commit_locked(&guard, id, fixed).await?;
        info!(repairs = ?validation.repairs, "Repaired active container");
        Ok(Some(outcome))
    }

    async fn cache_source_text(&self, _guard: &ProjectGuard, id: &ProjectId, source_text: &str) {
        let path = self.layout.source_path(id);
        match write_atomic(&path, source_text.as_bytes().to_vec()).await {
            Ok(()) => debug!(path = %path.display(), "Cached source text"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not cache source text"),
        }
    }

    async fn commit_locked(
        &self,
        _guard: &ProjectGuard,
        id: &ProjectId,
        candidate: &str,
    ) -> Result<CommitOutcome> {
        let validation = self.validator.validate(candidate);
        let Some(document) = validation.accepted(candidate) else {
            warn!(errors = ?validation.errors, "Rejected invalid candidate");
            return Err(BundleError::Validation {
                errors: validation.errors.clone(),
            });
        };
        if validation.was_auto_fixed {
            info!(repairs = ?validation.repairs, "Candidate was auto-fixed");
        }

        let snapshot = self.snapshot_locked(id, SnapshotReason::Commit).await?;

        fs::create_dir_all(self.layout.project_dir(id)).await?;
        let path = self.layout.container_path(id);
        let bytes = document.as_bytes().to_vec();
        let sha256 = sha256_hex(&bytes);
        write_atomic(&path, bytes).await?;

        info!(
            snapshot = ?snapshot.map(|v| v.number()),
            sha256 = %sha256,
            "Committed container"
        );

        Ok(CommitOutcome {
            snapshot,
            validation,
            sha256,
        })
    }

    async fn snapshot_locked(
        &self,
        id: &ProjectId,
        reason: SnapshotReason,
    ) -> Result<Option<VersionId>> {
        let active = self.layout.container_path(id);
        let content = match fs::read(&active).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No active state, snapshot is a no-op");
                return Ok(None);
            }
            Err(e) => return Err(snapshot_error(id, e)),
        };

        let versions_dir = self.layout.versions_dir(id);
        fs::create_dir_all(&versions_dir)
            .await
            .map_err(|e| snapshot_error(id, e))?;

        let version = match self
            .existing_versions(id)
            .await
            .map_err(|e| snapshot_error(id, e))?
            .last()
        {
            Some(last) => last.next().ok_or_else(|| {
                snapshot_error(id, std::io::Error::other("version sequence exhausted"))
            })?,
            None => VersionId::FIRST,
        };

        let info = VersionInfo {
            version,
            created_at: Utc::now(),
            sha256: sha256_hex(&content),
            size_bytes: content.len() as u64,
            reason,
            title: std::str::from_utf8(&content).ok().and_then(extract_title),
        };

        write_new(&self.layout.snapshot_path(id, version), content)
            .await
            .map_err(|e| snapshot_error(id, e))?;

        let sidecar = serde_json::to_vec_pretty(&info)
            .map_err(|e| snapshot_error(id, std::io::Error::other(e)))?;
        write_new(&self.layout.version_info_path(id, version), sidecar)
            .await
            .map_err(|e| snapshot_error(id, e))?;

        info!(version = version.number(), reason = ?reason, "Snapshot taken");
        Ok(Some(version))
    }

    /// Snapshot numbers present on disk, ascending
    async fn existing_versions(&self, id: &ProjectId) -> std::io::Result<Vec<VersionId>> {
        let dir = self.layout.versions_dir(id);
        let mut versions = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if let Some(version) = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_snapshot_name(id, name))
            {
                versions.push(version);
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Version history, ascending by sequence number
    pub async fn list_versions(&self, id: &ProjectId) -> Result<Vec<VersionInfo>> {
        let mut infos = Vec::new();

        for version in self.existing_versions(id).await? {
            let sidecar = self.layout.version_info_path(id, version);
            let info = match fs::read(&sidecar).await {
                Ok(raw) => match serde_json::from_slice::<VersionInfo>(&raw) {
                    Ok(info) => info,
                    Err(e) => {
                        warn!(version = version.number(), error = %e, "Unreadable version sidecar");
                        self.describe_snapshot(id, version).await?
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.describe_snapshot(id, version).await?
                }
                Err(e) => return Err(e.into()),
            };
            infos.push(info);
        }

        Ok(infos)
    }

    /// Rebuild a `VersionInfo` from the snapshot file alone
    async fn describe_snapshot(&self, id: &ProjectId, version: VersionId) -> Result<VersionInfo> {
        let path = self.layout.snapshot_path(id, version);
        let content = fs::read(&path).await?;
        let created_at = modified_time(&path).await.unwrap_or_else(Utc::now);

        Ok(VersionInfo {
            version,
            created_at,
            sha256: sha256_hex(&content),
            size_bytes: content.len() as u64,
            reason: SnapshotReason::Commit,
            title: std::str::from_utf8(&content).ok().and_then(extract_title),
        })
    }

    /// Content of one snapshot
    pub async fn read_version(&self, id: &ProjectId, version: VersionId) -> Result<String> {
        match fs::read_to_string(self.layout.snapshot_path(id, version)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BundleError::VersionNotFound {
                project: id.to_string(),
                version,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The active container, if the project has one
    pub async fn active(&self, id: &ProjectId) -> Result<Option<String>> {
        match fs::read_to_string(self.layout.container_path(id)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Make `version` the active state again.
    ///
    /// The target must still validate as stored (no auto-fix), and the state
    /// it replaces is snapshotted first so the restore can itself be undone.
    /// The cached source text is rewritten from the restored `<desc>`.
    #[instrument(skip(self), fields(project = %id, version = %version))]
    pub async fn restore(&self, id: &ProjectId, version: VersionId) -> Result<RestoreOutcome> {
        let guard = self.locks.try_acquire(id)?;

        let content = self.read_version(id, version).await?;
        let check = self.validator.check(&content);
        if !check.valid {
            warn!(errors = ?check.errors, "Refusing to restore invalid version");
            return Err(BundleError::Restore {
                project: id.to_string(),
                version,
                errors: check.errors,
            });
        }

        let snapshot = self
            .snapshot_locked(id, SnapshotReason::Restore { target: version })
            .await?;

        let description = extract_description(&content);
        write_atomic(&self.layout.container_path(id), content.into_bytes()).await?;
        if let Some(text) = description {
            self.cache_source_text(&guard, id, &text).await;
        }

        info!(snapshot = ?snapshot.map(|v| v.number()), "Restored version");
        Ok(RestoreOutcome {
            restored: version,
            snapshot,
        })
    }
}

fn snapshot_error(id: &ProjectId, source: std::io::Error) -> BundleError {
    BundleError::Snapshot {
        project: id.to_string(),
        source,
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

async fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
