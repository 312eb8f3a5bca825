//! Project Registry.
//!
//! Reconciles legacy multi-file projects and single-file containers into one
//! view, and composes the Version Manager, Validator and Media Checker for
//! registry-level queries.

mod frontmatter;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub use frontmatter::split_frontmatter;

use crate::config::ResolvedConfig;
use crate::container::extract::{extract_description, extract_media_sources, extract_metadata};
use crate::domain::{MediaKind, ProjectId, ProjectKind, ProjectMetadata, VersionId};
use crate::error::{BundleError, Result};
use crate::media::{legacy_media_files, MediaChecker, MediaReport};
use crate::store::{Layout, ProjectLocks, VersionManager};
use crate::validate::{ValidationResult, Validator};

/// Caller-supplied last resort in the metadata fallback chain
pub trait MetadataCache: Send + Sync {
    fn lookup(&self, id: &ProjectId) -> Option<ProjectMetadata>;
}

impl MetadataCache for HashMap<String, ProjectMetadata> {
    fn lookup(&self, id: &ProjectId) -> Option<ProjectMetadata> {
        self.get(id.as_str()).cloned()
    }
}

/// Which link of the fallback chain answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Container,
    MetadataJson,
    SourceFile,
    Cache,
}

/// Uniform metadata view for any project shape
#[derive(Debug, Clone, Serialize)]
pub struct MetadataView {
    pub project: String,
    pub kind: ProjectKind,
    pub source: MetadataSource,
    pub metadata: ProjectMetadata,

    /// Source text, from the container's `<desc>` or else the cache file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_content: Option<String>,
}

/// What [`Registry::repair`] did to the active container
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub project: String,
    pub repaired: bool,
    /// Snapshot of the broken state, taken only when a repair was written
    pub snapshot: Option<VersionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

/// One row of [`Registry::list_projects`]
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub kind: ProjectKind,
    pub title: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub version_count: usize,
    pub media: Vec<MediaKind>,
}

/// Validation of one stored file
#[derive(Debug, Clone, Serialize)]
pub struct FileValidation {
    /// File name within the project directory
    pub file: String,
    /// `None` for the active container
    pub version: Option<VersionId>,
    pub result: ValidationResult,
}

#[derive(Debug, Clone)]
pub struct Registry {
    layout: Layout,
    versions: VersionManager,
    media: MediaChecker,
}

impl Registry {
    /// Wire up every component from one resolved configuration
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        let layout = Layout::new(&config.root);
        let validator = Validator::new(&config.validator)?;
        let versions = VersionManager::new(layout.clone(), validator, ProjectLocks::new());
        let media = MediaChecker::new(layout.clone(), &config.media);
        Ok(Self::from_parts(versions, media))
    }

    pub fn from_parts(versions: VersionManager, media: MediaChecker) -> Self {
        Self {
            layout: versions.layout().clone(),
            versions,
            media,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    pub fn media(&self) -> &MediaChecker {
        &self.media
    }

    fn locks(&self) -> &ProjectLocks {
        self.versions.locks()
    }

    async fn ensure_exists(&self, id: &ProjectId) -> Result<()> {
        match fs::metadata(self.layout.project_dir(id)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(BundleError::ProjectNotFound(id.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BundleError::ProjectNotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Storage shape of an existing project
    pub async fn kind_of(&self, id: &ProjectId) -> Result<ProjectKind> {
        self.ensure_exists(id).await?;
        if fs::try_exists(self.layout.container_path(id)).await? {
            Ok(ProjectKind::SingleFileContainer)
        } else {
            Ok(ProjectKind::LegacyMultiFile)
        }
    }

    /// Every project under the root, sorted by id.
    ///
    /// A missing `projects/` directory is an empty registry. Entries whose
    /// names are not valid identifiers are skipped.
    #[instrument(skip(self))]
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let dir = self.layout.projects_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "No projects directory");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(id) = ProjectId::parse(&name) else {
                debug!(%name, "Skipping directory with invalid project name");
                continue;
            };

            match self.summarize(&id).await {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(project = %id, error = %e, "Skipping unreadable project"),
            }
        }

        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }

    async fn summarize(&self, id: &ProjectId) -> Result<ProjectSummary> {
        let version_count = self.versions.list_versions(id).await?.len();

        match self.versions.active(id).await? {
            Some(doc) => {
                let meta = extract_metadata(&doc).ok().flatten().unwrap_or_default();
                Ok(ProjectSummary {
                    id: id.to_string(),
                    kind: ProjectKind::SingleFileContainer,
                    title: meta.display_title().map(str::to_string),
                    created_at: meta.created_at,
                    version_count,
                    media: extract_media_sources(&doc).into_keys().collect(),
                })
            }
            None => {
                let meta = self
                    .legacy_metadata(id)
                    .await?
                    .map(|(_, meta, _)| meta)
                    .unwrap_or_default();
                Ok(ProjectSummary {
                    id: id.to_string(),
                    kind: ProjectKind::LegacyMultiFile,
                    title: meta.display_title().map(str::to_string),
                    created_at: meta.created_at,
                    version_count,
                    media: legacy_media_files(&self.layout, id).into_keys().collect(),
                })
            }
        }
    }

    /// Metadata through the ordered fallback chain: container block,
    /// `metadata.json`, source-file frontmatter, then `cache`
    #[instrument(skip(self, cache), fields(project = %id))]
    pub async fn get_metadata(
        &self,
        id: &ProjectId,
        cache: Option<&dyn MetadataCache>,
    ) -> Result<MetadataView> {
        self.ensure_exists(id).await?;

        let container = self.versions.active(id).await?;
        let kind = if container.is_some() {
            ProjectKind::SingleFileContainer
        } else {
            ProjectKind::LegacyMultiFile
        };
        let source_text = self.source_text(id).await?;

        if let Some(doc) = &container {
            match extract_metadata(doc) {
                Ok(Some(metadata)) => {
                    return Ok(MetadataView {
                        project: id.to_string(),
                        kind,
                        source: MetadataSource::Container,
                        metadata,
                        markdown_content: extract_description(doc)
                            .or_else(|| source_text.map(|(_, body)| body)),
                    });
                }
                Ok(None) => debug!("Container has no metadata block"),
                Err(e) => warn!(error = %e, "Container metadata block unreadable, falling back"),
            }
        }

        if let Some((source, metadata, body)) = self.legacy_metadata(id).await? {
            return Ok(MetadataView {
                project: id.to_string(),
                kind,
                source,
                metadata,
                markdown_content: container
                    .as_deref()
                    .and_then(extract_description)
                    .or(body),
            });
        }

        if let Some(metadata) = cache.and_then(|c| c.lookup(id)) {
            return Ok(MetadataView {
                project: id.to_string(),
                kind,
                source: MetadataSource::Cache,
                metadata,
                markdown_content: container
                    .as_deref()
                    .and_then(extract_description)
                    .or_else(|| source_text.map(|(_, body)| body)),
            });
        }

        Err(BundleError::Metadata(format!(
            "no metadata found for project {}",
            id
        )))
    }

    /// `metadata.json`, then source-file frontmatter
    async fn legacy_metadata(
        &self,
        id: &ProjectId,
    ) -> Result<Option<(MetadataSource, ProjectMetadata, Option<String>)>> {
        let source_text = self.source_text(id).await?;
        let body = source_text.as_ref().map(|(_, body)| body.clone());

        match fs::read(self.layout.legacy_metadata_path(id)).await {
            Ok(raw) => match serde_json::from_slice::<serde_json::Value>(&raw) {
                Ok(value) => {
                    return Ok(Some((
                        MetadataSource::MetadataJson,
                        ProjectMetadata::from_loose_value(&value),
                        body,
                    )))
                }
                Err(e) => warn!(error = %e, "metadata.json is not valid JSON"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some((Some(front), body)) = source_text {
            return Ok(Some((
                MetadataSource::SourceFile,
                ProjectMetadata::from_loose_value(&front),
                Some(body),
            )));
        }

        Ok(None)
    }

    /// Frontmatter and body of `<id>.md`, falling back to `description.md`
    async fn source_text(
        &self,
        id: &ProjectId,
    ) -> Result<Option<(Option<serde_json::Value>, String)>> {
        for path in [self.layout.source_path(id), self.layout.description_path(id)] {
            match fs::read_to_string(&path).await {
                Ok(text) => {
                    let (front, body) = split_frontmatter(&text);
                    return Ok(Some((front, body.to_string())));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Validate the active container (read-only, no fixes written)
    #[instrument(skip(self), fields(project = %id))]
    pub async fn validate(&self, id: &ProjectId) -> Result<ValidationResult> {
        self.ensure_exists(id).await?;
        let doc = self.versions.active(id).await?.ok_or_else(|| BundleError::Validation {
            errors: vec!["project has no single-file container".to_string()],
        })?;
        Ok(self.versions.validator().validate(&doc))
    }

    /// Validate the active container and every snapshot
    #[instrument(skip(self), fields(project = %id))]
    pub async fn validate_all(&self, id: &ProjectId) -> Result<Vec<FileValidation>> {
        self.ensure_exists(id).await?;
        let validator = self.versions.validator();
        let mut results = Vec::new();

        if let Some(doc) = self.versions.active(id).await? {
            results.push(FileValidation {
                file: file_name(&self.layout.container_path(id)),
                version: None,
                result: validator.validate(&doc),
            });
        }

        for info in self.versions.list_versions(id).await? {
            let doc = self.versions.read_version(id, info.version).await?;
            results.push(FileValidation {
                file: file_name(&self.layout.snapshot_path(id, info.version)),
                version: Some(info.version),
                result: validator.validate(&doc),
            });
        }

        let invalid = results.iter().filter(|r| !r.result.valid).count();
        info!(files = results.len(), invalid, "Validated project files");
        Ok(results)
    }

    /// Write auto-fix repairs back to the active container.
    ///
    /// Only the active state is touched; snapshots keep their stored bytes.
    #[instrument(skip(self), fields(project = %id))]
    pub async fn repair(&self, id: &ProjectId) -> Result<RepairReport> {
        self.ensure_exists(id).await?;
        let report = match self.versions.repair_active(id).await? {
            Some(outcome) => RepairReport {
                project: id.to_string(),
                repaired: true,
                snapshot: outcome.snapshot,
                validation: Some(outcome.validation),
            },
            None => RepairReport {
                project: id.to_string(),
                repaired: false,
                snapshot: None,
                validation: None,
            },
        };
        Ok(report)
    }

    pub async fn check_media(&self, id: &ProjectId) -> Result<MediaReport> {
        self.media.check(id).await
    }

    /// Remove a project and its whole version history. Irreversible; no
    /// snapshot is taken.
    #[instrument(skip(self), fields(project = %id))]
    pub async fn delete_project(&self, id: &ProjectId) -> Result<()> {
        let _guard = self.locks().try_acquire(id)?;

        let dir = self.layout.project_dir(id);
        let meta = match fs::symlink_metadata(&dir).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BundleError::ProjectNotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if meta.file_type().is_symlink() {
            // Its target could lie anywhere
            return Err(BundleError::PathTraversal(id.to_string()));
        }
        if !meta.is_dir() {
            return Err(BundleError::ProjectNotFound(id.to_string()));
        }

        fs::remove_dir_all(&dir).await?;
        info!("Deleted project and its version history");
        Ok(())
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
