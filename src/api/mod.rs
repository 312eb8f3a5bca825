//! Transport-agnostic service facade.
//!
//! Every operation takes raw string identifiers, parses them before touching
//! the filesystem, and answers with an [`ApiResponse`] envelope carrying an
//! explicit status plus a stable error kind on failure.

mod envelope;
mod jobs;

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

pub use envelope::{ApiError, ApiResponse, Status};
pub use jobs::{JobId, JobStatus, JobTracker};

use crate::config::ResolvedConfig;
use crate::container::builder::{BuildAssets, ContainerBuilder};
use crate::domain::{ProjectId, ProjectMetadata, VersionId, VersionInfo};
use crate::error::{BundleError, Result};
use crate::media::MediaReport;
use crate::registry::{
    FileValidation, MetadataCache, MetadataView, ProjectSummary, Registry, RepairReport,
};
use crate::store::CommitOutcome;
use crate::validate::ValidationResult;

/// Result of committing a document
#[derive(Debug, Clone, Serialize)]
pub struct CommitReport {
    pub project: String,
    /// Snapshot of the state that was replaced, if there was one
    pub snapshot: Option<VersionId>,
    pub sha256: String,
    pub validation: ValidationResult,
}

impl CommitReport {
    fn new(id: &ProjectId, outcome: CommitOutcome) -> Self {
        Self {
            project: id.to_string(),
            snapshot: outcome.snapshot,
            sha256: outcome.sha256,
            validation: outcome.validation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    #[serde(flatten)]
    pub commit: CommitReport,
    pub embedded_bytes: u64,
    pub metadata: ProjectMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub project: String,
    pub restored: VersionId,
    pub snapshot: Option<VersionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataUpdateReport {
    #[serde(flatten)]
    pub commit: CommitReport,
    pub metadata: ProjectMetadata,
}

#[derive(Clone)]
pub struct Service {
    builder: ContainerBuilder,
    registry: Registry,
    jobs: JobTracker,
    cache: Option<Arc<dyn MetadataCache>>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("builder", &self.builder)
            .field("registry", &self.registry)
            .field("has_cache", &self.cache.is_some())
            .finish()
    }
}

impl Service {
    /// Wire every component from one resolved configuration
    pub fn new(config: &ResolvedConfig) -> Result<Self> {
        Ok(Self::from_parts(
            ContainerBuilder::new(config.build.clone()),
            Registry::new(config)?,
        ))
    }

    pub fn from_parts(builder: ContainerBuilder, registry: Registry) -> Self {
        Self {
            builder,
            registry,
            jobs: JobTracker::new(),
            cache: None,
        }
    }

    /// Last-resort metadata source for projects with none on disk
    pub fn with_metadata_cache(mut self, cache: Arc<dyn MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Build a container and commit it as the project's active state
    pub async fn build(
        &self,
        project_id: &str,
        assets: BuildAssets,
        metadata: ProjectMetadata,
    ) -> ApiResponse<BuildReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.build_project(id, assets, metadata).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("build", result)
    }

    #[instrument(skip(self, assets, metadata), fields(project = %id))]
    async fn build_project(
        &self,
        id: ProjectId,
        assets: BuildAssets,
        metadata: ProjectMetadata,
    ) -> Result<BuildReport> {
        let builder = self.builder.clone();
        let build_id = id.clone();
        let source_text = assets.source_text.clone();
        let built = tokio::task::spawn_blocking(move || builder.build(&build_id, &assets, &metadata))
            .await
            .map_err(std::io::Error::other)??;

        let outcome = self
            .registry
            .versions()
            .commit_with_source(&id, &built.document, &source_text)
            .await?;

        info!(
            embedded_bytes = built.embedded_bytes,
            snapshot = ?outcome.snapshot,
            "Built and committed container"
        );

        Ok(BuildReport {
            commit: CommitReport::new(&id, outcome),
            embedded_bytes: built.embedded_bytes,
            metadata: built.metadata,
        })
    }

    /// Dispatch a build onto a background task and return its token at once.
    ///
    /// The identifier is checked before the job is registered, so a
    /// traversal attempt never produces a job.
    pub fn submit_build(
        &self,
        project_id: &str,
        assets: BuildAssets,
        metadata: ProjectMetadata,
    ) -> ApiResponse<JobId> {
        let id = match ProjectId::parse(project_id) {
            Ok(id) => id,
            Err(e) => return ApiResponse::from_result("submit_build", Err(e)),
        };
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                return ApiResponse::from_result(
                    "submit_build",
                    Err(BundleError::Config("no async runtime to run the build on".to_string())),
                )
            }
        };

        let job = self.jobs.start();
        let service = self.clone();
        handle.spawn(async move {
            let status = match service.build_project(id, assets, metadata).await {
                Ok(report) => JobStatus::Succeeded {
                    report: Box::new(report),
                },
                Err(e) => {
                    warn!(%job, kind = ?e.kind(), error = %e, "Build job failed");
                    JobStatus::Failed {
                        error: ApiError::from(&e),
                    }
                }
            };
            service.jobs.finish(job, status);
        });

        info!(%job, project = project_id, "Submitted build job");
        ApiResponse::success(job)
    }

    /// `None` for a token this service never issued, or whose final status
    /// was already collected
    pub fn job_status(&self, job: JobId) -> Option<JobStatus> {
        self.jobs.status(job)
    }

    /// Validate the active container without writing any repair back
    pub async fn validate(&self, project_id: &str) -> ApiResponse<ValidationResult> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.validate(&id).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("validate", result)
    }

    /// Validate the active container and every snapshot
    pub async fn validate_all(&self, project_id: &str) -> ApiResponse<Vec<FileValidation>> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.validate_all(&id).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("validate_all", result)
    }

    /// Write auto-fix repairs back to the active container, snapshotting the
    /// broken state first
    pub async fn repair(&self, project_id: &str) -> ApiResponse<RepairReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.repair(&id).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("repair", result)
    }

    pub async fn get_metadata(&self, project_id: &str) -> ApiResponse<MetadataView> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.get_metadata(&id, self.cache.as_deref()).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("get_metadata", result)
    }

    /// Merge `update` into the container's metadata block and commit it
    pub async fn update_metadata(
        &self,
        project_id: &str,
        update: ProjectMetadata,
    ) -> ApiResponse<MetadataUpdateReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.update_project_metadata(id, update).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("update_metadata", result)
    }

    #[instrument(skip(self, update), fields(project = %id))]
    async fn update_project_metadata(
        &self,
        id: ProjectId,
        update: ProjectMetadata,
    ) -> Result<MetadataUpdateReport> {
        let versions = self.registry.versions();
        let existing = match versions.active(&id).await? {
            Some(doc) => doc,
            None => {
                self.registry.kind_of(&id).await?;
                return Err(BundleError::Metadata(format!(
                    "project {} has no single-file container to update",
                    id
                )));
            }
        };

        let (document, metadata) = self.builder.rebuild_with_metadata(&existing, &update)?;
        let outcome = versions.commit(&id, &document).await?;

        Ok(MetadataUpdateReport {
            commit: CommitReport::new(&id, outcome),
            metadata,
        })
    }

    pub async fn list_versions(&self, project_id: &str) -> ApiResponse<Vec<VersionInfo>> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.list_project_versions(&id).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("list_versions", result)
    }

    async fn list_project_versions(&self, id: &ProjectId) -> Result<Vec<VersionInfo>> {
        self.registry.kind_of(id).await?;
        self.registry.versions().list_versions(id).await
    }

    pub async fn restore_version(&self, project_id: &str, version: &str) -> ApiResponse<RestoreReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.restore_project(id, version).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("restore_version", result)
    }

    async fn restore_project(&self, id: ProjectId, version: &str) -> Result<RestoreReport> {
        let version: VersionId = version.parse().map_err(BundleError::InvalidVersion)?;
        let outcome = self.registry.versions().restore(&id, version).await?;
        Ok(RestoreReport {
            project: id.to_string(),
            restored: outcome.restored,
            snapshot: outcome.snapshot,
        })
    }

    /// Probe every media kind; the report itself says what is playable
    pub async fn check_media(&self, project_id: &str) -> ApiResponse<MediaReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.check_media(&id).await,
            Err(e) => Err(e),
        };
        ApiResponse::from_result("check_media", result)
    }

    /// [`check_media`](Self::check_media), failing unless playback can start
    pub async fn check_playable(&self, project_id: &str) -> ApiResponse<MediaReport> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => match self.registry.check_media(&id).await {
                Ok(report) => report.ensure_playable().map(|()| report),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        ApiResponse::from_result("check_playable", result)
    }

    pub async fn delete_project(&self, project_id: &str) -> ApiResponse<String> {
        let result = match ProjectId::parse(project_id) {
            Ok(id) => self.registry.delete_project(&id).await.map(|()| id.to_string()),
            Err(e) => Err(e),
        };
        ApiResponse::from_result("delete_project", result)
    }

    pub async fn list_projects(&self) -> ApiResponse<Vec<ProjectSummary>> {
        ApiResponse::from_result("list_projects", self.registry.list_projects().await)
    }
}
