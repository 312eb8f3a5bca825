//! Error taxonomy shared by every component.
//!
//! Each variant maps to a stable [`ErrorKind`] so callers across a transport
//! boundary can branch on the kind, while [`BundleError::public_message`]
//! gives them text that never leaks internal paths.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{MediaKind, VersionId};

/// Errors raised while assembling a container
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("required {kind} payload is missing")]
    MissingMedia { kind: MediaKind },

    #[error("embedding {asset} brings the container to {size} bytes, over the {limit} byte ceiling")]
    Oversized { asset: String, size: u64, limit: u64 },

    #[error("{asset} could not be read: {reason}")]
    Unreadable { asset: String, reason: String },

    #[error("{asset} links to {path:?}, which is not a relative path inside the project")]
    InvalidLink { asset: String, path: String },

    #[error("{asset} has MIME type {mime}, which is not valid for {kind}")]
    MimeMismatch {
        asset: String,
        mime: String,
        kind: MediaKind,
    },

    #[error("metadata could not be encoded: {0}")]
    Encoding(String),
}

/// Top-level error type
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Container is malformed and could not be repaired: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("Snapshot failed for project {project}: {source}")]
    Snapshot {
        project: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Version {version} not found for project {project}")]
    VersionNotFound { project: String, version: VersionId },

    #[error("{0}")]
    InvalidVersion(String),

    #[error("Version {version} of project {project} no longer validates: {}", .errors.join("; "))]
    Restore {
        project: String,
        version: VersionId,
        errors: Vec<String>,
    },

    #[error("Project identifier {0:?} resolves outside the registry root")]
    PathTraversal(String),

    #[error("Project {0} already has a mutation in flight")]
    Conflict(String),

    #[error("{kind} payload is present but could not be decoded: {reason}")]
    MediaProbe { kind: MediaKind, reason: String },

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Invalid project identifier {id:?}: {reason}")]
    InvalidProjectId { id: String, reason: &'static str },

    #[error("Metadata block is unreadable: {0}")]
    Metadata(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable, machine-readable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BuildError,
    ValidationError,
    SnapshotError,
    VersionNotFound,
    InvalidVersion,
    RestoreError,
    PathTraversal,
    Conflict,
    MediaProbeError,
    ProjectNotFound,
    InvalidProjectId,
    MetadataError,
    ConfigError,
    IoError,
}

impl BundleError {
    /// Stable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BundleError::Build(_) => ErrorKind::BuildError,
            BundleError::Validation { .. } => ErrorKind::ValidationError,
            BundleError::Snapshot { .. } => ErrorKind::SnapshotError,
            BundleError::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            BundleError::InvalidVersion(_) => ErrorKind::InvalidVersion,
            BundleError::Restore { .. } => ErrorKind::RestoreError,
            BundleError::PathTraversal(_) => ErrorKind::PathTraversal,
            BundleError::Conflict(_) => ErrorKind::Conflict,
            BundleError::MediaProbe { .. } => ErrorKind::MediaProbeError,
            BundleError::ProjectNotFound(_) => ErrorKind::ProjectNotFound,
            BundleError::InvalidProjectId { .. } => ErrorKind::InvalidProjectId,
            BundleError::Metadata(_) => ErrorKind::MetadataError,
            BundleError::Config(_) => ErrorKind::ConfigError,
            BundleError::Io(_) => ErrorKind::IoError,
        }
    }

    /// Message safe to show across the external interface.
    ///
    /// OS-level errors carry paths, so they are reduced to a generic line.
    pub fn public_message(&self) -> String {
        match self {
            BundleError::Snapshot { project, .. } => {
                format!("Snapshot failed for project {}: storage error", project)
            }
            BundleError::Io(_) => "Storage operation failed".to_string(),
            BundleError::Config(_) => "Service is misconfigured".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate
pub type Result<T, E = BundleError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_stable() {
        let err = BundleError::Conflict("demo".to_string());
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(serde_json::to_string(&err.kind()).unwrap(), "\"conflict\"");

        let err = BundleError::from(BuildError::MissingMedia {
            kind: MediaKind::Audio,
        });
        assert_eq!(err.kind(), ErrorKind::BuildError);
        assert!(err.to_string().contains("audio"));
    }

    #[test]
    fn test_public_message_hides_paths() {
        let io = std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/secret/root/projects/demo/demo.svg: permission denied",
        );
        let err = BundleError::Snapshot {
            project: "demo".to_string(),
            source: io,
        };
        let message = err.public_message();
        assert!(message.contains("demo"));
        assert!(!message.contains("/secret"));

        let err = BundleError::Io(std::io::Error::new(std::io::ErrorKind::Other, "/tmp/x"));
        assert!(!err.public_message().contains("/tmp"));
    }

    #[test]
    fn test_oversized_error_names_asset() {
        let err = BuildError::Oversized {
            asset: "video (demo.mp4)".to_string(),
            size: 300,
            limit: 100,
        };
        let text = err.to_string();
        assert!(text.contains("demo.mp4"));
        assert!(text.contains("100"));
    }
}
