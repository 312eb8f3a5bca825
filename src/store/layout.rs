//! On-disk layout of the registry root.
//!
//! ```text
//! <root>/projects/<id>/
//! ├── <id>.svg                  # active container
//! ├── <id>.md                   # cached source text
//! ├── metadata.json             # legacy projects only
//! └── versions/
//!     ├── <id>_v1.svg           # snapshot
//!     └── <id>_v1.json          # VersionInfo sidecar
//! ```
//!
//! Every path is derived from a parsed [`ProjectId`], which cannot contain
//! separators or `..`, so nothing here can point outside the root.

use std::path::{Path, PathBuf};

use crate::container::CONTAINER_EXT;
use crate::domain::{ProjectId, VersionId};

const PROJECTS_DIR: &str = "projects";
const VERSIONS_DIR: &str = "versions";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join(PROJECTS_DIR)
    }

    pub fn project_dir(&self, id: &ProjectId) -> PathBuf {
        self.projects_dir().join(id.as_str())
    }

    pub fn container_path(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id)
            .join(format!("{}.{}", id, CONTAINER_EXT))
    }

    pub fn source_path(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join(format!("{}.md", id))
    }

    pub fn description_path(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join("description.md")
    }

    pub fn legacy_metadata_path(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join("metadata.json")
    }

    pub fn versions_dir(&self, id: &ProjectId) -> PathBuf {
        self.project_dir(id).join(VERSIONS_DIR)
    }

    pub fn snapshot_path(&self, id: &ProjectId, version: VersionId) -> PathBuf {
        self.versions_dir(id)
            .join(format!("{}_v{}.{}", id, version.number(), CONTAINER_EXT))
    }

    pub fn version_info_path(&self, id: &ProjectId, version: VersionId) -> PathBuf {
        self.versions_dir(id)
            .join(format!("{}_v{}.json", id, version.number()))
    }

    /// Path of a sibling file named in a container's relative media link
    pub fn sibling_path(&self, id: &ProjectId, relative: &str) -> PathBuf {
        self.project_dir(id).join(relative)
    }
}

/// Version number encoded in a snapshot file name, if it is one of ours
pub fn parse_snapshot_name(id: &ProjectId, file_name: &str) -> Option<VersionId> {
    let digits = file_name
        .strip_prefix(id.as_str())?
        .strip_prefix("_v")?
        .strip_suffix(CONTAINER_EXT)?
        .strip_suffix('.')?;

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().and_then(VersionId::new)
}
