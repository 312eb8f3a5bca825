//! Domain types for ytbundle.
//!
//! This module contains the core data structures:
//! - Project: identity, storage kind and structured metadata
//! - Media: the fixed set of media kinds a container can carry
//! - Version: snapshot identifiers and their recorded metadata

pub mod media;
pub mod project;
pub mod version;

// Re-export commonly used types
pub use media::{MediaKind, MediaManifestEntry, MediaSource};
pub use project::{ProjectId, ProjectKind, ProjectMetadata};
pub use version::{SnapshotReason, VersionId, VersionInfo};
