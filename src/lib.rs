//! ytbundle - single-file media project containers
//!
//! A project's video, audio, thumbnail, source text and metadata are packed
//! into one self-describing SVG document. The crate builds those containers,
//! validates and repairs them, keeps a version history for every edit, and
//! probes the embedded media.
//!
//! # Architecture
//!
//! Every write to a project goes through one path:
//! - The candidate document is validated, auto-fixing what can be repaired
//! - The current active state is snapshotted into the version store
//! - The accepted document replaces the active state atomically
//!
//! # Modules
//!
//! - `container`: Container Builder, data-URI codec, metadata extraction
//! - `validate`: Validator & Auto-Fixer with strict and heuristic backends
//! - `store`: Version Manager, atomic writes, per-project locks
//! - `media`: Media Integrity Checker
//! - `registry`: Project Registry over legacy and container projects
//! - `api`: Transport-agnostic service facade
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Build a project
//! ytbundle build demo --video demo.mp4 --audio demo.mp3 --title "Demo"
//!
//! # Inspect and roll back
//! ytbundle versions demo
//! ytbundle restore demo v1
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod container;
pub mod domain;
pub mod error;
pub mod media;
pub mod registry;
pub mod store;
pub mod validate;

// Re-export main types at crate root for convenience
pub use api::{ApiError, ApiResponse, JobId, JobStatus, Service};
pub use config::ResolvedConfig;
pub use container::builder::{AssetSource, BuildAssets, ContainerBuilder};
pub use domain::{MediaKind, ProjectId, ProjectKind, ProjectMetadata, VersionId, VersionInfo};
pub use error::{BuildError, BundleError, ErrorKind};
pub use media::{MediaCheckResult, MediaChecker, MediaReport};
pub use registry::{
    MetadataCache, MetadataSource, MetadataView, ProjectSummary, Registry, RepairReport,
};
pub use store::VersionManager;
pub use validate::{ValidationResult, Validator};
