//! Version Manager and on-disk storage.
//!
//! All writes to active containers and to the version store go through
//! [`VersionManager`], under the per-project [`ProjectLocks`] table.

pub mod atomic;
pub mod layout;
pub mod locks;
pub mod versions;

pub use layout::Layout;
pub use locks::{ProjectGuard, ProjectLocks};
pub use versions::{CommitOutcome, RestoreOutcome, VersionManager};
