//! Per-project mutation locks.
//!
//! Mutations never queue: a second writer for a project that already has one
//! in flight gets [`BundleError::Conflict`] straight away.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::domain::ProjectId;
use crate::error::{BundleError, Result};

/// Shared table of projects with a mutation in flight
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ProjectLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the lock for `id` or fail with a conflict
    pub fn try_acquire(&self, id: &ProjectId) -> Result<ProjectGuard> {
        if !self.table().insert(id.to_string()) {
            debug!(project = %id, "Rejected concurrent mutation");
            return Err(BundleError::Conflict(id.to_string()));
        }

        Ok(ProjectGuard {
            held: Arc::clone(&self.held),
            id: id.to_string(),
        })
    }

    pub fn is_held(&self, id: &ProjectId) -> bool {
        self.table().contains(id.as_str())
    }
}

/// Releases the project lock on drop
#[derive(Debug)]
pub struct ProjectGuard {
    held: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl ProjectGuard {
    pub fn project(&self) -> &str {
        &self.id
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}
