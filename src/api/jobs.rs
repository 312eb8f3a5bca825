//! Correlation tokens for builds dispatched off the caller's path

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::ApiError;
use super::BuildReport;

/// Token handed back by a submitted build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded { report: Box<BuildReport> },
    Failed { error: ApiError },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Status table shared between the service and its build tasks
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<Mutex<HashMap<JobId, JobStatus>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new pending job
    pub fn start(&self) -> JobId {
        let id = JobId::new();
        self.table().insert(id, JobStatus::Pending);
        id
    }

    pub fn finish(&self, id: JobId, status: JobStatus) {
        self.table().insert(id, status);
    }

    /// Current status of `id`. A finished status is returned once, then
    /// evicted.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        let mut table = self.table();
        if table.get(&id)?.is_finished() {
            table.remove(&id)
        } else {
            table.get(&id).cloned()
        }
    }

    /// Jobs still held, pending or uncollected
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}
