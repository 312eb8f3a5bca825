//! Version snapshot identifiers and their recorded metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-project snapshot sequence number, starting at 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(u32);

impl VersionId {
    /// The first version a project ever gets
    pub const FIRST: VersionId = VersionId(1);

    /// Wrap a sequence number; zero is not a valid version
    pub fn new(number: u32) -> Option<Self> {
        (number >= 1).then_some(Self(number))
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    /// The version that follows this one; `None` once the sequence is exhausted
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl std::str::FromStr for VersionId {
    type Err = String;

    /// Accepts `3` as well as `v3`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['v', 'V']);
        digits
            .parse::<u32>()
            .ok()
            .and_then(VersionId::new)
            .ok_or_else(|| format!("Invalid version: {}", s))
    }
}

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotReason {
    /// A new container was committed over this state
    Commit,

    /// This state was replaced by restoring an older version
    Restore { target: VersionId },
}

/// Metadata stored alongside each snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: VersionId,

    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the snapshot content (hex)
    pub sha256: String,

    pub size_bytes: u64,

    pub reason: SnapshotReason,

    /// Title found in the snapshot's metadata block, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_id_parsing() {
        assert_eq!("v3".parse::<VersionId>().unwrap().number(), 3);
        assert_eq!("12".parse::<VersionId>().unwrap().number(), 12);
        assert!("v0".parse::<VersionId>().is_err());
        assert!("latest".parse::<VersionId>().is_err());
        assert_eq!(VersionId::FIRST.next().unwrap().to_string(), "v2");
    }

    #[test]
    fn test_version_sequence_ends_at_max() {
        assert!(VersionId(u32::MAX).next().is_none());
        assert_eq!(VersionId(u32::MAX - 1).next(), Some(VersionId(u32::MAX)));
    }

    #[test]
    fn test_snapshot_reason_serialization() {
        let json = serde_json::to_string(&SnapshotReason::Restore {
            target: VersionId::FIRST,
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"restore","target":1}"#);

        let parsed: SnapshotReason = serde_json::from_str(r#"{"kind":"commit"}"#).unwrap();
        assert_eq!(parsed, SnapshotReason::Commit);
    }
}
