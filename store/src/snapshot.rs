//! Store snapshots: the full issue set and vote trail at a point in time.
//!
//! Written with bincode so a node can restart without losing reports.

use crate::StoreError;
use civic_types::{Issue, Timestamp, VoteRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub taken_at: Timestamp,
    pub issues: Vec<Issue>,
    pub votes: Vec<VoteRecord>,
}

impl StoreSnapshot {
    pub fn new(taken_at: Timestamp, issues: Vec<Issue>, votes: Vec<VoteRecord>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            taken_at,
            issues,
            votes,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let snapshot: Self =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Write the snapshot next to `path` and rename it into place, so a crash
    /// mid-write leaves the previous snapshot intact.
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = self.to_bytes()?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!(
            path = %path.display(),
            issues = self.issues.len(),
            votes = self.votes.len(),
            "snapshot written"
        );
        Ok(())
    }

    /// Read a snapshot, or `None` if the file does not exist yet.
    pub fn read_from(path: &Path) -> Result<Option<Self>, StoreError> {
        match std::fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
