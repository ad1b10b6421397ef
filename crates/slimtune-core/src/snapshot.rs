//! Snapshot identifiers and records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of a snapshot row.
///
/// Id 0 is reserved for the live snapshot (the current, unsaved
/// accumulation of data). Positive ids are named, persisted captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(i64);

impl SnapshotId {
    /// The live snapshot id.
    pub const LIVE: SnapshotId = SnapshotId(0);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns true for the live, uncommitted snapshot.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.0 == 0
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SnapshotId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Name given to the live snapshot when the store does not supply a row for it.
pub const LIVE_SNAPSHOT_NAME: &str = "Current";

// ============================================================================
// Snapshot
// ============================================================================

/// A point-in-time capture of profiling data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(id: SnapshotId, name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            timestamp,
        }
    }

    /// Creates the live snapshot record.
    pub fn live(timestamp: DateTime<Utc>) -> Self {
        Self::new(SnapshotId::LIVE, LIVE_SNAPSHOT_NAME, timestamp)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.id.is_live()
    }
}

impl fmt::Display for Snapshot {
    /// Formats as `(id) name - HH:MM:SS YYYY-MM-DD`, the snapshot list format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}) {} - {} {}",
            self.id,
            self.name,
            self.timestamp.format("%H:%M:%S"),
            self.timestamp.format("%Y-%m-%d")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_live_id() {
        assert!(SnapshotId::LIVE.is_live());
        assert!(!SnapshotId::new(3).is_live());
        assert_eq!(SnapshotId::default(), SnapshotId::LIVE);
    }

    #[test]
    fn test_snapshot_display() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let snap = Snapshot::new(SnapshotId::new(4), "After warmup", ts);
        assert_eq!(snap.to_string(), "(4) After warmup - 14:05:07 2024-03-09");
    }

    #[test]
    fn test_live_snapshot_name() {
        let snap = Snapshot::live(Utc::now());
        assert!(snap.is_live());
        assert_eq!(snap.name, LIVE_SNAPSHOT_NAME);
    }

    #[test]
    fn test_snapshot_id_serializes_transparently() {
        let json = serde_json::to_string(&SnapshotId::new(12)).unwrap();
        assert_eq!(json, "12");
    }
}
