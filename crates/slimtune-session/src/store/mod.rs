//! Snapshot store contract.
//!
//! The store persists snapshots and the sample/call rows that reference
//! them. Every operation is transactional: it either fully applies or
//! leaves the store untouched. The session never assumes anything about
//! the persisted layout beyond "rows keyed by integer id, id 0 reserved".

use std::path::Path;

use slimtune_core::{SessionError, Snapshot, SnapshotId};
use thiserror::Error;

mod memory;

pub use memory::{DataRows, MemoryStore, RESULTS_EXTENSION};

/// Errors raised by store implementations.
///
/// `NotFound` is kept distinct from failures of the store itself.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not complete the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No snapshot with this id exists.
    #[error("snapshot not found: {0}")]
    NotFound(SnapshotId),

    /// Reading or writing a results file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A results file could not be encoded or decoded.
    #[error("invalid results file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SessionError::SnapshotNotFound(id),
            other => SessionError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Persistence for one session's snapshots.
///
/// Implementations must be safe to share between the session actor and
/// visualizers reading from other tasks.
pub trait SnapshotStore: Send + Sync {
    /// Storage engine name, shown in the session caption.
    fn engine(&self) -> &str;

    /// File extension used for saved results (without the dot).
    fn extension(&self) -> &str;

    /// Whether the data lives only in memory and is lost on close.
    fn in_memory(&self) -> bool;

    /// All snapshots, newest first. The live row may be absent.
    fn list_snapshots(&self) -> StoreResult<Vec<Snapshot>>;

    /// Materializes the current live data as a new named snapshot.
    fn create_snapshot(&self, name: &str) -> StoreResult<Snapshot>;

    fn rename_snapshot(&self, id: SnapshotId, name: &str) -> StoreResult<()>;

    /// Removes a snapshot and every row referencing it.
    fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()>;

    /// Sample and call row counts attached to a snapshot, live included.
    fn rows(&self, id: SnapshotId) -> StoreResult<DataRows>;

    /// Erases the live data in place. The live snapshot itself stays.
    fn clear_live_data(&self) -> StoreResult<()>;

    /// Commits a named snapshot of the live data, then clears it, as one
    /// transaction. If the snapshot cannot be committed nothing is cleared.
    fn snapshot_then_clear(&self, name: &str) -> StoreResult<Snapshot>;

    /// Writes the full contents to a results file.
    fn save(&self, path: &Path) -> StoreResult<()>;
}
