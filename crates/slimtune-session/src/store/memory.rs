//! In-memory snapshot store with JSON results files.
//!
//! Keeps per-snapshot row counts rather than raw samples; that is all the
//! session layer needs to reason about cascades and clears.

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use slimtune_core::{Snapshot, SnapshotId};

use super::{SnapshotStore, StoreError, StoreResult};

/// Extension of results files written by [`MemoryStore::save`].
pub const RESULTS_EXTENSION: &str = "json";

const ENGINE_NAME: &str = "memory";

/// Sample and call rows attached to one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRows {
    pub samples: u64,
    pub calls: u64,
}

impl DataRows {
    pub fn new(samples: u64, calls: u64) -> Self {
        Self { samples, calls }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples == 0 && self.calls == 0
    }

    fn absorb(&mut self, other: DataRows) {
        self.samples = self.samples.saturating_add(other.samples);
        self.calls = self.calls.saturating_add(other.calls);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    snapshot: Snapshot,
    rows: DataRows,
}

/// Serialized form of a results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    next_id: i64,
    live_since: DateTime<Utc>,
    live: DataRows,
    snapshots: Vec<StoredSnapshot>,
}

impl StoreData {
    fn empty() -> Self {
        Self {
            next_id: 1,
            live_since: Utc::now(),
            live: DataRows::default(),
            snapshots: Vec::new(),
        }
    }

    fn position(&self, id: SnapshotId) -> StoreResult<usize> {
        if id.is_live() {
            // The live snapshot has no persisted row.
            return Err(StoreError::NotFound(id));
        }
        self.snapshots
            .iter()
            .position(|s| s.snapshot.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    fn materialize(&mut self, name: &str) -> Snapshot {
        let snapshot = Snapshot::new(SnapshotId::new(self.next_id), name, Utc::now());
        self.next_id += 1;
        self.snapshots.push(StoredSnapshot {
            snapshot: snapshot.clone(),
            rows: self.live,
        });
        snapshot
    }

    fn clear_live(&mut self) {
        self.live = DataRows::default();
        self.live_since = Utc::now();
    }
}

/// Thread-safe [`SnapshotStore`] held entirely in memory.
///
/// A store created with [`MemoryStore::new`] is in-memory (unsaved data is
/// lost on close); one loaded with [`MemoryStore::open`] is backed by a file.
#[derive(Debug)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    in_memory: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(StoreData::empty()),
            in_memory: true,
        }
    }

    /// Loads a results file previously written by [`SnapshotStore::save`].
    ///
    /// # Errors
    ///
    /// `StoreError::Io` if the file cannot be read, `StoreError::Format`
    /// if it is not a results file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut data: StoreData = serde_json::from_str(&contents)?;
        // Never hand out an id already present in the file.
        let highest = data
            .snapshots
            .iter()
            .map(|s| s.snapshot.id.get())
            .max()
            .unwrap_or(0);
        data.next_id = data.next_id.max(highest + 1);
        info!(
            path = %path.display(),
            snapshots = data.snapshots.len(),
            "Opened results file"
        );
        Ok(Self {
            data: Mutex::new(data),
            in_memory: false,
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreData>> {
        self.data
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    /// Appends rows to the live data, as the profiler does while sampling.
    pub fn record(&self, rows: DataRows) -> StoreResult<()> {
        self.lock()?.live.absorb(rows);
        Ok(())
    }

    /// Returns true if a snapshot with this id exists (the live one always does).
    pub fn contains(&self, id: SnapshotId) -> StoreResult<bool> {
        let data = self.lock()?;
        Ok(id.is_live() || data.snapshots.iter().any(|s| s.snapshot.id == id))
    }
}

impl SnapshotStore for MemoryStore {
    fn engine(&self) -> &str {
        ENGINE_NAME
    }

    fn extension(&self) -> &str {
        RESULTS_EXTENSION
    }

    fn in_memory(&self) -> bool {
        self.in_memory
    }

    fn list_snapshots(&self) -> StoreResult<Vec<Snapshot>> {
        let data = self.lock()?;
        let mut snapshots: Vec<Snapshot> = std::iter::once(Snapshot::live(data.live_since))
            .chain(data.snapshots.iter().map(|s| s.snapshot.clone()))
            .collect();
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    fn create_snapshot(&self, name: &str) -> StoreResult<Snapshot> {
        let snapshot = self.lock()?.materialize(name);
        debug!(snapshot_id = %snapshot.id, name, "Snapshot created");
        Ok(snapshot)
    }

    fn rename_snapshot(&self, id: SnapshotId, name: &str) -> StoreResult<()> {
        let mut data = self.lock()?;
        let index = data.position(id)?;
        if let Some(stored) = data.snapshots.get_mut(index) {
            stored.snapshot.name = name.to_string();
        }
        Ok(())
    }

    fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        let mut data = self.lock()?;
        let index = data.position(id)?;
        // Rows live on the record, so removing it drops samples and calls together.
        let removed = data.snapshots.remove(index);
        debug!(
            snapshot_id = %id,
            samples = removed.rows.samples,
            calls = removed.rows.calls,
            "Snapshot deleted"
        );
        Ok(())
    }

    fn rows(&self, id: SnapshotId) -> StoreResult<DataRows> {
        let data = self.lock()?;
        if id.is_live() {
            return Ok(data.live);
        }
        let index = data.position(id)?;
        data.snapshots
            .get(index)
            .map(|s| s.rows)
            .ok_or(StoreError::NotFound(id))
    }

    fn clear_live_data(&self) -> StoreResult<()> {
        self.lock()?.clear_live();
        Ok(())
    }

    fn snapshot_then_clear(&self, name: &str) -> StoreResult<Snapshot> {
        let mut data = self.lock()?;
        let snapshot = data.materialize(name);
        data.clear_live();
        Ok(snapshot)
    }

    fn save(&self, path: &Path) -> StoreResult<()> {
        let encoded = {
            let data = self.lock()?;
            serde_json::to_vec_pretty(&*data)?
        };

        // Temp file must live on the destination's filesystem for the rename.
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&encoded)?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;

        info!(path = %path.display(), bytes = encoded.len(), "Results saved");
        Ok(())
    }
}
