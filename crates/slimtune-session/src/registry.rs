//! Cached view of a session's snapshots.
//!
//! The registry mirrors the store's snapshot list for one session and owns
//! the user's snapshot selection. Invariants kept across every refresh:
//!
//! - the live snapshot (id 0) is present exactly once, at index 0
//! - persisted snapshots follow, newest first; equal timestamps keep the
//!   store's order
//! - the active snapshot survives a refresh if its id is still listed,
//!   otherwise selection falls back to the live snapshot
//!
//! Store failures leave the cache untouched.

use chrono::Utc;
use tracing::{debug, info};

use slimtune_core::{SessionError, SessionResult, Snapshot, SnapshotId};

use crate::store::SnapshotStore;

/// What to do with the live data before clearing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Commit a named snapshot of the live data first; clear only if that succeeds.
    SnapshotThenClear,
    /// Discard the live data.
    ClearOnly,
}

/// Orders a raw store listing: live first, then newest first.
///
/// A missing live row is synthesized; duplicate live rows are dropped.
pub fn order_snapshots(mut snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    // Stable sort: ties keep the store's natural order.
    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let live = snapshots
        .iter()
        .find(|s| s.is_live())
        .cloned()
        .unwrap_or_else(|| Snapshot::live(Utc::now()));

    std::iter::once(live)
        .chain(snapshots.into_iter().filter(|s| !s.is_live()))
        .collect()
}

/// In-memory snapshot list and selection for one session.
#[derive(Debug, Clone)]
pub struct SnapshotRegistry {
    snapshots: Vec<Snapshot>,
    active: SnapshotId,
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotRegistry {
    /// Creates a registry holding only a placeholder live snapshot.
    pub fn new() -> Self {
        Self {
            snapshots: vec![Snapshot::live(Utc::now())],
            active: SnapshotId::LIVE,
        }
    }

    /// Re-reads the store, keeping the current selection when possible.
    ///
    /// Returns the active snapshot id after the refresh.
    ///
    /// # Errors
    ///
    /// `SessionError::StoreUnavailable` if the store cannot be listed; the
    /// cached list and selection are left as they were.
    pub fn refresh(&mut self, store: &dyn SnapshotStore) -> SessionResult<SnapshotId> {
        let listed = store.list_snapshots()?;
        let ordered = order_snapshots(listed);

        let previous = self.active;
        let active = if ordered.iter().any(|s| s.id == previous) {
            previous
        } else {
            SnapshotId::LIVE
        };

        if active != previous {
            debug!(
                previous = %previous,
                "Active snapshot no longer listed, selecting live snapshot"
            );
        }

        self.snapshots = ordered;
        self.active = active;
        debug!(count = self.snapshots.len(), active = %active, "Snapshot list refreshed");
        Ok(active)
    }

    /// Snapshots in display order.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    pub fn active_id(&self) -> SnapshotId {
        self.active
    }

    pub fn active(&self) -> Option<&Snapshot> {
        self.get(self.active)
    }

    /// Position of the active snapshot in display order.
    pub fn active_index(&self) -> usize {
        self.snapshots
            .iter()
            .position(|s| s.id == self.active)
            .unwrap_or(0)
    }

    /// Makes `id` the active snapshot.
    ///
    /// # Errors
    ///
    /// `SessionError::SnapshotNotFound` if `id` is not listed.
    pub fn select(&mut self, id: SnapshotId) -> SessionResult<&Snapshot> {
        let index = self
            .snapshots
            .iter()
            .position(|s| s.id == id)
            .ok_or(SessionError::SnapshotNotFound(id))?;
        self.active = id;
        self.snapshots
            .get(index)
            .ok_or(SessionError::SnapshotNotFound(id))
    }

    // ========================================================================
    // Store Mutations
    // ========================================================================
    //
    // Each mutation is one store transaction. None of them refresh the
    // cache; callers follow up with `refresh`.

    /// Materializes the live data as a new persisted snapshot.
    pub fn take(&self, store: &dyn SnapshotStore, name: &str) -> SessionResult<Snapshot> {
        let snapshot = store.create_snapshot(name)?;
        info!(snapshot_id = %snapshot.id, name, "Snapshot taken");
        Ok(snapshot)
    }

    /// Renames a persisted snapshot.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidOperation` for the live snapshot or an empty
    /// name; the store is not touched in that case.
    pub fn rename(
        &self,
        store: &dyn SnapshotStore,
        id: SnapshotId,
        name: &str,
    ) -> SessionResult<()> {
        if id.is_live() {
            return Err(SessionError::invalid("the live snapshot cannot be renamed"));
        }
        if name.trim().is_empty() {
            return Err(SessionError::invalid("snapshot name cannot be empty"));
        }
        store.rename_snapshot(id, name)?;
        info!(snapshot_id = %id, name, "Snapshot renamed");
        Ok(())
    }

    /// Deletes a persisted snapshot and its data rows.
    ///
    /// Returns the deleted id: any visualizer bound to it is now dangling
    /// and must be closed by the caller.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidOperation` for the live snapshot (use `clear`);
    /// the store is not touched in that case.
    pub fn delete(&self, store: &dyn SnapshotStore, id: SnapshotId) -> SessionResult<SnapshotId> {
        if id.is_live() {
            return Err(SessionError::invalid(
                "the live snapshot cannot be deleted; clear it instead",
            ));
        }
        store.delete_snapshot(id)?;
        info!(snapshot_id = %id, "Snapshot deleted");
        Ok(id)
    }

    /// Erases the live data in place.
    ///
    /// With `SnapshotThenClear` the named snapshot is committed before the
    /// clear, in the same transaction, and returned.
    pub fn clear(
        &self,
        store: &dyn SnapshotStore,
        policy: ClearPolicy,
        snapshot_name: &str,
    ) -> SessionResult<Option<Snapshot>> {
        let saved = match policy {
            ClearPolicy::SnapshotThenClear => Some(store.snapshot_then_clear(snapshot_name)?),
            ClearPolicy::ClearOnly => {
                store.clear_live_data()?;
                None
            }
        };
        info!(
            ?policy,
            saved = ?saved.as_ref().map(|s| s.id),
            "Live data cleared"
        );
        Ok(saved)
    }
}
