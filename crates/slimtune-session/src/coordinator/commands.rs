//! Session actor commands, replies, and events.
//!
//! - `SessionCommand`: requests sent to the `SessionActor`
//! - `SessionEvent`: notifications published to presentation adapters
//! - reply types (`Outcome`, `SessionStatus`, `SnapshotListView`)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use slimtune_core::{
    Capabilities, ConnectionInfo, SessionResult, SessionState, Snapshot, SnapshotId,
};

use crate::registry::ClearPolicy;
use crate::visualizer::{VisualizerId, VisualizerKindInfo, VisualizerSummary};

// ============================================================================
// Session Commands
// ============================================================================

/// Commands sent to the session actor.
///
/// Every command carries a oneshot channel for its reply. Commands that may
/// ask the user something answer `Outcome::Cancelled` when the user backs
/// out.
#[derive(Debug)]
pub enum SessionCommand {
    /// Materialize the live data as a named snapshot.
    ///
    /// # Errors
    /// - `SessionError::InvalidOperation` unless the session is live
    TakeSnapshot {
        /// Snapshot name; the configured default when `None`
        name: Option<String>,
        respond_to: oneshot::Sender<SessionResult<Snapshot>>,
    },

    /// Change the active snapshot.
    SelectSnapshot {
        id: SnapshotId,
        respond_to: oneshot::Sender<SessionResult<Snapshot>>,
    },

    /// Rename a persisted snapshot.
    ///
    /// With `name: None` the prompter is asked for the new name.
    RenameSnapshot {
        id: SnapshotId,
        name: Option<String>,
        respond_to: oneshot::Sender<SessionResult<Outcome>>,
    },

    /// Delete a persisted snapshot after confirmation, closing every
    /// visualizer bound to it.
    DeleteSnapshot {
        id: SnapshotId,
        respond_to: oneshot::Sender<SessionResult<Outcome>>,
    },

    /// Erase the live data.
    ///
    /// With `policy: None` the prompter chooses: Yes snapshots first, No
    /// clears only, Cancel does nothing.
    ClearLiveData {
        policy: Option<ClearPolicy>,
        respond_to: oneshot::Sender<SessionResult<Outcome>>,
    },

    /// Current snapshot list and selection, without touching the store.
    ListSnapshots {
        respond_to: oneshot::Sender<SnapshotListView>,
    },

    /// Re-read the store and republish the list.
    Refresh {
        respond_to: oneshot::Sender<SessionResult<SnapshotListView>>,
    },

    /// Open a visualizer of `kind`.
    OpenVisualizer {
        kind: String,
        /// Snapshot to bind; the active snapshot when `None`
        snapshot: Option<SnapshotId>,
        respond_to: oneshot::Sender<SessionResult<VisualizerId>>,
    },

    CloseVisualizer {
        id: VisualizerId,
        respond_to: oneshot::Sender<SessionResult<()>>,
    },

    /// Close the selected visualizer, replying with its id if there was one.
    CloseActiveVisualizer {
        respond_to: oneshot::Sender<Option<VisualizerId>>,
    },

    SelectVisualizer {
        id: VisualizerId,
        respond_to: oneshot::Sender<SessionResult<()>>,
    },

    ListVisualizers {
        respond_to: oneshot::Sender<Vec<VisualizerSummary>>,
    },

    /// Visualizer kinds that can be opened.
    VisualizerKinds {
        respond_to: oneshot::Sender<Vec<VisualizerKindInfo>>,
    },

    /// Forward a control to the target. Replies whether it was forwarded.
    TargetControl {
        action: TargetAction,
        respond_to: oneshot::Sender<bool>,
    },

    /// Re-establish a dropped link.
    ///
    /// # Errors
    /// - `SessionError::InvalidOperation` unless the session is disconnected
    /// - `SessionError::ReconnectFailed` on failure or timeout; state unchanged
    Reconnect {
        respond_to: oneshot::Sender<SessionResult<()>>,
    },

    /// Save results to `path` once.
    SaveTo {
        path: PathBuf,
        respond_to: oneshot::Sender<SessionResult<()>>,
    },

    /// Ask for a destination and save, asking again after each failure.
    SaveResults {
        respond_to: oneshot::Sender<SessionResult<Outcome>>,
    },

    Status {
        respond_to: oneshot::Sender<SessionStatus>,
    },

    /// Close the session. On `Outcome::Completed` the actor has stopped.
    Close {
        reason: CloseReason,
        respond_to: oneshot::Sender<SessionResult<Outcome>>,
    },
}

/// Target controls available while live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAction {
    Suspend,
    Resume,
    PauseSampling,
    ResumeSampling,
}

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The user closed this session.
    User,
    /// The application is shutting down.
    Shutdown,
}

/// Result of an operation the user may back out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Snapshot list in display order plus the active selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotListView {
    pub snapshots: Vec<Snapshot>,
    pub active: SnapshotId,
}

impl SnapshotListView {
    pub fn active_snapshot(&self) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == self.active)
    }

    pub fn ids(&self) -> Vec<SnapshotId> {
        self.snapshots.iter().map(|s| s.id).collect()
    }
}

/// Everything a status bar needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub status_label: String,
    pub info: ConnectionInfo,
    pub capabilities: Capabilities,
    pub snapshot_count: usize,
    pub active_snapshot: SnapshotId,
    pub visualizer_count: usize,
    pub active_visualizer: Option<VisualizerId>,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published by the session to presentation adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The snapshot list or selection changed.
    SnapshotsRefreshed {
        snapshots: Vec<Snapshot>,
        active: SnapshotId,
    },

    StateChanged {
        state: SessionState,
    },

    VisualizerOpened {
        id: VisualizerId,
        kind: String,
        snapshot: Snapshot,
    },

    VisualizerClosed {
        id: VisualizerId,
    },

    ActiveVisualizerChanged {
        id: Option<VisualizerId>,
    },

    /// The session was torn down. No further events follow.
    Closed,
}
