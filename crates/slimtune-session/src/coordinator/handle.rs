//! Client interface for a running session.
//!
//! `SessionHandle` is cheap to clone and can be shared between presentation
//! adapters. The session is torn down when the last handle is dropped.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`
//! - Channel errors are mapped to `SessionError::ChannelClosed`

use std::path::PathBuf;

use tokio::sync::{broadcast, mpsc, oneshot};

use slimtune_core::{SessionError, SessionResult, Snapshot, SnapshotId};

use crate::registry::ClearPolicy;
use crate::visualizer::{VisualizerId, VisualizerKindInfo, VisualizerSummary};

use super::commands::{
    CloseReason, Outcome, SessionCommand, SessionEvent, SessionStatus, SnapshotListView,
    TargetAction,
};

// ============================================================================
// Session Handle
// ============================================================================

/// Handle for interacting with a session actor.
///
/// ```ignore
/// let handle = SessionBuilder::new(connection, store).spawn()?;
/// let mut events = handle.subscribe();
///
/// let snapshot = handle.take_snapshot(None).await?;
/// let id = handle.open_visualizer(SUMMARY_KIND, Some(snapshot.id)).await?;
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<SessionCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command built around a fresh reply channel and awaits the reply.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Takes a snapshot of the live data.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidOperation` unless the session is live
    /// - `SessionError::StoreUnavailable` if the store rejects it
    pub async fn take_snapshot(&self, name: Option<String>) -> SessionResult<Snapshot> {
        self.request(|respond_to| SessionCommand::TakeSnapshot { name, respond_to })
            .await?
    }

    pub async fn select_snapshot(&self, id: SnapshotId) -> SessionResult<Snapshot> {
        self.request(|respond_to| SessionCommand::SelectSnapshot { id, respond_to })
            .await?
    }

    /// Renames a snapshot, prompting for the name when `name` is `None`.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidOperation` for the live snapshot.
    pub async fn rename_snapshot(
        &self,
        id: SnapshotId,
        name: Option<String>,
    ) -> SessionResult<Outcome> {
        self.request(|respond_to| SessionCommand::RenameSnapshot {
            id,
            name,
            respond_to,
        })
        .await?
    }

    /// Deletes a snapshot after confirmation. Visualizers bound to it are
    /// closed.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidOperation` for the live snapshot.
    pub async fn delete_snapshot(&self, id: SnapshotId) -> SessionResult<Outcome> {
        self.request(|respond_to| SessionCommand::DeleteSnapshot { id, respond_to })
            .await?
    }

    /// Clears the live data. `None` lets the prompter choose the policy.
    pub async fn clear_live_data(&self, policy: Option<ClearPolicy>) -> SessionResult<Outcome> {
        self.request(|respond_to| SessionCommand::ClearLiveData { policy, respond_to })
            .await?
    }

    /// Cached snapshot list and selection.
    pub async fn snapshots(&self) -> SessionResult<SnapshotListView> {
        self.request(|respond_to| SessionCommand::ListSnapshots { respond_to })
            .await
    }

    /// Re-reads the store.
    pub async fn refresh(&self) -> SessionResult<SnapshotListView> {
        self.request(|respond_to| SessionCommand::Refresh { respond_to })
            .await?
    }

    // ========================================================================
    // Visualizers
    // ========================================================================

    /// Opens a visualizer bound to `snapshot`, or to the active snapshot.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownVisualizer` if `kind` is not registered
    /// - `SessionError::InitializationRejected` if the visualizer declined
    pub async fn open_visualizer(
        &self,
        kind: impl Into<String>,
        snapshot: Option<SnapshotId>,
    ) -> SessionResult<VisualizerId> {
        let kind = kind.into();
        self.request(|respond_to| SessionCommand::OpenVisualizer {
            kind,
            snapshot,
            respond_to,
        })
        .await?
    }

    pub async fn close_visualizer(&self, id: VisualizerId) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::CloseVisualizer { id, respond_to })
            .await?
    }

    /// Closes the selected visualizer, returning its id.
    pub async fn close_active_visualizer(&self) -> SessionResult<Option<VisualizerId>> {
        self.request(|respond_to| SessionCommand::CloseActiveVisualizer { respond_to })
            .await
    }

    pub async fn select_visualizer(&self, id: VisualizerId) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::SelectVisualizer { id, respond_to })
            .await?
    }

    pub async fn visualizers(&self) -> SessionResult<Vec<VisualizerSummary>> {
        self.request(|respond_to| SessionCommand::ListVisualizers { respond_to })
            .await
    }

    pub async fn visualizer_kinds(&self) -> SessionResult<Vec<VisualizerKindInfo>> {
        self.request(|respond_to| SessionCommand::VisualizerKinds { respond_to })
            .await
    }

    // ========================================================================
    // Target
    // ========================================================================

    /// Returns whether the request reached the target (only while live).
    pub async fn suspend_target(&self) -> SessionResult<bool> {
        self.target_control(TargetAction::Suspend).await
    }

    pub async fn resume_target(&self) -> SessionResult<bool> {
        self.target_control(TargetAction::Resume).await
    }

    pub async fn pause_sampling(&self) -> SessionResult<bool> {
        self.target_control(TargetAction::PauseSampling).await
    }

    pub async fn resume_sampling(&self) -> SessionResult<bool> {
        self.target_control(TargetAction::ResumeSampling).await
    }

    async fn target_control(&self, action: TargetAction) -> SessionResult<bool> {
        self.request(|respond_to| SessionCommand::TargetControl { action, respond_to })
            .await
    }

    /// Re-establishes a dropped link, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidOperation` unless the session is disconnected
    /// - `SessionError::ReconnectFailed` on failure or timeout
    pub async fn reconnect(&self) -> SessionResult<()> {
        self.request(|respond_to| SessionCommand::Reconnect { respond_to })
            .await?
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Saves results to `path`.
    ///
    /// # Errors
    ///
    /// `SessionError::SaveFailed` if the store could not write the file.
    pub async fn save_to(&self, path: impl Into<PathBuf>) -> SessionResult<()> {
        let path = path.into();
        self.request(|respond_to| SessionCommand::SaveTo { path, respond_to })
            .await?
    }

    /// Prompts for a destination and saves, retrying until success or cancel.
    pub async fn save_results(&self) -> SessionResult<Outcome> {
        self.request(|respond_to| SessionCommand::SaveResults { respond_to })
            .await?
    }

    pub async fn status(&self) -> SessionResult<SessionStatus> {
        self.request(|respond_to| SessionCommand::Status { respond_to })
            .await
    }

    /// Closes the session. After `Outcome::Completed` every further call
    /// returns `SessionError::ChannelClosed`.
    pub async fn close(&self, reason: CloseReason) -> SessionResult<Outcome> {
        self.request(|respond_to| SessionCommand::Close { reason, respond_to })
            .await?
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    /// True once the session actor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}
