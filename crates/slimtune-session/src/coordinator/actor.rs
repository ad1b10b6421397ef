//! Session actor - owns all mutable state of one session.
//!
//! The actor is the session's single serialized context. User commands
//! arrive over an mpsc channel; connection notifications arrive over the
//! connection's [`Subscription`] and are `select!`-ed into the same loop, so
//! nothing raised from the connection's I/O context touches the registry or
//! the visualizer set directly.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` or `unreachable!()`
//! - Reply send failures are ignored: the caller stopped waiting
//! - Event publish failures are ignored: nobody is listening

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use slimtune_core::{SessionError, SessionResult, SessionState, Snapshot, SnapshotId};

use crate::config::SessionConfig;
use crate::connection::{ConnectionEvent, ConnectionHandle, Connector, Subscription};
use crate::prompt::{Confirmation, Prompter};
use crate::registry::{ClearPolicy, SnapshotRegistry};
use crate::store::SnapshotStore;
use crate::visualizer::{VisualizerContext, VisualizerId, VisualizerSession};

use super::commands::{
    CloseReason, Outcome, SessionCommand, SessionEvent, SessionStatus, SnapshotListView,
    TargetAction,
};

const CLOSE_TITLE: &str = "Close Connection";
const CLOSE_MESSAGE: &str = "Close this connection?";
const CLEAR_TITLE: &str = "Clear Data";
const CLEAR_MESSAGE: &str = "Would you like to save a snapshot of the current data before clearing it?";

// ============================================================================
// Session Actor
// ============================================================================

/// Coordinator for one profiling session.
///
/// Owns the connection, the snapshot registry cache, the open visualizers
/// and the lifecycle state. Runs on its own task; see [`super::SessionBuilder`].
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionCommand>,
    event_publisher: broadcast::Sender<SessionEvent>,

    connection: Arc<dyn ConnectionHandle>,
    store: Arc<dyn SnapshotStore>,
    connector: Option<Arc<dyn Connector>>,
    prompter: Box<dyn Prompter>,
    config: SessionConfig,

    state: SessionState,
    registry: SnapshotRegistry,
    visualizers: VisualizerSession,

    subscription: Subscription,
    /// False once the subscription has ended, so the loop stops polling it.
    listening: bool,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        event_publisher: broadcast::Sender<SessionEvent>,
        connection: Arc<dyn ConnectionHandle>,
        store: Arc<dyn SnapshotStore>,
        connector: Option<Arc<dyn Connector>>,
        prompter: Box<dyn Prompter>,
        visualizers: VisualizerSession,
        config: SessionConfig,
    ) -> Self {
        // Subscribe before the first refresh so no flush is missed.
        let subscription = connection.subscribe();
        Self {
            receiver,
            event_publisher,
            connection,
            store,
            connector,
            prompter,
            config,
            state: SessionState::Opening,
            registry: SnapshotRegistry::new(),
            visualizers,
            subscription,
            listening: true,
        }
    }

    /// Loads the snapshot list and leaves `Opening`.
    ///
    /// # Errors
    ///
    /// `SessionError::StoreUnavailable` if the store cannot be listed; the
    /// session stays `Opening` and should be discarded.
    pub(crate) fn open(&mut self) -> SessionResult<()> {
        self.refresh_and_publish()?;
        let state = SessionState::from_connection(self.connection.state());
        self.set_state(state);
        info!(
            session = %self.connection.info().caption(),
            state = ?self.state,
            snapshots = self.registry.len(),
            "Session opened"
        );
        Ok(())
    }

    /// Runs the actor loop until the session is closed or every handle is
    /// dropped.
    pub async fn run(mut self) {
        debug!(session = %self.connection.info().name, "Session actor starting");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        debug!("All session handles dropped");
                        self.teardown();
                        break;
                    }
                },
                event = self.subscription.recv(), if self.listening => match event {
                    Some(event) => self.handle_connection_event(event),
                    None => {
                        debug!("Connection notifications ended");
                        self.listening = false;
                    }
                },
            }
        }

        debug!(session = %self.connection.info().name, "Session actor stopped");
    }

    /// Dispatches a command to its handler.
    pub(crate) async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::TakeSnapshot { name, respond_to } => {
                let result = self.handle_take_snapshot(name);
                let _ = respond_to.send(result);
            }
            SessionCommand::SelectSnapshot { id, respond_to } => {
                let result = self.handle_select_snapshot(id);
                let _ = respond_to.send(result);
            }
            SessionCommand::RenameSnapshot {
                id,
                name,
                respond_to,
            } => {
                let result = self.handle_rename_snapshot(id, name);
                let _ = respond_to.send(result);
            }
            SessionCommand::DeleteSnapshot { id, respond_to } => {
                let result = self.handle_delete_snapshot(id);
                let _ = respond_to.send(result);
            }
            SessionCommand::ClearLiveData { policy, respond_to } => {
                let result = self.handle_clear_live_data(policy);
                let _ = respond_to.send(result);
            }
            SessionCommand::ListSnapshots { respond_to } => {
                let _ = respond_to.send(self.list_view());
            }
            SessionCommand::Refresh { respond_to } => {
                let result = self.refresh_and_publish().map(|()| self.list_view());
                let _ = respond_to.send(result);
            }
            SessionCommand::OpenVisualizer {
                kind,
                snapshot,
                respond_to,
            } => {
                let result = self.handle_open_visualizer(&kind, snapshot);
                let _ = respond_to.send(result);
            }
            SessionCommand::CloseVisualizer { id, respond_to } => {
                let result = self.handle_close_visualizer(id);
                let _ = respond_to.send(result);
            }
            SessionCommand::CloseActiveVisualizer { respond_to } => {
                let closed = self.handle_close_active_visualizer();
                let _ = respond_to.send(closed);
            }
            SessionCommand::SelectVisualizer { id, respond_to } => {
                let result = self.handle_select_visualizer(id);
                let _ = respond_to.send(result);
            }
            SessionCommand::ListVisualizers { respond_to } => {
                let _ = respond_to.send(self.visualizers.summaries());
            }
            SessionCommand::VisualizerKinds { respond_to } => {
                let _ = respond_to.send(self.visualizers.factory().kinds());
            }
            SessionCommand::TargetControl { action, respond_to } => {
                let forwarded = self.handle_target_control(action);
                let _ = respond_to.send(forwarded);
            }
            SessionCommand::Reconnect { respond_to } => {
                let result = self.handle_reconnect().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::SaveTo { path, respond_to } => {
                let result = self.save_to(&path);
                let _ = respond_to.send(result);
            }
            SessionCommand::SaveResults { respond_to } => {
                let result = self.handle_save_results();
                let _ = respond_to.send(result);
            }
            SessionCommand::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            SessionCommand::Close { reason, respond_to } => {
                let outcome = self.handle_close(reason);
                let _ = respond_to.send(Ok(outcome));
                if outcome.is_completed() {
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }

    // ========================================================================
    // Connection Notifications
    // ========================================================================

    /// Applies a notification marshalled in from the connection.
    pub(crate) fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Disconnected => {
                let next = self.state.on_disconnected();
                if next == self.state {
                    debug!(state = ?self.state, "Ignoring repeated disconnect");
                    return;
                }
                warn!(
                    session = %self.connection.info().name,
                    error = %SessionError::ConnectionLost,
                    "Target disconnected"
                );
                self.set_state(next);
            }
            ConnectionEvent::DataFlushed => {
                if !self.state.is_live() {
                    debug!(state = ?self.state, "Ignoring data flush outside live state");
                    return;
                }
                if let Err(e) = self.refresh_and_publish() {
                    warn!(error = %e, "Refresh after data flush failed");
                }
            }
        }
    }

    // ========================================================================
    // Snapshot Handlers
    // ========================================================================

    fn handle_take_snapshot(&mut self, name: Option<String>) -> SessionResult<Snapshot> {
        if !self.state.is_live() {
            return Err(SessionError::invalid(format!(
                "snapshots can only be taken while the target is running (state: {})",
                self.state
            )));
        }
        let name = name.unwrap_or_else(|| self.config.snapshot_name.clone());
        let snapshot = self.registry.take(self.store.as_ref(), &name)?;
        self.republish();
        Ok(snapshot)
    }

    fn handle_select_snapshot(&mut self, id: SnapshotId) -> SessionResult<Snapshot> {
        let selected = self.registry.select(id)?.clone();
        debug!(snapshot_id = %id, "Active snapshot changed");
        self.publish_list();
        Ok(selected)
    }

    fn handle_rename_snapshot(
        &mut self,
        id: SnapshotId,
        name: Option<String>,
    ) -> SessionResult<Outcome> {
        if id.is_live() {
            return Err(SessionError::invalid("the live snapshot cannot be renamed"));
        }
        let current = self
            .registry
            .get(id)
            .ok_or(SessionError::SnapshotNotFound(id))?
            .clone();

        let name = match name {
            Some(name) => name,
            None => {
                let answer = self.prompter.prompt_text(
                    "Rename Snapshot",
                    "Enter a new name for the snapshot:",
                    &current.name,
                );
                match answer {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => {
                        debug!(snapshot_id = %id, "Rename cancelled");
                        return Ok(Outcome::Cancelled);
                    }
                }
            }
        };

        self.registry.rename(self.store.as_ref(), id, &name)?;
        self.republish();
        Ok(Outcome::Completed)
    }

    fn handle_delete_snapshot(&mut self, id: SnapshotId) -> SessionResult<Outcome> {
        if id.is_live() {
            return Err(SessionError::invalid(
                "the live snapshot cannot be deleted; clear it instead",
            ));
        }
        let snapshot = self
            .registry
            .get(id)
            .ok_or(SessionError::SnapshotNotFound(id))?
            .clone();

        let message = format!(
            "Are you sure you want to delete '{}', saved on {}?",
            snapshot.name,
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        if self.prompter.confirm("Delete Snapshot", &message) != Confirmation::Yes {
            debug!(snapshot_id = %id, "Delete cancelled");
            return Ok(Outcome::Cancelled);
        }

        let deleted = self.registry.delete(self.store.as_ref(), id)?;

        // Cascade: nothing may stay bound to the deleted snapshot.
        let active_before = self.visualizers.active();
        let closed = self.visualizers.close_all_bound_to(deleted);
        for closed_id in closed {
            self.publish(SessionEvent::VisualizerClosed { id: closed_id });
        }
        self.publish_active_visualizer_if_changed(active_before);

        self.republish();
        Ok(Outcome::Completed)
    }

    fn handle_clear_live_data(&mut self, policy: Option<ClearPolicy>) -> SessionResult<Outcome> {
        let policy = match policy {
            Some(policy) => policy,
            None => match self.prompter.confirm(CLEAR_TITLE, CLEAR_MESSAGE) {
                Confirmation::Yes => ClearPolicy::SnapshotThenClear,
                Confirmation::No => ClearPolicy::ClearOnly,
                Confirmation::Cancel => {
                    debug!("Clear cancelled");
                    return Ok(Outcome::Cancelled);
                }
            },
        };

        let name = self.config.cleared_snapshot_name.clone();
        self.registry.clear(self.store.as_ref(), policy, &name)?;
        self.republish();
        Ok(Outcome::Completed)
    }

    // ========================================================================
    // Visualizer Handlers
    // ========================================================================

    fn handle_open_visualizer(
        &mut self,
        kind: &str,
        snapshot: Option<SnapshotId>,
    ) -> SessionResult<VisualizerId> {
        let snapshot = match snapshot {
            Some(id) => self
                .registry
                .get(id)
                .ok_or(SessionError::SnapshotNotFound(id))?
                .clone(),
            None => self
                .registry
                .active()
                .ok_or_else(|| SessionError::invalid("no snapshot is selected"))?
                .clone(),
        };

        let ctx = VisualizerContext {
            info: self.connection.info(),
            state: self.state,
            connection: &self.connection,
            store: &self.store,
            snapshot: &snapshot,
        };
        let id = self.visualizers.open(kind, &ctx)?;

        self.publish(SessionEvent::VisualizerOpened {
            id,
            kind: kind.to_string(),
            snapshot,
        });
        self.publish(SessionEvent::ActiveVisualizerChanged { id: Some(id) });
        Ok(id)
    }

    fn handle_close_visualizer(&mut self, id: VisualizerId) -> SessionResult<()> {
        let active_before = self.visualizers.active();
        self.visualizers.close(id)?;
        self.publish(SessionEvent::VisualizerClosed { id });
        self.publish_active_visualizer_if_changed(active_before);
        Ok(())
    }

    fn handle_close_active_visualizer(&mut self) -> Option<VisualizerId> {
        let active_before = self.visualizers.active();
        let closed = self.visualizers.close_active()?;
        self.publish(SessionEvent::VisualizerClosed { id: closed });
        self.publish_active_visualizer_if_changed(active_before);
        Some(closed)
    }

    fn handle_select_visualizer(&mut self, id: VisualizerId) -> SessionResult<()> {
        let active_before = self.visualizers.active();
        self.visualizers.select(id)?;
        self.publish_active_visualizer_if_changed(active_before);
        Ok(())
    }

    // ========================================================================
    // Target Control / Reconnect
    // ========================================================================

    fn handle_target_control(&mut self, action: TargetAction) -> bool {
        if !self.state.is_live() {
            debug!(?action, state = ?self.state, "Target control ignored: not live");
            return false;
        }
        match action {
            TargetAction::Suspend => self.connection.suspend_target(),
            TargetAction::Resume => self.connection.resume_target(),
            TargetAction::PauseSampling => self.connection.set_sampling_active(false),
            TargetAction::ResumeSampling => self.connection.set_sampling_active(true),
        }
        info!(?action, "Target control forwarded");
        true
    }

    async fn handle_reconnect(&mut self) -> SessionResult<()> {
        self.state.check_reconnect()?;
        let connector = self
            .connector
            .clone()
            .ok_or_else(|| SessionError::invalid("no connector is configured for this session"))?;

        let info = self.connection.info().clone();
        let host = info.host.clone().unwrap_or_default();
        let timeout = self.config.reconnect_timeout();
        info!(host = %host, port = info.port, ?timeout, "Reconnecting");

        let connection =
            match tokio::time::timeout(timeout, connector.connect(&host, info.port, &info.engine))
                .await
            {
                Ok(Ok(connection)) => connection,
                Ok(Err(SessionError::ReconnectFailed(reason))) => {
                    warn!(reason = %reason, "Reconnect failed");
                    return Err(SessionError::ReconnectFailed(reason));
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Reconnect failed");
                    return Err(SessionError::ReconnectFailed(e.to_string()));
                }
                Err(_) => {
                    warn!(?timeout, "Reconnect timed out");
                    return Err(SessionError::ReconnectFailed(format!(
                        "timed out after {}s",
                        timeout.as_secs()
                    )));
                }
            };

        let next = self.state.on_reconnected()?;

        // Swap links: stop listening to the old one before releasing it.
        self.subscription.cancel();
        self.connection.dispose();
        self.subscription = connection.subscribe();
        self.listening = true;
        self.connection = connection;

        self.set_state(next);
        self.republish();
        Ok(())
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Saves the store to `path` once.
    fn save_to(&self, path: &Path) -> SessionResult<()> {
        self.store
            .save(path)
            .map_err(|e| SessionError::SaveFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        info!(path = %path.display(), "Results saved");
        Ok(())
    }

    fn handle_save_results(&mut self) -> SessionResult<Outcome> {
        let extension = self.store.extension().to_string();
        loop {
            let Some(path) = self.prompter.prompt_save_path(&extension) else {
                debug!("Save cancelled");
                return Ok(Outcome::Cancelled);
            };
            match self.save_to(&path) {
                Ok(()) => return Ok(Outcome::Completed),
                Err(e @ SessionError::SaveFailed { .. }) => {
                    warn!(error = %e, "Save failed, asking for another destination");
                    self.prompter.notify("Save Failed", &e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========================================================================
    // Close / Teardown
    // ========================================================================

    fn handle_close(&mut self, reason: CloseReason) -> Outcome {
        let ask = match reason {
            CloseReason::User => true,
            CloseReason::Shutdown => self.store.in_memory(),
        };
        if ask && self.prompter.confirm(CLOSE_TITLE, CLOSE_MESSAGE) != Confirmation::Yes {
            debug!(?reason, "Close cancelled");
            return Outcome::Cancelled;
        }
        self.teardown();
        Outcome::Completed
    }

    /// Closes every visualizer, then releases the connection.
    ///
    /// Visualizers go first: `on_close` may still read from the connection
    /// or the store.
    fn teardown(&mut self) {
        let closed = self.visualizers.close_all();
        for id in &closed {
            self.publish(SessionEvent::VisualizerClosed { id: *id });
        }

        self.subscription.cancel();
        self.listening = false;
        self.connection.dispose();

        info!(
            session = %self.connection.info().caption(),
            visualizers_closed = closed.len(),
            "Session closed"
        );
        self.publish(SessionEvent::Closed);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn set_state(&mut self, state: SessionState) {
        if state == self.state {
            return;
        }
        info!(from = ?self.state, to = ?state, "Session state changed");
        self.state = state;
        self.publish(SessionEvent::StateChanged { state });
    }

    fn refresh_and_publish(&mut self) -> SessionResult<()> {
        self.registry.refresh(self.store.as_ref())?;
        self.publish_list();
        Ok(())
    }

    /// Refresh after a completed store mutation. The mutation stands even if
    /// the refresh fails, so the failure is only logged.
    fn republish(&mut self) {
        if let Err(e) = self.refresh_and_publish() {
            warn!(error = %e, "Refresh after store mutation failed");
        }
    }

    fn publish_list(&self) {
        self.publish(SessionEvent::SnapshotsRefreshed {
            snapshots: self.registry.snapshots().to_vec(),
            active: self.registry.active_id(),
        });
    }

    fn publish_active_visualizer_if_changed(&self, before: Option<VisualizerId>) {
        let now = self.visualizers.active();
        if now != before {
            self.publish(SessionEvent::ActiveVisualizerChanged { id: now });
        }
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }

    fn list_view(&self) -> SnapshotListView {
        SnapshotListView {
            snapshots: self.registry.snapshots().to_vec(),
            active: self.registry.active_id(),
        }
    }

    fn status(&self) -> SessionStatus {
        let active_is_live = self.registry.active_id().is_live();
        SessionStatus {
            state: self.state,
            status_label: self.state.status_label().to_string(),
            info: self.connection.info().clone(),
            capabilities: self
                .state
                .capabilities(active_is_live, self.visualizers.len()),
            snapshot_count: self.registry.len(),
            active_snapshot: self.registry.active_id(),
            visualizer_count: self.visualizers.len(),
            active_visualizer: self.visualizers.active(),
        }
    }

    #[cfg(test)]
    fn state(&self) -> SessionState {
        self.state
    }
}
