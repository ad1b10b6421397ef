//! Session coordinator using the actor pattern.
//!
//! One actor per session owns the connection, the snapshot registry cache
//! and the open visualizers. Presentation adapters talk to it through a
//! [`SessionHandle`] and follow it through [`SessionEvent`]s.
//!
//! ```text
//! ┌──────────────┐ SessionCommand ┌──────────────┐ SessionEvent ┌──────────────┐
//! │ SessionHandle│───────────────▶│ SessionActor │─────────────▶│ presentation │
//! └──────────────┘    (mpsc)      └──────────────┘  (broadcast) └──────────────┘
//!                                        ▲
//!                                        │ ConnectionEvent (Subscription)
//!                                 ┌──────────────┐
//!                                 │  connection  │
//!                                 └──────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use slimtune_core::SessionResult;

use crate::config::SessionConfig;
use crate::connection::{ConnectionHandle, Connector};
use crate::prompt::{AssumeYes, Prompter};
use crate::store::SnapshotStore;
use crate::visualizer::{VisualizerFactory, VisualizerSession};

mod actor;
mod commands;
mod handle;

pub use actor::SessionActor;
pub use commands::{
    CloseReason, Outcome, SessionCommand, SessionEvent, SessionStatus, SnapshotListView,
    TargetAction,
};
pub use handle::SessionHandle;

/// Assembles and spawns a session.
///
/// Defaults: builtin visualizers, no connector (reconnect unavailable), an
/// [`AssumeYes`] prompter and [`SessionConfig::default`].
pub struct SessionBuilder {
    connection: Arc<dyn ConnectionHandle>,
    store: Arc<dyn SnapshotStore>,
    connector: Option<Arc<dyn Connector>>,
    factory: VisualizerFactory,
    prompter: Box<dyn Prompter>,
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new(connection: Arc<dyn ConnectionHandle>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            connection,
            store,
            connector: None,
            factory: VisualizerFactory::with_builtins(),
            prompter: Box::new(AssumeYes),
            config: SessionConfig::default(),
        }
    }

    /// Connector used by `reconnect`.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn visualizers(mut self, factory: VisualizerFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads the snapshot list, then spawns the actor on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// `SessionError::StoreUnavailable` if the store cannot be listed. The
    /// connection is disposed in that case.
    pub fn spawn(self) -> SessionResult<SessionHandle> {
        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(self.config.event_buffer.max(1));

        let connection = Arc::clone(&self.connection);
        let mut actor = SessionActor::new(
            cmd_rx,
            event_tx.clone(),
            self.connection,
            self.store,
            self.connector,
            self.prompter,
            VisualizerSession::new(self.factory),
            self.config,
        );

        if let Err(e) = actor.open() {
            warn!(error = %e, session = %connection.info().name, "Session failed to open");
            connection.dispose();
            return Err(e);
        }

        tokio::spawn(actor.run());
        Ok(SessionHandle::new(cmd_tx, event_tx))
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("connection", self.connection.info())
            .field("engine", &self.store.engine())
            .field("reconnect", &self.connector.is_some())
            .field("factory", &self.factory)
            .field("config", &self.config)
            .finish()
    }
}
