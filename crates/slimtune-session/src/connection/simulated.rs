//! In-process simulated target.
//!
//! Used by the `demo` command and by tests to drive the coordinator through
//! data flushes, link drops and reconnects without a real profiler.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use slimtune_core::{ConnectionInfo, ConnectionState, SessionError, SessionResult};

use super::{ConnectionEvent, ConnectionHandle, Connector, Notifier, Subscription};

/// A control request the target received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetCommand {
    Suspend,
    Resume,
    SetSampling(bool),
}

/// Connection to a simulated target.
#[derive(Debug)]
pub struct SimulatedConnection {
    info: ConnectionInfo,
    notifier: Notifier,
    running: AtomicBool,
    disposed: AtomicBool,
    commands: Mutex<Vec<TargetCommand>>,
}

impl SimulatedConnection {
    /// Creates a running connection.
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            notifier: Notifier::new(),
            running: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Raises `DataFlushed`, as the profiler does after writing samples.
    pub fn flush(&self) -> bool {
        self.notifier.notify(ConnectionEvent::DataFlushed)
    }

    /// Drops the link. `Disconnected` fires only on the first call.
    pub fn drop_link(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(name = %self.info.name, "Simulated target disconnected");
            self.notifier.notify(ConnectionEvent::Disconnected);
        }
    }

    /// Control requests received so far.
    pub fn commands(&self) -> Vec<TargetCommand> {
        self.commands
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn control(&self, command: TargetCommand) {
        if !self.running.load(Ordering::SeqCst) {
            debug!(?command, "Ignoring target control: no live link");
            return;
        }
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }
}

impl ConnectionHandle for SimulatedConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn state(&self) -> ConnectionState {
        if self.running.load(Ordering::SeqCst) {
            ConnectionState::Running
        } else {
            ConnectionState::Stopped
        }
    }

    fn suspend_target(&self) {
        self.control(TargetCommand::Suspend);
    }

    fn resume_target(&self) {
        self.control(TargetCommand::Resume);
    }

    fn set_sampling_active(&self, active: bool) {
        self.control(TargetCommand::SetSampling(active));
    }

    fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            debug!(name = %self.info.name, "Simulated connection disposed");
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// How the simulated connector answers connect requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Succeed,
    Fail(String),
    /// Never completes; exercises the reconnect timeout.
    Hang,
}

/// Connector producing [`SimulatedConnection`]s.
#[derive(Debug)]
pub struct SimulatedConnector {
    name: String,
    behavior: Mutex<ConnectBehavior>,
    attempts: AtomicUsize,
    last: Mutex<Option<Arc<SimulatedConnection>>>,
}

impl SimulatedConnector {
    pub fn new(name: impl Into<String>, behavior: ConnectBehavior) -> Self {
        Self {
            name: name.into(),
            behavior: Mutex::new(behavior),
            attempts: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn set_behavior(&self, behavior: ConnectBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The most recently established connection.
    pub fn last_connection(&self) -> Option<Arc<SimulatedConnection>> {
        self.last.lock().ok().and_then(|last| last.clone())
    }
}

#[async_trait]
impl Connector for SimulatedConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        engine: &str,
    ) -> SessionResult<Arc<dyn ConnectionHandle>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behavior
            .lock()
            .map(|b| b.clone())
            .map_err(|_| SessionError::ReconnectFailed("connector lock poisoned".to_string()))?;

        match behavior {
            ConnectBehavior::Succeed => {
                let conn = Arc::new(SimulatedConnection::new(ConnectionInfo::target(
                    host,
                    port,
                    engine,
                    self.name.clone(),
                )));
                if let Ok(mut last) = self.last.lock() {
                    *last = Some(Arc::clone(&conn));
                }
                Ok(conn)
            }
            ConnectBehavior::Fail(reason) => Err(SessionError::ReconnectFailed(reason)),
            ConnectBehavior::Hang => {
                std::future::pending::<()>().await;
                Err(SessionError::ReconnectFailed("connect never completed".to_string()))
            }
        }
    }
}
