//! Connection contract consumed by the session coordinator.
//!
//! The profiling wire protocol lives outside this crate. A session only
//! needs the link state, a few target controls, and two notifications
//! raised from the connection's own I/O context:
//!
//! - `Disconnected` - fired once when the link drops
//! - `DataFlushed` - fired (at least once) whenever the store changed;
//!   carries no payload, consumers re-query
//!
//! Notifications are delivered through a [`Subscription`] that the
//! coordinator owns and cancels on teardown, so nothing is delivered into a
//! session that no longer exists.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use slimtune_core::{ConnectionInfo, ConnectionState, SessionResult};

mod file;
mod simulated;

pub use file::FileConnection;
pub use simulated::{ConnectBehavior, SimulatedConnection, SimulatedConnector, TargetCommand};

/// Buffer size for notification channels.
const NOTIFY_BUFFER: usize = 32;

/// Asynchronous notification raised by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Disconnected,
    DataFlushed,
}

// ============================================================================
// Connection Handle
// ============================================================================

/// Live link to a profiled target, or a stand-in for an opened file.
///
/// Target controls are fire-and-forget and do nothing when no live link
/// exists.
pub trait ConnectionHandle: Send + Sync {
    fn info(&self) -> &ConnectionInfo;

    fn state(&self) -> ConnectionState;

    fn suspend_target(&self);

    fn resume_target(&self);

    fn set_sampling_active(&self, active: bool);

    /// Subscribes to this connection's notifications.
    fn subscribe(&self) -> Subscription;

    /// Releases the underlying link. Called once, on session teardown.
    fn dispose(&self);
}

/// Establishes new connections to a target, used by reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `host:port` using the given storage engine.
    ///
    /// The coordinator bounds this call with its reconnect timeout; an
    /// implementation must not leave partial state behind when the future
    /// is dropped.
    async fn connect(
        &self,
        host: &str,
        port: u16,
        engine: &str,
    ) -> SessionResult<Arc<dyn ConnectionHandle>>;
}

/// Default timeout for reconnect attempts.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Notifier / Subscription
// ============================================================================

/// Sending side of connection notifications, held by connection
/// implementations and fired from their I/O context.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<ConnectionEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFY_BUFFER);
        Self { sender }
    }

    /// Raises a notification. Returns false when nobody is subscribed.
    pub fn notify(&self, event: ConnectionEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }
}

/// Cancellable stream of connection notifications.
///
/// Once cancelled (explicitly or by drop) `recv` returns `None` and no
/// further events are delivered.
pub struct Subscription {
    receiver: Option<broadcast::Receiver<ConnectionEvent>>,
    cancel: CancellationToken,
}

impl Subscription {
    fn new(receiver: broadcast::Receiver<ConnectionEvent>) -> Self {
        Self {
            receiver: Some(receiver),
            cancel: CancellationToken::new(),
        }
    }

    /// A subscription that never yields, for connections without a link.
    pub fn closed() -> Self {
        Self {
            receiver: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the next notification.
    ///
    /// A lagged receiver reports `DataFlushed`: flushes are at-least-once and
    /// carry no payload, so a missed run collapses into a single re-query.
    /// Returns `None` once cancelled or when the connection side is gone.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        let receiver = self.receiver.as_mut()?;
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = receiver.recv() => result,
        };

        match result {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Notification subscriber lagged");
                Some(ConnectionEvent::DataFlushed)
            }
            Err(broadcast::error::RecvError::Closed) => {
                self.receiver = None;
                None
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("open", &self.receiver.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
