//! Session error taxonomy.
//!
//! Every failure in the session core is scoped to one session; nothing here
//! is fatal to the host process.

use std::path::PathBuf;

use thiserror::Error;

use crate::SnapshotId;

/// Errors reported by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The live link to the target dropped.
    #[error("connection to target lost")]
    ConnectionLost,

    /// A snapshot store call failed; the operation was aborted with no partial mutation.
    #[error("snapshot store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store has no snapshot with this id.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(SnapshotId),

    /// The operation is not valid for the current snapshot or session state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A visualizer declined to initialize and was discarded.
    #[error("visualizer '{kind}' rejected initialization")]
    InitializationRejected { kind: String },

    /// No visualizer constructor is registered under this kind.
    #[error("unknown visualizer kind: {0}")]
    UnknownVisualizer(String),

    /// No open visualizer has this id.
    #[error("visualizer not found: {0}")]
    VisualizerNotFound(u64),

    /// Persisting results to a file failed; the caller may retry elsewhere.
    #[error("failed to save results to {}: {reason}", path.display())]
    SaveFailed { path: PathBuf, reason: String },

    /// Reconnecting to the target failed or timed out.
    #[error("reconnect failed: {0}")]
    ReconnectFailed(String),

    /// The session actor has shut down.
    #[error("session channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// Creates an `InvalidOperation` error from any message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
