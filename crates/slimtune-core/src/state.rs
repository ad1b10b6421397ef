//! Session state machine and command availability.
//!
//! ```text
//! Opening ──▶ Live ◀──────┐
//!    │          │ Disconnected notification
//!    │          ▼         │ reconnect succeeds
//!    ├──▶ Disconnected ───┘
//!    └──▶ FileOnly (terminal)
//! ```
//!
//! Transitions are pure functions so the coordinator and its tests share
//! one definition of what is allowed.

use serde::{Deserialize, Serialize};

use crate::{ConnectionState, SessionError, SessionResult};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session is being set up; no snapshot list has been loaded yet.
    #[default]
    Opening,
    /// Target is running; snapshot-taking and suspend/resume are enabled.
    Live,
    /// Target link dropped; captured snapshots remain usable, reconnect is enabled.
    Disconnected,
    /// Opened from a results file; no network link will ever exist.
    FileOnly,
}

impl SessionState {
    /// Resolves the state an opening session enters for a given connection state.
    pub fn from_connection(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Running => Self::Live,
            ConnectionState::Stopped => Self::Disconnected,
            ConnectionState::FileOnly => Self::FileOnly,
        }
    }

    /// State after a `Disconnected` notification.
    ///
    /// Only `Live` moves; the notification is idempotent everywhere else.
    #[must_use]
    pub fn on_disconnected(self) -> Self {
        match self {
            Self::Live => Self::Disconnected,
            other => other,
        }
    }

    /// Checks whether a reconnect may be attempted from this state.
    ///
    /// # Errors
    ///
    /// `SessionError::InvalidOperation` unless the session is `Disconnected`.
    pub fn check_reconnect(self) -> SessionResult<()> {
        match self {
            Self::Disconnected => Ok(()),
            Self::FileOnly => Err(SessionError::invalid(
                "session was opened from a file and cannot reconnect",
            )),
            Self::Live => Err(SessionError::invalid("target is already connected")),
            Self::Opening => Err(SessionError::invalid("session is still opening")),
        }
    }

    /// State after a successful reconnect.
    pub fn on_reconnected(self) -> SessionResult<Self> {
        self.check_reconnect()?;
        Ok(Self::Live)
    }

    #[must_use]
    pub fn is_live(self) -> bool {
        self == Self::Live
    }

    /// Status text shown next to the connection details.
    #[must_use]
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Opening => "Opening",
            Self::Live => "Running",
            Self::Disconnected => "Stopped",
            Self::FileOnly => "Opened From File",
        }
    }

    /// Command availability for this state.
    ///
    /// `active_is_live` and `visualizer_count` refine the state-derived flags.
    pub fn capabilities(self, active_is_live: bool, visualizer_count: usize) -> Capabilities {
        Capabilities {
            take_snapshot: self.is_live(),
            suspend_resume: self.is_live(),
            reconnect: self == Self::Disconnected,
            rename_active: !active_is_live,
            close_visualizer: visualizer_count > 0,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status_label())
    }
}

/// Which user commands are currently available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub take_snapshot: bool,
    pub suspend_resume: bool,
    pub reconnect: bool,
    pub rename_active: bool,
    pub close_visualizer: bool,
}
