//! Connection stand-in for sessions opened from a results file.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use slimtune_core::{ConnectionInfo, ConnectionState};

use super::{ConnectionHandle, Subscription};

/// A connection with no network link.
///
/// Always reports `FileOnly`; target controls are no-ops and the
/// subscription never yields.
#[derive(Debug)]
pub struct FileConnection {
    info: ConnectionInfo,
    disposed: AtomicBool,
}

impl FileConnection {
    pub fn new(engine: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            info: ConnectionInfo::file(engine, name),
            disposed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl ConnectionHandle for FileConnection {
    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::FileOnly
    }

    fn suspend_target(&self) {}

    fn resume_target(&self) {}

    fn set_sampling_active(&self, _active: bool) {}

    fn subscribe(&self) -> Subscription {
        Subscription::closed()
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            debug!(name = %self.info.name, "File connection disposed");
        }
    }
}
