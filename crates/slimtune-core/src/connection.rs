//! Connection descriptor and link state.

use serde::{Deserialize, Serialize};

/// Label shown in place of host and port for sessions opened from a file.
const FILE_LABEL: &str = "(file)";

/// Describes what a session is connected to.
///
/// `port == 0` with no host denotes a session opened from a persisted
/// results file rather than a live target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: Option<String>,
    pub port: u16,
    /// Storage engine name (e.g. "memory")
    pub engine: String,
    /// Session name shown in captions
    pub name: String,
    /// Whether the backing store lives only in memory
    pub in_memory: bool,
}

impl ConnectionInfo {
    /// Descriptor for a live target.
    pub fn target(
        host: impl Into<String>,
        port: u16,
        engine: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let host = host.into();
        Self {
            host: if host.is_empty() { None } else { Some(host) },
            port,
            engine: engine.into(),
            name: name.into(),
            in_memory: true,
        }
    }

    /// Descriptor for a session opened from a results file.
    pub fn file(engine: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: None,
            port: 0,
            engine: engine.into(),
            name: name.into(),
            in_memory: false,
        }
    }

    /// Returns true if this descriptor has no network link.
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        self.port == 0 && self.host.as_deref().map_or(true, str::is_empty)
    }

    pub fn host_label(&self) -> String {
        match self.host.as_deref() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => FILE_LABEL.to_string(),
        }
    }

    pub fn port_label(&self) -> String {
        if self.port == 0 {
            FILE_LABEL.to_string()
        } else {
            self.port.to_string()
        }
    }

    /// Window caption, e.g. `myapp - localhost:3000 [memory]`.
    pub fn caption(&self) -> String {
        if self.is_file_backed() {
            format!("{} - {} [{}]", self.name, FILE_LABEL, self.engine)
        } else {
            format!(
                "{} - {}:{} [{}]",
                self.name,
                self.host_label(),
                self.port,
                self.engine
            )
        }
    }
}

/// State reported by a connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Linked to a running target.
    Running,
    /// Was linked, link is gone.
    Stopped,
    /// Opened from a results file; there never was a link.
    FileOnly,
}
