//! Visualizer contract and bookkeeping.
//!
//! A visualizer is an analysis view bound to exactly one snapshot for its
//! whole lifetime. Rendering is up to the presentation layer; the session
//! only tracks which visualizers are open, what they are bound to, and
//! which one is selected.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use slimtune_core::{ConnectionInfo, SessionState, Snapshot};

use crate::connection::ConnectionHandle;
use crate::store::SnapshotStore;

mod factory;
mod session;
mod summary;

pub use factory::{VisualizerConstructor, VisualizerFactory, VisualizerKindInfo};
pub use session::VisualizerSession;
pub use summary::{SnapshotSummary, SUMMARY_KIND};

/// Identifier of an open visualizer, unique within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisualizerId(u64);

impl VisualizerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for VisualizerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a visualizer may read while initializing.
///
/// The connection and store are shared handles so a visualizer can keep
/// them for later queries.
pub struct VisualizerContext<'a> {
    pub info: &'a ConnectionInfo,
    pub state: SessionState,
    pub connection: &'a Arc<dyn ConnectionHandle>,
    pub store: &'a Arc<dyn SnapshotStore>,
    pub snapshot: &'a Snapshot,
}

/// An analysis view over one snapshot.
pub trait Visualizer: Send {
    /// Title shown on the visualizer's host view.
    fn display_name(&self) -> String;

    /// Binds the visualizer to its snapshot.
    ///
    /// Returning false rejects the binding; the instance is then discarded
    /// without `on_close` being called.
    fn initialize(&mut self, ctx: &VisualizerContext<'_>) -> bool;

    /// Called exactly once, before the visualizer is dropped.
    fn on_close(&mut self);

    /// Opaque view state for the presentation layer.
    fn view_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Presentation-facing description of an open visualizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizerSummary {
    pub id: VisualizerId,
    pub kind: String,
    pub title: String,
    pub snapshot: Snapshot,
    pub active: bool,
    pub view_state: serde_json::Value,
}
