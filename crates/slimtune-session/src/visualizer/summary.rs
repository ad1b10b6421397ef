//! Snapshot summary visualizer: row counts for the bound snapshot.

use serde_json::json;
use tracing::{debug, warn};

use slimtune_core::SnapshotId;

use crate::store::DataRows;

use super::{Visualizer, VisualizerContext};

/// Kind identifier of [`SnapshotSummary`].
pub const SUMMARY_KIND: &str = "summary";

/// Shows how many samples and calls a snapshot holds.
///
/// Declines to initialize if the snapshot is gone from the store.
#[derive(Debug, Default)]
pub struct SnapshotSummary {
    bound: Option<(SnapshotId, DataRows)>,
    closed: bool,
}

impl SnapshotSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Option<DataRows> {
        self.bound.map(|(_, rows)| rows)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Visualizer for SnapshotSummary {
    fn display_name(&self) -> String {
        "Snapshot Summary".to_string()
    }

    fn initialize(&mut self, ctx: &VisualizerContext<'_>) -> bool {
        match ctx.store.rows(ctx.snapshot.id) {
            Ok(rows) => {
                self.bound = Some((ctx.snapshot.id, rows));
                true
            }
            Err(e) => {
                warn!(
                    snapshot_id = %ctx.snapshot.id,
                    error = %e,
                    "Snapshot summary could not read snapshot"
                );
                false
            }
        }
    }

    fn on_close(&mut self) {
        self.closed = true;
        debug!(snapshot = ?self.bound.map(|(id, _)| id), "Snapshot summary closed");
    }

    fn view_state(&self) -> serde_json::Value {
        match self.bound {
            Some((id, rows)) => json!({
                "snapshot": id,
                "samples": rows.samples,
                "calls": rows.calls,
            }),
            None => serde_json::Value::Null,
        }
    }
}
