//! The set of open visualizers in one session.
//!
//! Each open visualizer owns its host view: an instance is added to the set
//! only after it initialized successfully, and removed together with its
//! view, so the instance count and the view count can never diverge.
//!
//! Selection follows tab-strip rules: closing the selected visualizer
//! selects its right neighbour, else the new rightmost one, else nothing.

use tracing::{debug, info, warn};

use slimtune_core::{SessionError, SessionResult, Snapshot, SnapshotId};

use super::{Visualizer, VisualizerContext, VisualizerFactory, VisualizerId, VisualizerSummary};

/// One open visualizer and its host view.
struct OpenVisualizer {
    id: VisualizerId,
    kind: String,
    /// Host view title
    title: String,
    snapshot: Snapshot,
    visualizer: Box<dyn Visualizer>,
}

/// Open visualizers, in host-view order, and the selected one.
pub struct VisualizerSession {
    factory: VisualizerFactory,
    open: Vec<OpenVisualizer>,
    active: Option<VisualizerId>,
    next_id: u64,
}

impl VisualizerSession {
    pub fn new(factory: VisualizerFactory) -> Self {
        Self {
            factory,
            open: Vec::new(),
            active: None,
            next_id: 1,
        }
    }

    pub fn factory(&self) -> &VisualizerFactory {
        &self.factory
    }

    /// Instantiates a visualizer of `kind` bound to `ctx.snapshot`.
    ///
    /// On success the new visualizer is appended and selected.
    ///
    /// # Errors
    ///
    /// - `SessionError::UnknownVisualizer` if `kind` is not registered
    /// - `SessionError::InitializationRejected` if the visualizer declined;
    ///   nothing is added in that case
    pub fn open(&mut self, kind: &str, ctx: &VisualizerContext<'_>) -> SessionResult<VisualizerId> {
        let mut visualizer = self.factory.create(kind)?;

        if !visualizer.initialize(ctx) {
            warn!(
                kind,
                snapshot_id = %ctx.snapshot.id,
                "Visualizer rejected initialization, discarding"
            );
            return Err(SessionError::InitializationRejected {
                kind: kind.to_string(),
            });
        }

        let id = VisualizerId::new(self.next_id);
        self.next_id += 1;

        let title = visualizer.display_name();
        self.open.push(OpenVisualizer {
            id,
            kind: kind.to_string(),
            title,
            snapshot: ctx.snapshot.clone(),
            visualizer,
        });
        self.active = Some(id);

        info!(
            visualizer_id = %id,
            kind,
            snapshot_id = %ctx.snapshot.id,
            open = self.open.len(),
            "Visualizer opened"
        );
        Ok(id)
    }

    /// Closes one visualizer: `on_close` first, then removal.
    ///
    /// # Errors
    ///
    /// `SessionError::VisualizerNotFound` if `id` is not open.
    pub fn close(&mut self, id: VisualizerId) -> SessionResult<()> {
        let index = self
            .position(id)
            .ok_or(SessionError::VisualizerNotFound(id.get()))?;

        if let Some(closing) = self.open.get_mut(index) {
            closing.visualizer.on_close();
        }

        if self.active == Some(id) {
            self.active = self.successor(index);
        }
        let closing = self.open.remove(index);

        debug!(
            visualizer_id = %id,
            kind = %closing.kind,
            open = self.open.len(),
            active = ?self.active,
            "Visualizer closed"
        );
        Ok(())
    }

    /// Closes the selected visualizer, if any. Returns its id.
    pub fn close_active(&mut self) -> Option<VisualizerId> {
        let id = self.active?;
        self.close(id).ok().map(|()| id)
    }

    /// Closes every visualizer bound to `snapshot_id`.
    ///
    /// Returns the ids that were closed.
    pub fn close_all_bound_to(&mut self, snapshot_id: SnapshotId) -> Vec<VisualizerId> {
        let bound: Vec<VisualizerId> = self
            .open
            .iter()
            .filter(|v| v.snapshot.id == snapshot_id)
            .map(|v| v.id)
            .collect();

        for id in &bound {
            // Ids were collected from the set just above.
            let _ = self.close(*id);
        }

        if !bound.is_empty() {
            info!(
                snapshot_id = %snapshot_id,
                closed = bound.len(),
                "Closed visualizers bound to deleted snapshot"
            );
        }
        bound
    }

    /// Closes everything, in host-view order. Used on session teardown.
    pub fn close_all(&mut self) -> Vec<VisualizerId> {
        let ids = self.ids();
        for id in &ids {
            let _ = self.close(*id);
        }
        ids
    }

    /// Selects an open visualizer.
    pub fn select(&mut self, id: VisualizerId) -> SessionResult<()> {
        self.position(id)
            .ok_or(SessionError::VisualizerNotFound(id.get()))?;
        self.active = Some(id);
        Ok(())
    }

    pub fn active(&self) -> Option<VisualizerId> {
        self.active
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Number of host views; equal to `len()` at all times.
    pub fn view_count(&self) -> usize {
        self.open.len()
    }

    /// Ids in host-view order.
    pub fn ids(&self) -> Vec<VisualizerId> {
        self.open.iter().map(|v| v.id).collect()
    }

    /// Snapshot a visualizer is bound to.
    pub fn bound_snapshot(&self, id: VisualizerId) -> Option<&Snapshot> {
        self.open.iter().find(|v| v.id == id).map(|v| &v.snapshot)
    }

    pub fn summaries(&self) -> Vec<VisualizerSummary> {
        self.open
            .iter()
            .map(|v| VisualizerSummary {
                id: v.id,
                kind: v.kind.clone(),
                title: v.title.clone(),
                snapshot: v.snapshot.clone(),
                active: self.active == Some(v.id),
                view_state: v.visualizer.view_state(),
            })
            .collect()
    }

    fn position(&self, id: VisualizerId) -> Option<usize> {
        self.open.iter().position(|v| v.id == id)
    }

    /// Selection after the visualizer at `index` goes away.
    fn successor(&self, index: usize) -> Option<VisualizerId> {
        let count = self.open.len();
        if count > index + 1 {
            // Next to the right
            self.open.get(index + 1).map(|v| v.id)
        } else if count > 1 {
            // Closing the rightmost: its left neighbour becomes rightmost
            self.open.get(count - 2).map(|v| v.id)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for VisualizerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizerSession")
            .field("open", &self.ids())
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionHandle, FileConnection};
    use crate::store::{MemoryStore, SnapshotStore};
    use chrono::Utc;
    use slimtune_core::SessionState;
    use std::sync::{Arc, Mutex};

    type CloseLog = Arc<Mutex<Vec<String>>>;

    /// Visualizer that logs its close and optionally rejects initialization.
    struct Probe {
        name: String,
        accept: bool,
        log: CloseLog,
    }

    impl Visualizer for Probe {
        fn display_name(&self) -> String {
            self.name.clone()
        }
        fn initialize(&mut self, _ctx: &VisualizerContext<'_>) -> bool {
            self.accept
        }
        fn on_close(&mut self) {
            self.log.lock().unwrap().push(self.name.clone());
        }
    }

    struct Fixture {
        connection: Arc<dyn ConnectionHandle>,
        store: Arc<dyn SnapshotStore>,
        session: VisualizerSession,
        log: CloseLog,
    }

    impl Fixture {
        fn new() -> Self {
            let log: CloseLog = Arc::new(Mutex::new(Vec::new()));
            let mut factory = VisualizerFactory::new();
            let ok_log = Arc::clone(&log);
            factory.register("probe", "Probe", move || {
                Box::new(Probe {
                    name: "probe".to_string(),
                    accept: true,
                    log: Arc::clone(&ok_log),
                })
            });
            let reject_log = Arc::clone(&log);
            factory.register("reject", "Rejecting probe", move || {
                Box::new(Probe {
                    name: "reject".to_string(),
                    accept: false,
                    log: Arc::clone(&reject_log),
                })
            });

            Self {
                connection: Arc::new(FileConnection::new("memory", "test")),
                store: Arc::new(MemoryStore::new()),
                session: VisualizerSession::new(factory),
                log,
            }
        }

        fn open(&mut self, kind: &str, snapshot: &Snapshot) -> SessionResult<VisualizerId> {
            let ctx = VisualizerContext {
                info: self.connection.info(),
                state: SessionState::FileOnly,
                connection: &self.connection,
                store: &self.store,
                snapshot,
            };
            self.session.open(kind, &ctx)
        }

        fn open_n(&mut self, n: usize) -> Vec<VisualizerId> {
            let snap = Snapshot::live(Utc::now());
            (0..n).map(|_| self.open("probe", &snap).unwrap()).collect()
        }

        fn closed(&self) -> usize {
            self.log.lock().unwrap().len()
        }
    }

    #[test]
    fn test_open_selects_new_visualizer() {
        let mut fx = Fixture::new();
        let ids = fx.open_n(2);
        assert_eq!(fx.session.len(), 2);
        assert_eq!(fx.session.view_count(), 2);
        assert_eq!(fx.session.active(), Some(ids[1]));
    }

    #[test]
    fn test_rejected_open_leaves_set_unchanged() {
        let mut fx = Fixture::new();
        let ids = fx.open_n(1);
        let snap = Snapshot::live(Utc::now());

        let result = fx.open("reject", &snap);
        assert!(matches!(
            result,
            Err(SessionError::InitializationRejected { kind }) if kind == "reject"
        ));
        assert_eq!(fx.session.len(), 1);
        assert_eq!(fx.session.view_count(), fx.session.len());
        assert_eq!(fx.session.active(), Some(ids[0]));
        // A rejected instance is discarded without on_close
        assert_eq!(fx.closed(), 0);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut fx = Fixture::new();
        let snap = Snapshot::live(Utc::now());
        assert!(matches!(
            fx.open("flame", &snap),
            Err(SessionError::UnknownVisualizer(_))
        ));
        assert!(fx.session.is_empty());
    }

    #[test]
    fn test_close_selection_one_instance() {
        let mut fx = Fixture::new();
        let ids = fx.open_n(1);
        fx.session.close(ids[0]).unwrap();
        assert_eq!(fx.session.active(), None);
        assert!(fx.session.is_empty());
        assert_eq!(fx.closed(), 1);
    }

    #[test]
    fn test_close_selection_two_instances() {
        // Close left while selected -> right neighbour
        let mut fx = Fixture::new();
        let ids = fx.open_n(2);
        fx.session.select(ids[0]).unwrap();
        fx.session.close(ids[0]).unwrap();
        assert_eq!(fx.session.active(), Some(ids[1]));

        // Close right while selected -> new rightmost
        let mut fx = Fixture::new();
        let ids = fx.open_n(2);
        fx.session.close(ids[1]).unwrap();
        assert_eq!(fx.session.active(), Some(ids[0]));
    }

    #[test]
    fn test_close_selection_three_instances() {
        let expected = [
            // (closed position, expected selection position in the original ids)
            (0usize, 1usize),
            (1, 2),
            (2, 1),
        ];
        for (closed, selected) in expected {
            let mut fx = Fixture::new();
            let ids = fx.open_n(3);
            fx.session.select(ids[closed]).unwrap();
            fx.session.close(ids[closed]).unwrap();
            assert_eq!(
                fx.session.active(),
                Some(ids[selected]),
                "closing position {closed}"
            );
            assert_eq!(fx.session.len(), 2);
            assert_eq!(fx.session.view_count(), 2);
        }
    }

    #[test]
    fn test_close_unselected_keeps_selection() {
        let mut fx = Fixture::new();
        let ids = fx.open_n(3);
        fx.session.select(ids[2]).unwrap();
        fx.session.close(ids[0]).unwrap();
        assert_eq!(fx.session.active(), Some(ids[2]));
    }

    #[test]
    fn test_close_unknown_fails() {
        let mut fx = Fixture::new();
        let result = fx.session.close(VisualizerId::new(77));
        assert!(matches!(result, Err(SessionError::VisualizerNotFound(77))));
    }

    #[test]
    fn test_close_all_bound_to() {
        let mut fx = Fixture::new();
        let keep = Snapshot::live(Utc::now());
        let doomed = Snapshot::new(SnapshotId::new(4), "doomed", Utc::now());

        let a = fx.open("probe", &doomed).unwrap();
        let b = fx.open("probe", &keep).unwrap();
        let c = fx.open("probe", &doomed).unwrap();

        let closed = fx.session.close_all_bound_to(doomed.id);
        assert_eq!(closed, vec![a, c]);
        assert_eq!(fx.session.ids(), vec![b]);
        assert_eq!(fx.session.active(), Some(b));
        assert_eq!(fx.closed(), 2);
        assert!(fx
            .session
            .summaries()
            .iter()
            .all(|s| s.snapshot.id != doomed.id));
    }

    /// Visualizer whose close hook fails.
    struct Faulty;

    impl Visualizer for Faulty {
        fn display_name(&self) -> String {
            "faulty".to_string()
        }
        fn initialize(&mut self, _ctx: &VisualizerContext<'_>) -> bool {
            true
        }
        fn on_close(&mut self) {
            panic!("close hook failed");
        }
    }

    #[test]
    fn test_on_close_runs_before_removal() {
        let fx = Fixture::new();
        let mut factory = VisualizerFactory::new();
        factory.register("faulty", "Faulty", || Box::new(Faulty));
        let mut session = VisualizerSession::new(factory);
        let snap = Snapshot::live(Utc::now());
        let ctx = VisualizerContext {
            info: fx.connection.info(),
            state: SessionState::FileOnly,
            connection: &fx.connection,
            store: &fx.store,
            snapshot: &snap,
        };
        let id = session.open("faulty", &ctx).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| session.close(id)));
        assert!(result.is_err());
        // The hook ran while the instance was still open and selected.
        assert_eq!(session.ids(), vec![id]);
        assert_eq!(session.active(), Some(id));
    }

    #[test]
    fn test_close_all_calls_on_close_once_each() {
        let mut fx = Fixture::new();
        fx.open_n(3);
        let closed = fx.session.close_all();
        assert_eq!(closed.len(), 3);
        assert_eq!(fx.closed(), 3);
        assert!(fx.session.is_empty());
        assert_eq!(fx.session.active(), None);
    }

    #[test]
    fn test_close_active() {
        let mut fx = Fixture::new();
        assert_eq!(fx.session.close_active(), None);
        let ids = fx.open_n(2);
        assert_eq!(fx.session.close_active(), Some(ids[1]));
        assert_eq!(fx.session.active(), Some(ids[0]));
    }
}
