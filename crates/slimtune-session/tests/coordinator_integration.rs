//! Integration tests for the session coordinator.
//!
//! These drive a spawned session through `SessionBuilder::spawn` and the
//! `SessionHandle` interface, with simulated targets standing in for a
//! profiler.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use slimtune_core::{
    ConnectionInfo, ConnectionState, SessionError, SessionState, Snapshot, SnapshotId,
};
use slimtune_session::connection::{ConnectBehavior, TargetCommand};
use slimtune_session::prompt::{Answer, PromptRecord, ScriptedPrompter};
use slimtune_session::store::StoreResult;
use slimtune_session::{
    ClearPolicy, CloseReason, ConnectionHandle, Confirmation, DataRows, FileConnection,
    MemoryStore, Outcome, SessionBuilder, SessionConfig, SessionEvent, SessionHandle,
    SimulatedConnection, SimulatedConnector, SnapshotStore, StoreError, Visualizer,
    VisualizerContext, VisualizerFactory, SUMMARY_KIND,
};
use tokio::sync::broadcast;
use tokio::time::timeout;

// ============================================================================
// Test Helpers
// ============================================================================

type CloseLog = Arc<Mutex<Vec<Option<ConnectionState>>>>;

/// Records the connection state it observes when closed.
struct ProbeVisualizer {
    connection: Option<Arc<dyn ConnectionHandle>>,
    log: CloseLog,
}

impl Visualizer for ProbeVisualizer {
    fn display_name(&self) -> String {
        "Probe".to_string()
    }

    fn initialize(&mut self, ctx: &VisualizerContext<'_>) -> bool {
        self.connection = Some(Arc::clone(ctx.connection));
        true
    }

    fn on_close(&mut self) {
        let state = self.connection.as_ref().map(|c| c.state());
        self.log.lock().unwrap().push(state);
    }
}

/// Always declines to initialize.
struct PickyVisualizer;

impl Visualizer for PickyVisualizer {
    fn display_name(&self) -> String {
        "Picky".to_string()
    }

    fn initialize(&mut self, _ctx: &VisualizerContext<'_>) -> bool {
        false
    }

    fn on_close(&mut self) {
        panic!("rejected visualizers are never closed");
    }
}

fn factory(log: &CloseLog) -> VisualizerFactory {
    let mut factory = VisualizerFactory::with_builtins();
    let log = Arc::clone(log);
    factory.register("probe", "Probe", move || {
        Box::new(ProbeVisualizer {
            connection: None,
            log: Arc::clone(&log),
        })
    });
    factory.register("picky", "Picky", || Box::new(PickyVisualizer));
    factory
}

fn target() -> Arc<SimulatedConnection> {
    Arc::new(SimulatedConnection::new(ConnectionInfo::target(
        "localhost",
        4000,
        "memory",
        "app",
    )))
}

struct LiveSession {
    handle: SessionHandle,
    store: Arc<MemoryStore>,
    target: Arc<SimulatedConnection>,
    connector: Arc<SimulatedConnector>,
    prompter: ScriptedPrompter,
    closes: CloseLog,
}

fn live_session(config: SessionConfig) -> LiveSession {
    let store = Arc::new(MemoryStore::new());
    let target = target();
    let connector = Arc::new(SimulatedConnector::new("app", ConnectBehavior::Succeed));
    let prompter = ScriptedPrompter::default();
    let closes = CloseLog::default();

    let handle = SessionBuilder::new(target.clone(), store.clone())
        .connector(connector.clone())
        .visualizers(factory(&closes))
        .prompter(prompter.clone())
        .config(config)
        .spawn()
        .expect("session should open");

    LiveSession {
        handle,
        store,
        target,
        connector,
        prompter,
        closes,
    }
}

/// Waits for the first event matching `pred`.
async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn take(handle: &SessionHandle, name: &str) -> Snapshot {
    handle
        .take_snapshot(Some(name.to_string()))
        .await
        .expect("snapshot should be taken")
}

/// Store wrapper that can be switched into a failing mode.
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("disk offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SnapshotStore for FlakyStore {
    fn engine(&self) -> &str {
        self.inner.engine()
    }

    fn extension(&self) -> &str {
        self.inner.extension()
    }

    fn in_memory(&self) -> bool {
        self.inner.in_memory()
    }

    fn list_snapshots(&self) -> StoreResult<Vec<Snapshot>> {
        self.check()?;
        self.inner.list_snapshots()
    }

    fn create_snapshot(&self, name: &str) -> StoreResult<Snapshot> {
        self.check()?;
        self.inner.create_snapshot(name)
    }

    fn rename_snapshot(&self, id: SnapshotId, name: &str) -> StoreResult<()> {
        self.check()?;
        self.inner.rename_snapshot(id, name)
    }

    fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        self.check()?;
        self.inner.delete_snapshot(id)
    }

    fn rows(&self, id: SnapshotId) -> StoreResult<DataRows> {
        self.check()?;
        self.inner.rows(id)
    }

    fn clear_live_data(&self) -> StoreResult<()> {
        self.check()?;
        self.inner.clear_live_data()
    }

    fn snapshot_then_clear(&self, name: &str) -> StoreResult<Snapshot> {
        self.check()?;
        self.inner.snapshot_then_clear(name)
    }

    fn save(&self, path: &Path) -> StoreResult<()> {
        self.check()?;
        self.inner.save(path)
    }
}

// ============================================================================
// Lifecycle and Notifications
// ============================================================================

#[tokio::test]
async fn test_live_session_opens_with_live_snapshot() {
    let session = live_session(SessionConfig::default());

    let status = session.handle.status().await.unwrap();
    assert_eq!(status.state, SessionState::Live);
    assert_eq!(status.status_label, "Running");
    assert_eq!(status.info.caption(), "app - localhost:4000 [memory]");

    let list = session.handle.snapshots().await.unwrap();
    assert_eq!(list.ids(), vec![SnapshotId::LIVE]);
    assert_eq!(list.active, SnapshotId::LIVE);
}

#[tokio::test]
async fn test_data_flush_refreshes_and_preserves_selection() {
    let session = live_session(SessionConfig::default());
    let a = take(&session.handle, "A").await;
    session.handle.select_snapshot(a.id).await.unwrap();

    // Data written by the profiler outside the session
    session.store.create_snapshot("B").unwrap();

    let mut events = session.handle.subscribe();
    assert!(session.target.flush());

    let event = wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotsRefreshed { snapshots, .. } if snapshots.len() == 3)
    })
    .await;
    match event {
        SessionEvent::SnapshotsRefreshed { snapshots, active } => {
            assert_eq!(active, a.id);
            assert_eq!(snapshots.first().map(|s| s.id), Some(SnapshotId::LIVE));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_flush_after_selected_snapshot_deleted_elsewhere_selects_live() {
    let session = live_session(SessionConfig::default());
    let a = take(&session.handle, "A").await;
    session.handle.select_snapshot(a.id).await.unwrap();

    session.store.delete_snapshot(a.id).unwrap();

    let mut events = session.handle.subscribe();
    session.target.flush();
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotsRefreshed { active, .. } if *active == SnapshotId::LIVE)
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_disables_live_commands() {
    let session = live_session(SessionConfig::default());
    let mut events = session.handle.subscribe();

    session.target.drop_link();
    wait_for(&mut events, |e| {
        *e == SessionEvent::StateChanged {
            state: SessionState::Disconnected,
        }
    })
    .await;

    let status = session.handle.status().await.unwrap();
    assert!(!status.capabilities.take_snapshot);
    assert!(!status.capabilities.suspend_resume);
    assert!(status.capabilities.reconnect);

    assert!(matches!(
        session.handle.take_snapshot(None).await,
        Err(SessionError::InvalidOperation(_))
    ));
    assert!(!session.handle.suspend_target().await.unwrap());
}

#[tokio::test]
async fn test_target_control_forwarded_while_live() {
    let session = live_session(SessionConfig::default());

    assert!(session.handle.suspend_target().await.unwrap());
    assert!(session.handle.resume_target().await.unwrap());
    assert!(session.handle.pause_sampling().await.unwrap());

    assert_eq!(
        session.target.commands(),
        vec![
            TargetCommand::Suspend,
            TargetCommand::Resume,
            TargetCommand::SetSampling(false)
        ]
    );
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test]
async fn test_reconnect_from_disconnected_goes_live() {
    let session = live_session(SessionConfig::default());
    let mut events = session.handle.subscribe();

    session.target.drop_link();
    wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged { .. })).await;

    session.handle.reconnect().await.unwrap();
    assert_eq!(
        session.handle.status().await.unwrap().state,
        SessionState::Live
    );
    assert_eq!(session.connector.attempts(), 1);
    assert!(session.target.is_disposed());

    // Notifications now come from the new link
    let fresh = session.connector.last_connection().unwrap();
    session.store.create_snapshot("after").unwrap();
    assert!(fresh.flush());
    wait_for(&mut events, |e| {
        matches!(e, SessionEvent::SnapshotsRefreshed { snapshots, .. } if snapshots.len() == 2)
    })
    .await;
}

#[tokio::test]
async fn test_reconnect_while_live_is_rejected() {
    let session = live_session(SessionConfig::default());
    assert!(matches!(
        session.handle.reconnect().await,
        Err(SessionError::InvalidOperation(_))
    ));
    assert_eq!(session.connector.attempts(), 0);
}

#[tokio::test]
async fn test_reconnect_from_file_only_is_rejected() {
    let connector = Arc::new(SimulatedConnector::new("app", ConnectBehavior::Succeed));
    let handle = SessionBuilder::new(
        Arc::new(FileConnection::new("memory", "results")),
        Arc::new(MemoryStore::new()),
    )
    .connector(connector.clone())
    .spawn()
    .unwrap();

    assert!(matches!(
        handle.reconnect().await,
        Err(SessionError::InvalidOperation(_))
    ));
    assert_eq!(handle.status().await.unwrap().state, SessionState::FileOnly);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_reconnect_failure_leaves_state_unchanged() {
    let session = live_session(SessionConfig::default());
    session
        .connector
        .set_behavior(ConnectBehavior::Fail("refused".to_string()));
    let mut events = session.handle.subscribe();

    session.target.drop_link();
    wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged { .. })).await;

    assert_eq!(
        session.handle.reconnect().await,
        Err(SessionError::ReconnectFailed("refused".to_string()))
    );
    assert_eq!(
        session.handle.status().await.unwrap().state,
        SessionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_times_out() {
    let config = SessionConfig {
        reconnect_timeout_secs: 2,
        ..SessionConfig::default()
    };
    let session = live_session(config);
    session.connector.set_behavior(ConnectBehavior::Hang);
    let mut events = session.handle.subscribe();

    session.target.drop_link();
    wait_for(&mut events, |e| matches!(e, SessionEvent::StateChanged { .. })).await;

    let result = session.handle.reconnect().await;
    assert!(matches!(result, Err(SessionError::ReconnectFailed(_))));
    assert_eq!(
        session.handle.status().await.unwrap().state,
        SessionState::Disconnected
    );

    // A later attempt can still succeed
    session.connector.set_behavior(ConnectBehavior::Succeed);
    session.handle.reconnect().await.unwrap();
    assert_eq!(session.connector.attempts(), 2);
}

// ============================================================================
// Snapshots and Visualizers
// ============================================================================

#[tokio::test]
async fn test_delete_cascades_to_bound_visualizers() {
    let session = live_session(SessionConfig::default());
    session.store.record(DataRows::new(100, 7)).unwrap();
    let doomed = take(&session.handle, "doomed").await;
    let kept = take(&session.handle, "kept").await;

    let a = session
        .handle
        .open_visualizer(SUMMARY_KIND, Some(doomed.id))
        .await
        .unwrap();
    let b = session
        .handle
        .open_visualizer(SUMMARY_KIND, Some(kept.id))
        .await
        .unwrap();
    let c = session
        .handle
        .open_visualizer("probe", Some(doomed.id))
        .await
        .unwrap();

    let summaries = session.handle.visualizers().await.unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].view_state["samples"], 100);

    session.prompter.push(Answer::Confirm(Confirmation::Yes));
    let outcome = session.handle.delete_snapshot(doomed.id).await.unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let remaining = session.handle.visualizers().await.unwrap();
    assert_eq!(remaining.iter().map(|v| v.id).collect::<Vec<_>>(), vec![b]);
    assert!(remaining.iter().all(|v| v.snapshot.id != doomed.id));
    assert!(remaining[0].active);
    assert_ne!(a, c);

    assert_eq!(session.closes.lock().unwrap().len(), 1);
    assert!(!session.store.contains(doomed.id).unwrap());
}

#[tokio::test]
async fn test_live_snapshot_rename_and_delete_rejected() {
    let session = live_session(SessionConfig::default());

    assert!(matches!(
        session
            .handle
            .rename_snapshot(SnapshotId::LIVE, Some("x".to_string()))
            .await,
        Err(SessionError::InvalidOperation(_))
    ));
    assert!(matches!(
        session.handle.delete_snapshot(SnapshotId::LIVE).await,
        Err(SessionError::InvalidOperation(_))
    ));
    assert!(session.prompter.log().is_empty());
}

#[tokio::test]
async fn test_rename_snapshot() {
    let session = live_session(SessionConfig::default());
    let snapshot = take(&session.handle, "before").await;

    let outcome = session
        .handle
        .rename_snapshot(snapshot.id, Some("after".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    let list = session.handle.snapshots().await.unwrap();
    let renamed = list.snapshots.iter().find(|s| s.id == snapshot.id).unwrap();
    assert_eq!(renamed.name, "after");
}

#[tokio::test]
async fn test_rejected_open_leaves_set_unchanged() {
    let session = live_session(SessionConfig::default());
    let first = session
        .handle
        .open_visualizer(SUMMARY_KIND, None)
        .await
        .unwrap();

    let result = session.handle.open_visualizer("picky", None).await;
    assert_eq!(
        result,
        Err(SessionError::InitializationRejected {
            kind: "picky".to_string()
        })
    );

    let status = session.handle.status().await.unwrap();
    assert_eq!(status.visualizer_count, 1);
    assert_eq!(status.active_visualizer, Some(first));
}

#[tokio::test]
async fn test_close_active_visualizer_selection() {
    let session = live_session(SessionConfig::default());
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(
            session
                .handle
                .open_visualizer(SUMMARY_KIND, None)
                .await
                .unwrap(),
        );
    }

    // Select the middle one and close it: the right neighbour takes over
    session.handle.select_visualizer(ids[1]).await.unwrap();
    assert_eq!(
        session.handle.close_active_visualizer().await.unwrap(),
        Some(ids[1])
    );
    assert_eq!(
        session.handle.status().await.unwrap().active_visualizer,
        Some(ids[2])
    );

    // Closing the rightmost falls back to the new rightmost
    session.handle.close_visualizer(ids[2]).await.unwrap();
    assert_eq!(
        session.handle.status().await.unwrap().active_visualizer,
        Some(ids[0])
    );

    session.handle.close_visualizer(ids[0]).await.unwrap();
    let status = session.handle.status().await.unwrap();
    assert_eq!(status.active_visualizer, None);
    assert!(!status.capabilities.close_visualizer);
    assert_eq!(session.handle.close_active_visualizer().await.unwrap(), None);
}

#[tokio::test]
async fn test_clear_snapshot_then_clear() {
    let session = live_session(SessionConfig::default());
    session.store.record(DataRows::new(40, 4)).unwrap();

    let outcome = session
        .handle
        .clear_live_data(Some(ClearPolicy::SnapshotThenClear))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    assert!(session.store.rows(SnapshotId::LIVE).unwrap().is_empty());
    let list = session.handle.snapshots().await.unwrap();
    let saved = list
        .snapshots
        .iter()
        .find(|s| s.name == "Cleared Data")
        .expect("snapshot committed before clearing");
    assert_eq!(session.store.rows(saved.id).unwrap(), DataRows::new(40, 4));
}

#[tokio::test]
async fn test_failed_snapshot_then_clear_keeps_live_data() {
    let store = Arc::new(FlakyStore::new());
    let handle = SessionBuilder::new(target(), store.clone()).spawn().unwrap();
    store.inner.record(DataRows::new(40, 4)).unwrap();
    let before = handle.snapshots().await.unwrap();

    store.set_failing(true);
    assert!(matches!(
        handle.clear_live_data(Some(ClearPolicy::SnapshotThenClear)).await,
        Err(SessionError::StoreUnavailable(_))
    ));

    store.set_failing(false);
    assert_eq!(store.rows(SnapshotId::LIVE).unwrap(), DataRows::new(40, 4));
    let after = handle.refresh().await.unwrap();
    assert_eq!(after.ids(), before.ids());
    assert!(after.snapshots.iter().all(|s| s.name != "Cleared Data"));
}

#[tokio::test]
async fn test_store_failure_is_reported_without_partial_mutation() {
    let store = Arc::new(FlakyStore::new());
    let handle = SessionBuilder::new(target(), store.clone()).spawn().unwrap();
    let before = handle.snapshots().await.unwrap();

    store.set_failing(true);
    assert!(matches!(
        handle.take_snapshot(None).await,
        Err(SessionError::StoreUnavailable(_))
    ));
    assert!(matches!(
        handle.refresh().await,
        Err(SessionError::StoreUnavailable(_))
    ));
    assert_eq!(handle.snapshots().await.unwrap(), before);

    store.set_failing(false);
    assert_eq!(handle.refresh().await.unwrap().snapshots.len(), 1);
}

#[tokio::test]
async fn test_open_fails_when_store_unavailable() {
    let store = Arc::new(FlakyStore::new());
    store.set_failing(true);
    let target = target();

    let result = SessionBuilder::new(target.clone(), store).spawn();
    assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
    assert!(target.is_disposed());
}

// ============================================================================
// Saving
// ============================================================================

#[tokio::test]
async fn test_save_results_retries_until_success() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("missing").join("results.json");
    let good = dir.path().join("results.json");

    let session = live_session(SessionConfig::default());
    take(&session.handle, "kept").await;
    session.prompter.push(Answer::SavePath(Some(bad)));
    session.prompter.push(Answer::SavePath(Some(good.clone())));

    let outcome = session.handle.save_results().await.unwrap();
    assert_eq!(outcome, Outcome::Completed);
    assert!(good.exists());

    let log = session.prompter.log();
    assert!(log
        .iter()
        .any(|r| matches!(r, PromptRecord::Notify { title, .. } if title == "Save Failed")));

    // The saved file opens as a store with the same snapshots
    let reopened = MemoryStore::open(&good).unwrap();
    assert_eq!(reopened.list_snapshots().unwrap().len(), 2);
}

#[tokio::test]
async fn test_save_results_cancelled() {
    let session = live_session(SessionConfig::default());
    assert_eq!(
        session.handle.save_results().await.unwrap(),
        Outcome::Cancelled
    );
}

#[tokio::test]
async fn test_save_to_reports_failure() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("nope").join("results.json");

    let session = live_session(SessionConfig::default());
    assert!(matches!(
        session.handle.save_to(&bad).await,
        Err(SessionError::SaveFailed { path, .. }) if path == bad
    ));
}

// ============================================================================
// Close / Teardown
// ============================================================================

#[tokio::test]
async fn test_close_cancel_then_confirm() {
    let session = live_session(SessionConfig::default());
    session
        .handle
        .open_visualizer("probe", None)
        .await
        .unwrap();
    let mut events = session.handle.subscribe();

    session.prompter.push(Answer::Confirm(Confirmation::No));
    assert_eq!(
        session.handle.close(CloseReason::User).await.unwrap(),
        Outcome::Cancelled
    );
    assert!(!session.target.is_disposed());

    session.prompter.push(Answer::Confirm(Confirmation::Yes));
    assert_eq!(
        session.handle.close(CloseReason::User).await.unwrap(),
        Outcome::Completed
    );
    wait_for(&mut events, |e| *e == SessionEvent::Closed).await;

    // on_close ran while the connection was still up
    assert_eq!(
        *session.closes.lock().unwrap(),
        vec![Some(ConnectionState::Running)]
    );
    assert!(session.target.is_disposed());
    assert_eq!(
        session.handle.status().await,
        Err(SessionError::ChannelClosed)
    );
}

#[tokio::test]
async fn test_dropping_handles_tears_down() {
    let LiveSession {
        handle,
        target,
        closes,
        ..
    } = live_session(SessionConfig::default());
    handle.open_visualizer("probe", None).await.unwrap();
    let mut events = handle.subscribe();

    drop(handle);
    wait_for(&mut events, |e| *e == SessionEvent::Closed).await;

    assert!(target.is_disposed());
    assert_eq!(*closes.lock().unwrap(), vec![Some(ConnectionState::Running)]);
}

#[tokio::test]
async fn test_visualizer_kinds_listed() {
    let session = live_session(SessionConfig::default());
    let kinds = session.handle.visualizer_kinds().await.unwrap();
    let names: Vec<_> = kinds.iter().map(|k| k.kind.as_str()).collect();
    assert_eq!(names, vec![SUMMARY_KIND, "probe", "picky"]);
}
