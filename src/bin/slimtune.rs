//! SlimTune - profiling session tool
//!
//! Opens a results file as a read-only session, or runs a simulated live
//! session end to end.
//!
//! # Usage
//!
//! ```bash
//! # List snapshots in a results file
//! slimtune list results.json
//!
//! # Rename snapshot 2 (prompts for the name when omitted)
//! slimtune rename results.json 2 "Warm cache"
//!
//! # Delete snapshot 3 without asking
//! slimtune --yes delete results.json 3
//!
//! # Clear live data, keeping it as a snapshot first
//! slimtune clear results.json --snapshot
//!
//! # Simulated live session, saved at the end
//! slimtune demo --rounds 6 --out demo.json
//!
//! # Enable debug logging
//! RUST_LOG=slimtune_session=debug slimtune demo
//! ```

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use slimtune_core::{ConnectionInfo, SessionState, SnapshotId};
use slimtune_session::connection::ConnectBehavior;
use slimtune_session::{
    ClearPolicy, CloseReason, Confirmation, DataRows, FileConnection, MemoryStore, Outcome,
    Prompter, SessionBuilder, SessionConfig, SessionEvent, SessionHandle, SessionManager,
    SimulatedConnection, SimulatedConnector, SnapshotStore, SUMMARY_KIND,
};

/// SlimTune - profiling session coordinator
#[derive(Parser, Debug)]
#[command(name = "slimtune", version, about)]
struct Args {
    /// Configuration file (default: <config dir>/slimtune/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List snapshots in a results file
    List {
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a snapshot and save the file
    Rename {
        file: PathBuf,
        id: i64,
        /// New name; prompted for when omitted
        name: Option<String>,
    },
    /// Delete a snapshot and save the file
    Delete { file: PathBuf, id: i64 },
    /// Clear live data and save the file
    Clear {
        file: PathBuf,
        /// Keep the live data as a snapshot before clearing
        #[arg(long, conflicts_with = "discard")]
        snapshot: bool,
        /// Clear without keeping a snapshot
        #[arg(long)]
        discard: bool,
    },
    /// Write a copy of a results file
    Save { file: PathBuf, dest: PathBuf },
    /// Run a simulated live session
    Demo {
        /// Number of data flushes
        #[arg(long, default_value_t = 4)]
        rounds: u32,
        /// Samples recorded per flush
        #[arg(long, default_value_t = 250)]
        samples: u64,
        /// Milliseconds between flushes
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
        /// Save the results here when done
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

// ============================================================================
// Terminal Prompter
// ============================================================================

/// Prompts on stderr and reads answers from stdin.
struct TerminalPrompter {
    assume_yes: bool,
    input: Box<dyn BufRead + Send>,
}

impl TerminalPrompter {
    fn stdin(assume_yes: bool) -> Self {
        Self::with_input(assume_yes, Box::new(std::io::BufReader::new(std::io::stdin())))
    }

    fn with_input(assume_yes: bool, input: Box<dyn BufRead + Send>) -> Self {
        Self { assume_yes, input }
    }

    /// Reads one answer line. Runs on the session actor's task, so the
    /// worker is handed off while the user types.
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();
        let input = &mut self.input;
        tokio::task::block_in_place(|| {
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line.trim().to_string()),
            }
        })
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, title: &str, message: &str) -> Confirmation {
        if self.assume_yes {
            return Confirmation::Yes;
        }
        loop {
            let Some(answer) = self.read_line(&format!("{title}: {message} [y/n/c] ")) else {
                return Confirmation::Cancel;
            };
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Confirmation::Yes,
                "n" | "no" => return Confirmation::No,
                "c" | "cancel" | "" => return Confirmation::Cancel,
                _ => eprintln!("Please answer y, n or c."),
            }
        }
    }

    fn prompt_text(&mut self, title: &str, message: &str, default: &str) -> Option<String> {
        if self.assume_yes {
            return None;
        }
        let answer = self.read_line(&format!("{title}: {message} [{default}] "))?;
        if answer.is_empty() {
            Some(default.to_string())
        } else {
            Some(answer)
        }
    }

    fn prompt_save_path(&mut self, extension: &str) -> Option<PathBuf> {
        if self.assume_yes {
            return None;
        }
        let answer = self.read_line(&format!("Save results to (*.{extension}, empty to cancel): "))?;
        (!answer.is_empty()).then(|| PathBuf::from(answer))
    }

    fn notify(&mut self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = SessionConfig::resolve(args.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("slimtune={}", config.log_level).parse()?)
                .add_directive(format!("slimtune_core={}", config.log_level).parse()?)
                .add_directive(format!("slimtune_session={}", config.log_level).parse()?),
        )
        .init();

    debug!(?config, "Configuration loaded");
    let prompter = TerminalPrompter::stdin(args.yes);

    let result = match args.command {
        Command::List { file, json } => list(&file, json, prompter, config).await,
        Command::Rename { file, id, name } => {
            rename(&file, SnapshotId::new(id), name, prompter, config).await
        }
        Command::Delete { file, id } => delete(&file, SnapshotId::new(id), prompter, config).await,
        Command::Clear {
            file,
            snapshot,
            discard,
        } => {
            let policy = match (snapshot, discard) {
                (true, _) => Some(ClearPolicy::SnapshotThenClear),
                (_, true) => Some(ClearPolicy::ClearOnly),
                _ => None,
            };
            clear(&file, policy, prompter, config).await
        }
        Command::Save { file, dest } => save(&file, &dest, prompter, config).await,
        Command::Demo {
            rounds,
            samples,
            interval_ms,
            out,
        } => {
            let demo = Demo {
                rounds,
                samples,
                interval: Duration::from_millis(interval_ms),
                out,
            };
            run_demo(demo, prompter, config).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

// ============================================================================
// File Commands
// ============================================================================

/// Opens a results file as a file-only session.
fn open_file_session(
    path: &Path,
    prompter: TerminalPrompter,
    config: SessionConfig,
) -> Result<(SessionHandle, Arc<MemoryStore>)> {
    let store = Arc::new(
        MemoryStore::open(path)
            .with_context(|| format!("Failed to open results file {}", path.display()))?,
    );
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    let connection = Arc::new(FileConnection::new(store.engine(), name));

    let handle = SessionBuilder::new(connection, store.clone())
        .prompter(prompter)
        .config(config)
        .spawn()
        .context("Failed to open session")?;
    Ok((handle, store))
}

/// Saves back to the source file and closes the session.
async fn save_and_close(handle: &SessionHandle, path: &Path) -> Result<()> {
    handle
        .save_to(path)
        .await
        .with_context(|| format!("Failed to save {}", path.display()))?;
    handle.close(CloseReason::Shutdown).await?;
    Ok(())
}

async fn list(path: &Path, json: bool, prompter: TerminalPrompter, config: SessionConfig) -> Result<()> {
    let (handle, store) = open_file_session(path, prompter, config)?;
    let view = handle.snapshots().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        let status = handle.status().await?;
        println!("{} ({})", status.info.caption(), status.status_label);
        for snapshot in &view.snapshots {
            let marker = if snapshot.id == view.active { '*' } else { ' ' };
            let rows = store.rows(snapshot.id).unwrap_or_default();
            println!(
                "{marker} {snapshot}  [{} samples, {} calls]",
                rows.samples, rows.calls
            );
        }
    }

    handle.close(CloseReason::Shutdown).await?;
    Ok(())
}

async fn rename(
    path: &Path,
    id: SnapshotId,
    name: Option<String>,
    prompter: TerminalPrompter,
    config: SessionConfig,
) -> Result<()> {
    let (handle, _) = open_file_session(path, prompter, config)?;
    match handle.rename_snapshot(id, name).await? {
        Outcome::Completed => {
            save_and_close(&handle, path).await?;
            println!("Renamed snapshot {id}");
        }
        Outcome::Cancelled => println!("Rename cancelled"),
    }
    Ok(())
}

async fn delete(
    path: &Path,
    id: SnapshotId,
    prompter: TerminalPrompter,
    config: SessionConfig,
) -> Result<()> {
    let (handle, _) = open_file_session(path, prompter, config)?;
    match handle.delete_snapshot(id).await? {
        Outcome::Completed => {
            save_and_close(&handle, path).await?;
            println!("Deleted snapshot {id}");
        }
        Outcome::Cancelled => println!("Delete cancelled"),
    }
    Ok(())
}

async fn clear(
    path: &Path,
    policy: Option<ClearPolicy>,
    prompter: TerminalPrompter,
    config: SessionConfig,
) -> Result<()> {
    let (handle, _) = open_file_session(path, prompter, config)?;
    match handle.clear_live_data(policy).await? {
        Outcome::Completed => {
            save_and_close(&handle, path).await?;
            println!("Live data cleared");
        }
        Outcome::Cancelled => println!("Clear cancelled"),
    }
    Ok(())
}

async fn save(path: &Path, dest: &Path, prompter: TerminalPrompter, config: SessionConfig) -> Result<()> {
    if path == dest {
        bail!("Destination is the source file");
    }
    let (handle, _) = open_file_session(path, prompter, config)?;
    save_and_close(&handle, dest).await?;
    println!("Saved {}", dest.display());
    Ok(())
}

// ============================================================================
// Demo
// ============================================================================

struct Demo {
    rounds: u32,
    samples: u64,
    interval: Duration,
    out: Option<PathBuf>,
}

async fn run_demo(demo: Demo, prompter: TerminalPrompter, config: SessionConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            shutdown.cancel();
        }
    });

    let store = Arc::new(MemoryStore::new());
    let target = Arc::new(SimulatedConnection::new(ConnectionInfo::target(
        "localhost",
        4100,
        store.engine(),
        "demo",
    )));
    let connector = Arc::new(SimulatedConnector::new("demo", ConnectBehavior::Succeed));

    let handle = SessionBuilder::new(target.clone(), store.clone())
        .connector(connector)
        .prompter(prompter)
        .config(config)
        .spawn()
        .context("Failed to start demo session")?;
    let mut manager = SessionManager::new();
    manager.add(handle.clone());

    let printer = tokio::spawn(print_events(handle.subscribe()));
    let status = handle.status().await?;
    println!("{} ({})", status.info.caption(), status.status_label);

    for round in 1..=demo.rounds {
        store.record(DataRows::new(demo.samples, demo.samples / 10))?;
        target.flush();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(demo.interval) => {}
        }
        if round == demo.rounds / 2 {
            handle.take_snapshot(None).await?;
        }
    }

    if !cancel.is_cancelled() {
        let snapshot = handle.take_snapshot(Some("Demo".to_string())).await?;
        handle.open_visualizer(SUMMARY_KIND, Some(snapshot.id)).await?;
        for summary in handle.visualizers().await? {
            println!("{} on {}: {}", summary.title, summary.snapshot, summary.view_state);
        }

        // Drop the link and come back
        let mut events = handle.subscribe();
        target.drop_link();
        wait_for_state(&mut events, SessionState::Disconnected).await?;
        handle.reconnect().await.context("Reconnect failed")?;
    }

    if let Some(out) = &demo.out {
        handle
            .save_to(out)
            .await
            .with_context(|| format!("Failed to save {}", out.display()))?;
        println!("Saved {}", out.display());
    }

    drop(handle);
    let kept = manager.shutdown_all().await;
    if !kept.is_empty() {
        println!("Close cancelled; discarding session");
    }
    drop(manager);

    if let Err(e) = printer.await {
        debug!(error = %e, "Event printer ended abnormally");
    }
    Ok(())
}

async fn wait_for_state(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: SessionState,
) -> Result<()> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StateChanged { state }) if state == wanted => return Ok(()),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => bail!("Session ended"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .context("Timed out waiting for state change")?
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::SnapshotsRefreshed { snapshots, active }) => {
                println!("  snapshots: {} (active {active})", snapshots.len());
            }
            Ok(SessionEvent::StateChanged { state }) => println!("  state: {state}"),
            Ok(SessionEvent::VisualizerOpened { id, kind, snapshot }) => {
                println!("  opened {kind} #{id} on {snapshot}");
            }
            Ok(SessionEvent::VisualizerClosed { id }) => println!("  closed visualizer #{id}"),
            Ok(SessionEvent::ActiveVisualizerChanged { .. }) => {}
            Ok(SessionEvent::Closed) => {
                println!("  session closed");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read};
    use std::sync::mpsc;

    /// Reader that blocks until the test hands it a line.
    struct GatedInput(mpsc::Receiver<Vec<u8>>);

    impl Read for GatedInput {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    fn gated_prompter() -> (TerminalPrompter, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let prompter =
            TerminalPrompter::with_input(false, Box::new(BufReader::new(GatedInput(rx))));
        (prompter, tx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_pending_prompt_leaves_runtime_responsive() {
        let (mut prompter, tx) = gated_prompter();
        let answer = tokio::spawn(async move { prompter.confirm("Close Connection", "Close?") });

        // The only worker must stay available while the prompt waits.
        let other = tokio::time::timeout(Duration::from_secs(5), tokio::spawn(async { 7 }))
            .await
            .expect("runtime stalled behind pending prompt")
            .unwrap();
        assert_eq!(other, 7);

        tx.send(b"y\n".to_vec()).unwrap();
        assert_eq!(answer.await.unwrap(), Confirmation::Yes);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prompt_answers() {
        let (mut prompter, tx) = gated_prompter();
        tx.send(b"maybe\n".to_vec()).unwrap();
        tx.send(b"n\n".to_vec()).unwrap();
        assert_eq!(prompter.confirm("Clear Data", "Snapshot first?"), Confirmation::No);

        tx.send(b"\n".to_vec()).unwrap();
        assert_eq!(
            prompter.prompt_text("Rename Snapshot", "New name", "User"),
            Some("User".to_string())
        );

        tx.send(b"\n".to_vec()).unwrap();
        assert_eq!(prompter.prompt_save_path("json"), None);

        drop(tx);
        assert_eq!(prompter.confirm("Close Connection", "Close?"), Confirmation::Cancel);
    }

    #[test]
    fn test_assume_yes_never_reads() {
        let (mut prompter, _tx) = gated_prompter();
        prompter.assume_yes = true;
        assert_eq!(prompter.confirm("Close Connection", "Close?"), Confirmation::Yes);
        assert_eq!(prompter.prompt_save_path("json"), None);
    }
}
