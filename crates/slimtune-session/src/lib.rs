//! SlimTune Session - coordinator for one profiling session
//!
//! - `coordinator` - session actor, handle and builder
//! - `registry` - cached, ordered snapshot list with selection
//! - `visualizer` - visualizer contract, factory and the open set
//! - `store` - snapshot store contract and the in-memory/results-file store
//! - `connection` - connection contract, notifications and bundled links
//! - `prompt` - user confirmation contract
//! - `manager` - owner of every open session
//! - `config` - session configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       SessionActor                       │
//! │  ┌──────────────────┐  ┌──────────────────┐              │
//! │  │ SnapshotRegistry │  │VisualizerSession │  Prompter    │
//! │  └────────┬─────────┘  └────────┬─────────┘              │
//! │           │ refresh             │ initialize / on_close  │
//! │           ▼                     ▼                        │
//! │     SnapshotStore        ConnectionHandle ── Subscription│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//!   outside tests
//! - All fallible operations return `Result` or `Option`

pub mod config;
pub mod connection;
pub mod coordinator;
pub mod manager;
pub mod prompt;
pub mod registry;
pub mod store;
pub mod visualizer;

pub use config::{ConfigError, SessionConfig};
pub use connection::{
    ConnectionEvent, ConnectionHandle, Connector, FileConnection, Notifier, SimulatedConnection,
    SimulatedConnector, Subscription,
};
pub use coordinator::{
    CloseReason, Outcome, SessionBuilder, SessionEvent, SessionHandle, SessionStatus,
    SnapshotListView,
};
pub use manager::{SessionKey, SessionManager};
pub use prompt::{AssumeYes, Confirmation, Prompter};
pub use registry::{ClearPolicy, SnapshotRegistry};
pub use store::{DataRows, MemoryStore, SnapshotStore, StoreError};
pub use visualizer::{
    SnapshotSummary, Visualizer, VisualizerContext, VisualizerFactory, VisualizerId,
    VisualizerSession, VisualizerSummary, SUMMARY_KIND,
};
