//! SlimTune Core - Shared types for profiling sessions
//!
//! This crate provides the domain types shared between the session
//! coordinator (`slimtune-session`) and the `slimtune` binary.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod snapshot;
pub mod state;

// Re-exports for convenience
pub use connection::{ConnectionInfo, ConnectionState};
pub use error::{SessionError, SessionResult};
pub use snapshot::{Snapshot, SnapshotId, LIVE_SNAPSHOT_NAME};
pub use state::{Capabilities, SessionState};
