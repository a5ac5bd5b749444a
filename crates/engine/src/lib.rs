//! Debounced remote synchronization for table documents.
//!
//! A [`SyncEngine`] owns the local copy of one table scope. It loads the
//! remote copy once at start, applies edits immediately, and saves the full
//! document after a quiet interval. Superseded requests are aborted and
//! their late results ignored, so the remote never regresses to an older
//! snapshot and local edits are never overwritten by a load.

mod config;
mod debounce;
mod engine;
mod guard;
mod status;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use status::{Operation, StatusError, SyncPhase, SyncStatus};

pub use tablesync_client::{ErrorKind, LoadOutcome, RemoteStore, SaveAck, SyncError};
pub use tablesync_core::{Document, DocumentState, Scope, TableLimits};
