//! Observable sync status.
//!
//! Derived state only: every field is recomputed from the engine's
//! bookkeeping on each transition and published through a `watch` channel.
//! Subscribers see the latest value; intermediate states may be coalesced.

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use tablesync_client::{ErrorKind, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Engine constructed, no load issued yet
    #[default]
    Uninitialized,
    /// Initial load or reload in flight
    Loading,
    /// Remote copy matches local state
    Idle,
    /// Local edits not yet acknowledged
    PendingSave,
    /// Save request in flight
    Saving,
    /// Last operation failed; see `last_error`
    Error,
}

/// Which remote operation produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Load,
    Save,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
    pub operation: Operation,
    pub kind: ErrorKind,
    /// Short text for an indicator
    pub message: String,
    /// Full error, for logs and tooltips
    pub detail: String,
}

impl StatusError {
    pub fn new(operation: Operation, error: &SyncError) -> Self {
        Self {
            operation,
            kind: error.kind(),
            message: error.user_message(),
            detail: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub is_loading: bool,
    pub is_saving: bool,
    pub has_pending_changes: bool,
    /// A debounce timer is armed or will be armed once the load grace ends.
    pub save_scheduled: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<StatusError>,
    /// Set by a 401/403; remote calls stop until cleared.
    pub auth_required: bool,
    /// Server timestamp from the last load or acknowledged save.
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub saves_completed: u64,
}

impl SyncStatus {
    /// Short label for status bar display.
    pub fn label(&self) -> &'static str {
        match self.phase {
            SyncPhase::Uninitialized => "Not loaded",
            SyncPhase::Loading => "Loading...",
            SyncPhase::Idle => "Saved",
            SyncPhase::PendingSave => "Modified",
            SyncPhase::Saving => "Saving...",
            SyncPhase::Error => match self.last_error.as_ref().map(|e| e.kind) {
                Some(ErrorKind::Auth) => "Sign in required",
                Some(ErrorKind::Validation) => "Save failed",
                Some(ErrorKind::Network) if self.has_pending_changes => "Retry pending",
                Some(ErrorKind::Network) => "Offline",
                _ => "Error",
            },
        }
    }

    /// Nothing in flight and nothing scheduled.
    pub fn is_settled(&self) -> bool {
        self.phase != SyncPhase::Uninitialized
            && !self.is_loading
            && !self.is_saving
            && !self.save_scheduled
    }
}

/// Inputs the phase is derived from, in priority order.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PhaseInputs {
    pub started: bool,
    pub saving: bool,
    pub loading: bool,
    pub auth_blocked: bool,
    pub scheduled: bool,
    pub pending: bool,
    pub errored: bool,
}

impl PhaseInputs {
    pub fn phase(self) -> SyncPhase {
        if !self.started {
            SyncPhase::Uninitialized
        } else if self.saving {
            SyncPhase::Saving
        } else if self.loading {
            SyncPhase::Loading
        } else if self.auth_blocked {
            SyncPhase::Error
        } else if self.scheduled {
            SyncPhase::PendingSave
        } else if self.errored {
            SyncPhase::Error
        } else if self.pending {
            SyncPhase::PendingSave
        } else {
            SyncPhase::Idle
        }
    }
}

/// Single-writer side of the status channel.
pub(crate) struct StatusPublisher {
    tx: watch::Sender<SyncStatus>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::default());
        Self { tx }
    }

    /// Replace the current status; subscribers are only woken on change.
    pub fn publish(&self, next: SyncStatus) {
        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}
