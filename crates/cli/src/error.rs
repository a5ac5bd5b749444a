//! Command failures: an exit code, a message and an optional hint.

use thiserror::Error;

use tablesync_client::{ErrorKind, SyncError};
use tablesync_engine::StatusError;

use crate::exit_codes::{kind_exit_code, sync_exit_code, EXIT_ERROR, EXIT_USAGE};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), hint: None }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, message)
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, message)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Failure reported through the engine's status.
    pub fn from_status(error: &StatusError) -> Self {
        let err = Self::new(kind_exit_code(error.kind), error.detail.clone());
        match error.kind {
            ErrorKind::Auth => err.with_hint("run `tsync login` to refresh credentials"),
            _ => err,
        }
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        let err = Self::new(sync_exit_code(&e), e.to_string());
        match e.kind() {
            ErrorKind::Auth => err.with_hint("run `tsync login` to refresh credentials"),
            ErrorKind::Network => err.with_hint("check `api.base` with `tsync settings`"),
            _ => err,
        }
    }
}
