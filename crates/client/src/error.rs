//! Error taxonomy for remote table operations.

use thiserror::Error;

/// Error type for load/save operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No credentials configured
    #[error("not authenticated; run `tsync login` first")]
    NotAuthenticated,
    /// Connectivity failure or timeout
    #[error("network error: {0}")]
    Network(String),
    /// Server rejected the request with 429
    #[error("rate limited by server")]
    RateLimited,
    /// 401/403: credential missing, invalid or expired
    #[error("authentication failed: {0}")]
    Auth(String),
    /// 400/422: server rejected the document shape
    #[error("document rejected: {0}")]
    Validation(String),
    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Response body did not match the contract
    #[error("unexpected response: {0}")]
    Parse(String),
    /// Request cancelled by a newer save or by teardown
    #[error("request aborted")]
    Aborted,
}

/// Coarse classification driving the engine's propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient; retried by the next natural edit.
    Network,
    /// Caller must re-authenticate; the engine stops issuing requests.
    Auth,
    /// The document was refused; shown to the user, retried on next edit.
    Validation,
    /// Self-inflicted cancellation; never shown.
    Abort,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated | Self::Auth(_) => ErrorKind::Auth,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Aborted => ErrorKind::Abort,
            Self::Network(_) | Self::RateLimited | Self::Http { .. } | Self::Parse(_) => {
                ErrorKind::Network
            }
        }
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Auth(body),
            400 | 422 => Self::Validation(body),
            429 => Self::RateLimited,
            _ => Self::Http { status, body },
        }
    }

    /// Short text for a status indicator.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Network => match self {
                Self::RateLimited => "Server busy; will retry on next edit".to_string(),
                _ => "Network unavailable; will retry on next edit".to_string(),
            },
            ErrorKind::Auth => "Session expired; please sign in again".to_string(),
            ErrorKind::Validation => format!("Save failed: {}", self),
            ErrorKind::Abort => String::new(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Parse(e.to_string())
        } else {
            SyncError::Network(e.to_string())
        }
    }
}
