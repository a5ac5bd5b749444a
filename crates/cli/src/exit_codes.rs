//! CLI exit codes.
//!
//! Scripts branch on these, so they are part of the shell contract.
//!
//! | Code | Meaning                                          |
//! |------|--------------------------------------------------|
//! | 0    | Success                                          |
//! | 1    | General error                                    |
//! | 2    | Usage or local I/O error (bad args, bad file)    |
//! | 3    | Not authenticated, or credentials rejected       |
//! | 4    | Server unreachable, timed out or rate limited    |
//! | 5    | Server rejected the document                     |

use tablesync_client::{ErrorKind, SyncError};

pub const EXIT_SUCCESS: u8 = 0;

/// Unspecified failure. Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

pub const EXIT_USAGE: u8 = 2;

/// Missing credentials, 401 or 403.
pub const EXIT_AUTH: u8 = 3;

/// Connectivity, timeout, 429, 5xx or an unreadable response.
pub const EXIT_NETWORK: u8 = 4;

/// 400 or 422.
pub const EXIT_VALIDATION: u8 = 5;

/// Map a remote error to its exit code.
pub fn sync_exit_code(err: &SyncError) -> u8 {
    kind_exit_code(err.kind())
}

pub fn kind_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Auth => EXIT_AUTH,
        ErrorKind::Network => EXIT_NETWORK,
        ErrorKind::Validation => EXIT_VALIDATION,
        ErrorKind::Abort => EXIT_ERROR,
    }
}
