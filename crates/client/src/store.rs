//! The seam between the sync engine and whatever persists documents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use tablesync_core::{Document, Scope};

use crate::error::SyncError;

/// Result of loading a scope. "No data yet" is an expected state, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Persisted copy, normalized; `updated_at` carries the server timestamp.
    Found(Document),
    NotFound,
}

/// Server acknowledgement of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveAck {
    pub updated_at: DateTime<Utc>,
}

/// Remote persistence for table documents.
///
/// Implementations must honour `cancel` on `save`: once it fires, the call
/// returns [`SyncError::Aborted`] and the in-flight request is dropped.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn load(&self, scope: &Scope) -> Result<LoadOutcome, SyncError>;

    /// Upsert the full document for `scope`. Last writer wins.
    async fn save(
        &self,
        scope: &Scope,
        doc: &Document,
        cancel: &CancellationToken,
    ) -> Result<SaveAck, SyncError>;
}
