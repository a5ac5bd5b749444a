// Race guard: decides whether an async result is still allowed to land.
//
// Loads and saves are tagged when issued. A completion is applied only if
// its tag is still the newest one of its kind and it was not cancelled.
// "Pending" is tracked as the document revision the remote copy is known
// to match, so an ack for an older snapshot never clears newer edits.

use tokio_util::sync::CancellationToken;

use tablesync_client::{ErrorKind, SaveAck, SyncError};

/// Issued with every save; the token aborts it when superseded.
#[derive(Debug, Clone)]
pub(crate) struct SaveTicket {
    seq: u64,
    revision: u64,
    cancel: CancellationToken,
}

impl SaveTicket {
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Document revision the save carries.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadTicket {
    generation: u64,
    /// Document revision when the load was issued.
    base_revision: u64,
}

impl LoadTicket {
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum SaveVerdict {
    Committed(SaveAck),
    Failed(SyncError),
    /// Superseded, cancelled or aborted; drop silently.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadVerdict {
    /// No edits since the load was issued; hydrate from the result.
    Apply,
    /// Local edits exist; the result must not overwrite them.
    KeepLocal,
    /// A newer load was issued or the load was cancelled.
    Stale,
}

#[derive(Debug, Default)]
pub(crate) struct RaceGuard {
    save_seq: u64,
    in_flight_save: Option<SaveTicket>,
    load_generation: u64,
    in_flight_load: Option<LoadTicket>,
    /// Set from load start until the grace window after it resolves.
    hydrating: bool,
    synced_revision: u64,
    auth_blocked: bool,
}

impl RaceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Load ────────────────────────────────────────────────────────

    pub fn begin_load(&mut self, revision: u64) -> LoadTicket {
        self.load_generation += 1;
        let ticket = LoadTicket { generation: self.load_generation, base_revision: revision };
        self.in_flight_load = Some(ticket);
        self.hydrating = true;
        ticket
    }

    pub fn finish_load(&mut self, ticket: LoadTicket, current_revision: u64) -> LoadVerdict {
        if self.in_flight_load != Some(ticket) {
            return LoadVerdict::Stale;
        }
        self.in_flight_load = None;

        if current_revision == ticket.base_revision && current_revision == self.synced_revision {
            LoadVerdict::Apply
        } else {
            LoadVerdict::KeepLocal
        }
    }

    /// The document now mirrors the remote copy at `revision`.
    pub fn mark_synced(&mut self, revision: u64) {
        self.synced_revision = self.synced_revision.max(revision);
    }

    /// Close the grace window opened by load `generation`. Returns false if
    /// a newer load has started since.
    pub fn end_grace(&mut self, generation: u64) -> bool {
        if self.in_flight_load.is_some() || generation != self.load_generation {
            return false;
        }
        self.hydrating = false;
        true
    }

    pub fn cancel_load(&mut self) {
        self.in_flight_load = None;
        self.hydrating = false;
    }

    // ── Save ────────────────────────────────────────────────────────

    /// Issue a save for `revision`, aborting any save still in flight.
    pub fn begin_save(&mut self, revision: u64) -> SaveTicket {
        self.cancel_save();
        self.save_seq += 1;
        let ticket = SaveTicket { seq: self.save_seq, revision, cancel: CancellationToken::new() };
        self.in_flight_save = Some(ticket.clone());
        ticket
    }

    pub fn finish_save(&mut self, ticket: &SaveTicket, result: Result<SaveAck, SyncError>) -> SaveVerdict {
        let current = matches!(&self.in_flight_save, Some(t) if t.seq == ticket.seq);
        if !current || ticket.cancel.is_cancelled() {
            return SaveVerdict::Discarded;
        }
        self.in_flight_save = None;

        match result {
            Ok(ack) => {
                self.mark_synced(ticket.revision);
                SaveVerdict::Committed(ack)
            }
            Err(e) => match e.kind() {
                ErrorKind::Abort => SaveVerdict::Discarded,
                ErrorKind::Auth => {
                    self.auth_blocked = true;
                    SaveVerdict::Failed(e)
                }
                ErrorKind::Network | ErrorKind::Validation => SaveVerdict::Failed(e),
            },
        }
    }

    pub fn cancel_save(&mut self) {
        if let Some(ticket) = self.in_flight_save.take() {
            log::debug!("aborting save #{}", ticket.seq);
            ticket.cancel.cancel();
        }
    }

    // ── Auth ────────────────────────────────────────────────────────

    pub fn block_auth(&mut self) {
        self.auth_blocked = true;
    }

    /// Returns true if a block was lifted.
    pub fn clear_auth_block(&mut self) -> bool {
        std::mem::take(&mut self.auth_blocked)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn has_pending(&self, revision: u64) -> bool {
        revision != self.synced_revision
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight_load.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.in_flight_save.is_some()
    }

    pub fn is_hydrating(&self) -> bool {
        self.hydrating
    }

    pub fn is_auth_blocked(&self) -> bool {
        self.auth_blocked
    }

    /// Edits are applied locally but no save may be armed.
    pub fn suppresses_scheduling(&self) -> bool {
        self.hydrating || self.auth_blocked
    }
}
