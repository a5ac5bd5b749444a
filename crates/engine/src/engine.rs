//! The sync engine: one scope, one document, one remote copy.
//!
//! Edits go through [`SyncEngine`] and are applied synchronously. Each
//! effective change re-arms a debounce timer; when it fires the whole
//! document is saved. A newer save aborts the one in flight, and results
//! that arrive after being superseded are dropped by the race guard.
//!
//! All bookkeeping sits behind one `parking_lot` mutex that is never held
//! across an await. Timer, load and save tasks run on the tokio runtime the
//! engine was started on and report back by taking the lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tablesync_client::{ErrorKind, LoadOutcome, RemoteStore, SaveAck, SyncError};
use tablesync_core::{CellValue, Column, ColumnId, Document, DocumentState, Row, RowId, Scope};

use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::guard::{LoadTicket, LoadVerdict, RaceGuard, SaveTicket, SaveVerdict};
use crate::status::{Operation, PhaseInputs, StatusError, StatusPublisher, SyncStatus};

/// Owns the local document for one scope and keeps the remote copy in step.
///
/// Dropping the engine flushes unsaved edits with a fire-and-forget save;
/// use [`SyncEngine::shutdown`] to wait for it instead.
pub struct SyncEngine {
    shared: Arc<Shared>,
}

struct Shared {
    scope: Scope,
    store: Arc<dyn RemoteStore>,
    config: EngineConfig,
    runtime: Handle,
    status: StatusPublisher,
    inner: Mutex<Inner>,
}

struct Inner {
    doc: DocumentState,
    guard: RaceGuard,
    debounce: Debouncer,
    load_task: Option<JoinHandle<()>>,
    grace_task: Option<JoinHandle<()>>,
    last_saved_at: Option<DateTime<Utc>>,
    remote_updated_at: Option<DateTime<Utc>>,
    last_error: Option<StatusError>,
    saves_completed: u64,
    started: bool,
    torn_down: bool,
}

impl Inner {
    fn new(doc: DocumentState) -> Self {
        Self {
            doc,
            guard: RaceGuard::new(),
            debounce: Debouncer::new(),
            load_task: None,
            grace_task: None,
            last_saved_at: None,
            remote_updated_at: None,
            last_error: None,
            saves_completed: 0,
            started: false,
            torn_down: false,
        }
    }

    fn has_pending(&self) -> bool {
        self.guard.has_pending(self.doc.revision())
    }

    fn status(&self) -> SyncStatus {
        let pending = self.has_pending();
        let auth_blocked = self.guard.is_auth_blocked();
        // Edits made while hydrating are armed when the grace window closes.
        let scheduled = self.debounce.is_armed()
            || (pending && self.guard.is_hydrating() && !auth_blocked && !self.torn_down);

        let phase = PhaseInputs {
            started: self.started,
            saving: self.guard.is_saving(),
            loading: self.guard.is_loading(),
            auth_blocked,
            scheduled,
            pending,
            errored: self.last_error.is_some(),
        }
        .phase();

        SyncStatus {
            phase,
            is_loading: self.guard.is_loading(),
            is_saving: self.guard.is_saving(),
            has_pending_changes: pending,
            save_scheduled: scheduled,
            last_saved_at: self.last_saved_at,
            last_error: self.last_error.clone(),
            auth_required: auth_blocked,
            remote_updated_at: self.remote_updated_at,
            saves_completed: self.saves_completed,
        }
    }
}

impl SyncEngine {
    /// Start syncing `scope` on the current tokio runtime.
    ///
    /// `defaults` is shown until the initial load resolves, and kept if the
    /// remote has no copy yet.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(
        scope: Scope,
        defaults: Document,
        store: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Self {
        Self::start_on(Handle::current(), scope, defaults, store, config)
    }

    pub fn start_on(
        runtime: Handle,
        scope: Scope,
        defaults: Document,
        store: Arc<dyn RemoteStore>,
        config: EngineConfig,
    ) -> Self {
        let doc = DocumentState::new(defaults, config.limits);
        let shared = Arc::new(Shared {
            scope,
            store,
            config,
            runtime,
            status: StatusPublisher::new(),
            inner: Mutex::new(Inner::new(doc)),
        });

        log::info!("{}: sync started (debounce {:?})", shared.scope, shared.config.debounce);
        {
            let mut guard = shared.inner.lock();
            guard.started = true;
            shared.start_load(&mut guard);
        }
        Self { shared }
    }

    pub fn scope(&self) -> &Scope {
        &self.shared.scope
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    // ── Document access ─────────────────────────────────────────────

    pub fn document(&self) -> Document {
        self.shared.inner.lock().doc.document().clone()
    }

    /// Borrow the document without cloning. `f` must not call back into
    /// the engine.
    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(self.shared.inner.lock().doc.document())
    }

    pub fn revision(&self) -> u64 {
        self.shared.inner.lock().doc.revision()
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Run `f` against the document state. A save is scheduled if the
    /// revision moved. `f` must not call back into the engine.
    pub fn update<R>(&self, f: impl FnOnce(&mut DocumentState) -> R) -> R {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;
        let before = inner.doc.revision();
        let out = f(&mut inner.doc);
        if inner.doc.revision() != before {
            self.shared.on_change(inner);
        }
        out
    }

    pub fn set_columns(&self, columns: Vec<Column>) -> bool {
        self.update(|state| state.set_columns(columns))
    }

    pub fn set_rows(&self, rows: Vec<Row>) -> bool {
        self.update(|state| state.set_rows(rows))
    }

    pub fn set_row_heights(&self, heights: std::collections::BTreeMap<RowId, f64>) -> bool {
        self.update(|state| state.set_row_heights(heights))
    }

    pub fn add_row(&self, after: Option<&RowId>) -> RowId {
        self.update(|state| state.add_row(after))
    }

    pub fn delete_row(&self, id: &RowId) -> bool {
        self.update(|state| state.delete_row(id))
    }

    pub fn resize_row(&self, id: &RowId, height: f64) -> bool {
        self.update(|state| state.resize_row(id, height))
    }

    pub fn add_column(&self, title: impl Into<String>, after: Option<&ColumnId>) -> ColumnId {
        let title = title.into();
        self.update(|state| state.add_column(title, after))
    }

    pub fn delete_column(&self, id: &ColumnId) -> bool {
        self.update(|state| state.delete_column(id))
    }

    pub fn rename_column(&self, id: &ColumnId, title: impl Into<String>) -> bool {
        let title = title.into();
        self.update(|state| state.rename_column(id, title))
    }

    pub fn resize_column(&self, id: &ColumnId, width: f64) -> bool {
        self.update(|state| state.resize_column(id, width))
    }

    pub fn move_column(&self, id: &ColumnId, to: usize) -> bool {
        self.update(|state| state.move_column(id, to))
    }

    pub fn edit_cell(&self, row: &RowId, column: &ColumnId, value: impl Into<CellValue>) -> bool {
        let value = value.into();
        self.update(|state| state.edit_cell(row, column, value))
    }

    pub fn clear_cell(&self, row: &RowId, column: &ColumnId) -> bool {
        self.update(|state| state.clear_cell(row, column))
    }

    // ── Remote controls ─────────────────────────────────────────────

    /// Save pending edits now instead of waiting for the debounce.
    /// Returns false if there was nothing to save or auth is required.
    pub fn flush(&self) -> bool {
        self.shared.save_immediately(false)
    }

    /// Save the current document even if nothing changed.
    pub fn save_now(&self) -> bool {
        self.shared.save_immediately(true)
    }

    /// Fetch the remote copy again. It replaces the local document only if
    /// there are no unsaved edits when it arrives.
    pub fn reload(&self) -> bool {
        self.shared.reload()
    }

    /// Resume remote calls after the caller has re-authenticated.
    pub fn clear_auth_failure(&self) {
        self.shared.clear_auth_failure();
    }

    // ── Status ──────────────────────────────────────────────────────

    pub fn status(&self) -> SyncStatus {
        self.shared.status.current()
    }

    /// Receive every status transition. Do not hold a borrow of the
    /// receiver while calling into the engine.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until nothing is loading, saving or scheduled.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.subscribe();
        loop {
            let settled = rx.borrow_and_update().is_settled();
            if settled || rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Stop syncing and wait for the final flush of unsaved edits.
    pub async fn shutdown(self) -> SyncStatus {
        if let Some(final_save) = self.shared.teardown() {
            if let Err(e) = final_save.await {
                log::warn!("{}: final save did not complete: {}", self.shared.scope, e);
            }
        }
        self.shared.status.current()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        // Detached: the final save outlives the engine.
        let _ = self.shared.teardown();
    }
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.status.publish(inner.status());
    }

    fn on_change(self: &Arc<Self>, inner: &mut Inner) {
        if inner.guard.is_auth_blocked() {
            log::debug!("{}: edit kept locally; auth required", self.scope);
        } else if inner.guard.is_hydrating() {
            log::debug!("{}: edit kept locally; load not settled", self.scope);
        } else {
            self.arm_debounce(inner);
        }
        self.publish(inner);
    }

    // ── Debounce ────────────────────────────────────────────────────

    fn arm_debounce(self: &Arc<Self>, inner: &mut Inner) {
        let generation = inner.debounce.rearm();
        let delay = self.config.debounce;
        let weak = Arc::downgrade(self);
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_debounce_fired(generation);
            }
        });
        inner.debounce.set_timer(generation, timer);
    }

    fn on_debounce_fired(self: &Arc<Self>, generation: u64) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down || !inner.debounce.fire(generation) {
            return;
        }
        if inner.has_pending() && !inner.guard.suppresses_scheduling() {
            let _ = self.start_save(inner);
        }
        self.publish(inner);
    }

    // ── Save ────────────────────────────────────────────────────────

    fn start_save(self: &Arc<Self>, inner: &mut Inner) -> JoinHandle<()> {
        let ticket = inner.guard.begin_save(inner.doc.revision());
        let doc = inner.doc.document().clone();
        log::debug!("{}: save #{} at revision {}", self.scope, ticket.seq(), ticket.revision());

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let result = shared.store.save(&shared.scope, &doc, ticket.token()).await;
            shared.finish_save(&ticket, result);
        })
    }

    fn finish_save(&self, ticket: &SaveTicket, result: Result<SaveAck, SyncError>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.guard.finish_save(ticket, result) {
            SaveVerdict::Committed(ack) => {
                log::info!("{}: saved revision {}", self.scope, ticket.revision());
                inner.doc.set_updated_at(ack.updated_at);
                inner.last_saved_at = Some(ack.updated_at);
                inner.remote_updated_at = Some(ack.updated_at);
                inner.saves_completed += 1;
                if !inner.guard.is_auth_blocked() {
                    inner.last_error = None;
                }
            }
            SaveVerdict::Failed(e) => {
                log::warn!("{}: save #{} failed: {}", self.scope, ticket.seq(), e);
                inner.last_error = Some(StatusError::new(Operation::Save, &e));
            }
            SaveVerdict::Discarded => {
                log::debug!("{}: save #{} superseded; result dropped", self.scope, ticket.seq());
            }
        }
        self.publish(inner);
    }

    fn save_immediately(self: &Arc<Self>, force: bool) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down || inner.guard.is_auth_blocked() {
            return false;
        }
        if !force && !inner.has_pending() {
            return false;
        }
        inner.debounce.cancel();
        let _ = self.start_save(inner);
        self.publish(inner);
        true
    }

    // ── Load ────────────────────────────────────────────────────────

    fn start_load(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(task) = inner.load_task.take() {
            task.abort();
        }
        if let Some(task) = inner.grace_task.take() {
            task.abort();
        }
        let ticket = inner.guard.begin_load(inner.doc.revision());
        log::debug!("{}: load #{} issued", self.scope, ticket.generation());

        let shared = Arc::clone(self);
        inner.load_task = Some(self.runtime.spawn(async move {
            let result = shared.store.load(&shared.scope).await;
            shared.finish_load(ticket, result);
        }));
        self.publish(inner);
    }

    fn finish_load(self: &Arc<Self>, ticket: LoadTicket, result: Result<LoadOutcome, SyncError>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down {
            return;
        }
        let verdict = inner.guard.finish_load(ticket, inner.doc.revision());
        if verdict == LoadVerdict::Stale {
            log::debug!("{}: load #{} superseded; result dropped", self.scope, ticket.generation());
            return;
        }
        inner.load_task = None;

        match result {
            Ok(LoadOutcome::Found(doc)) => {
                inner.remote_updated_at = doc.updated_at.or(inner.remote_updated_at);
                if verdict == LoadVerdict::Apply {
                    inner.doc.replace(doc);
                    let revision = inner.doc.revision();
                    inner.guard.mark_synced(revision);
                    log::info!("{}: loaded remote copy", self.scope);
                } else {
                    log::info!("{}: remote copy ignored; local edits are newer", self.scope);
                }
                if !inner.guard.is_auth_blocked() {
                    inner.last_error = None;
                }
            }
            Ok(LoadOutcome::NotFound) => {
                log::info!("{}: no remote copy; keeping defaults", self.scope);
                if !inner.guard.is_auth_blocked() {
                    inner.last_error = None;
                }
            }
            Err(e) => {
                if e.kind() == ErrorKind::Auth {
                    inner.guard.block_auth();
                }
                if e.kind() != ErrorKind::Abort {
                    log::warn!("{}: load failed: {}", self.scope, e);
                    inner.last_error = Some(StatusError::new(Operation::Load, &e));
                }
            }
        }

        self.schedule_grace(inner, ticket.generation());
        self.publish(inner);
    }

    fn schedule_grace(self: &Arc<Self>, inner: &mut Inner, generation: u64) {
        let grace = self.config.load_grace;
        if grace.is_zero() {
            self.end_grace(inner, generation);
            return;
        }
        let weak = Arc::downgrade(self);
        inner.grace_task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(shared) = weak.upgrade() {
                let mut guard = shared.inner.lock();
                shared.end_grace(&mut guard, generation);
                shared.publish(&guard);
            }
        }));
    }

    fn end_grace(self: &Arc<Self>, inner: &mut Inner, generation: u64) {
        if inner.torn_down || !inner.guard.end_grace(generation) {
            return;
        }
        inner.grace_task = None;
        if inner.has_pending() && !inner.guard.is_auth_blocked() {
            log::debug!("{}: scheduling save for edits made while loading", self.scope);
            self.arm_debounce(inner);
        }
    }

    fn reload(self: &Arc<Self>) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down || inner.guard.is_auth_blocked() {
            return false;
        }
        self.start_load(inner);
        true
    }

    // ── Auth ────────────────────────────────────────────────────────

    fn clear_auth_failure(self: &Arc<Self>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down || !inner.guard.clear_auth_block() {
            return;
        }
        log::info!("{}: auth restored; resuming sync", self.scope);
        if inner.last_error.as_ref().is_some_and(|e| e.kind == ErrorKind::Auth) {
            inner.last_error = None;
        }
        if inner.has_pending() && !inner.guard.is_hydrating() {
            self.arm_debounce(inner);
        }
        self.publish(inner);
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Idempotent. Returns the final save if unsaved edits were flushed.
    fn teardown(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.torn_down {
            return None;
        }
        inner.torn_down = true;
        inner.debounce.cancel();
        for task in [inner.load_task.take(), inner.grace_task.take()].into_iter().flatten() {
            task.abort();
        }
        inner.guard.cancel_load();

        let final_save = if inner.has_pending() && !inner.guard.is_auth_blocked() {
            log::info!("{}: flushing unsaved edits on teardown", self.scope);
            Some(self.start_save(inner))
        } else {
            inner.guard.cancel_save();
            None
        };
        self.publish(inner);
        final_save
    }
}
