//! Engine behaviour. Most cases run under paused tokio time; the last one
//! runs on a real worker pool.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio::runtime::Handle;

use common::{config, defaults, ms, remote, scope, MockStore, DEBOUNCE, GRACE};
use tablesync_core::{CellValue, ColumnId, Document, RowId};
use tablesync_engine::{
    ErrorKind, LoadOutcome, Operation, RemoteStore, SyncEngine, SyncError, SyncPhase,
};

fn start(store: &Arc<MockStore>) -> SyncEngine {
    let store: Arc<dyn RemoteStore> = store.clone();
    SyncEngine::start(scope(), defaults(), store, config())
}

/// Wait for the initial load and its grace window.
async fn ready(engine: &SyncEngine) {
    engine.wait_until_idle().await;
    tokio::time::sleep(GRACE * 2).await;
}

fn edit(engine: &SyncEngine, value: &str) -> bool {
    engine.edit_cell(&RowId::from("revenue"), &ColumnId::from("2024"), value)
}

fn cell_2024(doc: &Document) -> Option<CellValue> {
    doc.cell("revenue", "2024").cloned()
}

// ── Debounce ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rapid_edits_during_load_coalesce_into_one_save() {
    let store = MockStore::new().then_load(ms(50), Ok(LoadOutcome::Found(remote()))).shared();
    let engine = start(&store);

    // The load lands 50ms after the first edit and must not clobber it.
    edit(&engine, "a");
    tokio::time::sleep(ms(100)).await;
    edit(&engine, "b");
    tokio::time::sleep(ms(100)).await;
    edit(&engine, "c");
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].started >= ms(500) && saves[0].started < ms(510), "{:?}", saves[0].started);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("c")));

    let doc = engine.document();
    assert_eq!(cell_2024(&doc), Some(CellValue::from("c")));
    assert!(doc.row("cogs").is_none());
    assert_eq!(engine.status().phase, SyncPhase::Idle);
    assert!(engine.status().remote_updated_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_save_fires_one_debounce_after_last_edit() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    let mut last_edit = store.elapsed();
    for value in ["1", "2", "3", "4", "5"] {
        last_edit = store.elapsed();
        edit(&engine, value);
        tokio::time::sleep(ms(100)).await;
    }
    assert!(store.saves().is_empty());
    assert_eq!(engine.status().phase, SyncPhase::PendingSave);
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("5")));
    let delay = saves[0].started - last_edit;
    assert!(delay >= DEBOUNCE && delay < DEBOUNCE + ms(10), "{:?}", delay);
}

#[tokio::test(start_paused = true)]
async fn test_status_transitions_through_a_save() {
    let store = MockStore::new().with_save_delay(ms(100)).shared();
    let engine = start(&store);
    assert_eq!(engine.status().phase, SyncPhase::Loading);
    ready(&engine).await;
    assert_eq!(engine.status().phase, SyncPhase::Idle);

    edit(&engine, "x");
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::PendingSave);
    assert!(status.has_pending_changes);
    assert_eq!(status.label(), "Modified");

    tokio::time::sleep(DEBOUNCE + ms(10)).await;
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Saving);
    assert!(status.is_saving);

    engine.wait_until_idle().await;
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.label(), "Saved");
    assert!(!status.has_pending_changes);
    assert!(status.last_saved_at.is_some());
    assert_eq!(status.saves_completed, 1);
    // The server timestamp lands on the document without counting as an edit.
    assert_eq!(engine.document().updated_at, status.last_saved_at);
    assert_eq!(engine.revision(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_edit_schedules_nothing() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    // min_rows = 1 keeps the only row.
    assert!(!engine.delete_row(&RowId::from("revenue")));
    assert!(!engine.rename_column(&ColumnId::from("missing"), "Nope"));
    tokio::time::sleep(ms(2_000)).await;

    assert!(store.saves().is_empty());
    assert_eq!(engine.status().phase, SyncPhase::Idle);
    assert_eq!(engine.revision(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_structural_edits_are_saved_together() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    let row = engine.add_row(Some(&RowId::from("revenue")));
    let col = engine.add_column("2025", None);
    engine.edit_cell(&row, &col, 42.0);
    engine.resize_column(&col, 140.0);
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    let saved = &saves[0].doc;
    assert_eq!(saved.rows.len(), 2);
    assert_eq!(saved.columns.last().map(|c| c.id.clone()), Some(col.clone()));
    assert_eq!(saved.cell(row.as_str(), col.as_str()), Some(&CellValue::Number(42.0)));
    assert_eq!(saved, &engine.document());
}

// ── Supersede ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_newer_save_aborts_in_flight_save() {
    let store = MockStore::new().with_save_delay(ms(1_000)).shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "first");
    tokio::time::sleep(ms(400)).await;
    assert_eq!(store.saves().len(), 1);

    edit(&engine, "second");
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert!(saves[0].aborted);
    assert!(!saves[0].completed);
    assert!(saves[1].completed);
    assert_eq!(cell_2024(&saves[1].doc), Some(CellValue::from("second")));

    let status = engine.status();
    assert_eq!(status.saves_completed, 1);
    assert!(!status.has_pending_changes);
    assert!(status.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_late_response_from_superseded_save_is_ignored() {
    let store = MockStore::new()
        .then_save_ignoring_cancel(ms(1_000))
        .then_save(ms(2_000), Ok(()))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "first");
    tokio::time::sleep(ms(400)).await;
    edit(&engine, "second");

    // The first save answers while the second is still in flight.
    tokio::time::sleep(ms(1_000)).await;
    assert!(store.saves()[0].completed);
    let status = engine.status();
    assert_eq!(status.saves_completed, 0);
    assert!(status.last_saved_at.is_none());
    assert!(status.has_pending_changes);
    assert!(status.is_saving);

    engine.wait_until_idle().await;
    let status = engine.status();
    assert_eq!(status.saves_completed, 1);
    assert!(!status.has_pending_changes);
}

#[tokio::test(start_paused = true)]
async fn test_ack_for_older_snapshot_keeps_newer_edits_pending() {
    let store = MockStore::new().with_save_delay(ms(200)).shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "first");
    tokio::time::sleep(ms(400)).await;
    edit(&engine, "second");

    // First save acked; the second edit is still waiting on its debounce.
    tokio::time::sleep(ms(150)).await;
    let status = engine.status();
    assert_eq!(status.saves_completed, 1);
    assert!(status.has_pending_changes);
    assert_eq!(status.phase, SyncPhase::PendingSave);

    engine.wait_until_idle().await;
    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert!(saves.iter().all(|s| s.completed));
    assert_eq!(cell_2024(&saves[1].doc), Some(CellValue::from("second")));
    assert!(!engine.status().has_pending_changes);
}

// ── Load ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_load_hydrates_untouched_document_without_saving() {
    let store = MockStore::new().then_load(ms(50), Ok(LoadOutcome::Found(remote()))).shared();
    let engine = start(&store);
    engine.wait_until_idle().await;
    tokio::time::sleep(ms(2_000)).await;

    assert_eq!(engine.document(), remote());
    assert!(store.saves().is_empty());
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(!status.has_pending_changes);
    assert_eq!(status.remote_updated_at, remote().updated_at);
}

#[tokio::test(start_paused = true)]
async fn test_missing_remote_keeps_defaults() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    assert_eq!(engine.document(), defaults());
    assert_eq!(store.load_count(), 1);
    assert_eq!(engine.status().phase, SyncPhase::Idle);
    assert!(store.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_grace_is_saved_after_grace() {
    let store = MockStore::new().then_load(ms(50), Ok(LoadOutcome::Found(remote()))).shared();
    let engine = start(&store);
    engine.wait_until_idle().await;

    // Hydrated, but the grace window is still open.
    edit(&engine, "during-grace");
    assert!(engine.status().save_scheduled);
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].started >= ms(50) + GRACE + DEBOUNCE, "{:?}", saves[0].started);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("during-grace")));
    // The edit applies on top of the hydrated copy.
    assert!(saves[0].doc.row("cogs").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_leaves_defaults_usable() {
    let store = MockStore::new()
        .then_load(ms(10), Err(SyncError::Network("connection refused".into())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Error);
    let error = status.last_error.unwrap();
    assert_eq!(error.operation, Operation::Load);
    assert_eq!(error.kind, ErrorKind::Network);
    assert_eq!(engine.document(), defaults());

    edit(&engine, "offline-edit");
    engine.wait_until_idle().await;
    assert_eq!(store.saves().len(), 1);
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reload_keeps_local_edits_over_remote() {
    let store = MockStore::new()
        .then_load(ms(0), Ok(LoadOutcome::NotFound))
        .then_load(ms(50), Ok(LoadOutcome::Found(remote())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "local");
    assert!(engine.reload());
    engine.wait_until_idle().await;

    assert_eq!(store.load_count(), 2);
    let doc = engine.document();
    assert_eq!(cell_2024(&doc), Some(CellValue::from("local")));
    assert!(doc.row("cogs").is_none());
    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("local")));
}

#[tokio::test(start_paused = true)]
async fn test_reload_applies_remote_when_clean() {
    let store = MockStore::new()
        .then_load(ms(0), Ok(LoadOutcome::NotFound))
        .then_load(ms(50), Ok(LoadOutcome::Found(remote())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    assert!(engine.reload());
    assert_eq!(engine.status().phase, SyncPhase::Loading);
    engine.wait_until_idle().await;

    assert_eq!(engine.document(), remote());
    assert!(store.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_reload_result_is_dropped() {
    let mut newer = remote();
    newer.rows.truncate(1);
    let store = MockStore::new()
        .then_load(ms(0), Ok(LoadOutcome::NotFound))
        .then_load(ms(500), Ok(LoadOutcome::Found(remote())))
        .then_load(ms(50), Ok(LoadOutcome::Found(newer.clone())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    engine.reload();
    tokio::time::sleep(ms(10)).await;
    engine.reload();
    engine.wait_until_idle().await;
    tokio::time::sleep(ms(1_000)).await;

    assert_eq!(engine.document(), newer);
}

// ── Errors ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_network_error_waits_for_next_edit() {
    let store = MockStore::new()
        .then_save(ms(50), Err(SyncError::Network("timeout".into())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "x");
    engine.wait_until_idle().await;

    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Error);
    assert!(status.has_pending_changes);
    assert_eq!(status.label(), "Retry pending");
    let error = status.last_error.clone().unwrap();
    assert_eq!(error.operation, Operation::Save);
    assert_eq!(error.kind, ErrorKind::Network);

    // No automatic retry.
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(store.saves().len(), 1);

    edit(&engine, "y");
    engine.wait_until_idle().await;
    assert_eq!(store.saves().len(), 2);
    let status = engine.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert!(status.last_error.is_none());
    assert!(!status.has_pending_changes);
}

#[tokio::test(start_paused = true)]
async fn test_validation_error_is_surfaced() {
    let store = MockStore::new()
        .then_save(ms(50), Err(SyncError::Validation("columns must not be empty".into())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "x");
    engine.wait_until_idle().await;
    let status = engine.status();
    assert_eq!(status.label(), "Save failed");
    assert!(status.last_error.unwrap().message.contains("columns must not be empty"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_halts_until_cleared() {
    let store = MockStore::new()
        .then_save(ms(50), Err(SyncError::Auth("expired".into())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "x");
    engine.wait_until_idle().await;
    let status = engine.status();
    assert!(status.auth_required);
    assert_eq!(status.phase, SyncPhase::Error);
    assert_eq!(status.label(), "Sign in required");

    // Edits still apply locally but nothing goes out.
    assert!(edit(&engine, "y"));
    assert!(!engine.flush());
    assert!(!engine.save_now());
    assert!(!engine.reload());
    tokio::time::sleep(ms(5_000)).await;
    assert_eq!(store.saves().len(), 1);
    assert_eq!(store.load_count(), 1);

    engine.clear_auth_failure();
    engine.wait_until_idle().await;
    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(cell_2024(&saves[1].doc), Some(CellValue::from("y")));
    let status = engine.status();
    assert!(!status.auth_required);
    assert!(status.last_error.is_none());
    assert_eq!(status.phase, SyncPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_on_load_blocks_saves() {
    let store = MockStore::new()
        .then_load(ms(10), Err(SyncError::Auth("no session".into())))
        .shared();
    let engine = start(&store);
    ready(&engine).await;
    assert!(engine.status().auth_required);

    edit(&engine, "x");
    tokio::time::sleep(ms(2_000)).await;
    assert!(store.saves().is_empty());
}

// ── Manual saves ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_flush_saves_without_waiting() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;
    assert!(!engine.flush());

    let edited_at = store.elapsed();
    edit(&engine, "x");
    assert!(engine.flush());
    engine.wait_until_idle().await;
    tokio::time::sleep(ms(2_000)).await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].started - edited_at < ms(5));
    assert!(!engine.flush());
}

#[tokio::test(start_paused = true)]
async fn test_save_now_without_changes_is_idempotent() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;
    let before = engine.document();

    assert!(engine.save_now());
    engine.wait_until_idle().await;
    assert!(engine.save_now());
    engine.wait_until_idle().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert_eq!(saves[0].doc.rows, saves[1].doc.rows);
    // The second body carries the timestamp acknowledged for the first.
    assert!(saves[0].doc.updated_at.is_none());
    assert!(saves[1].doc.updated_at.is_some());
    assert_eq!(engine.document().rows, before.rows);
    assert_eq!(engine.document().columns, before.columns);
    assert_eq!(engine.revision(), 0);
    let status = engine.status();
    assert!(!status.has_pending_changes);
    assert_eq!(status.saves_completed, 2);
    assert!(status.last_saved_at.is_some());
    assert_eq!(engine.document().updated_at, status.last_saved_at);
}

// ── Teardown ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_drop_flushes_pending_edit_once() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "unsaved");
    drop(engine);
    tokio::time::sleep(ms(2_000)).await;

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert!(saves[0].completed);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("unsaved")));
}

#[tokio::test(start_paused = true)]
async fn test_drop_without_edits_sends_nothing() {
    let store = MockStore::new().shared();
    let engine = start(&store);
    ready(&engine).await;

    drop(engine);
    tokio::time::sleep(ms(2_000)).await;
    assert!(store.saves().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_replaces_in_flight_save_with_final_one() {
    let store = MockStore::new().with_save_delay(ms(1_000)).shared();
    let engine = start(&store);
    ready(&engine).await;

    edit(&engine, "first");
    tokio::time::sleep(ms(400)).await;
    edit(&engine, "last");
    let status = engine.shutdown().await;

    let saves = store.saves();
    assert_eq!(saves.len(), 2);
    assert!(saves[0].aborted);
    assert_eq!(cell_2024(&saves[1].doc), Some(CellValue::from("last")));
    assert!(!status.has_pending_changes);
    assert_eq!(status.saves_completed, 1);

    tokio::time::sleep(ms(2_000)).await;
    assert_eq!(store.saves().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_load_keeps_defaults_and_saves_edits() {
    let store = MockStore::new().then_load(ms(500), Ok(LoadOutcome::Found(remote()))).shared();
    let engine = start(&store);

    edit(&engine, "early");
    let status = engine.shutdown().await;
    assert_eq!(status.saves_completed, 1);

    let saves = store.saves();
    assert_eq!(saves.len(), 1);
    assert_eq!(cell_2024(&saves[0].doc), Some(CellValue::from("early")));
    assert!(saves[0].doc.row("cogs").is_none());
}

// ── Multi-threaded runtime ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rapid_edits_on_worker_pool_settle_on_last_value() {
    let store = MockStore::new().with_save_delay(ms(5)).shared();
    let remote_store: Arc<dyn RemoteStore> = store.clone();
    let engine = SyncEngine::start_on(
        Handle::current(),
        scope(),
        defaults(),
        remote_store,
        config().with_debounce(ms(20)),
    );
    ready(&engine).await;

    // Pauses straddle the debounce so some saves fire and get superseded.
    for i in 0..40u64 {
        assert!(edit(&engine, &format!("v{}", i)));
        if i % 7 == 0 {
            tokio::time::sleep(ms(i % 3 * 15)).await;
        }
    }
    assert_eq!(engine.with_document(cell_2024), Some(CellValue::from("v39")));

    let status = engine.shutdown().await;
    assert!(!status.has_pending_changes);
    assert!(status.last_error.is_none());

    let saves = store.saves();
    let last = saves.iter().rev().find(|s| s.completed).unwrap();
    assert_eq!(cell_2024(&last.doc), Some(CellValue::from("v39")));
}
