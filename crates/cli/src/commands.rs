//! `tsync` subcommands.
//!
//! Each command returns its output as a value; `main` decides how to print
//! it. Remote commands take the store as a parameter so they can be pointed
//! at a mock server.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use tablesync_client::{delete_auth_from, save_auth_to, AuthCredentials, LoadOutcome, RemoteStore};
use tablesync_config::Settings;
use tablesync_core::{Document, Scope};
use tablesync_engine::{EngineConfig, SyncEngine, SyncError, SyncStatus};

use crate::error::CliError;

// ── Login ───────────────────────────────────────────────────────────

/// Validate and store credentials at `path`.
pub fn login(creds: &AuthCredentials, path: &Path) -> Result<(), CliError> {
    if creds.token.trim().is_empty() {
        return Err(CliError::usage("No token provided")
            .with_hint("pass --token or set TSYNC_TOKEN"));
    }
    if !(creds.api_base.starts_with("http://") || creds.api_base.starts_with("https://")) {
        return Err(CliError::usage(format!("Invalid API base: {}", creds.api_base))
            .with_hint("expected an http:// or https:// URL"));
    }
    save_auth_to(creds, path).map_err(|e| CliError::io(e.to_string()))?;
    log::info!("credentials written to {}", path.display());
    Ok(())
}

/// Returns true if credentials were removed.
pub fn logout(path: &Path) -> Result<bool, CliError> {
    delete_auth_from(path).map_err(|e| CliError::io(e.to_string()))
}

// ── Pull ────────────────────────────────────────────────────────────

/// Normalized remote document, or `{"exists": false}`.
pub async fn pull(store: &dyn RemoteStore, scope: &Scope) -> Result<Value, CliError> {
    match store.load(scope).await? {
        LoadOutcome::Found(doc) => serde_json::to_value(&doc)
            .map_err(|e| CliError::general(format!("Failed to encode document: {}", e))),
        LoadOutcome::NotFound => Ok(json!({ "exists": false })),
    }
}

// ── Push ────────────────────────────────────────────────────────────

/// Read a document file. Legacy column/row shapes are accepted and
/// normalized.
pub fn read_document(path: &Path) -> Result<Document, CliError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("Cannot read {}: {}", path.display(), e)))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| CliError::usage(format!("{} is not valid JSON: {}", path.display(), e)))?;
    // Accept the `pull` envelope-free output and `{ "data": ... }` alike.
    let value = match value {
        Value::Object(mut map) if map.contains_key("data") && !map.contains_key("columns") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };
    Document::from_json(value)
        .map_err(|e| CliError::usage(format!("{} is not a table document: {}", path.display(), e)))
}

/// Replace the remote document for `scope` with `doc` through a sync engine
/// and wait for the save to land.
pub async fn push(
    store: Arc<dyn RemoteStore>,
    scope: Scope,
    doc: Document,
    config: EngineConfig,
) -> Result<SyncStatus, CliError> {
    let engine = SyncEngine::start(scope, Document::default(), store, config);
    engine.wait_until_idle().await;

    if engine.status().auth_required {
        let status = engine.shutdown().await;
        return Err(status
            .last_error
            .as_ref()
            .map(CliError::from_status)
            .unwrap_or_else(|| CliError::from(SyncError::NotAuthenticated)));
    }

    let changed = engine.update(|state| {
        // The timestamp belongs to the server; compare content only.
        let mut doc = doc;
        doc.updated_at = state.document().updated_at;
        state.replace(doc)
    });
    if !changed {
        log::info!("{}: remote copy already matches", engine.scope());
    }

    let status = engine.shutdown().await;
    match &status.last_error {
        Some(error) => Err(CliError::from_status(error)),
        None => Ok(status),
    }
}

pub fn status_json(scope: &Scope, status: &SyncStatus) -> Value {
    json!({
        "tableType": scope.table_type,
        "ownerId": scope.owner_id,
        "status": status.label(),
        "saved": !status.has_pending_changes,
        "savesCompleted": status.saves_completed,
        "updatedAt": status.remote_updated_at.map(|t| t.to_rfc3339()),
    })
}

// ── Settings ────────────────────────────────────────────────────────

pub fn settings_json(settings: &Settings, path: &Path) -> Result<Value, CliError> {
    let values = serde_json::to_value(settings)
        .map_err(|e| CliError::general(format!("Failed to encode settings: {}", e)))?;
    Ok(json!({
        "path": path.display().to_string(),
        "settings": values,
    }))
}
