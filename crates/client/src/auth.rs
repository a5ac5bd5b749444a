//! Bearer credentials on disk.
//!
//! One JSON file, `<config dir>/tablesync/auth.json`, readable only by the
//! owner on Unix. The engine never refreshes it; after an auth failure the
//! caller logs in again and the next store picks up the new file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCredentials {
    /// Sent as `Authorization: Bearer <token>`
    pub token: String,
    /// e.g. "https://strategy.example.com"
    pub api_base: String,
    /// Extra header some deployments require on saves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    /// Display only
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthCredentials {
    pub fn new(token: String, api_base: String) -> Self {
        Self { token, api_base, csrf_token: None, email: None }
    }
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
    #[error("cannot encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn auth_file_path() -> PathBuf {
    tablesync_config::config_dir().join("auth.json")
}

/// Credentials from the default location, if present and readable.
pub fn load_auth() -> Option<AuthCredentials> {
    load_auth_from(&auth_file_path())
}

/// A missing file is "logged out"; a corrupt one is logged and treated
/// the same way.
pub fn load_auth_from(path: &Path) -> Option<AuthCredentials> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes)
        .map_err(|e| log::warn!("ignoring unreadable credentials at {}: {}", path.display(), e))
        .ok()
}

pub fn save_auth(creds: &AuthCredentials) -> Result<(), CredentialsError> {
    save_auth_to(creds, &auth_file_path())
}

pub fn save_auth_to(creds: &AuthCredentials, path: &Path) -> Result<(), CredentialsError> {
    let write_err = |source| CredentialsError::Write { path: path.to_path_buf(), source };
    let json = serde_json::to_vec_pretty(creds)?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }
    fs::write(path, json).map_err(write_err)?;
    restrict_to_owner(path).map_err(write_err)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn delete_auth() -> Result<bool, CredentialsError> {
    delete_auth_from(&auth_file_path())
}

/// Returns true if a file was removed.
pub fn delete_auth_from(path: &Path) -> Result<bool, CredentialsError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CredentialsError::Remove { path: path.to_path_buf(), source }),
    }
}
