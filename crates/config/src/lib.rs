// Configuration loading

pub mod settings;

pub use settings::{Settings, TablePreset};

use std::path::PathBuf;

/// Directory holding settings and credentials (`~/.config/tablesync`).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablesync")
}
