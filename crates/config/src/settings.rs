// Sync settings
// Loaded from ~/.config/tablesync/settings.json

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tablesync_core::TableLimits;

/// Shortest quiet interval we accept; anything lower saves per keystroke.
pub const MIN_DEBOUNCE_MS: u64 = 50;
pub const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Per-table-type overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TablePreset {
    /// Quiet interval before a save; `None` = use `sync.debounceMs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    pub min_rows: usize,
    pub min_columns: usize,
}

impl TablePreset {
    const fn new(debounce_ms: u64, min_rows: usize, min_columns: usize) -> Self {
        Self { debounce_ms: Some(debounce_ms), min_rows, min_columns }
    }
}

/// Presets shipped with the app. Financial tables are wide and expensive to
/// store, so they wait longer; task lists save almost immediately.
fn builtin_preset(table_type: &str) -> Option<TablePreset> {
    match table_type {
        "financial" | "financial_summary" | "budget" => Some(TablePreset::new(1500, 1, 2)),
        "market" | "value" | "team" | "review" => Some(TablePreset::new(800, 0, 1)),
        "task_decomposition" => Some(TablePreset::new(300, 0, 1)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Remote store
    #[serde(rename = "api.base")]
    pub api_base: String,

    #[serde(rename = "api.timeoutSecs")]
    pub timeout_secs: u64,

    // Sync engine
    #[serde(rename = "sync.debounceMs")]
    pub debounce_ms: u64,

    #[serde(rename = "sync.loadGraceMs")]
    pub load_grace_ms: u64,

    // Table presets, keyed by table type
    #[serde(rename = "tables")]
    pub tables: BTreeMap<String, TablePreset>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            debounce_ms: 800,
            load_grace_ms: 100,
            tables: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        crate::config_dir().join("settings.json")
    }

    /// Load settings from the default path, creating a commented default file
    /// on first run.
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            Self::create_default_file(&path);
            return Self::default();
        }

        Self::load_from(&path)
    }

    /// Load settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("Error reading {}: {}; using default settings", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned)
    }

    /// Save current settings to the default path
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    fn create_default_file(path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Remote store
    "api.base": "http://localhost:3000",
    "api.timeoutSecs": 30,

    // Quiet interval after the last edit before a table is saved
    "sync.debounceMs": 800,
    // Edits right after a load are not scheduled until this has passed
    "sync.loadGraceMs": 100,

    // Per-table overrides, e.g.
    // "financial": { "debounceMs": 1500, "minRows": 1, "minColumns": 2 }
    "tables": {}
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }

    fn preset(&self, table_type: &str) -> Option<TablePreset> {
        self.tables
            .get(table_type)
            .cloned()
            .or_else(|| builtin_preset(table_type))
    }

    /// Effective debounce for a table type, clamped to a sane range.
    pub fn debounce_for(&self, table_type: &str) -> Duration {
        let ms = self
            .preset(table_type)
            .and_then(|p| p.debounce_ms)
            .unwrap_or(self.debounce_ms)
            .clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Duration::from_millis(ms)
    }

    pub fn limits_for(&self, table_type: &str) -> TableLimits {
        self.preset(table_type)
            .map(|p| TableLimits::new(p.min_rows, p.min_columns))
            .unwrap_or_default()
    }

    pub fn load_grace(&self) -> Duration {
        Duration::from_millis(self.load_grace_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
