// Engine timing and shape knobs, resolved once per scope.

use std::time::Duration;

use tablesync_config::Settings;
use tablesync_core::TableLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet interval after the last edit before a save goes out.
    pub debounce: Duration,
    /// Window after a load resolves during which edits are applied
    /// but not scheduled.
    pub load_grace: Duration,
    pub limits: TableLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(800),
            load_grace: Duration::from_millis(100),
            limits: TableLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve the effective configuration for one table type.
    pub fn from_settings(settings: &Settings, table_type: &str) -> Self {
        Self {
            debounce: settings.debounce_for(table_type),
            load_grace: settings.load_grace(),
            limits: settings.limits_for(table_type),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_load_grace(mut self, load_grace: Duration) -> Self {
        self.load_grace = load_grace;
        self
    }

    pub fn with_limits(mut self, limits: TableLimits) -> Self {
        self.limits = limits;
        self
    }
}
