//! Tabula Settings System
//!
//! Provides application settings with persistence, including:
//! - Grid settings (initial fetch window, increments, debounce)
//! - Export settings (workbook output directory)
//! - Logging settings (default filter, file output)
//! - The user whose saved filters are listed

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabula_grid::FetchConfig;

mod settings_file;

pub use settings_file::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TabulaSettings {
    pub grid: GridSettings,
    pub export: ExportSettings,
    pub logging: LogSettings,
    /// Owner of saved filters; `None` lists filters without an owner
    pub user: Option<String>,
}

impl TabulaSettings {
    /// Load from the settings file; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = ?path, "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings JSON in {:?}", path))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&settings_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {:?}", path))?;
        Ok(())
    }
}

/// Incremental fetch tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub initial_fetch_rows: usize,
    pub fetch_increment: usize,
    pub prefetch_margin: usize,
    pub fetch_debounce_ms: u64,
}

impl Default for GridSettings {
    fn default() -> Self {
        let config = FetchConfig::default();
        Self {
            initial_fetch_rows: config.initial_rows,
            fetch_increment: config.increment,
            prefetch_margin: config.prefetch_margin,
            fetch_debounce_ms: config.debounce.as_millis() as u64,
        }
    }
}

impl GridSettings {
    /// Fetch window configuration; zero sizes fall back to one row
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            initial_rows: self.initial_fetch_rows.max(1),
            increment: self.fetch_increment.max(1),
            prefetch_margin: self.prefetch_margin,
            debounce: Duration::from_millis(self.fetch_debounce_ms),
        }
    }
}

impl From<&GridSettings> for FetchConfig {
    fn from(settings: &GridSettings) -> Self {
        settings.fetch_config()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportSettings {
    /// Defaults to the downloads directory
    pub output_dir: Option<PathBuf>,
}

impl ExportSettings {
    pub fn resolved_output_dir(&self) -> Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_export_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Also write JSON logs to daily files in the logs directory
    pub file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: false,
        }
    }
}
