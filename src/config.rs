//! Settings file and application paths.
//!
//! Config directory priority: CLI `--config-dir` → `MASKFLOW_CONFIG_DIR` →
//! platform config dir from dirs-next.
//!
//! Platform paths:
//! - Linux: ~/.config/maskflow/{name}
//! - macOS: ~/Library/Application Support/maskflow/{name}
//! - Windows: %APPDATA%\maskflow\{name}

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::event_bus::DEFAULT_MAX_DEPTH;
use crate::core::window::DEFAULT_SEGMENT_SIZE;

pub const SETTINGS_FILE: &str = "maskflow.json";
pub const LOG_FILE: &str = "maskflow.log";
const CONFIG_DIR_ENV: &str = "MASKFLOW_CONFIG_DIR";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (MASKFLOW_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        dirs_next::config_dir()
            .map(|dir| dir.join("maskflow"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path to a file inside the config directory.
    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Create the config directory if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.config_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Persistent client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Frames per segment window.
    pub segment_size: u32,
    /// Give up on LoadingData/Propagating after this many seconds. None waits forever.
    pub request_timeout_secs: Option<u64>,
    /// Bound on nested bus publishes.
    pub max_dispatch_depth: usize,
    /// Answer for confirmation dialogs when running headless.
    pub auto_confirm: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            request_timeout_secs: None,
            max_dispatch_depth: DEFAULT_MAX_DEPTH,
            auto_confirm: true,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Malformed settings file: {}", path.display()))?;
        info!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }

    /// Apply command-line overrides on top of the file.
    pub fn with_overrides(mut self, segment_size: Option<u32>, timeout_secs: Option<u64>, no_confirm: bool) -> Self {
        if let Some(size) = segment_size {
            self.segment_size = size.max(1);
        }
        if timeout_secs.is_some() {
            self.request_timeout_secs = timeout_secs;
        }
        if no_confirm {
            self.auto_confirm = false;
        }
        self
    }
}
