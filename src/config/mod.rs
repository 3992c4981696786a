//! Configuration module for the toolchain orchestrator
//!
//! The whole configuration lives in one TOML file. Every section and every
//! field has a default, so an empty or missing file is a valid configuration.
//!
//! # Config Location
//!
//! Without `--config` the file is looked up in the platform config directory:
//! - **Linux**: `~/.config/wide-toolchain/orchestrator.toml`
//! - **macOS**: `~/Library/Application Support/wide-toolchain/orchestrator.toml`
//! - **Windows**: `%APPDATA%\wide-toolchain\orchestrator.toml`
//!
//! # Example
//!
//! ```toml
//! [toolchain]
//! directory = "/opt/wide/bin"
//!
//! [chips.boards]
//! 3AxisPortal = "portal.chd"
//!
//! [chips.profiles.v1_00.hidden_pins]
//! clk_automaton_0 = 12
//! reset_automaton_0 = 13
//!
//! [timeouts]
//! progress_timeout_secs = 90
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ToolchainError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for the config directory
pub const APP_ID: &str = "wide-toolchain";

/// Config filename inside the config directory
pub const CONFIG_FILE: &str = "orchestrator.toml";

/// Get the application config directory path
pub fn app_config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub toolchain: ToolchainSettings,
    #[serde(default)]
    pub chips: ChipSettings,
    #[serde(default)]
    pub workspace: WorkspaceSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub export: ExportToolSettings,
    #[serde(default)]
    pub pin_mapping: PinMappingSettings,
    #[serde(default)]
    pub framing: FramingSettings,
    #[serde(default)]
    pub upload: UploadSettings,
}

impl OrchestratorConfig {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ToolchainError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ToolchainError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from `path` or the default location, returning defaults on any error
    ///
    /// A missing default file is not worth a warning; a broken one is.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Self::default(),
            },
        };

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolchainError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        std::fs::write(path, self.to_toml()?).map_err(|e| {
            ToolchainError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Render as TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ToolchainError::Config(format!("Failed to serialize config: {}", e)))
    }
}
