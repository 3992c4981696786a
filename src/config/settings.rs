//! Individual configuration sections
//!
//! Each section is a plain serde struct with defaults, so a configuration file
//! only has to name the values it changes.

use crate::chip::ChipProfile;
use crate::error::{Result, ToolchainError};
use crate::protocol::ProcessRole;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default progress timeout in seconds
pub const DEFAULT_PROGRESS_TIMEOUT_SECS: u64 = 60;

/// Default grace period for processes to exit after shutdown, in milliseconds
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

// ==================== Toolchain ====================

/// Location and names of the toolchain executables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainSettings {
    /// Directory containing the executables
    #[serde(default = "default_toolchain_dir")]
    pub directory: PathBuf,
    /// Executable names without platform suffix
    #[serde(default = "default_source_name")]
    pub source: String,
    #[serde(default = "default_table_name")]
    pub table: String,
    #[serde(default = "default_export_name")]
    pub export: String,
    #[serde(default = "default_persistence_name")]
    pub persistence: String,
}

fn default_toolchain_dir() -> PathBuf {
    PathBuf::from("toolchain")
}

fn default_source_name() -> String {
    "code".to_string()
}

fn default_table_name() -> String {
    "table".to_string()
}

fn default_export_name() -> String {
    "exportsim".to_string()
}

fn default_persistence_name() -> String {
    "save".to_string()
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            directory: default_toolchain_dir(),
            source: default_source_name(),
            table: default_table_name(),
            export: default_export_name(),
            persistence: default_persistence_name(),
        }
    }
}

impl ToolchainSettings {
    /// Full path of the executable for a role
    pub fn executable(&self, role: ProcessRole) -> PathBuf {
        let name = match role {
            ProcessRole::Source => &self.source,
            ProcessRole::Table => &self.table,
            ProcessRole::Export => &self.export,
            ProcessRole::Persistence => &self.persistence,
        };
        self.directory
            .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX))
    }
}

// ==================== Chips ====================

/// Chip descriptor lookup and per-chip profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipSettings {
    /// Directory holding the descriptor files
    #[serde(default = "default_descriptor_dir")]
    pub descriptor_dir: PathBuf,
    /// Descriptor used when a request names neither board nor descriptor
    #[serde(default = "default_descriptor")]
    pub default_descriptor: String,
    /// Board name -> descriptor file name
    #[serde(default)]
    pub boards: BTreeMap<String, String>,
    /// Descriptor base name (e.g. `v1_00`) -> profile
    #[serde(default)]
    pub profiles: BTreeMap<String, ChipProfile>,
}

fn default_descriptor_dir() -> PathBuf {
    PathBuf::from("chd")
}

fn default_descriptor() -> String {
    "v1_00.chd".to_string()
}

impl Default for ChipSettings {
    fn default() -> Self {
        Self {
            descriptor_dir: default_descriptor_dir(),
            default_descriptor: default_descriptor(),
            boards: BTreeMap::new(),
            profiles: BTreeMap::new(),
        }
    }
}

impl ChipSettings {
    /// Resolve the descriptor path for a request
    ///
    /// An explicit descriptor selector wins over the board name; unknown
    /// boards are rejected. Selectors must be plain file names.
    pub fn resolve_descriptor(&self, board: Option<&str>, selector: Option<&str>) -> Result<PathBuf> {
        let file_name = match (selector.filter(|s| !s.is_empty()), board.filter(|b| !b.is_empty())) {
            (Some(selector), _) => selector.to_string(),
            (None, Some(board)) => self.boards.get(board).cloned().ok_or_else(|| {
                ToolchainError::InvalidRequest(format!("Unknown board '{}'", board))
            })?,
            (None, None) => self.default_descriptor.clone(),
        };

        if !is_plain_file_name(&file_name) {
            return Err(ToolchainError::InvalidRequest(format!(
                "Invalid chip descriptor selector '{}'",
                file_name
            )));
        }

        Ok(self.descriptor_dir.join(file_name))
    }

    /// Profile for a descriptor base name, defaults when none is configured
    pub fn profile(&self, base_name: &str) -> ChipProfile {
        match self.profiles.get(base_name) {
            Some(profile) => profile.clone(),
            None => {
                tracing::warn!(
                    "No chip profile for '{}', hidden signals will stay unmapped",
                    base_name
                );
                ChipProfile::default()
            }
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// ==================== Workspace ====================

/// Private per-session workspaces and produced artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    /// Parent directory of all session workspaces
    #[serde(default = "default_workspace_root")]
    pub root: PathBuf,
    /// The artifact is the first file whose name ends with this suffix
    #[serde(default = "default_artifact_suffix")]
    pub artifact_suffix: String,
    /// File name the artifact is relayed under
    #[serde(default = "default_upload_file_name")]
    pub upload_file_name: String,
}

fn default_workspace_root() -> PathBuf {
    std::env::temp_dir().join("wide-toolchain")
}

fn default_artifact_suffix() -> String {
    "out.pof".to_string()
}

fn default_upload_file_name() -> String {
    "LogIProgrammingFile.hex".to_string()
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            root: default_workspace_root(),
            artifact_suffix: default_artifact_suffix(),
            upload_file_name: default_upload_file_name(),
        }
    }
}

// ==================== Timeouts ====================

/// Session time bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Maximum time without any envelope before the session fails
    #[serde(default = "default_progress_timeout_secs")]
    pub progress_timeout_secs: u64,
    /// Time processes get to exit after the terminal response
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_progress_timeout_secs() -> u64 {
    DEFAULT_PROGRESS_TIMEOUT_SECS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            progress_timeout_secs: DEFAULT_PROGRESS_TIMEOUT_SECS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl TimeoutSettings {
    pub fn progress_timeout(&self) -> Duration {
        Duration::from_secs(self.progress_timeout_secs.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ==================== Export tool ====================

/// External synthesis tool used by the export process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportToolSettings {
    /// When set, the export process is told to run the tool at this path
    #[serde(default)]
    pub synthesis_tool_path: Option<String>,
}

// ==================== Pin mapping ====================

/// How unmapped signals are treated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMappingSettings {
    /// Fail the session when any signal cannot be mapped
    #[serde(default)]
    pub strict: bool,
}

// ==================== Framing ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingSettings {
    /// Bound for one buffered frame per process
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_max_frame_bytes() -> usize {
    crate::protocol::DEFAULT_MAX_FRAME_BYTES
}

impl Default for FramingSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

// ==================== Upload ====================

/// Settings for the bundled directory uploader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Artifacts are copied below this directory when set
    #[serde(default)]
    pub drop_dir: Option<PathBuf>,
}
