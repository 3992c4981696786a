//! Chip descriptor files
//!
//! Descriptors are JSON documents shipped next to the toolchain. Only the
//! ordered `pinDescriptions[*].pinName` list is consumed; every other field is
//! ignored.

use crate::error::{Result, ToolchainError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct DescriptorFile {
    #[serde(rename = "pinDescriptions", default)]
    pin_descriptions: Vec<PinDescription>,
}

#[derive(Debug, Deserialize)]
struct PinDescription {
    #[serde(rename = "pinName")]
    pin_name: String,
}

/// Physical pin names of one target chip, in descriptor order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipDescriptor {
    /// File the descriptor was loaded from
    pub path: PathBuf,
    /// Ordered physical pin names
    pub pin_names: Vec<String>,
}

impl ChipDescriptor {
    pub fn new(path: impl Into<PathBuf>, pin_names: Vec<String>) -> Self {
        Self {
            path: path.into(),
            pin_names,
        }
    }

    /// Load a descriptor file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path).map_err(|e| {
            ToolchainError::ChipDescriptor(format!("Failed to read {:?}: {}", path, e))
        })?;
        Self::parse(path, &content)
    }

    /// Parse descriptor JSON
    pub fn parse(path: impl Into<PathBuf>, content: &[u8]) -> Result<Self> {
        let path = path.into();
        let file: DescriptorFile = serde_json::from_slice(content).map_err(|e| {
            ToolchainError::ChipDescriptor(format!("Failed to parse {:?}: {}", path, e))
        })?;

        Ok(Self {
            path,
            pin_names: file
                .pin_descriptions
                .into_iter()
                .map(|pin| pin.pin_name)
                .collect(),
        })
    }

    /// Index of the pin with this name
    pub fn pin_index(&self, name: &str) -> Option<usize> {
        self.pin_names.iter().position(|pin| pin == name)
    }

    /// Descriptor file stem (e.g. `v1_00` for `v1_00.chd`), used to look up the chip profile
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path with forward slashes, as the export process expects it
    pub fn wire_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}
