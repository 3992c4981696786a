//! Artifact relay after a successful export
//!
//! The orchestrator hands the produced hardware image to an
//! [`ArtifactUploader`] on a detached thread. Embedders provide HTTP transports;
//! [`DirectoryUploader`] copies the artifact into a drop directory.

use crate::error::{Result, ToolchainError};
use std::path::{Component, Path, PathBuf};

/// Everything an uploader needs to publish one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUpload {
    pub upload_server: String,
    pub experiment_id: Option<String>,
    pub session_id: String,
    /// Name the artifact is published under
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Publishes produced artifacts
#[cfg_attr(test, mockall::automock)]
pub trait ArtifactUploader: Send + Sync {
    fn upload(&self, upload: &ArtifactUpload) -> Result<()>;
}

/// Writes artifacts to `<drop_dir>/<experiment>/<session>/<file name>`
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    drop_dir: PathBuf,
}

impl DirectoryUploader {
    pub fn new(drop_dir: impl Into<PathBuf>) -> Self {
        Self {
            drop_dir: drop_dir.into(),
        }
    }

    /// Target path for an upload
    pub fn target_path(&self, upload: &ArtifactUpload) -> Result<PathBuf> {
        let experiment = upload.experiment_id.as_deref().unwrap_or("default");
        let mut path = self.drop_dir.clone();
        for part in [experiment, upload.session_id.as_str(), upload.file_name.as_str()] {
            path.push(plain_component(part)?);
        }
        Ok(path)
    }
}

fn plain_component(part: &str) -> Result<&Path> {
    let path = Path::new(part);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(ToolchainError::Upload(format!(
            "'{}' is not a plain path component",
            part
        ))),
    }
}

impl ArtifactUploader for DirectoryUploader {
    fn upload(&self, upload: &ArtifactUpload) -> Result<()> {
        let target = self.target_path(upload)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ToolchainError::Upload(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }
        std::fs::write(&target, &upload.bytes)
            .map_err(|e| ToolchainError::Upload(format!("Failed to write {:?}: {}", target, e)))?;

        tracing::info!(
            "Artifact for session {} ({} bytes, server {}) stored at {:?}",
            upload.session_id,
            upload.bytes.len(),
            upload.upload_server,
            target
        );
        Ok(())
    }
}
