//! Private per-session workspace directories
//!
//! The export stage writes its artifact next to the staged sources, so every
//! compile session gets its own directory under the configured root. The
//! directory is removed exactly once, by whichever comes first of an explicit
//! [`SessionWorkspace::remove`] or drop.

use crate::error::{Result, ResultExt, ToolchainError};
use crate::types::ProjectFile;
use std::path::{Component, Path, PathBuf};

/// Guard owning one session directory
#[derive(Debug)]
pub struct SessionWorkspace {
    path: PathBuf,
    removed: bool,
}

impl SessionWorkspace {
    /// Create `<root>/<session_id>`
    pub fn create(root: &Path, session_id: &str) -> Result<Self> {
        let path = root.join(session_id);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create workspace {:?}", path))?;
        tracing::debug!("Created workspace {:?}", path);
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Workspace path with forward slashes, as the export process expects it
    pub fn wire_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }

    /// Write the uploaded files below the workspace
    ///
    /// Directory placeholder entries are skipped. Absolute paths and paths
    /// leaving the workspace are rejected.
    pub fn stage(&self, files: &[ProjectFile]) -> Result<usize> {
        let mut staged = 0;
        for file in files {
            if file.is_directory_entry() {
                continue;
            }
            let relative = checked_relative_path(&file.name)?;
            let target = self.path.join(relative);

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ToolchainError::Workspace(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
            std::fs::write(&target, file.content.as_bytes()).map_err(|e| {
                ToolchainError::Workspace(format!("Failed to write {:?}: {}", target, e))
            })?;
            staged += 1;
        }
        tracing::debug!("Staged {} file(s) into {:?}", staged, self.path);
        Ok(staged)
    }

    /// First file (in sorted walk order) whose name ends with `suffix`
    pub fn find_artifact(&self, suffix: &str) -> Option<PathBuf> {
        find_file_with_suffix(&self.path, suffix)
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Remove the directory; later calls are no-ops
    pub fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed workspace {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove workspace {:?}: {}", self.path, e),
        }
    }
}

impl Drop for SessionWorkspace {
    fn drop(&mut self) {
        self.remove();
    }
}

fn checked_relative_path(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let path = Path::new(&normalized);

    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ToolchainError::InvalidRequest(format!(
                    "File name '{}' leaves the workspace",
                    name
                )))
            }
        }
    }

    if relative.as_os_str().is_empty() {
        return Err(ToolchainError::InvalidRequest(
            "Empty file name".to_string(),
        ));
    }
    Ok(relative)
}

fn find_file_with_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_file()
            && path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(suffix))
        {
            return Some(path.clone());
        }
    }

    entries
        .iter()
        .filter(|path| path.is_dir())
        .find_map(|path| find_file_with_suffix(path, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_skips_directory_entries() {
        let root = TempDir::new().unwrap();
        let workspace = SessionWorkspace::create(root.path(), "s1").unwrap();

        let staged = workspace
            .stage(&[
                ProjectFile::new("src/.", ""),
                ProjectFile::new("src/main.logic", "a = b;"),
                ProjectFile::new("./notes.txt", "hi"),
            ])
            .unwrap();

        assert_eq!(staged, 2);
        let content = std::fs::read_to_string(workspace.path().join("src/main.logic")).unwrap();
        assert_eq!(content, "a = b;");
        assert!(workspace.path().join("notes.txt").exists());
    }

    #[test]
    fn test_stage_rejects_traversal() {
        let root = TempDir::new().unwrap();
        let workspace = SessionWorkspace::create(root.path(), "s2").unwrap();

        for bad in ["../escape.logic", "/etc/passwd", "a/../../b", "..\\win.logic"] {
            let err = workspace
                .stage(&[ProjectFile::new(bad, "x")])
                .unwrap_err();
            assert!(err.is_rejection(), "{bad} should be rejected");
        }
        assert!(!root.path().join("escape.logic").exists());
    }

    #[test]
    fn test_find_artifact_recurses() {
        let root = TempDir::new().unwrap();
        let workspace = SessionWorkspace::create(root.path(), "s3").unwrap();
        std::fs::create_dir_all(workspace.path().join("output_files")).unwrap();
        std::fs::write(workspace.path().join("main.logic"), "").unwrap();
        std::fs::write(workspace.path().join("output_files/main_out.pof"), "img").unwrap();

        let artifact = workspace.find_artifact("out.pof").unwrap();
        assert!(artifact.ends_with("output_files/main_out.pof"));
        assert!(workspace.find_artifact(".sof").is_none());
    }

    #[test]
    fn test_remove_is_idempotent_and_runs_on_drop() {
        let root = TempDir::new().unwrap();
        let mut workspace = SessionWorkspace::create(root.path(), "s4").unwrap();
        let path = workspace.path().to_path_buf();

        workspace.remove();
        assert!(!path.exists());
        assert!(workspace.is_removed());
        workspace.remove();

        {
            let _dropped = SessionWorkspace::create(root.path(), "s5").unwrap();
        }
        assert!(!root.path().join("s5").exists());
    }
}
