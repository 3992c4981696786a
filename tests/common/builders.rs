//! Test data builders for requests, descriptors and configurations

use std::path::Path;
use tempfile::TempDir;
use wide_toolchain::config::OrchestratorConfig;
use wide_toolchain::types::{CompileRequest, ProjectFile};

/// Builder for creating test compile requests
pub struct CompileRequestBuilder {
    request: CompileRequest,
}

impl CompileRequestBuilder {
    pub fn new(session_id: &str) -> Self {
        Self {
            request: CompileRequest {
                session_id: session_id.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn file(mut self, name: &str, content: &str) -> Self {
        self.request.files.push(ProjectFile::new(name, content));
        self
    }

    pub fn chd(mut self, chd: &str) -> Self {
        self.request.chd = Some(chd.to_string());
        self
    }

    pub fn board(mut self, board: &str) -> Self {
        self.request.board = Some(board.to_string());
        self
    }

    pub fn upload_to(mut self, server: &str, experiment_id: &str) -> Self {
        self.request.upload_server = Some(server.to_string());
        self.request.experiment_id = Some(experiment_id.to_string());
        self
    }

    pub fn build(self) -> CompileRequest {
        self.request
    }
}

/// Write a chip descriptor with the given pin names
pub fn write_descriptor(dir: &Path, file_name: &str, pins: &[&str]) {
    let pins: Vec<_> = pins
        .iter()
        .map(|pin| serde_json::json!({ "pinName": pin, "pinType": "io" }))
        .collect();
    let content = serde_json::json!({ "chipName": "test", "pinDescriptions": pins });
    std::fs::write(dir.join(file_name), content.to_string()).unwrap();
}

/// Temporary directories backing one test configuration
pub struct TestEnvironment {
    pub root: TempDir,
    pub config: OrchestratorConfig,
}

impl TestEnvironment {
    /// Descriptor dir with `v1_00.chd` (pins a, b, out) and an empty workspace root
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let chd_dir = root.path().join("chd");
        let workspaces = root.path().join("workspaces");
        std::fs::create_dir_all(&chd_dir).unwrap();
        std::fs::create_dir_all(&workspaces).unwrap();
        write_descriptor(&chd_dir, "v1_00.chd", &["a", "b", "out"]);

        let mut config = OrchestratorConfig::default();
        config.chips.descriptor_dir = chd_dir;
        config.workspace.root = workspaces;
        config.timeouts.progress_timeout_secs = 5;
        config.timeouts.shutdown_grace_ms = 2000;

        Self { root, config }
    }

    pub fn workspace_path(&self, session_id: &str) -> std::path::PathBuf {
        self.config.workspace.root.join(session_id)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_request_builder() {
        let request = CompileRequestBuilder::new("s1")
            .file("main.logic", "out = a;")
            .chd("v1_00.chd")
            .build();

        assert_eq!(request.session_id, "s1");
        assert_eq!(request.files.len(), 1);
        assert_eq!(request.chd.as_deref(), Some("v1_00.chd"));
        assert!(!request.wants_upload());
    }
}
