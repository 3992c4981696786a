//! Entry point for external callers
//!
//! The [`Orchestrator`] validates requests, allocates session ids, stages the
//! private workspace and starts each workflow on its own thread. Requests that
//! are malformed are rejected with an error before anything is spawned; every
//! accepted request yields exactly one [`TerminalResponse`] through its
//! [`PendingResponse`].

use crate::chip::{disambiguate_source, ChipDescriptor};
use crate::config::OrchestratorConfig;
use crate::error::{Result, ToolchainError};
use crate::process::{ExecutableLauncher, ProcessLauncher};
use crate::session::{
    allocate_session_id, validate_session_id, SessionRegistry, SessionWorkspace, WorkflowKind,
};
use crate::types::{CompileRequest, MinimizeRequest, SourceKind, TerminalResponse};
use crate::upload::{ArtifactUploader, DirectoryUploader};
use crate::workflow::{
    response_slot, CompileJob, CompileStateMachine, MinimizeStateMachine, PendingResponse,
    PreparedEquation, UploadContext, WorkflowDriver, WorkflowMachine,
};
use std::sync::Arc;

pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    registry: SessionRegistry,
    launcher: Arc<dyn ProcessLauncher>,
    uploader: Option<Arc<dyn ArtifactUploader>>,
}

impl Orchestrator {
    /// Orchestrator running the configured executables
    ///
    /// A [`DirectoryUploader`] is installed when `upload.drop_dir` is set.
    pub fn new(config: OrchestratorConfig) -> Self {
        let launcher = Arc::new(ExecutableLauncher::new(
            config.toolchain.clone(),
            config.framing.max_frame_bytes,
        ));
        let uploader = config
            .upload
            .drop_dir
            .clone()
            .map(|dir| Arc::new(DirectoryUploader::new(dir)) as Arc<dyn ArtifactUploader>);

        let mut orchestrator = Self::with_launcher(config, launcher);
        orchestrator.uploader = uploader;
        orchestrator
    }

    /// Orchestrator with a custom process launcher and no uploader
    pub fn with_launcher(config: OrchestratorConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            launcher,
            uploader: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn ArtifactUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_registry(mut self, registry: SessionRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // ==================== Compile ====================

    /// Validate a compile request and start its workflow
    pub fn submit_compile(&self, request: CompileRequest) -> Result<PendingResponse> {
        validate_files(&request)?;
        let session_id = resolve_session_id(Some(request.session_id.as_str()))?;
        let source = request
            .source_file()
            .ok_or_else(|| ToolchainError::InvalidRequest("Request contains no source file".to_string()))?
            .clone();
        let descriptor_path = self
            .config
            .chips
            .resolve_descriptor(request.board.as_deref(), request.chd.as_deref())?;

        let kind = SourceKind::classify(&source.name);
        if !kind.is_supported() {
            tracing::info!("Session {}: rejecting {} source {}", session_id, kind, source.name);
            return Ok(PendingResponse::ready(TerminalResponse::failure(
                session_id,
                format!("Unsupported source kind: {}", kind),
            )));
        }

        self.registry.register(&session_id, WorkflowKind::Compile)?;
        tracing::info!(
            "Session {}: compiling {} for {:?}",
            session_id,
            source.name,
            descriptor_path
        );

        let prepared = self.prepare_compile(&session_id, &request, &source.name, &source.content, &descriptor_path);
        let (job, workspace) = match prepared {
            Ok(prepared) => prepared,
            Err(e) if e.is_rejection() => {
                self.registry.deregister(&session_id);
                return Err(e);
            }
            Err(e) => {
                self.registry.deregister(&session_id);
                tracing::error!("Session {}: {}", session_id, e);
                return Ok(PendingResponse::ready(TerminalResponse::failure(
                    session_id,
                    e.to_string(),
                )));
            }
        };

        let upload = self.upload_context(&session_id, &request);
        let job = CompileJob {
            upload_requested: upload.is_some(),
            ..job
        };

        let machine = CompileStateMachine::new(job);
        self.start(&session_id, "compile", machine, Some(workspace), upload)
    }

    /// Submit and block until the terminal response
    pub fn compile(&self, request: CompileRequest) -> Result<TerminalResponse> {
        self.submit_compile(request)?.wait()
    }

    fn prepare_compile(
        &self,
        session_id: &str,
        request: &CompileRequest,
        source_name: &str,
        source_text: &str,
        descriptor_path: &std::path::Path,
    ) -> Result<(CompileJob, SessionWorkspace)> {
        let workspace = SessionWorkspace::create(&self.config.workspace.root, session_id)?;
        workspace.stage(&request.files)?;

        let descriptor = ChipDescriptor::load(descriptor_path)?;
        let profile = self.config.chips.profile(&descriptor.base_name());

        let source_file_name = source_name
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(source_name)
            .to_string();

        let job = CompileJob {
            session_id: session_id.to_string(),
            source_file_name,
            source_text: disambiguate_source(source_text, &descriptor.pin_names),
            descriptor,
            profile,
            workspace: workspace.wire_path(),
            strict_pin_mapping: self.config.pin_mapping.strict,
            synthesis_tool_path: self.config.export.synthesis_tool_path.clone(),
            upload_requested: false,
        };
        Ok((job, workspace))
    }

    fn upload_context(&self, session_id: &str, request: &CompileRequest) -> Option<UploadContext> {
        if !request.wants_upload() {
            return None;
        }
        let Some(uploader) = &self.uploader else {
            tracing::warn!(
                "Session {}: upload requested but no uploader is configured",
                session_id
            );
            return None;
        };
        Some(UploadContext {
            uploader: Arc::clone(uploader),
            upload_server: request.upload_server.clone().unwrap_or_default(),
            experiment_id: request.experiment_id.clone(),
            artifact_suffix: self.config.workspace.artifact_suffix.clone(),
            file_name: self.config.workspace.upload_file_name.clone(),
        })
    }

    // ==================== Minimize ====================

    /// Prepare an equation and start its minimize workflow
    pub fn submit_minimize(&self, request: MinimizeRequest) -> Result<PendingResponse> {
        let session_id = resolve_session_id(request.session_id.as_deref())?;

        let equation = match PreparedEquation::parse(&request.content) {
            Ok(equation) => equation,
            Err(e) => {
                let message = match e {
                    ToolchainError::Equation(message) => message,
                    other => other.to_string(),
                };
                tracing::info!("Session {}: rejecting equation: {}", session_id, message);
                return Ok(PendingResponse::ready(TerminalResponse::failure(
                    session_id, message,
                )));
            }
        };

        self.registry.register(&session_id, WorkflowKind::Minimize)?;
        let machine = MinimizeStateMachine::new(session_id.clone(), equation);
        self.start(&session_id, "minimize", machine, None, None)
    }

    /// Submit and block until the terminal response
    pub fn minimize(&self, request: MinimizeRequest) -> Result<TerminalResponse> {
        self.submit_minimize(request)?.wait()
    }

    // ==================== Shared ====================

    fn start<M: WorkflowMachine + 'static>(
        &self,
        session_id: &str,
        label: &str,
        machine: M,
        workspace: Option<SessionWorkspace>,
        upload: Option<UploadContext>,
    ) -> Result<PendingResponse> {
        let (responder, pending) = response_slot(session_id);

        let mut driver = WorkflowDriver::new(
            session_id,
            machine,
            Arc::clone(&self.launcher),
            self.registry.clone(),
            responder,
            self.config.timeouts.clone(),
        )
        .with_upload(upload);
        if let Some(workspace) = workspace {
            driver = driver.with_workspace(workspace);
        }

        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", label, session_id))
            .spawn(move || driver.run());

        if let Err(e) = spawned {
            self.registry.deregister(session_id);
            return Err(ToolchainError::Channel(format!(
                "Failed to start workflow thread: {}",
                e
            )));
        }
        Ok(pending)
    }
}

fn validate_files(request: &CompileRequest) -> Result<()> {
    if request.files.is_empty() {
        return Err(ToolchainError::InvalidRequest(
            "Request contains no files".to_string(),
        ));
    }
    if request.files.iter().any(|f| f.name.trim().is_empty()) {
        return Err(ToolchainError::InvalidRequest(
            "Request contains a file without a name".to_string(),
        ));
    }
    Ok(())
}

fn resolve_session_id(requested: Option<&str>) -> Result<String> {
    match requested.filter(|id| !id.is_empty()) {
        Some(id) => {
            validate_session_id(id)?;
            Ok(id.to_string())
        }
        None => Ok(allocate_session_id()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{EnvelopeSink, ProcessEvent};
    use crate::protocol::ProcessRole;
    use crate::types::ProjectFile;
    use crossbeam_channel::Sender;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Launcher that must never be reached
    #[derive(Default)]
    struct CountingLauncher {
        launches: AtomicUsize,
    }

    impl ProcessLauncher for CountingLauncher {
        fn launch(
            &self,
            role: ProcessRole,
            _events: Sender<ProcessEvent>,
        ) -> Result<Box<dyn EnvelopeSink>> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Err(ToolchainError::Spawn {
                role,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not here"),
            })
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<CountingLauncher>) {
        let launcher = Arc::new(CountingLauncher::default());
        let mut config = OrchestratorConfig::default();
        config.workspace.root = std::env::temp_dir().join("wide-toolchain-unit");
        (Orchestrator::with_launcher(config, launcher.clone()), launcher)
    }

    fn request(files: Vec<ProjectFile>) -> CompileRequest {
        CompileRequest {
            files,
            ..Default::default()
        }
    }

    #[test]
    fn test_malformed_requests_are_rejected_before_spawn() {
        let (orchestrator, launcher) = orchestrator();

        let cases = vec![
            request(vec![]),
            request(vec![ProjectFile::new("", "x")]),
            CompileRequest {
                chd: Some("../../etc/passwd".to_string()),
                ..request(vec![ProjectFile::new("main.logic", "a = b;")])
            },
            CompileRequest {
                session_id: "../evil".to_string(),
                ..request(vec![ProjectFile::new("main.logic", "a = b;")])
            },
        ];

        for case in cases {
            let err = orchestrator.submit_compile(case).unwrap_err();
            assert!(err.is_rejection(), "unexpected error: {err}");
        }
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert!(orchestrator.registry().is_empty());
    }

    #[test]
    fn test_unsupported_source_kind_answers_without_spawn() {
        let (orchestrator, launcher) = orchestrator();

        let response = orchestrator
            .compile(request(vec![ProjectFile::new("top.vhd", "entity x is end;")]))
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.output, "Unsupported source kind: VHDL");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_descriptor_is_failure_response() {
        let (orchestrator, launcher) = orchestrator();

        let response = orchestrator
            .compile(CompileRequest {
                session_id: "nodesc".to_string(),
                chd: Some("missing.chd".to_string()),
                ..request(vec![ProjectFile::new("main.logic", "a = b;")])
            })
            .unwrap();

        assert!(!response.success);
        assert!(response.output.contains("Chip descriptor"));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert!(!orchestrator.registry().is_active("nodesc"));
        assert!(!orchestrator.config().workspace.root.join("nodesc").exists());
    }

    #[test]
    fn test_bad_equation_answers_without_spawn() {
        let (orchestrator, launcher) = orchestrator();

        let response = orchestrator.minimize(MinimizeRequest::new("y a b")).unwrap();
        assert!(!response.success);
        assert_eq!(response.output, "There is no \"=\" in the equation");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_spawn_failure_is_single_failure_response() {
        let (orchestrator, launcher) = orchestrator();

        let response = orchestrator.minimize(MinimizeRequest::new("y = a;")).unwrap();
        assert!(!response.success);
        assert!(response.output.contains("Failed to start the source process"));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }
}
