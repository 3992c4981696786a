//! Single-threaded workflow driver
//!
//! The driver spawns the processes a [`WorkflowMachine`] asks for, pumps
//! their events through the [`AddressRouter`] and into the machine, and
//! executes the resulting actions. It also enforces the progress timeout,
//! tears the processes down after the terminal response and owns the session
//! workspace until it is removed.
//!
//! The session is released (workspace removed, registry entry dropped) right
//! before the terminal response is delivered, so a caller holding the response
//! can reuse the session id while stragglers are still being torn down.

use super::{describe_exit_code, Action, WorkflowMachine};
use crate::config::TimeoutSettings;
use crate::error::{Result, ToolchainError};
use crate::process::{EnvelopeSink, ProcessEvent, ProcessLauncher};
use crate::protocol::{AddressRouter, Envelope, ProcessRole, Route};
use crate::session::{SessionRegistry, SessionWorkspace};
use crate::types::TerminalResponse;
use crate::upload::{ArtifactUpload, ArtifactUploader};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capacity of the process event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ==================== Response delivery ====================

/// Sending half of a session's response slot; delivers at most once
#[derive(Debug)]
pub struct Responder {
    session_id: String,
    tx: Option<Sender<TerminalResponse>>,
}

/// Receiving half held by the caller
#[derive(Debug)]
pub struct PendingResponse {
    session_id: String,
    rx: Receiver<TerminalResponse>,
}

/// Create a connected responder / pending response pair
pub fn response_slot(session_id: &str) -> (Responder, PendingResponse) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (
        Responder {
            session_id: session_id.to_string(),
            tx: Some(tx),
        },
        PendingResponse {
            session_id: session_id.to_string(),
            rx,
        },
    )
}

impl Responder {
    /// Deliver the response; returns false if one was already delivered
    pub fn respond(&mut self, response: TerminalResponse) -> bool {
        let Some(tx) = self.tx.take() else {
            tracing::warn!(
                "Session {}: dropping second terminal response",
                self.session_id
            );
            return false;
        };

        if response.success {
            tracing::info!("Session {} completed", self.session_id);
        } else {
            tracing::warn!("Session {} failed: {}", self.session_id, response.output);
        }
        // The caller may have stopped waiting
        let _ = tx.send(response);
        true
    }

    pub fn has_responded(&self) -> bool {
        self.tx.is_none()
    }
}

impl PendingResponse {
    /// A response that is already known, e.g. a rejection before any spawn
    pub fn ready(response: TerminalResponse) -> Self {
        let (mut responder, pending) = response_slot(&response.session_id);
        responder.respond(response);
        pending
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Block until the session's terminal response arrives
    pub fn wait(self) -> Result<TerminalResponse> {
        self.rx.recv().map_err(|_| {
            ToolchainError::Channel(format!(
                "Session {} ended without a response",
                self.session_id
            ))
        })
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Result<TerminalResponse> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ToolchainError::Timeout(format!(
                "No response for session {} within {:?}",
                self.session_id, timeout
            )),
            RecvTimeoutError::Disconnected => ToolchainError::Channel(format!(
                "Session {} ended without a response",
                self.session_id
            )),
        })
    }
}

// ==================== Upload ====================

/// Where and how a produced artifact is relayed
#[derive(Clone)]
pub struct UploadContext {
    pub uploader: Arc<dyn ArtifactUploader>,
    pub upload_server: String,
    pub experiment_id: Option<String>,
    /// Suffix identifying the artifact inside the workspace
    pub artifact_suffix: String,
    /// Name the artifact is published under
    pub file_name: String,
}

impl std::fmt::Debug for UploadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadContext")
            .field("upload_server", &self.upload_server)
            .field("experiment_id", &self.experiment_id)
            .field("artifact_suffix", &self.artifact_suffix)
            .field("file_name", &self.file_name)
            .finish()
    }
}

// ==================== Driver ====================

/// Runs one session's workflow to completion
pub struct WorkflowDriver<M: WorkflowMachine> {
    session_id: String,
    machine: M,
    router: AddressRouter,
    launcher: Arc<dyn ProcessLauncher>,
    registry: SessionRegistry,
    responder: Responder,
    timeouts: TimeoutSettings,
    workspace: Option<SessionWorkspace>,
    upload: Option<UploadContext>,
    processes: BTreeMap<ProcessRole, Box<dyn EnvelopeSink>>,
    exited: BTreeSet<ProcessRole>,
    /// Registry entry and workspace already given up
    released: bool,
}

impl<M: WorkflowMachine> WorkflowDriver<M> {
    pub fn new(
        session_id: impl Into<String>,
        machine: M,
        launcher: Arc<dyn ProcessLauncher>,
        registry: SessionRegistry,
        responder: Responder,
        timeouts: TimeoutSettings,
    ) -> Self {
        let router = AddressRouter::new(machine.forward_to());
        Self {
            session_id: session_id.into(),
            machine,
            router,
            launcher,
            registry,
            responder,
            timeouts,
            workspace: None,
            upload: None,
            processes: BTreeMap::new(),
            exited: BTreeSet::new(),
            released: false,
        }
    }

    /// Hand over the session workspace; it is removed when the export process exits or the session is released
    pub fn with_workspace(mut self, workspace: SessionWorkspace) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_upload(mut self, upload: Option<UploadContext>) -> Self {
        self.upload = upload;
        self
    }

    /// Drive the workflow until its terminal state and tear everything down
    pub fn run(mut self) {
        tracing::info!(
            "Session {}: starting workflow with {} process(es)",
            self.session_id,
            self.machine.roles().len()
        );

        let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        if self.spawn_all(&tx) {
            // Readers hold the remaining senders; the channel disconnects once all exit
            drop(tx);
            let actions = self.machine.start();
            self.execute(actions);
            self.sync_state();
            self.pump(&rx);
        } else {
            drop(tx);
        }

        self.teardown(&rx);
    }

    fn spawn_all(&mut self, events: &Sender<ProcessEvent>) -> bool {
        for &role in self.machine.roles() {
            match self.launcher.launch(role, events.clone()) {
                Ok(sink) => {
                    self.processes.insert(role, sink);
                }
                Err(e) => {
                    let actions = self
                        .machine
                        .fail(&format!("Failed to start the {} process: {}", role, e));
                    self.execute(actions);
                    self.sync_state();
                    return false;
                }
            }
        }
        true
    }

    fn pump(&mut self, rx: &Receiver<ProcessEvent>) {
        let progress_timeout = self.timeouts.progress_timeout();
        let mut last_progress = Instant::now();

        while !self.machine.is_terminal() {
            let remaining = progress_timeout.saturating_sub(last_progress.elapsed());
            let actions = match rx.recv_timeout(remaining) {
                Ok(ProcessEvent::Envelope { role, envelope }) => {
                    last_progress = Instant::now();
                    self.forward(role, &envelope);
                    self.machine.on_envelope(role, &envelope)
                }
                Ok(ProcessEvent::Exited { role, code }) => {
                    let mut actions = self.record_exit(role, code);
                    if !self.machine.is_terminal() && self.all_exited() {
                        actions.extend(
                            self.machine
                                .fail("All toolchain processes exited before the workflow finished"),
                        );
                    }
                    actions
                }
                Err(RecvTimeoutError::Timeout) => self.machine.fail(&format!(
                    "No progress from the toolchain within {} s",
                    progress_timeout.as_secs()
                )),
                Err(RecvTimeoutError::Disconnected) => self
                    .machine
                    .fail("Lost the connection to all toolchain processes"),
            };
            self.execute(actions);
            self.sync_state();
        }
    }

    fn forward(&self, from: ProcessRole, envelope: &Envelope) {
        match self.router.route(envelope) {
            Route::Deliver(target) => match self.processes.get(&target) {
                Some(sink) if !self.exited.contains(&target) => {
                    if let Err(e) = sink.send(envelope) {
                        tracing::warn!(
                            "Session {}: forwarding {} from {} to {} failed: {}",
                            self.session_id,
                            envelope.message_type,
                            from,
                            target,
                            e
                        );
                    }
                }
                _ => tracing::debug!(
                    "Session {}: {} has no running {} process",
                    self.session_id,
                    envelope.message_type,
                    target
                ),
            },
            Route::Broadcast => {}
            Route::Unrecognized(module) => tracing::trace!(
                "Session {}: not forwarding {} for module {}",
                self.session_id,
                envelope.message_type,
                module
            ),
        }
    }

    fn record_exit(&mut self, role: ProcessRole, code: Option<i32>) -> Vec<Action> {
        tracing::debug!(
            "Session {}: {} exited with code {}",
            self.session_id,
            role,
            describe_exit_code(code)
        );
        self.exited.insert(role);
        if role == ProcessRole::Export {
            if let Some(workspace) = self.workspace.as_mut() {
                workspace.remove();
            }
        }
        self.machine.on_exit(role, code)
    }

    fn all_exited(&self) -> bool {
        self.processes.keys().all(|role| self.exited.contains(role))
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send { role, envelope } => self.send(role, &envelope),
                Action::Respond(response) => self.respond(response),
                Action::Upload => self.relay_artifact(),
                Action::ShutdownAll => {
                    for (&role, sink) in &self.processes {
                        if !self.exited.contains(&role) {
                            if let Err(e) = sink.send(&Envelope::shutdown(role)) {
                                tracing::debug!("Shutdown of {} not delivered: {}", role, e);
                            }
                        }
                    }
                }
                Action::KillAll => self.kill_all(),
            }
        }
    }

    fn send(&self, role: ProcessRole, envelope: &Envelope) {
        let Some(sink) = self.processes.get(&role) else {
            tracing::warn!(
                "Session {}: no {} process for {}",
                self.session_id,
                role,
                envelope.message_type
            );
            return;
        };
        if let Err(e) = sink.send(envelope) {
            // The exit event that follows decides the outcome
            tracing::error!(
                "Session {}: sending {} to {} failed: {}",
                self.session_id,
                envelope.message_type,
                role,
                e
            );
        }
    }

    fn kill_all(&self) {
        for (role, sink) in &self.processes {
            if !self.exited.contains(role) {
                sink.terminate();
            }
        }
    }

    /// Read the artifact now, publish it on a detached thread
    fn relay_artifact(&self) {
        let Some(upload) = self.upload.clone() else {
            tracing::warn!(
                "Session {}: upload requested but no uploader is configured",
                self.session_id
            );
            return;
        };
        let Some(workspace) = self.workspace.as_ref().filter(|w| !w.is_removed()) else {
            tracing::warn!("Session {}: no workspace to relay from", self.session_id);
            return;
        };
        let Some(path) = workspace.find_artifact(&upload.artifact_suffix) else {
            tracing::warn!(
                "Session {}: no artifact ending in '{}' in {:?}",
                self.session_id,
                upload.artifact_suffix,
                workspace.path()
            );
            return;
        };
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Session {}: failed to read {:?}: {}", self.session_id, path, e);
                return;
            }
        };

        let request = ArtifactUpload {
            upload_server: upload.upload_server.clone(),
            experiment_id: upload.experiment_id.clone(),
            session_id: self.session_id.clone(),
            file_name: upload.file_name.clone(),
            bytes,
        };
        let uploader = Arc::clone(&upload.uploader);
        let spawned = std::thread::Builder::new()
            .name(format!("upload-{}", self.session_id))
            .spawn(move || {
                if let Err(e) = uploader.upload(&request) {
                    tracing::warn!("Upload for session {} failed: {}", request.session_id, e);
                }
            });
        if let Err(e) = spawned {
            tracing::warn!("Session {}: failed to start upload: {}", self.session_id, e);
        }
    }

    /// Release the session, then deliver; a caller woken by the response
    /// must find the id free
    fn respond(&mut self, response: TerminalResponse) {
        if !self.responder.has_responded() {
            self.release_session();
        }
        self.responder.respond(response);
    }

    /// Remove the workspace and drop the registry entry; runs once
    fn release_session(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(workspace) = self.workspace.as_mut() {
            workspace.remove();
        }
        self.registry.deregister(&self.session_id);
    }

    fn sync_state(&self) {
        // After release the id may already belong to a new session
        if !self.released {
            self.registry
                .update_state(&self.session_id, self.machine.state_name());
        }
    }

    fn teardown(&mut self, rx: &Receiver<ProcessEvent>) {
        let deadline = Instant::now() + self.timeouts.shutdown_grace();

        while !self.all_exited() {
            match rx.recv_deadline(deadline) {
                Ok(ProcessEvent::Exited { role, code }) => {
                    // Terminal already; the machine ignores exits
                    let _ = self.record_exit(role, code);
                }
                Ok(ProcessEvent::Envelope { role, envelope }) => tracing::trace!(
                    "Session {}: dropping {} from {} during teardown",
                    self.session_id,
                    envelope.message_type,
                    role
                ),
                Err(_) => break,
            }
        }

        if !self.all_exited() {
            tracing::debug!(
                "Session {}: killing processes still running after the grace period",
                self.session_id
            );
            self.kill_all();
        }
        self.processes.clear();

        if let Some(mut workspace) = self.workspace.take() {
            workspace.remove();
        }

        if !self.responder.has_responded() {
            self.respond(TerminalResponse::failure(
                &self.session_id,
                "The workflow ended without a result",
            ));
        }
        self.release_session();
        tracing::info!(
            "Session {}: workflow finished in state {}",
            self.session_id,
            self.machine.state_name()
        );
    }
}
