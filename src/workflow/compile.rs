//! Compile workflow state machine
//!
//! ```text
//! Idle → SourceSent → ChipLoadRequested → ChipLoaded → PinMapRequested → ExportStarted
//!                                                                          ↓
//!                                                                  Completed | Failed
//! ```
//!
//! A syntax error report with detail fails the session from any non-terminal
//! state. Envelopes a state does not expect are ignored.

use super::{describe_exit_code, Action, WorkflowMachine};
use crate::chip::{ChipDescriptor, ChipProfile, PinMapBuilder};
use crate::protocol::{AddressHop, Envelope, MessageKind, ProcessRole};
use crate::types::TerminalResponse;
use serde_json::Value;

/// Spawn order of the compile processes
const COMPILE_ROLES: [ProcessRole; 4] = [
    ProcessRole::Persistence,
    ProcessRole::Source,
    ProcessRole::Export,
    ProcessRole::Table,
];

/// The compile workflow answers the persisted-mapping lookup itself and
/// never forwards to the persistence process
const COMPILE_FORWARD: [ProcessRole; 3] =
    [ProcessRole::Source, ProcessRole::Table, ProcessRole::Export];

/// Everything the compile workflow needs besides the processes
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub session_id: String,
    /// Base name of the source file, reported to the export process
    pub source_file_name: String,
    /// Source text after identifier disambiguation
    pub source_text: String,
    pub descriptor: ChipDescriptor,
    pub profile: ChipProfile,
    /// Workspace path with forward slashes
    pub workspace: String,
    /// Fail instead of warn when signals cannot be mapped
    pub strict_pin_mapping: bool,
    /// External synthesis tool the export process should use
    pub synthesis_tool_path: Option<String>,
    /// Whether the artifact is relayed on success
    pub upload_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileState {
    #[default]
    Idle,
    SourceSent,
    ChipLoadRequested,
    ChipLoaded,
    PinMapRequested,
    ExportStarted,
    Completed,
    Failed,
}

impl CompileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompileState::Completed | CompileState::Failed)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CompileState::Idle => "Idle",
            CompileState::SourceSent => "SourceSent",
            CompileState::ChipLoadRequested => "ChipLoadRequested",
            CompileState::ChipLoaded => "ChipLoaded",
            CompileState::PinMapRequested => "PinMapRequested",
            CompileState::ExportStarted => "ExportStarted",
            CompileState::Completed => "Completed",
            CompileState::Failed => "Failed",
        }
    }
}

pub struct CompileStateMachine {
    job: CompileJob,
    state: CompileState,
    responded: bool,
}

impl CompileStateMachine {
    pub fn new(job: CompileJob) -> Self {
        Self {
            job,
            state: CompileState::Idle,
            responded: false,
        }
    }

    pub fn state(&self) -> CompileState {
        self.state
    }

    pub fn job(&self) -> &CompileJob {
        &self.job
    }

    fn send(role: ProcessRole, envelope: Envelope) -> Action {
        Action::Send { role, envelope }
    }

    /// Enter a terminal state and emit the single response
    fn finish(&mut self, state: CompileState, response: TerminalResponse, teardown: Action) -> Vec<Action> {
        self.state = state;
        let mut actions = Vec::with_capacity(2);
        if !self.responded {
            self.responded = true;
            actions.push(Action::Respond(response));
        }
        actions.push(teardown);
        actions
    }

    fn on_pin_map_request(&mut self, envelope: &Envelope) -> Vec<Action> {
        self.state = CompileState::PinMapRequested;

        let inputs = signal_names(&envelope.payload, "inputVariables");
        let outputs = signal_names(&envelope.payload, "outputVariables");
        let mapping = PinMapBuilder::build(&self.job.descriptor, &inputs, &outputs, &self.job.profile);

        if !mapping.is_complete() {
            let unmapped = mapping.unmapped().join(", ");
            tracing::warn!(
                "Session {}: no pin on {:?} for signal(s) {}",
                self.job.session_id,
                self.job.descriptor.path,
                unmapped
            );
            if self.job.strict_pin_mapping {
                let response = TerminalResponse::failure(
                    &self.job.session_id,
                    format!("Unmapped signals: {}", unmapped),
                );
                return self.finish(CompileState::Failed, response, Action::ShutdownAll);
            }
        }

        let mut actions = Vec::with_capacity(3);
        if let Some(tool) = &self.job.synthesis_tool_path {
            actions.push(Self::send(
                ProcessRole::Export,
                Envelope::export_setting("string", "quartuspath", tool),
            ));
            actions.push(Self::send(
                ProcessRole::Export,
                Envelope::export_setting("bool", "usequartus", "1"),
            ));
        }

        let pin_mapping = match mapping.to_value() {
            Ok(value) => value,
            Err(e) => {
                let response = TerminalResponse::failure(
                    &self.job.session_id,
                    format!("Failed to serialize pin mapping: {}", e),
                );
                return self.finish(CompileState::Failed, response, Action::KillAll);
            }
        };

        let target = format!("{},{}", self.job.workspace, self.job.source_file_name).replace('\\', "/");
        actions.push(Self::send(
            ProcessRole::Export,
            Envelope::start_export(target, pin_mapping),
        ));
        self.state = CompileState::ExportStarted;
        actions
    }
}

impl WorkflowMachine for CompileStateMachine {
    fn roles(&self) -> &'static [ProcessRole] {
        &COMPILE_ROLES
    }

    fn forward_to(&self) -> &'static [ProcessRole] {
        &COMPILE_FORWARD
    }

    fn start(&mut self) -> Vec<Action> {
        if self.state != CompileState::Idle {
            return Vec::new();
        }
        self.state = CompileState::SourceSent;
        vec![Self::send(
            ProcessRole::Source,
            Envelope::load_source(
                vec![
                    AddressHop::new("gui.message", 101),
                    AddressHop::new("save.file", 0),
                ],
                &self.job.source_text,
            ),
        )]
    }

    fn on_envelope(&mut self, from: ProcessRole, envelope: &Envelope) -> Vec<Action> {
        if self.state.is_terminal() {
            tracing::debug!(
                "Session {}: ignoring {} from {} after completion",
                self.job.session_id,
                envelope.message_type,
                from
            );
            return Vec::new();
        }

        if envelope.message_type == MessageKind::SyntaxError && envelope.has_detail() {
            tracing::info!("Session {}: source has syntax errors", self.job.session_id);
            let response = TerminalResponse::failure(&self.job.session_id, envelope_text(envelope));
            return self.finish(CompileState::Failed, response, Action::ShutdownAll);
        }

        match (self.state, &envelope.message_type) {
            (CompileState::SourceSent, MessageKind::FileNewAck) => {
                self.state = CompileState::ChipLoadRequested;
                vec![Self::send(
                    ProcessRole::Export,
                    Envelope::choose_chip(&self.job.descriptor.wire_path()),
                )]
            }
            (CompileState::ChipLoadRequested, MessageKind::ChipLoaded) => {
                self.state = CompileState::ChipLoaded;
                vec![Self::send(ProcessRole::Export, Envelope::no_existing_mapping())]
            }
            (CompileState::ChipLoaded, MessageKind::PinMapRequest) => {
                self.on_pin_map_request(envelope)
            }
            (CompileState::ExportStarted, MessageKind::ExportFinished) => {
                tracing::info!("Session {}: export finished", self.job.session_id);
                let upload = self.job.upload_requested;
                let response = TerminalResponse::success(&self.job.session_id, envelope_text(envelope));
                let mut actions = Vec::with_capacity(3);
                if upload {
                    actions.push(Action::Upload);
                }
                actions.extend(self.finish(CompileState::Completed, response, Action::ShutdownAll));
                actions
            }
            (state, kind) => {
                tracing::trace!(
                    "Session {}: {} from {} not expected in {}",
                    self.job.session_id,
                    kind,
                    from,
                    state.display_name()
                );
                Vec::new()
            }
        }
    }

    fn on_exit(&mut self, role: ProcessRole, code: Option<i32>) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        if code == Some(0) {
            tracing::warn!(
                "Session {}: {} process exited early in {}",
                self.job.session_id,
                role,
                self.state.display_name()
            );
            return Vec::new();
        }

        tracing::error!(
            "Session {}: {} process crashed (exit code {})",
            self.job.session_id,
            role,
            describe_exit_code(code)
        );
        let response = TerminalResponse::failure(
            &self.job.session_id,
            format!(
                "The {} process exited unexpectedly (exit code: {})",
                role,
                describe_exit_code(code)
            ),
        );
        self.finish(CompileState::Failed, response, Action::KillAll)
    }

    fn fail(&mut self, reason: &str) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        tracing::error!("Session {}: {}", self.job.session_id, reason);
        let response = TerminalResponse::failure(&self.job.session_id, reason);
        self.finish(CompileState::Failed, response, Action::KillAll)
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn state_name(&self) -> &'static str {
        self.state.display_name()
    }
}

fn signal_names(payload: &Value, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|name| name.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Compact JSON of an envelope, used as response output
fn envelope_text(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|_| envelope.message_type.to_string())
}
