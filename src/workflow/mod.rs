//! Workflow orchestration
//!
//! A workflow is a pure state machine ([`WorkflowMachine`]) that reacts to
//! envelopes, process exits and failures by emitting [`Action`]s. The
//! [`WorkflowDriver`] owns the processes of one session and applies those
//! actions on a single thread, so all routing and transitions of a session
//! happen in order.
//!
//! # Workflows
//!
//! - [`CompileStateMachine`] - source → chip → pin mapping → export → artifact
//! - [`MinimizeStateMachine`] - one equation through the source process's minimizer

pub mod compile;
pub mod driver;
pub mod equation;
pub mod minimize;

pub use compile::{CompileJob, CompileState, CompileStateMachine};
pub use driver::{response_slot, PendingResponse, Responder, UploadContext, WorkflowDriver};
pub use equation::{AssignOp, PreparedEquation};
pub use minimize::{MinimizeState, MinimizeStateMachine};

use crate::protocol::{Envelope, ProcessRole};
use crate::types::TerminalResponse;

/// Side effects requested by a state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write an envelope to one process
    Send { role: ProcessRole, envelope: Envelope },
    /// Deliver the terminal response to the caller
    Respond(TerminalResponse),
    /// Relay the produced artifact
    Upload,
    /// Ask every running process to shut down
    ShutdownAll,
    /// Kill every running process
    KillAll,
}

/// Event-driven workflow logic without any I/O
pub trait WorkflowMachine: Send {
    /// Processes to spawn, in spawn order
    fn roles(&self) -> &'static [ProcessRole];

    /// Roles the router may forward envelopes to
    fn forward_to(&self) -> &'static [ProcessRole];

    /// Called once after all processes were spawned
    fn start(&mut self) -> Vec<Action>;

    /// An envelope arrived from `from`
    fn on_envelope(&mut self, from: ProcessRole, envelope: &Envelope) -> Vec<Action>;

    /// A process exited
    fn on_exit(&mut self, role: ProcessRole, code: Option<i32>) -> Vec<Action>;

    /// Fail the session for a reason outside the protocol (timeout, spawn error)
    fn fail(&mut self, reason: &str) -> Vec<Action>;

    fn is_terminal(&self) -> bool;

    /// Current state for logging and the session registry
    fn state_name(&self) -> &'static str;
}

/// Human-readable exit code for messages
pub(crate) fn describe_exit_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
