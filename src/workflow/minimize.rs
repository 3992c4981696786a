//! Minimize workflow state machine
//!
//! Only the source and persistence processes take part. The source process
//! announces itself with an `address_single` broadcast before it accepts a
//! document; after the document is acknowledged the minimization query is sent
//! for the equation line.

use super::equation::PreparedEquation;
use super::{describe_exit_code, Action, WorkflowMachine};
use crate::protocol::{AddressHop, Envelope, MessageKind, ProcessRole};
use crate::types::TerminalResponse;

const MINIMIZE_ROLES: [ProcessRole; 2] = [ProcessRole::Source, ProcessRole::Persistence];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinimizeState {
    #[default]
    Idle,
    AwaitingSource,
    EquationSent,
    QuerySent,
    Completed,
    Failed,
}

impl MinimizeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MinimizeState::Completed | MinimizeState::Failed)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MinimizeState::Idle => "Idle",
            MinimizeState::AwaitingSource => "AwaitingSource",
            MinimizeState::EquationSent => "EquationSent",
            MinimizeState::QuerySent => "QuerySent",
            MinimizeState::Completed => "Completed",
            MinimizeState::Failed => "Failed",
        }
    }
}

pub struct MinimizeStateMachine {
    session_id: String,
    equation: PreparedEquation,
    state: MinimizeState,
    responded: bool,
}

impl MinimizeStateMachine {
    pub fn new(session_id: impl Into<String>, equation: PreparedEquation) -> Self {
        Self {
            session_id: session_id.into(),
            equation,
            state: MinimizeState::Idle,
            responded: false,
        }
    }

    pub fn state(&self) -> MinimizeState {
        self.state
    }

    fn finish(&mut self, state: MinimizeState, response: TerminalResponse) -> Vec<Action> {
        self.state = state;
        let mut actions = Vec::with_capacity(2);
        if !self.responded {
            self.responded = true;
            actions.push(Action::Respond(response));
        }
        actions.push(Action::KillAll);
        actions
    }

    fn backend_error(&mut self, code: Option<i32>) -> Vec<Action> {
        let response = TerminalResponse::failure(
            &self.session_id,
            format!(
                "An error occurred in the backend, please check your equation and try again (error code: {})",
                describe_exit_code(code)
            ),
        );
        self.finish(MinimizeState::Failed, response)
    }
}

impl WorkflowMachine for MinimizeStateMachine {
    fn roles(&self) -> &'static [ProcessRole] {
        &MINIMIZE_ROLES
    }

    fn forward_to(&self) -> &'static [ProcessRole] {
        &MINIMIZE_ROLES
    }

    fn start(&mut self) -> Vec<Action> {
        if self.state == MinimizeState::Idle {
            self.state = MinimizeState::AwaitingSource;
        }
        Vec::new()
    }

    fn on_envelope(&mut self, from: ProcessRole, envelope: &Envelope) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        match (self.state, &envelope.message_type) {
            (MinimizeState::AwaitingSource, MessageKind::AddressSingle)
                if envelope.origin().is_some_and(|hop| hop.module() == "code") =>
            {
                self.state = MinimizeState::EquationSent;
                vec![Action::Send {
                    role: ProcessRole::Source,
                    envelope: Envelope::load_source(
                        vec![AddressHop::new("", 0)],
                        &self.equation.document(),
                    ),
                }]
            }
            (MinimizeState::EquationSent, MessageKind::FileNewAck) => {
                self.state = MinimizeState::QuerySent;
                vec![Action::Send {
                    role: ProcessRole::Source,
                    envelope: Envelope::minimize_query(self.equation.equation_line()),
                }]
            }
            (MinimizeState::EquationSent | MinimizeState::QuerySent, MessageKind::MinimizedEquation) => {
                match self.equation.render_minimized(&envelope.payload) {
                    Ok(result) => {
                        tracing::info!("Session {}: minimized to {}", self.session_id, result);
                        let response = TerminalResponse::success(&self.session_id, result);
                        self.finish(MinimizeState::Completed, response)
                    }
                    Err(e) => {
                        let response = TerminalResponse::failure(&self.session_id, e.to_string());
                        self.finish(MinimizeState::Failed, response)
                    }
                }
            }
            (state, kind) => {
                tracing::trace!(
                    "Session {}: {} from {} not expected in {}",
                    self.session_id,
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
        if role == ProcessRole::Persistence && code == Some(0) {
            return Vec::new();
        }
        tracing::error!(
            "Session {}: {} process exited before a result (exit code {})",
            self.session_id,
            role,
            describe_exit_code(code)
        );
        self.backend_error(code)
    }

    fn fail(&mut self, reason: &str) -> Vec<Action> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        tracing::error!("Session {}: {}", self.session_id, reason);
        let response = TerminalResponse::failure(&self.session_id, reason);
        self.finish(MinimizeState::Failed, response)
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn state_name(&self) -> &'static str {
        self.state.display_name()
    }
}
