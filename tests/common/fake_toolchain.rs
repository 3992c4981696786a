//! Scripted stand-ins for the toolchain executables
//!
//! A [`ScriptedLauncher`] hands out fake processes that answer every envelope
//! written to them with a scripted list of [`Reply`]s. Replies are encoded to
//! wire lines and pushed through a [`StreamFramer`] in two chunks, so the
//! driver sees exactly what a reader thread would produce.

use crossbeam_channel::Sender;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use wide_toolchain::error::{Result, ToolchainError};
use wide_toolchain::process::{EnvelopeSink, ProcessEvent, ProcessLauncher};
use wide_toolchain::protocol::{
    AddressHop, Direction, Envelope, MessageKind, ProcessRole, StreamFramer,
};

/// What a fake process does in response to one incoming envelope
#[derive(Debug, Clone)]
pub enum Reply {
    /// Write an envelope to stdout
    Send(Envelope),
    /// Write raw bytes to stdout
    Raw(Vec<u8>),
    /// Exit with this code
    Exit(Option<i32>),
}

pub type Script = Arc<dyn Fn(&Envelope) -> Vec<Reply> + Send + Sync>;

/// Envelope as a toolchain module would emit it
pub fn envelope_from(module: &str, kind: MessageKind, payload: Value) -> Envelope {
    Envelope::new(
        vec![AddressHop::new(module, 0)],
        kind,
        "none",
        Direction::None,
        payload,
    )
}

/// Launcher whose processes follow per-role scripts
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    scripts: HashMap<ProcessRole, Script>,
    greetings: HashMap<ProcessRole, Vec<Reply>>,
    fail_role: Option<ProcessRole>,
    hanging: HashSet<ProcessRole>,
    received: Arc<Mutex<Vec<(ProcessRole, Envelope)>>>,
    launched: Arc<Mutex<Vec<ProcessRole>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer envelopes written to `role`
    pub fn on<F>(mut self, role: ProcessRole, script: F) -> Self
    where
        F: Fn(&Envelope) -> Vec<Reply> + Send + Sync + 'static,
    {
        self.scripts.insert(role, Arc::new(script));
        self
    }

    /// Replies emitted right after `role` is launched
    pub fn greet(mut self, role: ProcessRole, replies: Vec<Reply>) -> Self {
        self.greetings.insert(role, replies);
        self
    }

    /// Make launching `role` fail like a missing executable
    pub fn fail_on(mut self, role: ProcessRole) -> Self {
        self.fail_role = Some(role);
        self
    }

    /// Make `role` ignore shutdown requests and kills, so only the
    /// teardown grace period ends it
    pub fn hang_on_exit(mut self, role: ProcessRole) -> Self {
        self.hanging.insert(role);
        self
    }

    /// Everything written to any fake process, in order
    pub fn received(&self) -> Vec<(ProcessRole, Envelope)> {
        self.received.lock().unwrap().clone()
    }

    /// Message kinds written to one process, in order
    pub fn kinds_sent_to(&self, role: ProcessRole) -> Vec<MessageKind> {
        self.received()
            .into_iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, envelope)| envelope.message_type)
            .collect()
    }

    pub fn launched(&self) -> Vec<ProcessRole> {
        self.launched.lock().unwrap().clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(
        &self,
        role: ProcessRole,
        events: Sender<ProcessEvent>,
    ) -> Result<Box<dyn EnvelopeSink>> {
        if self.fail_role == Some(role) {
            return Err(ToolchainError::Spawn {
                role,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such executable"),
            });
        }
        self.launched.lock().unwrap().push(role);

        let process = FakeProcess {
            role,
            script: self.scripts.get(&role).cloned(),
            events,
            framer: Mutex::new(StreamFramer::new(64 * 1024)),
            exited: AtomicBool::new(false),
            hangs: self.hanging.contains(&role),
            received: Arc::clone(&self.received),
        };
        if let Some(greeting) = self.greetings.get(&role) {
            process.emit(greeting.clone());
        }
        Ok(Box::new(process))
    }
}

struct FakeProcess {
    role: ProcessRole,
    script: Option<Script>,
    events: Sender<ProcessEvent>,
    framer: Mutex<StreamFramer>,
    exited: AtomicBool,
    hangs: bool,
    received: Arc<Mutex<Vec<(ProcessRole, Envelope)>>>,
}

impl FakeProcess {
    fn emit(&self, replies: Vec<Reply>) {
        for reply in replies {
            match reply {
                Reply::Send(envelope) => {
                    let line = envelope.to_line().unwrap();
                    self.write_stdout(line.as_bytes());
                }
                Reply::Raw(bytes) => self.write_stdout(&bytes),
                Reply::Exit(code) => self.exit(code),
            }
        }
    }

    fn write_stdout(&self, bytes: &[u8]) {
        if self.exited.load(Ordering::SeqCst) {
            return;
        }
        let mut framer = self.framer.lock().unwrap();
        // Split every write so frames straddle read boundaries
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        for chunk in [head, tail] {
            for envelope in framer.feed(chunk) {
                let _ = self.events.send(ProcessEvent::Envelope {
                    role: self.role,
                    envelope,
                });
            }
        }
    }

    fn exit(&self, code: Option<i32>) {
        if !self.exited.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(ProcessEvent::Exited {
                role: self.role,
                code,
            });
        }
    }
}

impl EnvelopeSink for FakeProcess {
    fn role(&self) -> ProcessRole {
        self.role
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        if self.exited.load(Ordering::SeqCst) {
            return Err(ToolchainError::ProcessIo {
                role: self.role,
                message: "stdin already closed".to_string(),
            });
        }
        self.received
            .lock()
            .unwrap()
            .push((self.role, envelope.clone()));

        if envelope.message_type == MessageKind::Control
            && envelope.payload == Value::String("shutdown".to_string())
        {
            if !self.hangs {
                self.exit(Some(0));
            }
            return Ok(());
        }

        if let Some(script) = &self.script {
            self.emit(script(envelope));
        }
        Ok(())
    }

    fn terminate(&self) {
        if !self.hangs {
            self.exit(None);
        }
    }
}

// ==================== Canned toolchains ====================

/// Source process that acknowledges every loaded document
pub fn acknowledging_source(envelope: &Envelope) -> Vec<Reply> {
    match envelope.message_type {
        MessageKind::FileLoadContent => vec![Reply::Send(envelope_from(
            "code.document",
            MessageKind::FileNewAck,
            Value::Null,
        ))],
        _ => Vec::new(),
    }
}

/// Split a start-export annotation into workspace and source file name
pub fn export_target(envelope: &Envelope) -> Option<(PathBuf, String)> {
    let Direction::Annotation(target) = &envelope.direction else {
        return None;
    };
    let (workspace, file) = target.rsplit_once(',')?;
    Some((PathBuf::from(workspace), file.to_string()))
}

/// Export process that loads any chip, reports the given signals and writes
/// `<stem>.out.pof` into the workspace when asked to export
pub fn exporting_export(
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
) -> impl Fn(&Envelope) -> Vec<Reply> + Send + Sync + 'static {
    move |envelope: &Envelope| match envelope.message_type {
        MessageKind::ChooseChip => vec![Reply::Send(envelope_from(
            "exportsim.export",
            MessageKind::ChipLoaded,
            Value::Null,
        ))],
        MessageKind::NoExistingMapping => vec![Reply::Send(envelope_from(
            "exportsim.export",
            MessageKind::PinMapRequest,
            serde_json::json!({
                "inputVariables": inputs,
                "outputVariables": outputs,
            }),
        ))],
        MessageKind::StartExport => {
            if let Some((workspace, file)) = export_target(envelope) {
                let stem = file.split('.').next().unwrap_or("project").to_string();
                std::fs::write(workspace.join(format!("{stem}.out.pof")), b"POF-IMAGE").unwrap();
            }
            vec![Reply::Send(envelope_from(
                "exportsim.export",
                MessageKind::ExportFinished,
                Value::String("Export finished".to_string()),
            ))]
        }
        _ => Vec::new(),
    }
}

/// Source and export processes for a successful compile of `out = a & b;`
pub fn compiling_toolchain() -> ScriptedLauncher {
    ScriptedLauncher::new()
        .on(ProcessRole::Source, acknowledging_source)
        .on(
            ProcessRole::Export,
            exporting_export(&["a_var", "b_var"], &["out_var"]),
        )
}
