//! Spawned toolchain executables
//!
//! A [`ToolchainProcess`] owns one child process. Its stdout is drained by a
//! dedicated reader thread that exclusively owns a [`StreamFramer`] and turns
//! the byte stream into [`ProcessEvent`]s on a crossbeam channel; its stderr is
//! drained by a second thread that only logs. Writing goes through the
//! [`EnvelopeSink`] trait so workflows can be driven by scripted fakes in tests.
//!
//! The [`ProcessLauncher`] trait is the seam between workflows and real
//! executables; [`ExecutableLauncher`] is the production implementation.

use crate::config::ToolchainSettings;
use crate::error::{Result, ToolchainError};
use crate::protocol::{Envelope, ProcessRole, StreamFramer};
use crossbeam_channel::Sender;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Read buffer size for process stdout
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Poll interval while waiting for a process with closed stdout to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Events produced by the reader threads of a process
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// A complete envelope was decoded from the process's stdout
    Envelope { role: ProcessRole, envelope: Envelope },
    /// The process exited; `code` is `None` when it was killed by a signal
    Exited { role: ProcessRole, code: Option<i32> },
}

impl ProcessEvent {
    pub fn role(&self) -> ProcessRole {
        match self {
            ProcessEvent::Envelope { role, .. } | ProcessEvent::Exited { role, .. } => *role,
        }
    }
}

/// Write side of a running process
pub trait EnvelopeSink: Send + Sync {
    /// Role of the process behind this sink
    fn role(&self) -> ProcessRole;

    /// Serialize the envelope, write it as one line and flush
    fn send(&self, envelope: &Envelope) -> Result<()>;

    /// Forcefully stop the process. Idempotent.
    fn terminate(&self);
}

/// Starts toolchain processes for a workflow
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the process for `role`; its events are delivered on `events`
    fn launch(
        &self,
        role: ProcessRole,
        events: Sender<ProcessEvent>,
    ) -> Result<Box<dyn EnvelopeSink>>;
}

/// One spawned toolchain executable
pub struct ToolchainProcess {
    role: ProcessRole,
    pid: u32,
    stdin: Mutex<Option<BufWriter<ChildStdin>>>,
    child: Arc<Mutex<Child>>,
}

impl ToolchainProcess {
    /// Spawn `program` with piped streams and start its reader threads
    pub fn spawn(
        role: ProcessRole,
        program: &Path,
        max_frame_bytes: usize,
        events: Sender<ProcessEvent>,
    ) -> Result<Self> {
        tracing::debug!("Spawning {} process: {:?}", role, program);

        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolchainError::Spawn { role, source })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            return Err(ToolchainError::ProcessIo {
                role,
                message: "Failed to capture process streams".to_string(),
            });
        };

        let child = Arc::new(Mutex::new(child));

        let reader_child = Arc::clone(&child);
        std::thread::Builder::new()
            .name(format!("{}-stdout", role))
            .spawn(move || read_stdout(role, stdout, max_frame_bytes, reader_child, events))
            .map_err(|e| ToolchainError::ProcessIo {
                role,
                message: format!("Failed to start reader thread: {}", e),
            })?;

        if let Some(stderr) = stderr {
            let _ = std::thread::Builder::new()
                .name(format!("{}-stderr", role))
                .spawn(move || log_stderr(role, stderr));
        }

        tracing::info!("{} process spawned: pid={}", role, pid);

        Ok(Self {
            role,
            pid,
            stdin: Mutex::new(Some(BufWriter::new(stdin))),
            child,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl EnvelopeSink for ToolchainProcess {
    fn role(&self) -> ProcessRole {
        self.role
    }

    fn send(&self, envelope: &Envelope) -> Result<()> {
        let line = envelope.to_line()?;
        let mut guard = self.stdin.lock().map_err(|_| ToolchainError::ProcessIo {
            role: self.role,
            message: "stdin lock poisoned".to_string(),
        })?;
        let writer = guard.as_mut().ok_or_else(|| ToolchainError::ProcessIo {
            role: self.role,
            message: "stdin already closed".to_string(),
        })?;

        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| ToolchainError::ProcessIo {
                role: self.role,
                message: e.to_string(),
            })?;

        tracing::debug!("-> {} {}", self.role, line.trim_end());
        Ok(())
    }

    fn terminate(&self) {
        if let Ok(mut stdin) = self.stdin.lock() {
            stdin.take();
        }
        if let Ok(mut child) = self.child.lock() {
            // Fails only when the process is already gone
            if child.kill().is_ok() {
                tracing::debug!("Killed {} process (pid={})", self.role, self.pid);
            }
        }
    }
}

impl Drop for ToolchainProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn read_stdout(
    role: ProcessRole,
    mut stdout: impl Read,
    max_frame_bytes: usize,
    child: Arc<Mutex<Child>>,
    events: Sender<ProcessEvent>,
) {
    let mut framer = StreamFramer::new(max_frame_bytes);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        match stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                for envelope in framer.feed(&buf[..n]) {
                    tracing::debug!("<- {} {}", role, envelope.message_type);
                    // Keep draining after the driver is gone so the child never blocks on a full pipe
                    let _ = events.send(ProcessEvent::Envelope { role, envelope });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("{} stdout read failed: {}", role, e);
                break;
            }
        }
    }

    if framer.has_pending() {
        tracing::warn!(
            "{} closed stdout with {} unterminated bytes",
            role,
            framer.pending_len()
        );
    }
    let stats = framer.stats();
    tracing::debug!(
        "{} framer: {} bytes, {} frames, {} discarded",
        role,
        stats.bytes_seen,
        stats.frames_decoded,
        stats.frames_discarded
    );

    let code = wait_for_exit(role, &child);
    tracing::info!("{} process exited with code {:?}", role, code);
    let _ = events.send(ProcessEvent::Exited { role, code });
}

/// Poll until the child has exited, releasing the lock between polls so
/// `terminate` can still reach it
fn wait_for_exit(role: ProcessRole, child: &Mutex<Child>) -> Option<i32> {
    loop {
        {
            let Ok(mut child) = child.lock() else {
                return None;
            };
            match child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to query {} exit status: {}", role, e);
                    return None;
                }
            }
        }
        std::thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn log_stderr(role: ProcessRole, stderr: impl Read) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(line) if !line.trim().is_empty() => tracing::debug!("[{} stderr] {}", role, line),
            Ok(_) => {}
            Err(_) => break,
        }
    }
}

/// Launches the configured toolchain executables
#[derive(Debug, Clone)]
pub struct ExecutableLauncher {
    toolchain: ToolchainSettings,
    max_frame_bytes: usize,
}

impl ExecutableLauncher {
    pub fn new(toolchain: ToolchainSettings, max_frame_bytes: usize) -> Self {
        Self {
            toolchain,
            max_frame_bytes,
        }
    }

    pub fn executable(&self, role: ProcessRole) -> PathBuf {
        self.toolchain.executable(role)
    }
}

impl ProcessLauncher for ExecutableLauncher {
    fn launch(
        &self,
        role: ProcessRole,
        events: Sender<ProcessEvent>,
    ) -> Result<Box<dyn EnvelopeSink>> {
        let program = self.executable(role);
        let process = ToolchainProcess::spawn(role, &program, self.max_frame_bytes, events)?;
        Ok(Box::new(process))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;
    use std::io::Cursor;

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let launcher = ExecutableLauncher::new(
            ToolchainSettings {
                directory: PathBuf::from("/definitely/not/a/toolchain"),
                ..Default::default()
            },
            1024,
        );

        let err = launcher.launch(ProcessRole::Table, tx).err().unwrap();
        match err {
            ToolchainError::Spawn { role, .. } => assert_eq!(role, ProcessRole::Table),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_event_role() {
        let event = ProcessEvent::Exited {
            role: ProcessRole::Source,
            code: Some(1),
        };
        assert_eq!(event.role(), ProcessRole::Source);
    }

    #[cfg(unix)]
    #[test]
    fn test_reader_emits_envelopes_then_exit() {
        let child = Command::new("true").spawn().unwrap();
        let child = Arc::new(Mutex::new(child));
        let (tx, rx) = crossbeam_channel::unbounded();

        let stdout = Cursor::new(
            b"{\"tid\":[],\"msgType\":\"file_new_ack\"}\n{\"tid\":[],\"msgType\":\"control\"}\n"
                .to_vec(),
        );
        read_stdout(ProcessRole::Source, stdout, 1024, child, tx);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            ProcessEvent::Envelope { envelope, .. } if envelope.message_type == MessageKind::FileNewAck
        ));
        assert_eq!(
            events[2],
            ProcessEvent::Exited {
                role: ProcessRole::Source,
                code: Some(0)
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_cat_echoes_envelopes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let process =
            ToolchainProcess::spawn(ProcessRole::Persistence, Path::new("cat"), 1024, tx).unwrap();

        let envelope = Envelope::shutdown(ProcessRole::Persistence);
        process.send(&envelope).unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            event,
            ProcessEvent::Envelope {
                role: ProcessRole::Persistence,
                envelope
            }
        );

        process.terminate();
        process.terminate();
        let exited = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(exited, ProcessEvent::Exited { .. }));
        assert!(process.send(&Envelope::shutdown(ProcessRole::Persistence)).is_err());
    }
}
