//! Process-wide table of in-flight sessions

use super::types::{SessionEntry, WorkflowKind};
use crate::error::{Result, ToolchainError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Maximum length of a caller-supplied session id
pub const MAX_SESSION_ID_LEN: usize = 128;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh session id from the current UTC time and a process-wide counter
pub fn allocate_session_id() -> String {
    let seq = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{:04}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"), seq)
}

/// Check that a caller-supplied id is usable as a workspace directory name
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ToolchainError::InvalidRequest(format!(
            "Invalid session id '{}'",
            session_id
        )))
    }
}

/// Shared registry of in-flight sessions
///
/// Cloning is cheap; all clones see the same table. A session id can only be
/// registered once until it is deregistered again.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        // A panicking holder cannot leave the map half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a session, rejecting ids that are already in flight
    pub fn register(&self, session_id: &str, kind: WorkflowKind) -> Result<()> {
        let mut sessions = self.lock();
        if sessions.contains_key(session_id) {
            return Err(ToolchainError::SessionBusy(session_id.to_string()));
        }
        sessions.insert(session_id.to_string(), SessionEntry::new(session_id, kind));
        tracing::debug!("Registered {} session {}", kind, session_id);
        Ok(())
    }

    /// Record the current workflow state of a session
    pub fn update_state(&self, session_id: &str, state: &str) {
        if let Some(entry) = self.lock().get_mut(session_id) {
            if entry.state != state {
                tracing::debug!("Session {}: {} -> {}", session_id, entry.state, state);
                entry.state = state.to_string();
            }
        }
    }

    /// Remove a session; returns the entry if it was registered
    pub fn deregister(&self, session_id: &str) -> Option<SessionEntry> {
        let entry = self.lock().remove(session_id);
        if let Some(entry) = &entry {
            tracing::debug!(
                "Deregistered {} session {} after {} ms in state {}",
                entry.kind,
                session_id,
                entry.age().num_milliseconds(),
                entry.state
            );
        }
        entry
    }

    /// Snapshot of one session
    pub fn status(&self, session_id: &str) -> Option<SessionEntry> {
        self.lock().get(session_id).cloned()
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Snapshot of all sessions, oldest first
    pub fn active(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.started_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Block until no session is in flight; false if `timeout` elapsed first
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }
}
