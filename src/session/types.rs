//! Session data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which workflow a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Compile,
    Minimize,
}

impl WorkflowKind {
    /// Display name for the kind
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkflowKind::Compile => "compile",
            WorkflowKind::Minimize => "minimize",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Registry record for one in-flight session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Session identifier
    pub session_id: String,
    /// Workflow the session runs
    pub kind: WorkflowKind,
    /// When the session was registered
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Last reported workflow state
    pub state: String,
}

impl SessionEntry {
    pub fn new(session_id: impl Into<String>, kind: WorkflowKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            started_at: chrono::Utc::now(),
            state: "Idle".to_string(),
        }
    }

    /// Time since registration
    pub fn age(&self) -> chrono::Duration {
        chrono::Utc::now() - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_idle() {
        let entry = SessionEntry::new("abc", WorkflowKind::Minimize);
        assert_eq!(entry.state, "Idle");
        assert_eq!(entry.kind.to_string(), "minimize");
        assert!(entry.age() >= chrono::Duration::zero());
    }
}
