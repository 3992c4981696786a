//! Error handling for the toolchain orchestrator
//!
//! This module defines the crate-wide error type and a Result alias for use
//! throughout the library. Session-level failures never escape as errors once a
//! workflow has started; they are turned into a terminal response instead.

use crate::protocol::ProcessRole;
use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Error, Debug)]
pub enum ToolchainError {
    /// The inbound request is missing fields or carries invalid values
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A workflow for this session id is already in flight
    #[error("Session {0} already has a workflow in flight")]
    SessionBusy(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// A toolchain executable could not be started
    #[error("Failed to spawn {role} process: {source}")]
    Spawn {
        role: ProcessRole,
        #[source]
        source: std::io::Error,
    },

    /// Writing to or reading from a running process failed
    #[error("{role} process I/O error: {message}")]
    ProcessIo { role: ProcessRole, message: String },

    /// Errors related to the chip descriptor file
    #[error("Chip descriptor error: {0}")]
    ChipDescriptor(String),

    /// Errors related to equation preparation for minimization
    #[error("Equation error: {0}")]
    Equation(String),

    /// Errors related to the private session workspace
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Errors raised by an artifact upload collaborator
    #[error("Upload error: {0}")]
    Upload(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ToolchainError>,
    },
}

impl ToolchainError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ToolchainError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error rejects the request before any process was spawned
    pub fn is_rejection(&self) -> bool {
        match self {
            ToolchainError::InvalidRequest(_) | ToolchainError::SessionBusy(_) => true,
            ToolchainError::WithContext { source, .. } => source.is_rejection(),
            _ => false,
        }
    }
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, ToolchainError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ToolchainError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ToolchainError::Io(e).with_context(f()))
    }
}
