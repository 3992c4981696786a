//! Session bookkeeping
//!
//! This module tracks the sessions that currently have a workflow in flight
//! and owns their private workspace directories.
//!
//! # Features
//!
//! - [`SessionRegistry`] - Shared table of in-flight sessions with state labels
//! - [`SessionWorkspace`] - Directory guard that stages sources and is removed exactly once
//! - Session id allocation and validation

pub mod registry;
pub mod types;
pub mod workspace;

pub use registry::{allocate_session_id, validate_session_id, SessionRegistry};
pub use types::{SessionEntry, WorkflowKind};
pub use workspace::SessionWorkspace;
