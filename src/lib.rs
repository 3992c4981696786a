//! # wide-toolchain: Toolchain Orchestration for a Web Design Environment
//!
//! Drives the native hardware-design toolchain behind the web IDE. A compile
//! request spawns four cooperating executables, exchanges newline-delimited
//! JSON envelopes with them over their standard streams and sequences the
//! pipeline from source text to an exported hardware image. A minimize request
//! runs one equation through the source process's minimizer.
//!
//! ## Architecture
//!
//! - **Protocol**: Envelope model, per-process stream framing and address routing
//! - **Chip**: Descriptor loading and signal-to-pin mapping
//! - **Process**: Spawned executables with reader threads feeding crossbeam channels
//! - **Workflow**: Pure state machines run by a single-threaded driver per session
//! - **Session**: Registry of in-flight sessions and private workspaces
//!
//! ## Configuration
//!
//! The orchestrator reads `orchestrator.toml` from the platform config
//! directory under `wide-toolchain` unless a path is given explicitly; see
//! [`config`] for all sections.
//!
//! ## Example
//!
//! ```ignore
//! use wide_toolchain::{config::OrchestratorConfig, types::MinimizeRequest, Orchestrator};
//!
//! let config = OrchestratorConfig::load_or_default(None);
//! let orchestrator = Orchestrator::new(config);
//!
//! let response = orchestrator.minimize(MinimizeRequest::new("y = a & b + a & !b;"))?;
//! assert_eq!(response.output, "y = a;");
//! ```

pub mod chip;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod protocol;
pub mod session;
pub mod types;
pub mod upload;
pub mod workflow;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use error::{Result, ToolchainError};
pub use orchestrator::Orchestrator;
pub use protocol::{AddressRouter, Envelope, MessageKind, ProcessRole, StreamFramer};
pub use session::SessionRegistry;
pub use types::{CompileRequest, MinimizeRequest, TerminalResponse};
pub use workflow::PendingResponse;
