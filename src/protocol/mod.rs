//! Wire protocol spoken with the toolchain executables
//!
//! Every executable reads and writes newline-delimited JSON envelopes on its
//! standard streams. This module holds the envelope model, the per-process
//! stream framer and the address router.
//!
//! # Components
//!
//! - [`Envelope`] - One addressed message with a [`MessageKind`] tag
//! - [`StreamFramer`] - Reassembles envelopes from arbitrarily chunked stdout data
//! - [`AddressRouter`] - Decides which [`ProcessRole`] an envelope is forwarded to

pub mod envelope;
pub mod framer;
pub mod router;

pub use envelope::{AddressHop, Direction, Envelope, MessageKind};
pub use framer::{FramerStats, StreamFramer, DEFAULT_MAX_FRAME_BYTES};
pub use router::{AddressRouter, Route};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four cooperating toolchain executables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRole {
    /// Parses the logic source (module name `code`)
    Source,
    /// Derives truth tables and equations (module name `table`)
    Table,
    /// Maps pins and exports the hardware image (module name `exportsim`)
    Export,
    /// Persists documents and hosts utility services (module name `save`)
    Persistence,
}

impl ProcessRole {
    /// All roles, in the order the compile workflow spawns them
    pub const ALL: [ProcessRole; 4] = [
        ProcessRole::Persistence,
        ProcessRole::Source,
        ProcessRole::Export,
        ProcessRole::Table,
    ];

    /// Module name the executable answers to in an address chain
    pub fn module_name(self) -> &'static str {
        match self {
            ProcessRole::Source => "code",
            ProcessRole::Table => "table",
            ProcessRole::Export => "exportsim",
            ProcessRole::Persistence => "save",
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::Source => write!(f, "source"),
            ProcessRole::Table => write!(f, "table"),
            ProcessRole::Export => write!(f, "export"),
            ProcessRole::Persistence => write!(f, "persistence"),
        }
    }
}
