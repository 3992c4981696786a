//! Address-based routing between toolchain processes

use crate::protocol::{Envelope, ProcessRole};

/// Routing decision for one envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Chain of length <= 1; nobody in particular is addressed
    Broadcast,
    /// Forward to the process with this role
    Deliver(ProcessRole),
    /// The next hop names a module this workflow does not forward to
    Unrecognized(String),
}

/// Module-name fragments, in match priority order
const ROLE_FRAGMENTS: [(&str, ProcessRole); 5] = [
    ("export", ProcessRole::Export),
    ("code", ProcessRole::Source),
    ("table", ProcessRole::Table),
    ("save", ProcessRole::Persistence),
    ("utils", ProcessRole::Persistence),
];

/// Maps the last hop of an address chain to a process role
///
/// The router only delivers to the roles it was built with; envelopes for any
/// other module are reported as [`Route::Unrecognized`] and consumed by the
/// workflow alone.
#[derive(Debug, Clone)]
pub struct AddressRouter {
    forward_to: Vec<ProcessRole>,
}

impl AddressRouter {
    pub fn new(forward_to: &[ProcessRole]) -> Self {
        Self {
            forward_to: forward_to.to_vec(),
        }
    }

    /// Router that forwards to all four roles
    pub fn all() -> Self {
        Self::new(&ProcessRole::ALL)
    }

    /// Role whose name fragment occurs in `module`, ignoring the forward set
    pub fn role_for_module(module: &str) -> Option<ProcessRole> {
        ROLE_FRAGMENTS
            .iter()
            .find(|(fragment, _)| module.contains(fragment))
            .map(|&(_, role)| role)
    }

    pub fn route(&self, envelope: &Envelope) -> Route {
        if !envelope.is_routable() {
            return Route::Broadcast;
        }
        let Some(hop) = envelope.next_hop() else {
            return Route::Broadcast;
        };

        match Self::role_for_module(hop.module()) {
            Some(role) if self.forward_to.contains(&role) => Route::Deliver(role),
            _ => Route::Unrecognized(hop.module().to_string()),
        }
    }

    pub fn forwards_to(&self, role: ProcessRole) -> bool {
        self.forward_to.contains(&role)
    }
}
