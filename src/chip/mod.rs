//! Target chip handling
//!
//! - [`ChipDescriptor`] - Ordered physical pin names loaded from a descriptor file
//! - [`PinMapBuilder`] - Assigns source signals to physical pins
//! - [`disambiguate_source`] - Renames identifiers that collide with pin names

pub mod descriptor;
pub mod pinmap;

pub use descriptor::ChipDescriptor;
pub use pinmap::{
    disambiguate_source, ChipProfile, HiddenSignalPins, InputAssignment, OutputAssignment,
    PinMapBuilder, PinMapping, SIGNAL_SUFFIX,
};
