//! Pin mapping between source signals and physical chip pins
//!
//! Signal names that collide with physical pin names are suffixed with
//! [`SIGNAL_SUFFIX`] before the source is handed to the source process, so the
//! names reported back in a pin-map request carry the suffix and must be
//! stripped again before the lookup. The three hidden control signals are
//! generated by the toolchain itself and never carry it.

use crate::chip::ChipDescriptor;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix appended to source identifiers that collide with pin names
pub const SIGNAL_SUFFIX: &str = "_var";

/// Derived automaton clock
pub const HIDDEN_CLOCK: &str = "clk_automaton_0";
/// Derived automaton reset
pub const HIDDEN_RESET: &str = "reset_automaton_0";
/// Debounce clock
pub const HIDDEN_DEBOUNCE_CLOCK: &str = "debounce_clk";

/// Externally configured pins for the hidden control signals of one chip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenSignalPins {
    #[serde(default)]
    pub clk_automaton_0: Option<usize>,
    #[serde(default)]
    pub reset_automaton_0: Option<usize>,
    #[serde(default)]
    pub debounce_clk: Option<usize>,
}

impl HiddenSignalPins {
    /// Configured pin for a hidden signal name, if the name is one
    pub fn pin_for(&self, signal: &str) -> Option<usize> {
        if signal.contains(HIDDEN_CLOCK) {
            self.clk_automaton_0
        } else if signal.contains(HIDDEN_RESET) {
            self.reset_automaton_0
        } else if signal.contains(HIDDEN_DEBOUNCE_CLOCK) {
            self.debounce_clk
        } else {
            None
        }
    }

    pub fn is_hidden(signal: &str) -> bool {
        signal.contains(HIDDEN_CLOCK)
            || signal.contains(HIDDEN_RESET)
            || signal.contains(HIDDEN_DEBOUNCE_CLOCK)
    }
}

/// Per-chip settings consumed by the pin mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipProfile {
    #[serde(default)]
    pub hidden_pins: HiddenSignalPins,
    /// (pin, active-high) pairs handed to the export stage unchanged
    #[serde(default = "default_reset_activation_levels")]
    pub reset_activation_levels: Vec<(usize, bool)>,
    #[serde(default)]
    pub debounced_ports: Vec<Value>,
    #[serde(default)]
    pub divided_input_clk_signals: Vec<Value>,
}

fn default_reset_activation_levels() -> Vec<(usize, bool)> {
    vec![(2, true)]
}

impl Default for ChipProfile {
    fn default() -> Self {
        Self {
            hidden_pins: HiddenSignalPins::default(),
            reset_activation_levels: default_reset_activation_levels(),
            debounced_ports: Vec::new(),
            divided_input_clk_signals: Vec::new(),
        }
    }
}

/// Physical pin driving one or more source inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(usize, Vec<usize>)", into = "(usize, Vec<usize>)")]
pub struct InputAssignment {
    pub pin: usize,
    pub signals: Vec<usize>,
}

impl From<(usize, Vec<usize>)> for InputAssignment {
    fn from((pin, signals): (usize, Vec<usize>)) -> Self {
        Self { pin, signals }
    }
}

impl From<InputAssignment> for (usize, Vec<usize>) {
    fn from(a: InputAssignment) -> Self {
        (a.pin, a.signals)
    }
}

/// Source outputs driving one physical pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Vec<usize>, usize)", into = "(Vec<usize>, usize)")]
pub struct OutputAssignment {
    pub signals: Vec<usize>,
    pub pin: usize,
}

impl From<(Vec<usize>, usize)> for OutputAssignment {
    fn from((signals, pin): (Vec<usize>, usize)) -> Self {
        Self { signals, pin }
    }
}

impl From<OutputAssignment> for (Vec<usize>, usize) {
    fn from(a: OutputAssignment) -> Self {
        (a.signals, a.pin)
    }
}

/// Device project description sent with the start-export message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinMapping {
    #[serde(rename = "debouncedPorts")]
    pub debounced_ports: Vec<Value>,
    #[serde(rename = "devicePinsToInput")]
    pub input_assignments: Vec<InputAssignment>,
    #[serde(rename = "dividedInputClkSignals")]
    pub divided_input_clk_signals: Vec<Value>,
    #[serde(rename = "outputToDevicePins")]
    pub output_assignments: Vec<OutputAssignment>,
    #[serde(rename = "resetActivationLevels")]
    pub reset_activation_levels: Vec<(usize, bool)>,
    /// Input signals no pin was found for
    #[serde(skip)]
    pub unmapped_inputs: Vec<String>,
    /// Output signals no pin was found for
    #[serde(skip)]
    pub unmapped_outputs: Vec<String>,
}

impl PinMapping {
    pub fn is_complete(&self) -> bool {
        self.unmapped_inputs.is_empty() && self.unmapped_outputs.is_empty()
    }

    /// All unmapped signal names, inputs first
    pub fn unmapped(&self) -> Vec<&str> {
        self.unmapped_inputs
            .iter()
            .chain(self.unmapped_outputs.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn strip_signal_suffix(name: &str) -> &str {
    name.strip_suffix(SIGNAL_SUFFIX).unwrap_or(name)
}

/// Derives pin assignments from a descriptor and the reported signal names
pub struct PinMapBuilder;

impl PinMapBuilder {
    /// Map inputs and outputs to pins. Signal indices follow list order.
    pub fn build(
        descriptor: &ChipDescriptor,
        input_signals: &[String],
        output_signals: &[String],
        profile: &ChipProfile,
    ) -> PinMapping {
        let mut mapping = PinMapping {
            debounced_ports: profile.debounced_ports.clone(),
            input_assignments: Vec::new(),
            divided_input_clk_signals: profile.divided_input_clk_signals.clone(),
            output_assignments: Vec::new(),
            reset_activation_levels: profile.reset_activation_levels.clone(),
            unmapped_inputs: Vec::new(),
            unmapped_outputs: Vec::new(),
        };

        for (index, raw) in input_signals.iter().enumerate() {
            let name = if HiddenSignalPins::is_hidden(raw) {
                raw.as_str()
            } else {
                strip_signal_suffix(raw)
            };

            let pin = descriptor
                .pin_index(name)
                .or_else(|| profile.hidden_pins.pin_for(raw));

            match pin {
                Some(pin) => {
                    tracing::trace!("Input {} @ {} mapped to pin {}", raw, index, pin);
                    mapping.input_assignments.push(InputAssignment {
                        pin,
                        signals: vec![index],
                    });
                }
                None => mapping.unmapped_inputs.push(raw.clone()),
            }
        }

        for (index, raw) in output_signals.iter().enumerate() {
            match descriptor.pin_index(strip_signal_suffix(raw)) {
                Some(pin) => {
                    tracing::trace!("Output {} @ {} mapped to pin {}", raw, index, pin);
                    mapping.output_assignments.push(OutputAssignment {
                        signals: vec![index],
                        pin,
                    });
                }
                None => mapping.unmapped_outputs.push(raw.clone()),
            }
        }

        mapping
    }
}

/// Append [`SIGNAL_SUFFIX`] to every identifier equal to a pin name
///
/// Only whole identifiers match: a pin name that is a prefix or a suffix of
/// a longer identifier (`a` inside `data` or `ab`) is left alone.
pub fn disambiguate_source(text: &str, pin_names: &[String]) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut ident = String::new();

    let flush = |ident: &mut String, out: &mut String| {
        if ident.is_empty() {
            return;
        }
        out.push_str(ident);
        if pin_names.iter().any(|pin| pin == ident) {
            out.push_str(SIGNAL_SUFFIX);
        }
        ident.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            ident.push(c);
        } else {
            flush(&mut ident, &mut out);
            out.push(c);
        }
    }
    flush(&mut ident, &mut out);

    out
}
