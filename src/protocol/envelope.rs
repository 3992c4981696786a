//! Envelope model and constructors for the outgoing messages
//!
//! The executables identify fields by short names (`tid`, `msgType`, `info`, ...),
//! so the serde attributes below pin the wire names while the Rust side uses
//! descriptive ones.

use crate::error::Result;
use crate::protocol::ProcessRole;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// One `(module, id)` hop of an address chain, serialized as a two-element array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressHop(pub String, pub i64);

impl AddressHop {
    pub fn new(module: impl Into<String>, id: i64) -> Self {
        Self(module.into(), id)
    }

    /// Module name of this hop (e.g. `exportsim.export`)
    pub fn module(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> i64 {
        self.1
    }
}

/// Semantic tag of an envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Source text handed to the source process
    FileLoadContent,
    /// The source process finished loading a document
    FileNewAck,
    /// The source process found syntax errors
    SyntaxError,
    /// Export process: select the chip descriptor
    ChooseChip,
    /// Export process: descriptor loaded
    ChipLoaded,
    /// Synthetic answer that no persisted pin mapping exists
    NoExistingMapping,
    /// Export process asks for the device pin mapping
    PinMapRequest,
    /// Start the hardware export with a pin mapping
    StartExport,
    /// Export process finished writing the artifact
    ExportFinished,
    /// Configuration update for a module
    ConfigUpdate,
    /// Control message (shutdown)
    Control,
    /// A module announces its address after start-up
    AddressSingle,
    /// Query against a text selection (used to request minimization)
    TextSelectionQuery,
    /// Result of a minimization query
    MinimizedEquation,
    /// Any tag this crate does not interpret
    Unrecognized(String),
}

impl MessageKind {
    /// Wire tag of this kind
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::FileLoadContent => "file_load_content",
            MessageKind::FileNewAck => "file_new_ack",
            MessageKind::SyntaxError => "code_doc_syntax_error",
            MessageKind::ChooseChip => "exportsim_choose_chip",
            MessageKind::ChipLoaded => "exportsim_chd_loaded",
            MessageKind::NoExistingMapping => "save_export_no_mapping",
            MessageKind::PinMapRequest => "exportsim_do_device_pin_map",
            MessageKind::StartExport => "exportsim_start_export",
            MessageKind::ExportFinished => "exportsim_export_finished",
            MessageKind::ConfigUpdate => "update",
            MessageKind::Control => "control",
            MessageKind::AddressSingle => "address_single",
            MessageKind::TextSelectionQuery => "code_text_selection_query",
            MessageKind::MinimizedEquation => "minimized_equation",
            MessageKind::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "file_load_content" => MessageKind::FileLoadContent,
            "file_new_ack" => MessageKind::FileNewAck,
            "code_doc_syntax_error" => MessageKind::SyntaxError,
            "exportsim_choose_chip" => MessageKind::ChooseChip,
            "exportsim_chd_loaded" => MessageKind::ChipLoaded,
            "save_export_no_mapping" => MessageKind::NoExistingMapping,
            "exportsim_do_device_pin_map" => MessageKind::PinMapRequest,
            "exportsim_start_export" => MessageKind::StartExport,
            "exportsim_export_finished" => MessageKind::ExportFinished,
            "update" => MessageKind::ConfigUpdate,
            "control" => MessageKind::Control,
            "address_single" => MessageKind::AddressSingle,
            "code_text_selection_query" => MessageKind::TextSelectionQuery,
            "minimized_equation" => MessageKind::MinimizedEquation,
            _ => MessageKind::Unrecognized(tag),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unrecognized(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction slot of an envelope (`info` on the wire)
///
/// The export stage reuses the slot to carry `"<workspace>,<source file>"`,
/// which is kept verbatim as an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Direction {
    Request,
    Response,
    #[default]
    None,
    Annotation(String),
}

impl From<String> for Direction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "req" => Direction::Request,
            "res" => Direction::Response,
            "" => Direction::None,
            _ => Direction::Annotation(value),
        }
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Request => "req".to_string(),
            Direction::Response => "res".to_string(),
            Direction::None => String::new(),
            Direction::Annotation(text) => text,
        }
    }
}

/// The unit of exchange on every process stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "tid", default)]
    pub address_chain: Vec<AddressHop>,
    #[serde(rename = "msgType")]
    pub message_type: MessageKind,
    #[serde(rename = "dataType", default)]
    pub data_type: String,
    #[serde(rename = "info", default)]
    pub direction: Direction,
    #[serde(rename = "data", default)]
    pub payload: Value,
}

/// Operator spelling handed to the source process with every document
const SOURCE_OPERATORS: [(&str, &str); 4] = [
    ("andOperator", "&"),
    ("commentOperator", "//"),
    ("notOperator", "!"),
    ("orOperator", "+"),
];

impl Envelope {
    pub fn new(
        address_chain: Vec<AddressHop>,
        message_type: MessageKind,
        data_type: impl Into<String>,
        direction: Direction,
        payload: Value,
    ) -> Self {
        Self {
            address_chain,
            message_type,
            data_type: data_type.into(),
            direction,
            payload,
        }
    }

    /// Whether the chain names a concrete next hop
    pub fn is_routable(&self) -> bool {
        self.address_chain.len() >= 2
    }

    /// Last hop of the address chain
    pub fn next_hop(&self) -> Option<&AddressHop> {
        self.address_chain.last()
    }

    /// First hop of the address chain (the sender of a broadcast)
    pub fn origin(&self) -> Option<&AddressHop> {
        self.address_chain.first()
    }

    /// Serialize to a single newline-terminated line
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one line (without terminator)
    pub fn from_line(line: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(line)?)
    }

    /// Whether the payload carries any detail (non-empty array, string or object)
    pub fn has_detail(&self) -> bool {
        match &self.payload {
            Value::Null => false,
            Value::Array(items) => !items.is_empty(),
            Value::String(text) => !text.is_empty(),
            Value::Object(map) => !map.is_empty(),
            _ => true,
        }
    }

    // ==================== Outgoing messages ====================

    /// Hand a source document to the source process
    ///
    /// `via` holds the hops preceding the final `code.document` hop.
    pub fn load_source(mut via: Vec<AddressHop>, text: &str) -> Self {
        let mut data = serde_json::Map::new();
        for (key, op) in SOURCE_OPERATORS {
            data.insert(key.to_string(), Value::String(op.to_string()));
        }
        data.insert("text".to_string(), Value::String(text.to_string()));

        via.push(AddressHop::new("code.document", 0));

        Self::new(
            via,
            MessageKind::FileLoadContent,
            "code_document_save_data",
            Direction::Request,
            Value::Object(data),
        )
    }

    /// Point the export process at a chip descriptor file
    pub fn choose_chip(descriptor_path: &str) -> Self {
        Self::new(
            vec![
                AddressHop::new("gui.message", 109),
                AddressHop::new("exportsim.export", 0),
            ],
            MessageKind::ChooseChip,
            "string",
            Direction::None,
            Value::String(descriptor_path.to_string()),
        )
    }

    /// Answer the export process's mapping lookup with "nothing persisted"
    pub fn no_existing_mapping() -> Self {
        Self::new(
            vec![
                AddressHop::new("exportsim.export", 0),
                AddressHop::new("save.file", 0),
                AddressHop::new("exportsim.export", 0),
            ],
            MessageKind::NoExistingMapping,
            "none",
            Direction::Response,
            Value::Null,
        )
    }

    /// Start the export with a serialized pin mapping
    ///
    /// `target` is `"<workspace>,<source file name>"` with forward slashes.
    pub fn start_export(target: String, mapping: Value) -> Self {
        Self::new(
            vec![
                AddressHop::new("gui.message", 876),
                AddressHop::new("exportsim.export", 0),
            ],
            MessageKind::StartExport,
            "exportsim_dev_proj_con_desc",
            Direction::Annotation(target),
            mapping,
        )
    }

    /// Update one setting of the export process
    pub fn export_setting(class_name: &str, setting_name: &str, value: &str) -> Self {
        Self::new(
            vec![AddressHop::new("exportsim.export", 0)],
            MessageKind::ConfigUpdate,
            "sb_cfg_map",
            Direction::Response,
            json!({
                "class_name": class_name,
                "setting_name": setting_name,
                "value": value,
            }),
        )
    }

    /// Ask a process to shut down
    pub fn shutdown(role: ProcessRole) -> Self {
        Self::new(
            vec![AddressHop::new(role.module_name(), 0)],
            MessageKind::Control,
            "string",
            Direction::Request,
            Value::String("shutdown".to_string()),
        )
    }

    /// Ask the source process to minimize the equation starting at `line_start`
    pub fn minimize_query(line_start: usize) -> Self {
        Self::new(
            vec![AddressHop::new("", 0), AddressHop::new("code.document", 0)],
            MessageKind::TextSelectionQuery,
            "gui_text_selection_query",
            Direction::None,
            json!({
                "charIdxStart": 0,
                "lineStart": line_start,
                "queryType": 1,
            }),
        )
    }
}
