//! Request and response types exchanged with external callers
//!
//! # Main Types
//!
//! - [`CompileRequest`] - Project files plus target selection for a compile run
//! - [`MinimizeRequest`] - One equation to minimize
//! - [`TerminalResponse`] - The single success/failure answer of a session
//! - [`SourceKind`] - Classification of the submitted source by file extension
//!
//! Field names follow the camelCase JSON the presentation layer sends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One uploaded project file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    #[serde(default)]
    pub content: String,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Directory placeholder entries (`dir/.`) carry no content
    pub fn is_directory_entry(&self) -> bool {
        self.name.ends_with("/.") || self.name == "."
    }
}

/// Inbound compile request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// Empty means "allocate one"
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    #[serde(default)]
    pub board: Option<String>,
    /// Explicit chip descriptor file name, wins over `board`
    #[serde(default)]
    pub chd: Option<String>,
    #[serde(default)]
    pub experiment_id: Option<String>,
    /// When set, the produced artifact is relayed after a successful export
    #[serde(default)]
    pub upload_server: Option<String>,
}

impl CompileRequest {
    /// The file compiled as the project source: the first non-directory entry
    pub fn source_file(&self) -> Option<&ProjectFile> {
        self.files.iter().find(|f| !f.is_directory_entry())
    }

    pub fn wants_upload(&self) -> bool {
        self.upload_server.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Inbound minimization request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimizeRequest {
    pub content: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl MinimizeRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            session_id: None,
        }
    }
}

/// The single terminal answer of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResponse {
    pub success: bool,
    pub session_id: String,
    pub output: String,
}

impl TerminalResponse {
    pub fn success(session_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: session_id.into(),
            output: output.into(),
        }
    }

    pub fn failure(session_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: session_id.into(),
            output: output.into(),
        }
    }
}

/// Kind of the submitted source, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Logic equations / automata handled by the toolchain
    Logic,
    Vhdl,
    C,
    Cpp,
    Arduino,
    Unknown,
}

impl SourceKind {
    pub fn classify(file_name: &str) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "logic" => SourceKind::Logic,
            "vhd" | "vhdl" => SourceKind::Vhdl,
            "c" | "h" => SourceKind::C,
            "cpp" | "cc" | "cxx" | "hpp" => SourceKind::Cpp,
            "ino" => SourceKind::Arduino,
            _ => SourceKind::Unknown,
        }
    }

    /// Whether the orchestrated toolchain compiles this kind
    pub fn is_supported(self) -> bool {
        self == SourceKind::Logic
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Logic => write!(f, "logic"),
            SourceKind::Vhdl => write!(f, "VHDL"),
            SourceKind::C => write!(f, "C"),
            SourceKind::Cpp => write!(f, "C++"),
            SourceKind::Arduino => write!(f, "Arduino"),
            SourceKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_request_from_json() {
        let request: CompileRequest = serde_json::from_str(
            r#"{
                "sessionId": "",
                "files": [{"name": "src/."}, {"name": "src/main.logic", "content": "a = b;"}],
                "board": "3AxisPortal",
                "experimentId": "42",
                "uploadServer": "https://lab.example"
            }"#,
        )
        .unwrap();

        assert!(request.session_id.is_empty());
        assert_eq!(request.source_file().unwrap().name, "src/main.logic");
        assert_eq!(request.board.as_deref(), Some("3AxisPortal"));
        assert!(request.chd.is_none());
        assert!(request.wants_upload());
    }

    #[test]
    fn test_empty_upload_server_means_no_upload() {
        let request = CompileRequest {
            upload_server: Some(String::new()),
            ..Default::default()
        };
        assert!(!request.wants_upload());
    }

    #[test]
    fn test_response_wire_names() {
        let json = serde_json::to_string(&TerminalResponse::failure("s1", "boom")).unwrap();
        assert_eq!(json, r#"{"success":false,"sessionId":"s1","output":"boom"}"#);
    }

    #[test]
    fn test_classify_sources() {
        assert_eq!(SourceKind::classify("main.logic"), SourceKind::Logic);
        assert_eq!(SourceKind::classify("top.VHD"), SourceKind::Vhdl);
        assert_eq!(SourceKind::classify("blink.ino"), SourceKind::Arduino);
        assert_eq!(SourceKind::classify("main.cpp"), SourceKind::Cpp);
        assert_eq!(SourceKind::classify("Makefile"), SourceKind::Unknown);
        assert!(SourceKind::Logic.is_supported());
        assert!(!SourceKind::C.is_supported());
    }
}
