//! Wire protocol types
//!
//! JSON-RPC 2.0 framing, MCP tool calls and results, and the structured
//! error value every tool handler renders back to the agent.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of error classifications returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PathOutsideSandbox,
    FileNotFound,
    PermissionDenied,
    FileTooLarge,
    DepthExceeded,
    InvalidEncoding,
    WriteDisabled,
    DirectoryNotEmpty,
    AlreadyExists,
    InvalidPath,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::PathOutsideSandbox => "PATH_OUTSIDE_SANDBOX",
            ErrorCode::FileNotFound => "FILE_NOT_FOUND",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::FileTooLarge => "FILE_TOO_LARGE",
            ErrorCode::DepthExceeded => "DEPTH_EXCEEDED",
            ErrorCode::InvalidEncoding => "INVALID_ENCODING",
            ErrorCode::WriteDisabled => "WRITE_DISABLED",
            ErrorCode::DirectoryNotEmpty => "DIRECTORY_NOT_EMPTY",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InvalidPath => "INVALID_PATH",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error: a classification code, a human message and an
/// optional detail map whose shape depends on the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ForgeError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ForgeError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach one detail entry, creating the map on first use
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|d| d.get(key))
    }

    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPath, message)
    }

    pub fn outside_sandbox(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PathOutsideSandbox, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FileNotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AlreadyExists, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownError, message)
    }
}

// ---- JSON-RPC framing ----

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming JSON-RPC message. Requests without an id are notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ---- Tool results ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
}

/// Result of a `tools/call`; errors carry the serialized `ForgeError`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn success<T: Serialize>(data: &T) -> Self {
        match serde_json::to_string_pretty(data) {
            Ok(json) => Self::text(json),
            Err(e) => Self::error(&ForgeError::unknown(format!(
                "Failed to serialize result: {}",
                e
            ))),
        }
    }

    pub fn error(error: &ForgeError) -> Self {
        let text = serde_json::to_string(error).unwrap_or_else(|_| error.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: true,
        }
    }

    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

// ---- Tool calls ----

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_true() -> bool {
    true
}

fn default_read_max_kb() -> u64 {
    10_240
}

fn default_dir_depth() -> u32 {
    5
}

fn default_glob_results() -> usize {
    1_000
}

fn default_grep_results() -> usize {
    100
}

fn default_usage_depth() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistsKind {
    File,
    Directory,
    #[default]
    Any,
}

/// A decoded `tools/call`, tagged by tool name
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    ReadFile {
        path: String,
        #[serde(default = "default_encoding")]
        encoding: String,
        #[serde(default)]
        start_line: Option<u64>,
        #[serde(default)]
        end_line: Option<u64>,
        #[serde(default = "default_read_max_kb")]
        max_size_kb: u64,
    },
    ReadDirectory {
        path: String,
        #[serde(default)]
        recursive: bool,
        #[serde(default = "default_dir_depth")]
        max_depth: u32,
        #[serde(default)]
        include_hidden: bool,
        #[serde(default)]
        pattern: Option<String>,
    },
    ReadMultiple {
        paths: Vec<String>,
        #[serde(default = "default_encoding")]
        encoding: String,
        #[serde(default)]
        fail_on_error: bool,
    },
    WriteFile {
        path: String,
        content: String,
        #[serde(default = "default_encoding")]
        encoding: String,
        #[serde(default = "default_true")]
        create_dirs: bool,
        #[serde(default = "default_true")]
        overwrite: bool,
        #[serde(default)]
        backup: bool,
    },
    CreateDirectory {
        path: String,
        #[serde(default = "default_true")]
        recursive: bool,
    },
    CopyFile {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
        #[serde(default = "default_true")]
        recursive: bool,
    },
    MoveFile {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    DeleteFile {
        path: String,
        #[serde(default)]
        recursive: bool,
        #[serde(default)]
        force: bool,
    },
    GlobSearch {
        pattern: String,
        #[serde(default)]
        base_path: Option<String>,
        #[serde(default = "default_glob_results")]
        max_results: usize,
        #[serde(default)]
        include_dirs: bool,
    },
    GrepSearch {
        pattern: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        glob: Option<String>,
        #[serde(default = "default_true")]
        case_sensitive: bool,
        #[serde(default = "default_grep_results")]
        max_results: usize,
        #[serde(default)]
        context_lines: usize,
    },
    FindByContent {
        text: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        file_pattern: Option<String>,
        #[serde(default = "default_grep_results")]
        max_results: usize,
    },
    FileStat {
        path: String,
    },
    FileExists {
        path: String,
        #[serde(default, rename = "type")]
        kind: ExistsKind,
    },
    GetDiskUsage {
        path: String,
        #[serde(default = "default_usage_depth")]
        max_depth: u32,
    },
    CompareFiles {
        path1: String,
        path2: String,
    },
    ScaffoldProject {
        template: String,
        destination: String,
        #[serde(default)]
        variables: HashMap<String, String>,
        #[serde(default)]
        overwrite: bool,
    },
    ListTemplates {
        #[serde(default)]
        category: Option<String>,
    },
}

impl ToolCall {
    /// Decode a tool name plus its (possibly absent) argument object
    pub fn from_parts(name: &str, arguments: Value) -> Result<Self, serde_json::Error> {
        let arguments = if arguments.is_null() {
            Value::Object(Map::new())
        } else {
            arguments
        };
        serde_json::from_value(serde_json::json!({
            "name": name,
            "arguments": arguments,
        }))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ReadFile { .. } => "read_file",
            ToolCall::ReadDirectory { .. } => "read_directory",
            ToolCall::ReadMultiple { .. } => "read_multiple",
            ToolCall::WriteFile { .. } => "write_file",
            ToolCall::CreateDirectory { .. } => "create_directory",
            ToolCall::CopyFile { .. } => "copy_file",
            ToolCall::MoveFile { .. } => "move_file",
            ToolCall::DeleteFile { .. } => "delete_file",
            ToolCall::GlobSearch { .. } => "glob_search",
            ToolCall::GrepSearch { .. } => "grep_search",
            ToolCall::FindByContent { .. } => "find_by_content",
            ToolCall::FileStat { .. } => "file_stat",
            ToolCall::FileExists { .. } => "file_exists",
            ToolCall::GetDiskUsage { .. } => "get_disk_usage",
            ToolCall::CompareFiles { .. } => "compare_files",
            ToolCall::ScaffoldProject { .. } => "scaffold_project",
            ToolCall::ListTemplates { .. } => "list_templates",
        }
    }
}

// ---- Handler payloads ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub is_file: bool,
    pub is_directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStat {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub modified: String,
    pub accessed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResult {
    pub path: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ForgeError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl OperationOutcome {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            success: true,
            path: Some(path.into()),
            source: None,
            destination: None,
            bytes_written: None,
            backup: None,
            note: None,
        }
    }

    pub fn transfer(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            success: true,
            path: None,
            source: Some(source.into()),
            destination: Some(destination.into()),
            bytes_written: None,
            backup: None,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistsResult {
    pub exists: bool,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_directory: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskUsage {
    pub path: String,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub file_count: u64,
    pub directory_count: u64,
    pub breakdown: Vec<UsageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub is_file: bool,
    pub size: u64,
    pub size_formatted: String,
    pub modified: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub path1: String,
    pub path2: String,
    pub same_type: bool,
    pub same_size: bool,
    pub file1: FileSummary,
    pub file2: FileSummary,
    pub newer_file: String,
    pub size_difference: i64,
    pub size_difference_formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobHit {
    pub path: String,
    pub name: String,
    pub is_file: bool,
    pub is_directory: bool,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobResults {
    pub count: usize,
    pub total_matches: usize,
    pub truncated: bool,
    pub results: Vec<GlobHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchContext {
    pub before: Vec<String>,
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepMatch {
    pub file: String,
    pub line: usize,
    pub column: usize,
    #[serde(rename = "match")]
    pub matched: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MatchContext>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepResults {
    pub pattern: String,
    pub count: usize,
    pub truncated: bool,
    pub matches: Vec<GrepMatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Contents of a template's `template.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<TemplateVariable>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaffoldReport {
    pub success: bool,
    pub template: TemplateRef,
    pub destination: String,
    pub files_created: usize,
    pub files_skipped: usize,
    pub variables_used: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    pub path: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<TemplateVariable>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListing {
    pub template_paths: Vec<String>,
    pub count: usize,
    pub templates: Vec<TemplateInfo>,
}
