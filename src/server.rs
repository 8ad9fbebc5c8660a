//! JSON-RPC 2.0 over stdio: one message per line in, one response per line out

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::filesystem::read_only::is_write_tool;
use crate::filesystem::FileSystemService;
use crate::protocol::{
    ForgeError, Request, Response, ToolCall, ToolResult, INTERNAL_ERROR, INVALID_PARAMS,
    METHOD_NOT_FOUND, PARSE_ERROR,
};

pub const SERVER_NAME: &str = "mcp-file-forge";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub struct Server {
    service: Arc<FileSystemService>,
}

impl Server {
    pub fn new(service: Arc<FileSystemService>) -> Self {
        Self { service }
    }

    /// Serve stdin/stdout until stdin closes
    pub async fn run(&self) -> io::Result<()> {
        tracing::info!("{} listening on stdio", SERVER_NAME);
        self.serve(BufReader::new(io::stdin()), io::BufWriter::new(io::stdout()))
            .await
    }

    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                write_response(&mut writer, &response).await?;
            }
        }
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::debug!("Unparsable message: {}", e);
                Some(Response::err(Value::Null, PARSE_ERROR, e.to_string()))
            }
        }
    }

    /// Notifications get no response
    pub async fn handle_request(&self, request: Request) -> Option<Response> {
        if request.is_notification() {
            tracing::debug!("Notification: {}", request.method);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize(&request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tool_definitions() })),
            "tools/call" => self.tools_call(&request.params).await,
            other => {
                tracing::debug!("Unknown method: {}", other);
                Err((METHOD_NOT_FOUND, format!("Method not found: {}", other)))
            }
        };

        Some(match result {
            Ok(value) => Response::ok(id, value),
            Err((code, message)) => Response::err(id, code, message),
        })
    }

    fn initialize(&self, params: &Value) -> Value {
        let client = params
            .get("clientInfo")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!("Client connected: {}", client);

        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    async fn tools_call(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| (INVALID_PARAMS, "Tool name is required".to_string()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let call = ToolCall::from_parts(name, arguments)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid arguments for {}: {}", name, e)))?;

        let result = self.call_tool(call).await;
        serde_json::to_value(&result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
    }

    /// Run one decoded tool call; failures become tool error results
    pub async fn call_tool(&self, call: ToolCall) -> ToolResult {
        let name = call.name();
        if is_write_tool(name) {
            if let Err(e) = self.service.gate().validate_write_allowed() {
                tracing::debug!("{} blocked: {}", name, e);
                return ToolResult::error(&e);
            }
        }

        tracing::debug!("tools/call {}", name);
        let result = self.dispatch(call).await;
        if let Err(e) = &result {
            tracing::debug!("{} failed: {}", name, e);
        }
        result.unwrap_or_else(|e| ToolResult::error(&e))
    }

    async fn dispatch(&self, call: ToolCall) -> Result<ToolResult, ForgeError> {
        let ops = self.service.ops();
        let search = self.service.search();
        let scaffold = self.service.scaffold();

        match call {
            ToolCall::ReadFile {
                path,
                encoding,
                start_line,
                end_line,
                max_size_kb,
            } => ops
                .read_file(&path, &encoding, start_line, end_line, max_size_kb)
                .await
                .map(ToolResult::text),
            ToolCall::ReadDirectory {
                path,
                recursive,
                max_depth,
                include_hidden,
                pattern,
            } => success(
                ops.read_directory(&path, recursive, max_depth, include_hidden, pattern.as_deref())
                    .await,
            ),
            ToolCall::ReadMultiple {
                paths,
                encoding,
                fail_on_error,
            } => success(ops.read_multiple(&paths, &encoding, fail_on_error).await),
            ToolCall::WriteFile {
                path,
                content,
                encoding,
                create_dirs,
                overwrite,
                backup,
            } => success(
                ops.write_file(&path, &content, &encoding, create_dirs, overwrite, backup)
                    .await,
            ),
            ToolCall::CreateDirectory { path, recursive } => {
                success(ops.create_directory(&path, recursive).await)
            }
            ToolCall::CopyFile {
                source,
                destination,
                overwrite,
                recursive,
            } => success(
                ops.copy_file(&source, &destination, overwrite, recursive)
                    .await,
            ),
            ToolCall::MoveFile {
                source,
                destination,
                overwrite,
            } => success(ops.move_file(&source, &destination, overwrite).await),
            ToolCall::DeleteFile {
                path,
                recursive,
                force,
            } => success(ops.delete_file(&path, recursive, force).await),
            ToolCall::GlobSearch {
                pattern,
                base_path,
                max_results,
                include_dirs,
            } => success(
                search
                    .glob_search(&pattern, base_path.as_deref(), max_results, include_dirs)
                    .await,
            ),
            ToolCall::GrepSearch {
                pattern,
                path,
                glob,
                case_sensitive,
                max_results,
                context_lines,
            } => success(
                search
                    .grep_search(
                        &pattern,
                        path.as_deref(),
                        glob.as_deref(),
                        case_sensitive,
                        max_results,
                        context_lines,
                    )
                    .await,
            ),
            ToolCall::FindByContent {
                text,
                path,
                file_pattern,
                max_results,
            } => success(
                search
                    .find_by_content(&text, path.as_deref(), file_pattern.as_deref(), max_results)
                    .await,
            ),
            ToolCall::FileStat { path } => success(ops.file_stat(&path).await),
            ToolCall::FileExists { path, kind } => success(ops.file_exists(&path, kind).await),
            ToolCall::GetDiskUsage { path, max_depth } => {
                success(ops.get_disk_usage(&path, max_depth).await)
            }
            ToolCall::CompareFiles { path1, path2 } => {
                success(ops.compare_files(&path1, &path2).await)
            }
            ToolCall::ScaffoldProject {
                template,
                destination,
                variables,
                overwrite,
            } => success(
                scaffold
                    .scaffold_project(&template, &destination, &variables, overwrite)
                    .await,
            ),
            ToolCall::ListTemplates { category } => {
                success(scaffold.list_templates(category.as_deref()).await)
            }
        }
    }
}

fn success<T: Serialize>(result: Result<T, ForgeError>) -> Result<ToolResult, ForgeError> {
    result.map(|value| ToolResult::success(&value))
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> io::Result<()> {
    let line = serde_json::to_string(response)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

fn tool(name: &str, description: &str, properties: Value, required: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
    })
}

/// Tool registry advertised through `tools/list`
pub fn tool_definitions() -> Vec<Value> {
    vec![
        tool(
            "read_file",
            "Read the contents of a file",
            json!({
                "path": { "type": "string", "description": "Path to the file to read" },
                "encoding": { "type": "string", "description": "File encoding (default: utf-8)" },
                "start_line": { "type": "integer", "minimum": 1, "description": "Start line (1-indexed)" },
                "end_line": { "type": "integer", "minimum": 1, "description": "End line (inclusive)" },
                "max_size_kb": { "type": "integer", "description": "Maximum file size in KB (default: 10240)" },
            }),
            &["path"],
        ),
        tool(
            "read_directory",
            "List contents of a directory",
            json!({
                "path": { "type": "string", "description": "Directory path" },
                "recursive": { "type": "boolean", "description": "Include subdirectories" },
                "max_depth": { "type": "integer", "description": "Maximum recursion depth (default: 5)" },
                "include_hidden": { "type": "boolean", "description": "Include hidden entries" },
                "pattern": { "type": "string", "description": "Name filter glob (e.g. *.rs)" },
            }),
            &["path"],
        ),
        tool(
            "read_multiple",
            "Read multiple files at once",
            json!({
                "paths": { "type": "array", "items": { "type": "string" }, "description": "Files to read" },
                "encoding": { "type": "string", "description": "File encoding" },
                "fail_on_error": { "type": "boolean", "description": "Stop at the first failure" },
            }),
            &["paths"],
        ),
        tool(
            "write_file",
            "Write content to a file",
            json!({
                "path": { "type": "string", "description": "Path to write" },
                "content": { "type": "string", "description": "Content to write" },
                "encoding": { "type": "string", "description": "File encoding (default: utf-8)" },
                "create_dirs": { "type": "boolean", "description": "Create parent directories (default: true)" },
                "overwrite": { "type": "boolean", "description": "Overwrite an existing file (default: true)" },
                "backup": { "type": "boolean", "description": "Keep a .bak copy of the previous file" },
            }),
            &["path", "content"],
        ),
        tool(
            "create_directory",
            "Create a directory",
            json!({
                "path": { "type": "string", "description": "Directory to create" },
                "recursive": { "type": "boolean", "description": "Create parents (default: true)" },
            }),
            &["path"],
        ),
        tool(
            "copy_file",
            "Copy a file or directory",
            json!({
                "source": { "type": "string", "description": "Source path" },
                "destination": { "type": "string", "description": "Destination path" },
                "overwrite": { "type": "boolean", "description": "Overwrite an existing destination" },
                "recursive": { "type": "boolean", "description": "Copy directories recursively (default: true)" },
            }),
            &["source", "destination"],
        ),
        tool(
            "move_file",
            "Move or rename a file or directory",
            json!({
                "source": { "type": "string", "description": "Source path" },
                "destination": { "type": "string", "description": "Destination path" },
                "overwrite": { "type": "boolean", "description": "Overwrite an existing destination" },
            }),
            &["source", "destination"],
        ),
        tool(
            "delete_file",
            "Delete a file or directory",
            json!({
                "path": { "type": "string", "description": "Path to delete" },
                "recursive": { "type": "boolean", "description": "Delete directory contents" },
                "force": { "type": "boolean", "description": "Ignore I/O errors" },
            }),
            &["path"],
        ),
        tool(
            "glob_search",
            "Find files matching a glob pattern",
            json!({
                "pattern": { "type": "string", "description": "Glob pattern (e.g. **/*.rs)" },
                "base_path": { "type": "string", "description": "Base directory for search" },
                "max_results": { "type": "integer", "description": "Maximum results (default: 1000)" },
                "include_dirs": { "type": "boolean", "description": "Include directories in results" },
            }),
            &["pattern"],
        ),
        tool(
            "grep_search",
            "Search file contents with a regular expression",
            json!({
                "pattern": { "type": "string", "description": "Regex pattern" },
                "path": { "type": "string", "description": "File or directory to search" },
                "glob": { "type": "string", "description": "File filter (e.g. **/*.rs)" },
                "case_sensitive": { "type": "boolean", "description": "Case sensitive search (default: true)" },
                "max_results": { "type": "integer", "description": "Maximum results (default: 100)" },
                "context_lines": { "type": "integer", "description": "Lines of context around matches" },
            }),
            &["pattern"],
        ),
        tool(
            "find_by_content",
            "Find files containing specific text",
            json!({
                "text": { "type": "string", "description": "Literal text to search for" },
                "path": { "type": "string", "description": "Directory to search" },
                "file_pattern": { "type": "string", "description": "File filter (e.g. *.rs)" },
                "max_results": { "type": "integer", "description": "Maximum results (default: 100)" },
            }),
            &["text"],
        ),
        tool(
            "file_stat",
            "Get file or directory statistics",
            json!({
                "path": { "type": "string", "description": "Path to file or directory" },
            }),
            &["path"],
        ),
        tool(
            "file_exists",
            "Check if a file or directory exists",
            json!({
                "path": { "type": "string", "description": "Path to check" },
                "type": { "type": "string", "enum": ["file", "directory", "any"], "description": "Expected type (default: any)" },
            }),
            &["path"],
        ),
        tool(
            "get_disk_usage",
            "Calculate disk usage of a directory",
            json!({
                "path": { "type": "string", "description": "Directory path" },
                "max_depth": { "type": "integer", "description": "Breakdown depth (default: 1)" },
            }),
            &["path"],
        ),
        tool(
            "compare_files",
            "Compare size, type and age of two paths",
            json!({
                "path1": { "type": "string", "description": "First path" },
                "path2": { "type": "string", "description": "Second path" },
            }),
            &["path1", "path2"],
        ),
        tool(
            "scaffold_project",
            "Create a project from a template",
            json!({
                "template": { "type": "string", "description": "Template name or path" },
                "destination": { "type": "string", "description": "Destination directory" },
                "variables": { "type": "object", "additionalProperties": { "type": "string" }, "description": "Template variables" },
                "overwrite": { "type": "boolean", "description": "Overwrite existing files" },
            }),
            &["template", "destination"],
        ),
        tool(
            "list_templates",
            "List available project templates",
            json!({
                "category": { "type": "string", "description": "Filter by category" },
            }),
            &[],
        ),
    ]
}
