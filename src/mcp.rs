//! MCP (Model Context Protocol) Server
//!
//! This module implements an MCP server using manual JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dependencies**: `serde_json`, `schemars` for tool input schemas, and anyhow
//! - **Protocol**: `initialize`, `tools/list`, `tools/call`; notifications get no reply
//!
//! # MCP Tools
//!
//! - `list_connections` - Connections saved in the workspace
//! - `get_connection_info` - One connection by id or name
//! - `test_connection` - Probe a connection through DBeaver
//! - `execute_query` - Run SQL and return columns and rows
//! - `export_data` - Write a result set to a file
//! - `list_tables` - Tables and views visible to a connection
//! - `get_table_schema` - Column layout of one table
//! - `debug_info` - Resolved workspace and connections file
//!
//! # Usage
//!
//! Start the MCP server with: `dbeaver-mcp mcp`
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "dbeaver": {
//!       "command": "dbeaver-mcp",
//!       "args": ["mcp"]
//!     }
//!   }
//! }
//! ```

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::client::{DbeaverClient, ProcessRunner, TokioProcessRunner};
use crate::config::ConfigParser;
use crate::error::DbeaverError;
use crate::output::ErrorInfo;
use crate::types::{ExportFormat, ExportOptions};

const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

// ============================================================================
// MCP Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

impl TextContent {
    fn new(text: String) -> Self {
        Self { content_type: "text".to_string(), text }
    }
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl CallToolResult {
    /// Successful tool result with pretty-printed JSON data
    fn success(data: impl Serialize) -> Result<Value> {
        let json_text = serde_json::to_string_pretty(&data)?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error: false };
        Ok(serde_json::to_value(result)?)
    }

    /// Tool-level failure: the call was well-formed but the operation failed
    fn failure(err: &DbeaverError) -> Result<Value> {
        let info = ErrorInfo::new(err.error_code(), err.message());
        let json_text = serde_json::to_string_pretty(&serde_json::json!({ "error": info }))?;
        let result = Self { content: vec![TextContent::new(json_text)], is_error: true };
        Ok(serde_json::to_value(result)?)
    }
}

// ============================================================================
// Tool Inputs
// ============================================================================

/// Input for tools addressing one saved connection
#[derive(Debug, Deserialize, JsonSchema)]
struct ConnectionArgs {
    /// Connection id or display name from list_connections
    connection_id: String,
}

/// Input for the execute_query tool
#[derive(Debug, Deserialize, JsonSchema)]
struct ExecuteQueryArgs {
    /// Connection id or display name from list_connections
    connection_id: String,
    /// SQL to run, in the connection's own dialect
    query: String,
}

/// Input for the export_data tool
#[derive(Debug, Deserialize, JsonSchema)]
struct ExportDataArgs {
    /// Connection id or display name from list_connections
    connection_id: String,
    /// SQL whose result set is exported
    query: String,
    /// Output format. Default: csv
    #[serde(default)]
    format: Option<ExportFormat>,
    /// Destination file. Default: a generated file in the export directory
    #[serde(default)]
    output_path: Option<PathBuf>,
    /// Write a header row. Default: true
    #[serde(default)]
    include_headers: Option<bool>,
    /// Field delimiter for csv
    #[serde(default)]
    delimiter: Option<char>,
    /// Output encoding, e.g. UTF-8
    #[serde(default)]
    encoding: Option<String>,
}

/// Input for the list_tables tool
#[derive(Debug, Deserialize, JsonSchema)]
struct ListTablesArgs {
    /// Connection id or display name from list_connections
    connection_id: String,
    /// Restrict to one schema
    #[serde(default)]
    schema: Option<String>,
}

/// Input for the get_table_schema tool
#[derive(Debug, Deserialize, JsonSchema)]
struct TableSchemaArgs {
    /// Connection id or display name from list_connections
    connection_id: String,
    /// Table name
    table: String,
    /// Schema the table lives in
    #[serde(default)]
    schema: Option<String>,
}

/// Input for tools without parameters
#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

fn input_schema<T: JsonSchema>() -> Result<Value> {
    Ok(serde_json::to_value(schemars::schema_for!(T))?)
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() { Value::Object(serde_json::Map::new()) } else { args };
    serde_json::from_value(args).map_err(|e| anyhow!("Invalid tool arguments: {e}"))
}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server over a workspace and a DBeaver client
///
/// Each tool call re-reads the workspace; nothing is cached between calls.
pub struct McpServer<R = TokioProcessRunner> {
    parser: ConfigParser,
    client: DbeaverClient<R>,
}

impl<R: ProcessRunner> McpServer<R> {
    pub const fn new(parser: ConfigParser, client: DbeaverClient<R>) -> Self {
        Self { parser, client }
    }

    /// Run the server loop until stdin closes
    ///
    /// # Protocol
    /// - Each request is a single line of JSON
    /// - Each response is a single line of JSON
    /// - Unparseable lines get a `-32700` error response
    ///
    /// # Errors
    /// Returns an error if stdio communication fails.
    pub async fn serve(&self) -> Result<()> {
        info!(version = env!("CARGO_PKG_VERSION"), "Starting MCP server on stdio");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let response_json = serde_json::to_string(&response)?;
                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        info!("stdin closed, MCP server stopping");
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"))),
        }
    }

    /// Route a request by method name; notifications produce no response
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() && request.method.starts_with("notifications/") {
            debug!(method = %request.method, "Ignoring notification");
            return None;
        }

        let result = match request.method.as_str() {
            "initialize" => Ok(handle_initialize()),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params).await,
            _ => {
                return Some(JsonRpcResponse::error(
                    request.id,
                    -32601,
                    format!("Unknown method: {}", request.method),
                ));
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::result(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, -32603, e.to_string()),
        })
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| anyhow!("Missing params"))?;
        let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);

        debug!(tool = name, "Calling tool");
        let outcome = match name {
            "list_connections" => {
                parse_args::<NoArgs>(args)?;
                self.tool_list_connections().await
            }
            "get_connection_info" => self.tool_get_connection_info(parse_args(args)?).await,
            "test_connection" => self.tool_test_connection(parse_args(args)?).await,
            "execute_query" => self.tool_execute_query(parse_args(args)?).await,
            "export_data" => self.tool_export_data(parse_args(args)?).await,
            "list_tables" => self.tool_list_tables(parse_args(args)?).await,
            "get_table_schema" => self.tool_get_table_schema(parse_args(args)?).await,
            "debug_info" => {
                parse_args::<NoArgs>(args)?;
                Ok(serde_json::to_value(self.parser.debug_info())?)
            }
            _ => return Err(anyhow!("Unknown tool: {name}")),
        };

        match outcome {
            Ok(data) => CallToolResult::success(data),
            Err(ToolError::Dbeaver(err)) => CallToolResult::failure(&err),
            Err(ToolError::Internal(err)) => Err(err),
        }
    }

    // ========================================================================
    // Tool Implementations
    // ========================================================================

    async fn tool_list_connections(&self) -> ToolResult {
        let connections = self.parser.parse_connections().await?;
        Ok(serde_json::json!({
            "connections": connections,
            "count": connections.len(),
        }))
    }

    async fn tool_get_connection_info(&self, args: ConnectionArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        Ok(serde_json::to_value(connection)?)
    }

    async fn tool_test_connection(&self, args: ConnectionArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        let result = self.client.test_connection(&connection).await;
        Ok(serde_json::to_value(result)?)
    }

    async fn tool_execute_query(&self, args: ExecuteQueryArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        let result = self.client.execute_query(&connection, &args.query).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn tool_export_data(&self, args: ExportDataArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        let options = ExportOptions {
            format: args.format.unwrap_or_default(),
            include_headers: args.include_headers.unwrap_or(true),
            output_path: args.output_path,
            delimiter: args.delimiter,
            encoding: args.encoding,
        };
        let path = self.client.export_data(&connection, &args.query, &options).await?;
        Ok(serde_json::json!({
            "connection_id": connection.id,
            "format": options.format,
            "output_path": path,
        }))
    }

    async fn tool_list_tables(&self, args: ListTablesArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        let result = self.client.list_tables(&connection, args.schema.as_deref()).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn tool_get_table_schema(&self, args: TableSchemaArgs) -> ToolResult {
        let connection = self.parser.find_connection(&args.connection_id).await?;
        let result = self
            .client
            .get_table_schema(&connection, &args.table, args.schema.as_deref())
            .await?;
        Ok(serde_json::to_value(result)?)
    }
}

/// Failures inside a tool: library errors are reported to the agent as
/// `isError` results, anything else becomes a JSON-RPC error
enum ToolError {
    Dbeaver(DbeaverError),
    Internal(anyhow::Error),
}

impl From<DbeaverError> for ToolError {
    fn from(err: DbeaverError) -> Self {
        Self::Dbeaver(err)
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.into())
    }
}

type ToolResult = std::result::Result<Value, ToolError>;

// ============================================================================
// MCP Protocol Handlers
// ============================================================================

fn handle_initialize() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "dbeaver-mcp",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn handle_list_tools() -> Result<Value> {
    Ok(serde_json::json!({
        "tools": [
            {
                "name": "list_connections",
                "description": "List the database connections saved in the DBeaver workspace. Returns id, name, driver and host details for each connection in the order DBeaver stores them. Use the returned id as connection_id in every other tool.",
                "inputSchema": input_schema::<NoArgs>()?
            },
            {
                "name": "get_connection_info",
                "description": "Get the saved settings of one connection, looked up by id first and then by display name.",
                "inputSchema": input_schema::<ConnectionArgs>()?
            },
            {
                "name": "test_connection",
                "description": "Check that DBeaver can reach a connection by running the driver's trivial version query. Always returns a result: success=false carries the error text instead of failing the call.",
                "inputSchema": input_schema::<ConnectionArgs>()?
            },
            {
                "name": "execute_query",
                "description": "Run SQL against a saved connection through DBeaver and return columns and rows. Use the connection's own SQL dialect. DROP DATABASE, DROP SCHEMA, TRUNCATE and SHUTDOWN are rejected before DBeaver is launched, and read-only connections only accept read statements (SELECT, WITH, SHOW, EXPLAIN, DESCRIBE, PRAGMA, VALUES).",
                "inputSchema": input_schema::<ExecuteQueryArgs>()?
            },
            {
                "name": "export_data",
                "description": "Run SQL and have DBeaver write the full result set to a file (csv, json, xml, html or xlsx). Returns the path of the written file. Prefer this over execute_query for large result sets.",
                "inputSchema": input_schema::<ExportDataArgs>()?
            },
            {
                "name": "list_tables",
                "description": "List tables and views visible to a connection, optionally restricted to one schema.",
                "inputSchema": input_schema::<ListTablesArgs>()?
            },
            {
                "name": "get_table_schema",
                "description": "Describe the columns of one table: name, data type, nullability and default, in ordinal order.",
                "inputSchema": input_schema::<TableSchemaArgs>()?
            },
            {
                "name": "debug_info",
                "description": "Show which DBeaver workspace is in use, whether it uses the data-sources.json or the legacy connections.xml format, and which file connections are read from.",
                "inputSchema": input_schema::<NoArgs>()?
            }
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientOptions, ProcessOutput, RunOptions};
    use std::io;
    use std::path::Path;
    use std::sync::Mutex;

    struct ScriptedRunner {
        stdout: String,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(stdout: &str) -> Self {
            Self { stdout: stdout.to_string(), calls: Mutex::new(Vec::new()) }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        async fn run(
            &self,
            _program: &Path,
            args: &[String],
            _options: &RunOptions,
        ) -> io::Result<ProcessOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(ProcessOutput::ok(self.stdout.clone()))
        }
    }

    fn server(workspace: &Path, stdout: &str) -> McpServer<ScriptedRunner> {
        let client = DbeaverClient::with_runner(
            Some(PathBuf::from("/opt/dbeaver/dbeaver-cli")),
            ScriptedRunner::new(stdout),
            ClientOptions::default(),
        );
        McpServer::new(ConfigParser::with_workspace(workspace), client)
    }

    fn write_workspace(dir: &Path) {
        let config_dir = dir.join("General").join(".dbeaver");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("data-sources.json"),
            r#"{"connections": {"conn-1": {"name": "Test DB 1", "provider": "postgresql",
                "configuration": {"host": "localhost", "port": "5432", "database": "app"}}}}"#,
        )
        .unwrap();
    }

    fn request(method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::from(1)),
            method: method.to_string(),
            params: Some(params),
        }
    }

    fn tool_text(response: &JsonRpcResponse) -> Value {
        let result = response.result.as_ref().unwrap();
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), "");

        let init = server.handle_request(request("initialize", Value::Null)).await.unwrap();
        assert_eq!(init.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);

        let tools = server.handle_request(request("tools/list", Value::Null)).await.unwrap();
        let tools = tools.result.unwrap();
        let names: Vec<&str> =
            tools["tools"].as_array().unwrap().iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "list_connections",
                "get_connection_info",
                "test_connection",
                "execute_query",
                "export_data",
                "list_tables",
                "get_table_schema",
                "debug_info"
            ]
        );
        let query_schema = &tools["tools"][3]["inputSchema"];
        assert!(query_schema["properties"]["query"].is_object());
    }

    #[test]
    fn test_input_schemas_are_objects() {
        let schema = input_schema::<ExportDataArgs>().unwrap();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["format"].is_object());
        assert_eq!(schema["required"], serde_json::json!(["connection_id", "query"]));

        let tools = handle_list_tools().unwrap();
        for tool in tools["tools"].as_array().unwrap() {
            assert_eq!(tool["inputSchema"]["type"], "object", "{}", tool["name"]);
        }
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), "");
        let notification = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(server.handle_request(notification).await.is_none());
    }

    #[tokio::test]
    async fn test_parse_error_and_unknown_method() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), "");

        let response = server.handle_line("{not json").await.unwrap();
        assert_eq!(response.error.unwrap().code, -32700);

        let response = server.handle_request(request("resources/list", Value::Null)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_list_connections_tool() {
        let dir = tempfile::tempdir().unwrap();
        write_workspace(dir.path());
        let server = server(dir.path(), "");

        let response = server
            .handle_request(request("tools/call", serde_json::json!({"name": "list_connections"})))
            .await
            .unwrap();
        let data = tool_text(&response);
        assert_eq!(data["count"], 1);
        assert_eq!(data["connections"][0]["id"], "conn-1");
        assert_eq!(data["connections"][0]["host"], "localhost");
    }

    #[tokio::test]
    async fn test_execute_query_tool() {
        let dir = tempfile::tempdir().unwrap();
        write_workspace(dir.path());
        let server = server(dir.path(), "id,name\n1,alice\n");

        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({
                    "name": "execute_query",
                    "arguments": {"connection_id": "Test DB 1", "query": "SELECT id, name FROM users"}
                }),
            ))
            .await
            .unwrap();
        let data = tool_text(&response);
        assert_eq!(data["columns"], serde_json::json!(["id", "name"]));
        assert_eq!(data["row_count"], 1);

        let calls = server.client.runner().calls.lock().unwrap();
        assert!(calls[0].contains(&"id=conn-1".to_string()));
    }

    #[tokio::test]
    async fn test_library_errors_are_tool_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_workspace(dir.path());
        let server = server(dir.path(), "");

        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({"name": "get_connection_info", "arguments": {"connection_id": "nope"}}),
            ))
            .await
            .unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.result.as_ref().unwrap()["isError"], true);
        assert_eq!(tool_text(&response)["error"]["code"], "CONNECTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_missing_arguments_are_protocol_errors() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), "");

        let response = server
            .handle_request(request(
                "tools/call",
                serde_json::json!({"name": "execute_query", "arguments": {"connection_id": "conn-1"}}),
            ))
            .await
            .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert!(error.message.contains("Invalid tool arguments"));
    }

    #[tokio::test]
    async fn test_debug_info_tool() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path(), "");

        let response = server
            .handle_request(request("tools/call", serde_json::json!({"name": "debug_info"})))
            .await
            .unwrap();
        let data = tool_text(&response);
        assert_eq!(data["is_new_format"], true);
        assert!(data["connections_file_path"].as_str().unwrap().ends_with("data-sources.json"));
    }
}
