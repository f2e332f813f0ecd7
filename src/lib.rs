//! dbeaver-mcp - DBeaver Workspace Connections for Agents
//!
//! Reads the connections a user has saved in a DBeaver workspace and drives
//! the DBeaver executable to test them, run SQL against them and export
//! result sets to files.
//!
//! # Core Principles
//! - Connections come from the workspace as-is (no credentials handled here)
//! - DBeaver is an opaque subprocess with an argument/stdout contract
//! - Arguments are passed as a vector, never through a shell
//! - Read-only connections only accept read statements
//!
//! # Architecture
//! The CLI binary and the MCP server are thin wrappers over this library.
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`types`] - Connection, result and export records
//! - [`config`] - Workspace format detection and connection parsing
//! - [`client`] - DBeaver invocation and output parsing
//! - [`utils`] - Query prefilter, identifier sanitizing, introspection SQL
//! - [`output`] - JSON output envelope types
//! - [`mcp`] - MCP server over stdio

pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod output;
pub mod types;
pub mod utils;

pub use client::{
    build_export_args, build_query_args, ClientOptions, DbeaverClient, ProcessOutput,
    ProcessRunner, RunOptions, TokioProcessRunner,
};
pub use config::{
    default_workspace_path, detect_format, ConfigFormat, ConfigParser, ConfigParserOptions,
    DBEAVER_WORKSPACE_ENV,
};
pub use error::{DbeaverError, Result};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use types::{
    Connection, DebugInfo, DriverFamily, ExportFormat, ExportOptions, QueryResult, TestResult,
};
pub use utils::{find_dbeaver_executable, validate_query, DBEAVER_PATH_ENV};
