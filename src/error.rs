//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout dbeaver-mcp.
//! All errors are structured and map to specific error codes for JSON output.
//!
//! # Error Categories
//! - `ConfigParse`: Malformed or unreadable workspace connection file
//! - `ExecutableNotFound`: The DBeaver launcher could not be located
//! - `QueryExecution`: The DBeaver subprocess failed while running a query
//! - `Export`: The export subprocess failed or the destination could not be prepared
//! - `InvalidQuery`: Query rejected by the syntactic prefilter
//! - `InvalidInput`: Malformed caller input (empty connection id, bad arguments)
//! - `ConnectionNotFound`: No connection with the requested id or name
//! - `Config`: Runtime configuration problems (no workspace directory, etc.)

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for dbeaver-mcp operations
#[derive(Error, Debug)]
pub enum DbeaverError {
    /// Workspace connection file could not be read or parsed
    #[error("Failed to parse connection config {}: {cause}", .path.display())]
    ConfigParse { path: PathBuf, cause: String },

    /// DBeaver executable could not be located
    #[error("DBeaver executable not found: {0}")]
    ExecutableNotFound(String),

    /// Query subprocess failed
    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    /// Export subprocess failed or destination unusable
    #[error("Export failed: {0}")]
    Export(String),

    /// Query rejected before execution (message is shown verbatim)
    #[error("{0}")]
    InvalidQuery(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No connection matched the requested id or name
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Runtime configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbeaverError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "CONFIG_PARSE_ERROR",
            Self::ExecutableNotFound(_) => "EXECUTABLE_NOT_FOUND",
            Self::QueryExecution(_) => "QUERY_FAILED",
            Self::Export(_) => "EXPORT_FAILED",
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a config parse error for `path`
    pub fn config_parse(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::ConfigParse { path: path.into(), cause: cause.to_string() }
    }

    /// Create an executable-not-found error
    pub fn executable_not_found(message: impl Into<String>) -> Self {
        Self::ExecutableNotFound(message.into())
    }

    /// Create a query execution error
    pub fn query_execution(message: impl Into<String>) -> Self {
        Self::QueryExecution(message.into())
    }

    /// Create an export error
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export(message.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a connection-not-found error
    pub fn connection_not_found(message: impl Into<String>) -> Self {
        Self::ConnectionNotFound(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for dbeaver-mcp operations
pub type Result<T> = std::result::Result<T, DbeaverError>;
