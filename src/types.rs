//! Core Types
//!
//! Canonical records shared by the workspace parser, the DBeaver client and
//! the outer surfaces (CLI and MCP).

use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::DbeaverError;

/// A saved DBeaver connection, normalized from either workspace format
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Connection {
    /// Workspace-unique connection id
    pub id: String,

    /// Display name
    pub name: String,

    /// Engine identifier as DBeaver stores it (e.g. `postgresql`, `mysql`)
    pub driver: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// JDBC URL if the workspace stores one, otherwise empty
    pub url: String,

    /// Folder the connection is filed under in the navigator
    pub folder: String,

    pub description: String,

    /// Read-only connections only accept read statements
    pub readonly: bool,
}

impl Connection {
    /// Engine family derived from the driver string
    #[must_use]
    pub fn family(&self) -> DriverFamily {
        DriverFamily::from_driver(&self.driver)
    }
}

/// Coarse engine classification used to pick probe and introspection queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverFamily {
    /// `PostgreSQL` and derivatives
    Postgres,
    /// `MySQL` and `MariaDB`
    MySql,
    /// `SQLite`
    Sqlite,
    /// Microsoft SQL Server
    SqlServer,
    /// Oracle Database
    Oracle,
    /// Anything else
    Other,
}

impl DriverFamily {
    /// Classify a driver identifier by substring, so `postgres-jdbc` still
    /// lands in [`DriverFamily::Postgres`].
    #[must_use]
    pub fn from_driver(driver: &str) -> Self {
        let driver = driver.to_ascii_lowercase();
        if driver.contains("postgres") {
            Self::Postgres
        } else if driver.contains("mysql") || driver.contains("mariadb") {
            Self::MySql
        } else if driver.contains("sqlite") {
            Self::Sqlite
        } else if driver.contains("sqlserver") || driver.contains("mssql") || driver.contains("jtds") {
            Self::SqlServer
        } else if driver.contains("oracle") {
            Self::Oracle
        } else {
            Self::Other
        }
    }

    /// Get the family name as a string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::SqlServer => "sqlserver",
            Self::Oracle => "oracle",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for DriverFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Query execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set
    pub columns: Vec<String>,

    /// Result rows, each exactly `columns.len()` values long
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Rows returned, or the engine-reported affected count for DML/DDL
    pub row_count: u64,

    /// Engine-reported execution time, or measured wall-clock time
    pub execution_time_ms: u64,
}

/// Outcome of a connection probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub success: bool,

    pub connection_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestResult {
    /// Successful probe
    #[must_use]
    pub fn succeeded(connection_id: impl Into<String>, database_version: Option<String>) -> Self {
        Self {
            success: true,
            connection_id: connection_id.into(),
            database_version,
            error: None,
        }
    }

    /// Failed probe; an empty message is replaced so `error` is never blank
    #[must_use]
    pub fn failed(connection_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "Unknown error".to_string();
        }
        Self {
            success: false,
            connection_id: connection_id.into(),
            database_version: None,
            error: Some(error),
        }
    }
}

/// Output formats the DBeaver data transfer task can write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Xml,
    Html,
    Xlsx,
}

impl ExportFormat {
    pub const ALL: [Self; 5] = [Self::Csv, Self::Json, Self::Xml, Self::Html, Self::Xlsx];

    /// Token passed after `-f`
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Html => "html",
            Self::Xlsx => "xlsx",
        }
    }

    /// File extension for generated output paths
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = DbeaverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            "html" => Ok(Self::Html),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            other => Err(DbeaverError::invalid_input(format!(
                "Unsupported export format '{other}'. Expected one of: csv, json, xml, html, xlsx"
            ))),
        }
    }
}

/// Options for [`crate::DbeaverClient::export_data`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default)]
    pub format: ExportFormat,

    #[serde(default = "default_include_headers")]
    pub include_headers: bool,

    /// Destination file; generated under the export directory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Field delimiter (csv only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

const fn default_include_headers() -> bool {
    true
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            include_headers: true,
            output_path: None,
            delimiter: None,
            encoding: None,
        }
    }
}

impl ExportOptions {
    #[must_use]
    pub fn new(format: ExportFormat) -> Self {
        Self { format, ..Self::default() }
    }
}

/// Construction-time snapshot of a [`crate::ConfigParser`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub workspace_path: PathBuf,
    pub is_new_format: bool,
    pub connections_file_path: PathBuf,
}
