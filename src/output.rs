//! JSON Output Envelope Types
//!
//! Every CLI command prints exactly one envelope to stdout.
//!
//! # Output Contract
//! - Success: `{"ok": true, "driver": "...", "command": "...", "data": {...}, "meta": {...}}`
//! - Error: `{"ok": false, "driver": "...", "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! `driver` is the connection's driver string, or empty for commands that are
//! not tied to one connection (`connections`, `debug`).

use serde::{Deserialize, Serialize};

use crate::error::DbeaverError;

/// Success envelope for operation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessEnvelope<T> {
    /// Always true for success envelopes
    pub ok: bool,

    /// Driver of the connection the command ran against
    pub driver: String,

    /// Command that was executed (query, export, test, ...)
    pub command: String,

    /// Operation-specific data
    pub data: T,

    /// Execution metadata
    pub meta: Metadata,
}

impl<T> SuccessEnvelope<T> {
    pub fn new(driver: impl Into<String>, command: impl Into<String>, data: T, meta: Metadata) -> Self {
        Self { ok: true, driver: driver.into(), command: command.into(), data, meta }
    }
}

/// Error envelope for operation failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub driver: String,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(driver: impl Into<String>, command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, driver: driver.into(), command: command.into(), error }
    }

    /// Envelope carrying the stable code and message of a [`DbeaverError`]
    pub fn from_error(
        driver: impl Into<String>,
        command: impl Into<String>,
        err: &DbeaverError,
    ) -> Self {
        Self::new(driver, command, ErrorInfo::new(err.error_code(), err.message()))
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "QUERY_FAILED", "CONNECTION_NOT_FOUND")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

/// Execution metadata included in all success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Wall-clock time of the whole command in milliseconds
    pub execution_ms: u64,

    /// Number of rows returned (query-like commands only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_returned: Option<u64>,
}

impl Metadata {
    #[must_use]
    pub const fn new(execution_ms: u64) -> Self {
        Self { execution_ms, rows_returned: None }
    }

    #[must_use]
    pub const fn with_rows(execution_ms: u64, rows_returned: u64) -> Self {
        Self { execution_ms, rows_returned: Some(rows_returned) }
    }
}
