//! Workspace Connection Discovery
//!
//! This module locates and parses the connection store of a DBeaver workspace.
//!
//! # Formats
//! - New: `General/.dbeaver/data-sources.json` (DBeaver 6+)
//! - Old: `.metadata/.plugins/org.jkiss.dbeaver.core/connections.xml` (legacy)
//!
//! # Detection
//! Detection runs once when the parser is built:
//! 1. `data-sources.json` exists -> new format
//! 2. `connections.xml` exists -> old format
//! 3. Neither exists -> new format (fresh workspace)
//!
//! When both files exist the new format wins. Missing files and a missing
//! workspace directory are normal states, never errors.

mod data_sources;
mod legacy_xml;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DbeaverError, Result};
use crate::types::{Connection, DebugInfo};

/// Environment variable the CLI reads for the workspace directory
pub const DBEAVER_WORKSPACE_ENV: &str = "DBEAVER_WORKSPACE";

/// On-disk connection store layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `data-sources.json`
    DataSources,
    /// `connections.xml`
    LegacyXml,
}

impl ConfigFormat {
    /// Authoritative connections file for this format under `workspace`
    #[must_use]
    pub fn connections_file(&self, workspace: &Path) -> PathBuf {
        match self {
            Self::DataSources => workspace.join("General").join(".dbeaver").join("data-sources.json"),
            Self::LegacyXml => workspace
                .join(".metadata")
                .join(".plugins")
                .join("org.jkiss.dbeaver.core")
                .join("connections.xml"),
        }
    }

    #[must_use]
    pub const fn is_new_format(&self) -> bool {
        matches!(self, Self::DataSources)
    }
}

/// Construction options for [`ConfigParser`]
///
/// Every field is optional; unset fields are resolved from the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigParserOptions {
    /// Workspace directory (default: [`default_workspace_path`])
    pub workspace_path: Option<PathBuf>,

    /// Skip detection and force a format
    pub format: Option<ConfigFormat>,

    /// Read connections from this file instead of the format's default location
    pub connections_file: Option<PathBuf>,
}

impl ConfigParserOptions {
    #[must_use]
    pub fn workspace(path: impl Into<PathBuf>) -> Self {
        Self { workspace_path: Some(path.into()), ..Self::default() }
    }

    #[must_use]
    pub const fn with_format(mut self, format: ConfigFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[must_use]
    pub fn with_connections_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.connections_file = Some(path.into());
        self
    }
}

/// Reads DBeaver connections from a workspace
///
/// Format and file path are fixed at construction; [`ConfigParser::parse_connections`]
/// re-reads the file on every call.
#[derive(Debug, Clone)]
pub struct ConfigParser {
    workspace_path: PathBuf,
    format: ConfigFormat,
    connections_file: PathBuf,
}

impl ConfigParser {
    /// Build a parser, detecting the workspace format unless overridden
    ///
    /// Fails only when no workspace was given and the platform data directory
    /// cannot be determined.
    pub fn new(options: ConfigParserOptions) -> Result<Self> {
        let workspace_path = match options.workspace_path {
            Some(path) => path,
            None => default_workspace_path()?,
        };
        let format = options.format.unwrap_or_else(|| detect_format(&workspace_path));
        let connections_file =
            options.connections_file.unwrap_or_else(|| format.connections_file(&workspace_path));

        debug!(
            workspace = %workspace_path.display(),
            new_format = format.is_new_format(),
            file = %connections_file.display(),
            "Resolved DBeaver workspace"
        );

        Ok(Self { workspace_path, format, connections_file })
    }

    /// Parser for an explicit workspace with format detection
    #[must_use]
    pub fn with_workspace(path: impl Into<PathBuf>) -> Self {
        let workspace_path = path.into();
        let format = detect_format(&workspace_path);
        let connections_file = format.connections_file(&workspace_path);
        Self { workspace_path, format, connections_file }
    }

    /// Workspace path exactly as given at construction
    #[must_use]
    pub fn workspace_path(&self) -> &Path {
        &self.workspace_path
    }

    #[must_use]
    pub const fn format(&self) -> ConfigFormat {
        self.format
    }

    #[must_use]
    pub const fn is_new_format(&self) -> bool {
        self.format.is_new_format()
    }

    /// File that [`ConfigParser::parse_connections`] reads
    #[must_use]
    pub fn connections_file_path(&self) -> &Path {
        &self.connections_file
    }

    /// Construction-time snapshot; does not touch the filesystem
    #[must_use]
    pub fn debug_info(&self) -> DebugInfo {
        DebugInfo {
            workspace_path: self.workspace_path.clone(),
            is_new_format: self.is_new_format(),
            connections_file_path: self.connections_file.clone(),
        }
    }

    /// Read and parse the connections file
    ///
    /// # Returns
    /// * `Ok(vec![])` if the file does not exist
    /// * `Ok(connections)` in file order
    /// * `Err(DbeaverError::ConfigParse)` if the file is unreadable or malformed
    pub async fn parse_connections(&self) -> Result<Vec<Connection>> {
        let path = &self.connections_file;

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(file = %path.display(), "No connections file, workspace has no connections");
                return Ok(Vec::new());
            }
            Err(e) => return Err(DbeaverError::config_parse(path, e)),
        };

        let parsed = match self.format {
            ConfigFormat::DataSources => data_sources::parse(&contents),
            ConfigFormat::LegacyXml => legacy_xml::parse(&contents),
        };
        let connections = parsed.map_err(|cause| DbeaverError::config_parse(path, cause))?;

        debug!(count = connections.len(), "Parsed workspace connections");
        Ok(connections)
    }

    /// Look a connection up by id, falling back to display name
    pub async fn find_connection(&self, id_or_name: &str) -> Result<Connection> {
        let mut connections = self.parse_connections().await?;

        let index = connections
            .iter()
            .position(|c| c.id == id_or_name)
            .or_else(|| connections.iter().position(|c| c.name == id_or_name));
        if let Some(index) = index {
            return Ok(connections.swap_remove(index));
        }

        let available: Vec<&str> = connections.iter().map(|c| c.id.as_str()).collect();
        Err(DbeaverError::connection_not_found(format!(
            "'{id_or_name}'. Available connections: {available:?}"
        )))
    }
}

/// Pick the workspace format from marker files (read-only existence checks)
#[must_use]
pub fn detect_format(workspace: &Path) -> ConfigFormat {
    if ConfigFormat::DataSources.connections_file(workspace).is_file() {
        ConfigFormat::DataSources
    } else if ConfigFormat::LegacyXml.connections_file(workspace).is_file() {
        ConfigFormat::LegacyXml
    } else {
        ConfigFormat::DataSources
    }
}

/// Platform default DBeaver workspace
///
/// - macOS: `~/Library/DBeaverData/workspace6`
/// - Linux: `~/.local/share/DBeaverData/workspace6`
/// - Windows: `%APPDATA%\DBeaverData\workspace6`
pub fn default_workspace_path() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library"))
    } else {
        dirs::data_dir()
    };

    base.map(|dir| dir.join("DBeaverData").join("workspace6"))
        .ok_or_else(|| DbeaverError::config("Could not determine the DBeaver data directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_paths() {
        let ws = Path::new("/mock/workspace");
        assert!(ConfigFormat::DataSources
            .connections_file(ws)
            .ends_with("General/.dbeaver/data-sources.json"));
        assert!(ConfigFormat::LegacyXml.connections_file(ws).ends_with("connections.xml"));
        assert!(ConfigFormat::DataSources.is_new_format());
        assert!(!ConfigFormat::LegacyXml.is_new_format());
    }

    #[test]
    fn test_missing_workspace_defaults_to_new_format() {
        let parser = ConfigParser::with_workspace("/definitely/not/a/workspace");
        assert!(parser.is_new_format());
        assert_eq!(parser.workspace_path(), Path::new("/definitely/not/a/workspace"));
    }

    #[test]
    fn test_overrides_skip_detection() {
        let parser = ConfigParser::new(
            ConfigParserOptions::workspace("/mock/workspace")
                .with_format(ConfigFormat::LegacyXml)
                .with_connections_file("/tmp/custom.xml"),
        )
        .unwrap();

        let info = parser.debug_info();
        assert!(!info.is_new_format);
        assert_eq!(info.connections_file_path, PathBuf::from("/tmp/custom.xml"));
        assert_eq!(info.workspace_path, PathBuf::from("/mock/workspace"));
    }

    #[test]
    fn test_default_workspace_path_shape() {
        if let Ok(path) = default_workspace_path() {
            assert!(path.ends_with("DBeaverData/workspace6"));
        }
    }
}
