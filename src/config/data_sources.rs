//! `data-sources.json` reader (DBeaver 6+ workspaces)
//!
//! ```json
//! {
//!   "folders": {},
//!   "connections": {
//!     "postgres-jdbc-18a5c3": {
//!       "provider": "postgresql",
//!       "driver": "postgres-jdbc",
//!       "name": "Orders",
//!       "folder": "Prod",
//!       "read-only": true,
//!       "configuration": { "host": "db", "port": "5432", "database": "orders", "user": "app" }
//!     }
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::types::Connection;

#[derive(Debug, Deserialize)]
struct DataSourcesFile {
    /// Key order is preserved (`serde_json/preserve_order`)
    #[serde(default)]
    connections: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DataSourceEntry {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    provider: Option<String>,

    #[serde(default)]
    driver: Option<String>,

    #[serde(default)]
    folder: Option<String>,

    #[serde(default)]
    description: Option<String>,

    #[serde(default, rename = "read-only")]
    read_only: Option<bool>,

    #[serde(default)]
    configuration: DataSourceConfiguration,
}

/// Scalars are kept as raw JSON because DBeaver writes `port` as a string
/// while hand-edited files often use a number.
#[derive(Debug, Default, Deserialize)]
struct DataSourceConfiguration {
    #[serde(default)]
    host: Option<Value>,

    #[serde(default)]
    port: Option<Value>,

    #[serde(default)]
    database: Option<Value>,

    #[serde(default)]
    user: Option<Value>,

    #[serde(default)]
    url: Option<Value>,
}

/// Parse the file contents into connections, in key order
pub(crate) fn parse(contents: &str) -> Result<Vec<Connection>, String> {
    let file: DataSourcesFile =
        serde_json::from_str(contents.trim_start_matches('\u{feff}')).map_err(|e| e.to_string())?;

    file.connections
        .into_iter()
        .map(|(id, raw)| {
            let entry: DataSourceEntry = serde_json::from_value(raw)
                .map_err(|e| format!("connection '{id}' is malformed: {e}"))?;
            Ok(into_connection(id, entry))
        })
        .collect()
}

fn into_connection(id: String, entry: DataSourceEntry) -> Connection {
    let config = entry.configuration;

    Connection {
        name: entry.name.unwrap_or_else(|| id.clone()),
        driver: entry.provider.or(entry.driver).unwrap_or_default(),
        host: scalar_text(config.host),
        port: scalar_text(config.port),
        database: scalar_text(config.database),
        user: scalar_text(config.user),
        url: scalar_text(config.url).unwrap_or_default(),
        folder: entry.folder.unwrap_or_default(),
        description: entry.description.unwrap_or_default(),
        readonly: entry.read_only.unwrap_or(false),
        id,
    }
}

fn scalar_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
