//! dbeaver-mcp CLI Entry Point
//!
//! Subcommands:
//! - `connections` - List workspace connections
//! - `debug` - Show the resolved workspace and connections file
//! - `test` - Probe a connection
//! - `query` - Run SQL and print the parsed result
//! - `export` - Write a result set to a file
//! - `tables` / `schema` - Introspection through generated SQL
//! - `mcp` - MCP server mode (for AI agent integration)
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use dbeaver_mcp::mcp::McpServer;
use dbeaver_mcp::{
    ClientOptions, ConfigParser, ConfigParserOptions, DbeaverClient, DbeaverError, ErrorEnvelope,
    ErrorInfo, ExportFormat, ExportOptions, Metadata, SuccessEnvelope, DBEAVER_PATH_ENV,
    DBEAVER_WORKSPACE_ENV,
};

/// dbeaver-mcp - DBeaver workspace connections for agents
#[derive(Parser)]
#[command(name = "dbeaver-mcp")]
#[command(about = "Query and export through the connections saved in a DBeaver workspace")]
#[command(version)]
struct Cli {
    /// DBeaver workspace directory
    #[arg(long, global = true, env = DBEAVER_WORKSPACE_ENV)]
    workspace: Option<PathBuf>,

    /// DBeaver launcher (dbeaver or dbeaver-cli)
    #[arg(long, global = true, env = DBEAVER_PATH_ENV)]
    dbeaver_path: Option<PathBuf>,

    /// Kill DBeaver invocations that run longer than this
    #[arg(long, global = true, env = "DBEAVER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Directory for export files when no --output is given
    #[arg(long, global = true, env = "DBEAVER_EXPORT_DIR")]
    export_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "DBEAVER_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "DBEAVER_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the connections saved in the workspace
    Connections,

    /// Show the resolved workspace, format and connections file
    Debug,

    /// Probe a connection with its driver's test query
    Test {
        /// Connection id or name
        connection: String,
    },

    /// Run SQL against a connection
    Query {
        /// Connection id or name
        connection: String,
        /// SQL text
        sql: String,
    },

    /// Export a query result to a file
    Export {
        /// Connection id or name
        connection: String,
        /// SQL text
        sql: String,
        /// csv, json, xml, html or xlsx
        #[arg(long, short, default_value = "csv")]
        format: ExportFormat,
        /// Destination file
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Omit the header row
        #[arg(long)]
        no_headers: bool,
        /// Field delimiter (csv)
        #[arg(long)]
        delimiter: Option<char>,
        /// Output encoding
        #[arg(long)]
        encoding: Option<String>,
    },

    /// List tables and views
    Tables {
        /// Connection id or name
        connection: String,
        #[arg(long)]
        schema: Option<String>,
    },

    /// Describe the columns of a table
    Schema {
        /// Connection id or name
        connection: String,
        table: String,
        #[arg(long)]
        schema: Option<String>,
    },

    /// Start MCP server on stdio
    Mcp,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Connections => "connections",
            Self::Debug => "debug",
            Self::Test { .. } => "test",
            Self::Query { .. } => "query",
            Self::Export { .. } => "export",
            Self::Tables { .. } => "tables",
            Self::Schema { .. } => "schema",
            Self::Mcp => "mcp",
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

/// Data and row count of a successful command
struct Outcome {
    data: Value,
    rows: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let command = cli.command.name();
    let started = Instant::now();
    let mut driver = String::new();

    let result = run(&cli, &mut driver).await;
    let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (json, code) = match result {
        Ok(None) => return Ok(ExitCode::SUCCESS),
        Ok(Some(outcome)) => {
            let meta = match outcome.rows {
                Some(rows) => Metadata::with_rows(execution_ms, rows),
                None => Metadata::new(execution_ms),
            };
            let envelope = SuccessEnvelope::new(driver, command, outcome.data, meta);
            (serde_json::to_string(&envelope)?, ExitCode::SUCCESS)
        }
        Err(err) => {
            let envelope = match err.downcast_ref::<DbeaverError>() {
                Some(dbeaver_err) => ErrorEnvelope::from_error(driver, command, dbeaver_err),
                None => ErrorEnvelope::new(
                    driver,
                    command,
                    ErrorInfo::new("INTERNAL_ERROR", format!("{err:#}")),
                ),
            };
            (serde_json::to_string(&envelope)?, ExitCode::FAILURE)
        }
    };

    println!("{json}");
    Ok(code)
}

/// Execute one command; `Ok(None)` means the command wrote its own output (mcp)
async fn run(cli: &Cli, driver: &mut String) -> anyhow::Result<Option<Outcome>> {
    let parser = ConfigParser::new(ConfigParserOptions {
        workspace_path: cli.workspace.clone(),
        ..ConfigParserOptions::default()
    })?;
    let client = DbeaverClient::with_options(ClientOptions {
        executable_path: cli.dbeaver_path.clone(),
        timeout: cli.timeout_secs.map(Duration::from_secs),
        export_dir: cli.export_dir.clone(),
    });
    debug!(command = cli.command.name(), "Dispatching command");

    let outcome = match &cli.command {
        Commands::Connections => {
            let connections = parser.parse_connections().await?;
            let count = connections.len() as u64;
            Outcome { data: serde_json::to_value(connections)?, rows: Some(count) }
        }
        Commands::Debug => {
            let mut data = serde_json::to_value(parser.debug_info())?;
            data["executable_path"] = serde_json::to_value(client.executable_path())?;
            Outcome { data, rows: None }
        }
        Commands::Test { connection } => {
            let connection = parser.find_connection(connection).await?;
            driver.clone_from(&connection.driver);
            let result = client.test_connection(&connection).await;
            Outcome { data: serde_json::to_value(result)?, rows: None }
        }
        Commands::Query { connection, sql } => {
            let connection = parser.find_connection(connection).await?;
            driver.clone_from(&connection.driver);
            let result = client.execute_query(&connection, sql).await?;
            let rows = result.row_count;
            Outcome { data: serde_json::to_value(result)?, rows: Some(rows) }
        }
        Commands::Export { connection, sql, format, output, no_headers, delimiter, encoding } => {
            let connection = parser.find_connection(connection).await?;
            driver.clone_from(&connection.driver);
            let options = ExportOptions {
                format: *format,
                include_headers: !no_headers,
                output_path: output.clone(),
                delimiter: *delimiter,
                encoding: encoding.clone(),
            };
            let path = client.export_data(&connection, sql, &options).await?;
            Outcome {
                data: serde_json::json!({ "format": format, "output_path": path }),
                rows: None,
            }
        }
        Commands::Tables { connection, schema } => {
            let connection = parser.find_connection(connection).await?;
            driver.clone_from(&connection.driver);
            let result = client.list_tables(&connection, schema.as_deref()).await?;
            let rows = result.row_count;
            Outcome { data: serde_json::to_value(result)?, rows: Some(rows) }
        }
        Commands::Schema { connection, table, schema } => {
            let connection = parser.find_connection(connection).await?;
            driver.clone_from(&connection.driver);
            let result = client.get_table_schema(&connection, table, schema.as_deref()).await?;
            let rows = result.row_count;
            Outcome { data: serde_json::to_value(result)?, rows: Some(rows) }
        }
        Commands::Mcp => {
            McpServer::new(parser, client).serve().await.context("MCP server failed")?;
            return Ok(None);
        }
    };

    Ok(Some(outcome))
}
