//! DBeaver CLI Client
//!
//! Translates high-level intents (probe a connection, run a query, export a
//! result set, introspect tables) into DBeaver subprocess invocations and turns
//! the captured stdout back into [`QueryResult`]s.
//!
//! # Invocation Contract
//! - Query: `-nosplash -con id=<id> -sql <query> -f csv`
//! - Export: `-nosplash -con id=<id> -sql <query> -f <format> -o <path> -header <bool>`
//!
//! Only the sanitized connection id is ever placed in an argument. Every call
//! spawns its own process; the client holds no mutable state.

mod parse;
pub mod runner;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{DbeaverError, Result};
use crate::types::{Connection, ExportOptions, QueryResult, TestResult};
use crate::utils::{
    build_list_tables_query, build_table_schema_query, extract_version, find_dbeaver_executable,
    format_error, get_test_query, is_read_only_query, sanitize_connection_id, validate_query,
};

pub use runner::{ProcessOutput, ProcessRunner, RunOptions, TokioProcessRunner};

/// Distinguishes generated export paths created in the same millisecond
static EXPORT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Client construction options
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Use this launcher instead of searching for one
    pub executable_path: Option<PathBuf>,

    /// Per-invocation timeout passed to the runner
    pub timeout: Option<Duration>,

    /// Directory for generated export file names (default: system temp dir)
    pub export_dir: Option<PathBuf>,
}

/// Drives the DBeaver executable
#[derive(Debug, Clone)]
pub struct DbeaverClient<R = TokioProcessRunner> {
    executable_path: Option<PathBuf>,
    runner: R,
    options: ClientOptions,
}

impl DbeaverClient<TokioProcessRunner> {
    /// Client with a located executable and default options
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// Client using real subprocesses
    ///
    /// A missing executable is not an error here; operations that need it fail
    /// with [`DbeaverError::ExecutableNotFound`].
    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        let executable_path = options.executable_path.clone().or_else(find_dbeaver_executable);
        Self::with_runner(executable_path, TokioProcessRunner, options)
    }
}

impl Default for DbeaverClient<TokioProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> DbeaverClient<R> {
    /// Client with an explicit executable path and runner
    pub fn with_runner(executable_path: Option<PathBuf>, runner: R, options: ClientOptions) -> Self {
        match &executable_path {
            Some(path) => debug!(executable = %path.display(), "Using DBeaver executable"),
            None => warn!("DBeaver executable not found; set DBEAVER_PATH to enable query execution"),
        }
        Self { executable_path, runner, options }
    }

    /// Launcher resolved at construction
    #[must_use]
    pub fn executable_path(&self) -> Option<&Path> {
        self.executable_path.as_deref()
    }

    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `query` against `connection` and parse the tabular output
    ///
    /// # Errors
    /// * `InvalidQuery` if the prefilter or the read-only guard rejects the query
    /// * `InvalidInput` if the connection id sanitizes to nothing
    /// * `ExecutableNotFound` if no launcher was located
    /// * `QueryExecution` if DBeaver fails or prints malformed output
    pub async fn execute_query(&self, connection: &Connection, query: &str) -> Result<QueryResult> {
        validate_query(query)?;
        guard_read_only(connection, query)?;
        let connection_id = sanitize_connection_id(&connection.id)?;

        let args = build_query_args(&connection_id, query);
        let started = Instant::now();
        let output = self.run_dbeaver(&args, DbeaverError::QueryExecution).await?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let parsed =
            parse::parse_query_output(&output.stdout).map_err(DbeaverError::QueryExecution)?;
        let row_count = parsed.affected_rows.unwrap_or(parsed.rows.len() as u64);

        Ok(QueryResult {
            columns: parsed.columns,
            rows: parsed.rows,
            row_count,
            execution_time_ms: parsed.execution_ms.unwrap_or(elapsed_ms),
        })
    }

    /// Probe a connection with the driver's test query
    ///
    /// Never fails: every error becomes `TestResult { success: false, .. }`.
    pub async fn test_connection(&self, connection: &Connection) -> TestResult {
        let query = get_test_query(&connection.driver);

        match self.execute_query(connection, query).await {
            Ok(result) => {
                let version = extract_version(&result, connection.family());
                debug!(connection = %connection.id, version = ?version, "Connection test succeeded");
                TestResult::succeeded(&connection.id, version)
            }
            Err(err) => {
                warn!(connection = %connection.id, error = %err, "Connection test failed");
                TestResult::failed(&connection.id, format_error(&err))
            }
        }
    }

    /// Run `query` and have DBeaver write the result set to a file
    ///
    /// Returns the path of the written file.
    pub async fn export_data(
        &self,
        connection: &Connection,
        query: &str,
        options: &ExportOptions,
    ) -> Result<PathBuf> {
        validate_query(query)?;
        guard_read_only(connection, query)?;
        let connection_id = sanitize_connection_id(&connection.id)?;

        let output_path = match &options.output_path {
            Some(path) => path.clone(),
            None => self.default_export_path(&connection_id, options),
        };
        prepare_destination(&output_path).await?;

        let args = build_export_args(&connection_id, query, &output_path, options);
        self.run_dbeaver(&args, DbeaverError::Export).await?;

        if !tokio::fs::try_exists(&output_path).await.unwrap_or(false) {
            return Err(DbeaverError::export(format!(
                "DBeaver finished but {} was not created",
                output_path.display()
            )));
        }

        info!(
            connection = %connection.id,
            format = %options.format,
            path = %output_path.display(),
            "Exported query result"
        );
        Ok(output_path)
    }

    /// List tables (and views) visible to the connection
    pub async fn list_tables(
        &self,
        connection: &Connection,
        schema: Option<&str>,
    ) -> Result<QueryResult> {
        let query = build_list_tables_query(connection.family(), schema);
        self.execute_query(connection, &query).await
    }

    /// Describe the columns of one table
    pub async fn get_table_schema(
        &self,
        connection: &Connection,
        table: &str,
        schema: Option<&str>,
    ) -> Result<QueryResult> {
        let query = build_table_schema_query(connection.family(), table, schema)?;
        self.execute_query(connection, &query).await
    }

    /// `dbeaver-export-<id>-<timestamp>-<pid>-<seq>.<ext>`, unique within the process
    fn default_export_path(&self, connection_id: &str, options: &ExportOptions) -> PathBuf {
        let dir = self.options.export_dir.clone().unwrap_or_else(std::env::temp_dir);
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
        let seq = EXPORT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        dir.join(format!(
            "dbeaver-export-{connection_id}-{stamp}-{}-{seq}.{}",
            std::process::id(),
            options.format.extension()
        ))
    }

    /// Launch DBeaver and classify the outcome
    ///
    /// A non-zero exit, or empty stdout alongside stderr text, is a failure
    /// reported through `fail`.
    async fn run_dbeaver(
        &self,
        args: &[String],
        fail: fn(String) -> DbeaverError,
    ) -> Result<ProcessOutput> {
        let program = self.executable_path.as_deref().ok_or_else(|| {
            DbeaverError::executable_not_found(
                "install DBeaver or point DBEAVER_PATH at the dbeaver/dbeaver-cli launcher",
            )
        })?;

        let run_options = RunOptions { timeout: self.options.timeout };
        debug!(program = %program.display(), argc = args.len(), "Launching DBeaver");

        let output = self
            .runner
            .run(program, args, &run_options)
            .await
            .map_err(|e| fail(format!("could not run {}: {e}", program.display())))?;

        let stderr = output.stderr.trim();
        let failed = !output.exited_successfully()
            || (output.stdout.trim().is_empty() && !stderr.is_empty());
        if failed {
            warn!(exit_code = ?output.exit_code, "DBeaver invocation failed");
            let message = if !stderr.is_empty() {
                stderr.to_string()
            } else {
                match output.exit_code {
                    Some(code) => format!("DBeaver exited with status {code}"),
                    None => "DBeaver was terminated by a signal".to_string(),
                }
            };
            return Err(fail(message));
        }

        Ok(output)
    }
}

/// Argument vector for query mode
#[must_use]
pub fn build_query_args(connection_id: &str, query: &str) -> Vec<String> {
    vec![
        "-nosplash".to_string(),
        "-con".to_string(),
        format!("id={connection_id}"),
        "-sql".to_string(),
        query.to_string(),
        "-f".to_string(),
        "csv".to_string(),
    ]
}

/// Argument vector for export mode
///
/// Always contains `-con`, `-f` and `-o`.
#[must_use]
pub fn build_export_args(
    connection_id: &str,
    query: &str,
    output_path: &Path,
    options: &ExportOptions,
) -> Vec<String> {
    let mut args = vec![
        "-nosplash".to_string(),
        "-con".to_string(),
        format!("id={connection_id}"),
        "-sql".to_string(),
        query.to_string(),
        "-f".to_string(),
        options.format.as_str().to_string(),
        "-o".to_string(),
        output_path.to_string_lossy().into_owned(),
        "-header".to_string(),
        options.include_headers.to_string(),
    ];

    if let Some(delimiter) = options.delimiter {
        args.push("-delimiter".to_string());
        args.push(delimiter.to_string());
    }
    if let Some(encoding) = options.encoding.as_deref().filter(|e| !e.trim().is_empty()) {
        args.push("-encoding".to_string());
        args.push(encoding.to_string());
    }

    args
}

fn guard_read_only(connection: &Connection, query: &str) -> Result<()> {
    if connection.readonly && !is_read_only_query(query) {
        return Err(DbeaverError::invalid_query(format!(
            "Connection '{}' is read-only; only read statements are allowed",
            connection.id
        )));
    }
    Ok(())
}

async fn prepare_destination(path: &Path) -> Result<()> {
    if tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false) {
        return Err(DbeaverError::export(format!("{} is a directory", path.display())));
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DbeaverError::export(format!(
                    "could not create output directory {}: {e}",
                    parent.display()
                ))
            })
        }
        _ => Ok(()),
    }
}
