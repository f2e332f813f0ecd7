//! DBeaver Client Tests
//!
//! The client is driven through a recording fake [`ProcessRunner`], so these
//! tests check argument vectors and output handling without DBeaver installed.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dbeaver_mcp::{
    build_export_args, build_query_args, ClientOptions, Connection, DbeaverClient, DbeaverError,
    ExportFormat, ExportOptions, ProcessOutput, ProcessRunner, RunOptions,
};
use pretty_assertions::assert_eq;

const EXECUTABLE: &str = "/opt/dbeaver/dbeaver-cli";

/// One recorded invocation
#[derive(Debug, Clone)]
struct Call {
    program: PathBuf,
    args: Vec<String>,
    options: RunOptions,
}

enum Reply {
    Output(ProcessOutput),
    SpawnError,
}

/// Fake runner replaying a canned reply and recording every call
///
/// When `write_output` is set it creates the file named after `-o`, the way
/// DBeaver does for a successful export.
struct FakeRunner {
    reply: Reply,
    write_output: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeRunner {
    fn replying(output: ProcessOutput) -> Self {
        Self { reply: Reply::Output(output), write_output: false, calls: Mutex::new(Vec::new()) }
    }

    fn stdout(stdout: &str) -> Self {
        Self::replying(ProcessOutput::ok(stdout))
    }

    fn exporting() -> Self {
        Self { write_output: true, ..Self::stdout("") }
    }

    fn spawn_error() -> Self {
        Self { reply: Reply::SpawnError, write_output: false, calls: Mutex::new(Vec::new()) }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for FakeRunner {
    async fn run(&self, program: &Path, args: &[String], options: &RunOptions) -> io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(Call {
            program: program.to_path_buf(),
            args: args.to_vec(),
            options: options.clone(),
        });

        if self.write_output {
            if let Some(pos) = args.iter().position(|a| a == "-o") {
                std::fs::write(&args[pos + 1], "exported")?;
            }
        }

        match &self.reply {
            Reply::Output(output) => Ok(output.clone()),
            Reply::SpawnError => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }
}

fn client(runner: FakeRunner) -> DbeaverClient<FakeRunner> {
    DbeaverClient::with_runner(Some(PathBuf::from(EXECUTABLE)), runner, ClientOptions::default())
}

fn postgres() -> Connection {
    Connection {
        id: "conn-1".to_string(),
        name: "Test DB 1".to_string(),
        driver: "postgresql".to_string(),
        ..Connection::default()
    }
}

// ============================================================================
// Query Execution
// ============================================================================

#[tokio::test]
async fn test_execute_query_parses_columns_and_rows() {
    let client = client(FakeRunner::stdout("id,name\n1,alice\n2,[NULL]\n\nExecution time: 7 ms\n"));
    let result = client.execute_query(&postgres(), "SELECT id, name FROM users").await.unwrap();

    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(
        result.rows,
        vec![
            vec![serde_json::json!("1"), serde_json::json!("alice")],
            vec![serde_json::json!("2"), serde_json::Value::Null],
        ]
    );
    assert_eq!(result.row_count, 2);
    assert_eq!(result.execution_time_ms, 7);

    let calls = client.runner().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program, PathBuf::from(EXECUTABLE));
    assert_eq!(calls[0].args, build_query_args("conn-1", "SELECT id, name FROM users"));
}

#[tokio::test]
async fn test_execute_query_reports_affected_rows() {
    let client = client(FakeRunner::stdout("Updated Rows: 3\n"));
    let result = client.execute_query(&postgres(), "UPDATE users SET active = true").await.unwrap();

    assert!(result.columns.is_empty());
    assert_eq!(result.row_count, 3);
}

#[tokio::test]
async fn test_rows_resembling_trailer_lines_are_kept() {
    let client = client(FakeRunner::stdout("id,note\n1,2 rows affected\n7,ok\n"));
    let result = client.execute_query(&postgres(), "SELECT id, note FROM notes").await.unwrap();

    assert_eq!(
        result.rows,
        vec![
            vec![serde_json::json!("1"), serde_json::json!("2 rows affected")],
            vec![serde_json::json!("7"), serde_json::json!("ok")],
        ]
    );
    assert_eq!(result.row_count, 2);
}

#[tokio::test]
async fn test_non_zero_exit_is_a_query_error() {
    let client = client(FakeRunner::replying(ProcessOutput::failed(1, "ERROR: relation \"nope\" does not exist\n")));
    let err = client.execute_query(&postgres(), "SELECT * FROM nope").await.unwrap_err();

    assert!(matches!(err, DbeaverError::QueryExecution(_)));
    assert!(err.to_string().contains("relation \"nope\" does not exist"));
}

#[tokio::test]
async fn test_stderr_without_stdout_is_a_failure() {
    let output = ProcessOutput { stdout: String::new(), stderr: "Connection refused".to_string(), exit_code: Some(0) };
    let client = client(FakeRunner::replying(output));
    let err = client.execute_query(&postgres(), "SELECT 1").await.unwrap_err();

    assert_eq!(err.error_code(), "QUERY_FAILED");
    assert!(err.to_string().contains("Connection refused"));
}

#[tokio::test]
async fn test_stderr_noise_with_stdout_is_not_a_failure() {
    let output = ProcessOutput {
        stdout: "n\n1\n".to_string(),
        stderr: "WARNING: using default JVM options\n".to_string(),
        exit_code: Some(0),
    };
    let client = client(FakeRunner::replying(output));
    assert_eq!(client.execute_query(&postgres(), "SELECT 1 AS n").await.unwrap().row_count, 1);
}

#[tokio::test]
async fn test_malformed_output_is_an_error_not_a_truncated_result() {
    let client = client(FakeRunner::stdout("a,b\n1,2\n3\n"));
    let err = client.execute_query(&postgres(), "SELECT a, b FROM t").await.unwrap_err();
    assert!(matches!(err, DbeaverError::QueryExecution(_)));
}

#[tokio::test]
async fn test_dangerous_query_never_spawns() {
    let client = client(FakeRunner::stdout(""));
    let err = client.execute_query(&postgres(), "drop   database prod").await.unwrap_err();

    assert!(matches!(err, DbeaverError::InvalidQuery(_)));
    assert!(client.runner().calls().is_empty());
}

#[tokio::test]
async fn test_empty_query_never_spawns() {
    let client = client(FakeRunner::stdout(""));
    let err = client.execute_query(&postgres(), "   ").await.unwrap_err();

    assert_eq!(err.to_string(), "Query cannot be empty");
    assert!(client.runner().calls().is_empty());
}

#[tokio::test]
async fn test_connection_id_is_sanitized_in_arguments() {
    let connection = Connection { id: "conn-1; rm -rf /".to_string(), ..postgres() };
    let client = client(FakeRunner::stdout("n\n1\n"));
    client.execute_query(&connection, "SELECT 1 AS n").await.unwrap();

    let args = &client.runner().calls()[0].args;
    assert!(args.contains(&"id=conn-1rm-rf".to_string()));
    assert!(args.iter().all(|a| !a.contains(';') || a == "SELECT 1 AS n"));
}

#[tokio::test]
async fn test_read_only_connection_rejects_writes() {
    let connection = Connection { readonly: true, ..postgres() };
    let client = client(FakeRunner::stdout("n\n1\n"));

    let err = client.execute_query(&connection, "DELETE FROM users").await.unwrap_err();
    assert!(matches!(err, DbeaverError::InvalidQuery(_)));
    assert!(client.runner().calls().is_empty());

    assert!(client.execute_query(&connection, "SELECT 1 AS n").await.is_ok());
}

#[tokio::test]
async fn test_read_only_connection_rejects_stacked_writes() {
    let connection = Connection { readonly: true, ..postgres() };
    let client = client(FakeRunner::stdout("n\n1\n"));

    for query in ["SELECT 1; DELETE FROM users", "SELECT * INTO backup FROM users"] {
        let err = client.execute_query(&connection, query).await.unwrap_err();
        assert!(err.to_string().contains("read-only"), "{query}");
    }
    assert!(client.runner().calls().is_empty());
}

#[tokio::test]
async fn test_missing_executable() {
    let client = DbeaverClient::with_runner(None, FakeRunner::stdout(""), ClientOptions::default());
    let err = client.execute_query(&postgres(), "SELECT 1").await.unwrap_err();

    assert_eq!(err.error_code(), "EXECUTABLE_NOT_FOUND");
    assert!(client.runner().calls().is_empty());
}

#[tokio::test]
async fn test_timeout_is_passed_to_runner() {
    let options = ClientOptions { timeout: Some(Duration::from_secs(30)), ..ClientOptions::default() };
    let client = DbeaverClient::with_runner(Some(PathBuf::from(EXECUTABLE)), FakeRunner::stdout("n\n1\n"), options);
    client.execute_query(&postgres(), "SELECT 1 AS n").await.unwrap();

    assert_eq!(client.runner().calls()[0].options.timeout, Some(Duration::from_secs(30)));
}

// ============================================================================
// Connection Testing
// ============================================================================

#[tokio::test]
async fn test_connection_success_extracts_version() {
    let client = client(FakeRunner::stdout(
        "version\n\"PostgreSQL 16.1 on x86_64-pc-linux-gnu, compiled by gcc\"\n",
    ));
    let result = client.test_connection(&postgres()).await;

    assert!(result.success);
    assert_eq!(result.connection_id, "conn-1");
    assert_eq!(result.database_version.as_deref(), Some("PostgreSQL 16.1"));
    assert_eq!(result.error, None);
    assert!(client.runner().calls()[0].args.contains(&"SELECT version();".to_string()));
}

#[tokio::test]
async fn test_connection_failure_is_reported_not_raised() {
    let client = client(FakeRunner::replying(ProcessOutput::failed(2, "Authentication failed")));
    let result = client.test_connection(&postgres()).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Authentication failed"));
}

#[tokio::test]
async fn test_connection_without_executable_is_reported() {
    let client = DbeaverClient::with_runner(None, FakeRunner::stdout(""), ClientOptions::default());
    let result = client.test_connection(&postgres()).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_connection_spawn_error_is_reported() {
    let client = client(FakeRunner::spawn_error());
    let result = client.test_connection(&postgres()).await;

    assert!(!result.success);
    assert!(!result.error.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_uses_driver_specific_probe() {
    let sqlite = Connection { id: "local".to_string(), driver: "sqlite".to_string(), ..Connection::default() };
    let client = client(FakeRunner::stdout("sqlite_version()\n3.45.1\n"));
    let result = client.test_connection(&sqlite).await;

    assert_eq!(result.database_version.as_deref(), Some("3.45.1"));
    assert!(client.runner().calls()[0].args.contains(&"SELECT sqlite_version();".to_string()));
}

// ============================================================================
// Export
// ============================================================================

#[tokio::test]
async fn test_export_arguments_for_every_format() {
    let dir = tempfile::tempdir().unwrap();

    for format in ExportFormat::ALL {
        let client = client(FakeRunner::exporting());
        let target = dir.path().join(format!("out.{}", format.extension()));
        let options = ExportOptions { output_path: Some(target.clone()), ..ExportOptions::new(format) };

        let written = client.export_data(&postgres(), "SELECT * FROM users", &options).await.unwrap();
        assert_eq!(written, target);

        let args = &client.runner().calls()[0].args;
        for flag in ["-con", "-f", "-o"] {
            assert!(args.contains(&flag.to_string()), "{format}: missing {flag}");
        }
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], format.as_str());
    }
}

#[tokio::test]
async fn test_export_generates_path_in_export_dir() {
    let dir = tempfile::tempdir().unwrap();
    let options = ClientOptions { export_dir: Some(dir.path().join("exports")), ..ClientOptions::default() };
    let client = DbeaverClient::with_runner(Some(PathBuf::from(EXECUTABLE)), FakeRunner::exporting(), options);

    let path = client
        .export_data(&postgres(), "SELECT 1", &ExportOptions::new(ExportFormat::Json))
        .await
        .unwrap();

    assert!(path.starts_with(dir.path().join("exports")));
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("dbeaver-export-conn-1-"));
    assert!(file_name.ends_with(".json"));
    assert!(path.is_file());
}

#[tokio::test]
async fn test_concurrent_exports_get_distinct_paths() {
    let dir = tempfile::tempdir().unwrap();
    let options = ClientOptions { export_dir: Some(dir.path().to_path_buf()), ..ClientOptions::default() };
    let client = DbeaverClient::with_runner(Some(PathBuf::from(EXECUTABLE)), FakeRunner::exporting(), options);
    let export = ExportOptions::new(ExportFormat::Csv);

    let (conn_a, conn_b) = (postgres(), postgres());
    let (a, b) = tokio::join!(
        client.export_data(&conn_a, "SELECT 1", &export),
        client.export_data(&conn_b, "SELECT 2", &export),
    );
    assert_ne!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_export_fails_when_no_file_was_written() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(FakeRunner::stdout(""));
    let options = ExportOptions { output_path: Some(dir.path().join("never.csv")), ..ExportOptions::default() };

    let err = client.export_data(&postgres(), "SELECT 1", &options).await.unwrap_err();
    assert!(matches!(err, DbeaverError::Export(_)));
}

#[tokio::test]
async fn test_export_subprocess_failure_is_an_export_error() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(FakeRunner::replying(ProcessOutput::failed(1, "Data transfer failed")));
    let options = ExportOptions { output_path: Some(dir.path().join("out.csv")), ..ExportOptions::default() };

    let err = client.export_data(&postgres(), "SELECT 1", &options).await.unwrap_err();
    assert_eq!(err.error_code(), "EXPORT_FAILED");
    assert!(err.to_string().contains("Data transfer failed"));
}

#[tokio::test]
async fn test_export_rejects_dangerous_query_before_spawning() {
    let client = client(FakeRunner::exporting());
    let err = client
        .export_data(&postgres(), "TRUNCATE users", &ExportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, DbeaverError::InvalidQuery(_)));
    assert!(client.runner().calls().is_empty());
}

// ============================================================================
// Introspection
// ============================================================================

#[tokio::test]
async fn test_list_tables_runs_generated_sql() {
    let client = client(FakeRunner::stdout("table_schema,table_name,table_type\npublic,users,BASE TABLE\n"));
    let result = client.list_tables(&postgres(), Some("public")).await.unwrap();

    assert_eq!(result.row_count, 1);
    let sql = &client.runner().calls()[0].args[4];
    assert!(sql.contains("information_schema.tables"));
    assert!(sql.contains("'public'"));
}

#[tokio::test]
async fn test_get_table_schema_quotes_table_name() {
    let client = client(FakeRunner::stdout("column_name,data_type\nid,integer\n"));
    client.get_table_schema(&postgres(), "o'brien", None).await.unwrap();

    let sql = &client.runner().calls()[0].args[4];
    assert!(sql.contains("'o''brien'"));
}

#[tokio::test]
async fn test_introspection_accepts_keyword_named_tables() {
    let client = client(FakeRunner::stdout("column_name,data_type\nid,integer\n"));
    let result = client.get_table_schema(&postgres(), "shutdown", Some("truncate")).await.unwrap();
    assert_eq!(result.row_count, 1);

    let sql = &client.runner().calls()[0].args[4];
    assert!(sql.contains("table_name = 'shutdown'"));
    assert!(sql.contains("table_schema = 'truncate'"));
}

// ============================================================================
// Argument Rendering
// ============================================================================

#[test]
fn test_query_args_snapshot() {
    let args = build_query_args("conn-1", "SELECT version();");
    insta::assert_snapshot!(args.join(" "), @"-nosplash -con id=conn-1 -sql SELECT version(); -f csv");
}

#[test]
fn test_export_args_snapshot() {
    let options = ExportOptions {
        format: ExportFormat::Csv,
        include_headers: false,
        output_path: None,
        delimiter: Some(';'),
        encoding: Some("UTF-8".to_string()),
    };
    let args = build_export_args("conn-2", "SELECT * FROM t", Path::new("/data/out.csv"), &options);
    insta::assert_snapshot!(
        args.join(" "),
        @"-nosplash -con id=conn-2 -sql SELECT * FROM t -f csv -o /data/out.csv -header false -delimiter ; -encoding UTF-8"
    );
}
