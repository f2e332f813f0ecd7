//! Shared Validation and Formatting Primitives
//!
//! Everything here is pure and synchronous except [`find_dbeaver_executable`],
//! which only probes the filesystem.
//!
//! # Query Prefilter
//! [`validate_query`] is a syntactic guard against obviously destructive
//! statements (`DROP DATABASE`, `TRUNCATE`, ...). It is not a SQL parser and not
//! a security boundary.

use std::iter::Peekable;
use std::path::PathBuf;
use std::str::Chars;

use crate::error::{DbeaverError, Result};
use crate::types::{DriverFamily, QueryResult};

/// Environment variable naming an explicit DBeaver launcher
pub const DBEAVER_PATH_ENV: &str = "DBEAVER_PATH";

/// Keyword sequences that are never sent to DBeaver
const DANGEROUS_KEYWORDS: &[&[&str]] =
    &[&["DROP", "DATABASE"], &["DROP", "SCHEMA"], &["TRUNCATE"], &["SHUTDOWN"]];

/// First keywords of statements that cannot modify data
const READ_ONLY_LEADS: &[&str] =
    &["SELECT", "WITH", "SHOW", "EXPLAIN", "DESCRIBE", "DESC", "PRAGMA", "VALUES"];

/// Keywords that turn a CTE into a data-modifying statement
const WRITE_KEYWORDS: &[&str] =
    &["INSERT", "UPDATE", "DELETE", "MERGE", "UPSERT", "REPLACE", "CREATE", "ALTER", "DROP"];

/// Render any error (or plain string) for a user-visible `error` field
pub fn format_error<E: std::fmt::Display + ?Sized>(err: &E) -> String {
    err.to_string()
}

/// Reject empty queries and queries containing denylisted destructive keywords
///
/// Keywords inside comments, string literals and quoted identifiers are ignored.
///
/// # Returns
/// * `Ok(())` if the query may be sent to DBeaver
/// * `Err(DbeaverError::InvalidQuery)` with "Query cannot be empty" or a
///   message containing "dangerous query"
pub fn validate_query(query: &str) -> Result<()> {
    let views = Escapes::ALL.map(|escapes| split_statements(query, escapes));
    if views.iter().all(Vec::is_empty) {
        return Err(DbeaverError::invalid_query("Query cannot be empty"));
    }

    for statement in views.iter().flatten() {
        for pattern in DANGEROUS_KEYWORDS {
            if contains_sequence(statement, pattern) {
                return Err(DbeaverError::invalid_query(format!(
                    "Potentially dangerous query detected: {} operations are not allowed",
                    pattern.join(" ")
                )));
            }
        }
    }

    Ok(())
}

/// Check whether every statement in a query only reads data
///
/// Used to guard connections flagged read-only in the workspace. The query is
/// lexed with and without backslash escapes in literals and must read only
/// under both.
#[must_use]
pub fn is_read_only_query(query: &str) -> bool {
    Escapes::ALL.into_iter().all(|escapes| {
        let statements = split_statements(query, escapes);
        !statements.is_empty() && statements.iter().all(|tokens| is_read_statement(tokens))
    })
}

fn is_read_statement(tokens: &[String]) -> bool {
    let Some(first) = tokens.first() else {
        return false;
    };

    if !READ_ONLY_LEADS.contains(&first.as_str()) {
        return false;
    }

    // SELECT ... INTO creates a table or writes a file
    if tokens.iter().any(|t| t == "INTO") {
        return false;
    }

    // Postgres allows INSERT/UPDATE/DELETE inside WITH; EXPLAIN ANALYZE runs its statement
    if matches!(first.as_str(), "WITH" | "EXPLAIN") {
        return !tokens.iter().any(|t| WRITE_KEYWORDS.contains(&t.as_str()));
    }

    true
}

/// Strip everything except ASCII alphanumerics, `-`, `_` and `.`
///
/// The result is safe to splice into a DBeaver argument without quoting.
pub fn sanitize_connection_id(id: &str) -> Result<String> {
    if id.is_empty() {
        return Err(DbeaverError::invalid_input("Connection ID cannot be empty"));
    }

    let sanitized: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    if sanitized.is_empty() {
        return Err(DbeaverError::invalid_input(format!(
            "Connection ID '{id}' contains no usable characters"
        )));
    }

    Ok(sanitized)
}

/// Minimal probe query for a driver identifier
#[must_use]
pub fn get_test_query(driver: &str) -> &'static str {
    match DriverFamily::from_driver(driver) {
        DriverFamily::Postgres | DriverFamily::MySql => "SELECT version();",
        DriverFamily::Sqlite => "SELECT sqlite_version();",
        DriverFamily::SqlServer => "SELECT @@VERSION;",
        DriverFamily::Oracle => "SELECT banner FROM v$version",
        DriverFamily::Other => "SELECT 1;",
    }
}

/// Pull a version string out of a probe result (first row, first column)
///
/// `PostgreSQL 16.1 on x86_64-pc-linux-gnu, ...` is shortened to `PostgreSQL 16.1`;
/// SQL Server's multi-line banner is cut to its first line.
#[must_use]
pub fn extract_version(result: &QueryResult, family: DriverFamily) -> Option<String> {
    let cell = result.rows.first()?.first()?;
    let raw = match cell {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => return None,
        other => other.to_string(),
    };

    let version = match family {
        DriverFamily::Postgres => raw.split(" on ").next().unwrap_or(&raw).to_string(),
        DriverFamily::SqlServer => raw.lines().next().unwrap_or(&raw).to_string(),
        _ => raw.clone(),
    };

    let version = version.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Quote a value as a SQL string literal
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Driver-specific query listing tables (and views) of a schema
#[must_use]
pub fn build_list_tables_query(family: DriverFamily, schema: Option<&str>) -> String {
    let schema = schema.map(str::trim).filter(|s| !s.is_empty());

    match family {
        DriverFamily::Postgres => {
            let filter = schema.map_or_else(
                || "table_schema NOT IN ('pg_catalog', 'information_schema')".to_string(),
                |s| format!("table_schema = {}", quote_literal(s)),
            );
            format!(
                "SELECT table_schema, table_name, table_type FROM information_schema.tables \
                 WHERE {filter} ORDER BY table_schema, table_name;"
            )
        }
        DriverFamily::MySql => {
            let target = schema.map_or_else(|| "DATABASE()".to_string(), quote_literal);
            format!(
                "SELECT table_schema, table_name, table_type FROM information_schema.tables \
                 WHERE table_schema = {target} ORDER BY table_name;"
            )
        }
        DriverFamily::Sqlite => "SELECT name AS table_name, type AS table_type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name;"
            .to_string(),
        DriverFamily::SqlServer => {
            let filter = schema
                .map(|s| format!(" WHERE TABLE_SCHEMA = {}", quote_literal(s)))
                .unwrap_or_default();
            format!(
                "SELECT TABLE_SCHEMA AS table_schema, TABLE_NAME AS table_name, \
                 TABLE_TYPE AS table_type FROM INFORMATION_SCHEMA.TABLES{filter} \
                 ORDER BY TABLE_SCHEMA, TABLE_NAME;"
            )
        }
        DriverFamily::Oracle => {
            let owner = schema.map_or_else(|| "USER".to_string(), quote_literal);
            format!(
                "SELECT owner AS table_schema, table_name FROM all_tables \
                 WHERE owner = {owner} ORDER BY table_name"
            )
        }
        DriverFamily::Other => {
            let filter = schema
                .map(|s| format!(" WHERE table_schema = {}", quote_literal(s)))
                .unwrap_or_default();
            format!(
                "SELECT table_schema, table_name, table_type FROM information_schema.tables\
                 {filter} ORDER BY table_name;"
            )
        }
    }
}

/// Driver-specific query describing the columns of one table
pub fn build_table_schema_query(
    family: DriverFamily,
    table: &str,
    schema: Option<&str>,
) -> Result<String> {
    let table = table.trim();
    if table.is_empty() {
        return Err(DbeaverError::invalid_input("Table name cannot be empty"));
    }
    let schema = schema.map(str::trim).filter(|s| !s.is_empty());
    let table_lit = quote_literal(table);

    let query = match family {
        DriverFamily::Sqlite => format!(
            "SELECT name AS column_name, type AS data_type, \
             CASE WHEN \"notnull\" = 0 THEN 'YES' ELSE 'NO' END AS is_nullable, \
             dflt_value AS column_default FROM pragma_table_info({table_lit}) ORDER BY cid;"
        ),
        DriverFamily::Oracle => {
            let owner = schema.map_or_else(|| "USER".to_string(), quote_literal);
            format!(
                "SELECT column_name, data_type, nullable AS is_nullable, \
                 data_default AS column_default FROM all_tab_columns \
                 WHERE table_name = {table_lit} AND owner = {owner} ORDER BY column_id"
            )
        }
        DriverFamily::SqlServer => {
            let filter = schema
                .map(|s| format!(" AND TABLE_SCHEMA = {}", quote_literal(s)))
                .unwrap_or_default();
            format!(
                "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
                 IS_NULLABLE AS is_nullable, COLUMN_DEFAULT AS column_default \
                 FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = {table_lit}{filter} \
                 ORDER BY ORDINAL_POSITION;"
            )
        }
        DriverFamily::MySql => {
            let target = schema.map_or_else(|| "DATABASE()".to_string(), quote_literal);
            format!(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns WHERE table_name = {table_lit} \
                 AND table_schema = {target} ORDER BY ordinal_position;"
            )
        }
        DriverFamily::Postgres | DriverFamily::Other => {
            let filter = schema
                .map(|s| format!(" AND table_schema = {}", quote_literal(s)))
                .unwrap_or_default();
            format!(
                "SELECT column_name, data_type, is_nullable, column_default \
                 FROM information_schema.columns WHERE table_name = {table_lit}{filter} \
                 ORDER BY ordinal_position;"
            )
        }
    };

    Ok(query)
}

/// Locate the DBeaver launcher
///
/// Lookup order:
/// 1. `DBEAVER_PATH` environment variable
/// 2. `dbeaver-cli` / `dbeaver` on `PATH`
/// 3. Well-known install locations for the current platform
#[must_use]
pub fn find_dbeaver_executable() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(DBEAVER_PATH_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
        tracing::warn!(path = %path.display(), "{DBEAVER_PATH_ENV} does not point to a file");
    }

    for name in ["dbeaver-cli", "dbeaver"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    well_known_locations().into_iter().find(|p| p.is_file())
}

fn well_known_locations() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if cfg!(target_os = "windows") {
        for root in ["C:\\Program Files\\DBeaver", "C:\\Program Files (x86)\\DBeaver"] {
            candidates.push(PathBuf::from(root).join("dbeaver-cli.exe"));
            candidates.push(PathBuf::from(root).join("dbeaver.exe"));
        }
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("DBeaver").join("dbeaver-cli.exe"));
        }
    } else if cfg!(target_os = "macos") {
        candidates.push(PathBuf::from("/Applications/DBeaver.app/Contents/MacOS/dbeaver"));
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("Applications/DBeaver.app/Contents/MacOS/dbeaver"));
        }
    } else {
        candidates.extend(
            [
                "/usr/bin/dbeaver",
                "/usr/local/bin/dbeaver",
                "/usr/share/dbeaver-ce/dbeaver",
                "/opt/dbeaver/dbeaver",
                "/snap/bin/dbeaver-ce",
                "/var/lib/flatpak/exports/bin/io.dbeaver.DBeaverCommunity",
            ]
            .map(PathBuf::from),
        );
    }

    candidates
}

/// How backslashes inside quoted text are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escapes {
    /// `''` is the only escape (ANSI, Postgres)
    Standard,
    /// `\'` escapes too (MySQL default)
    Backslash,
}

impl Escapes {
    const ALL: [Self; 2] = [Self::Standard, Self::Backslash];
}

/// Token standing in for a string literal or quoted identifier
const QUOTED_TOKEN: &str = "''";

/// Split SQL into statements of upper-cased words
///
/// Comments produce nothing. String literals, quoted identifiers and
/// dollar-quoted bodies each become one [`QUOTED_TOKEN`]. A `;` outside them
/// ends a statement; empty statements are dropped.
fn split_statements(sql: &str, escapes: Escapes) -> Vec<Vec<String>> {
    let mut statements = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        // `$` continues an identifier (Oracle `v$version`)
        if ch.is_alphanumeric() || ch == '_' || (ch == '$' && !word.is_empty()) {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            current.push(std::mem::take(&mut word).to_uppercase());
        }

        match ch {
            '-' if chars.peek() == Some(&'-') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            '\'' | '"' => {
                skip_quoted(&mut chars, ch, escapes);
                current.push(QUOTED_TOKEN.to_string());
            }
            '`' => {
                skip_quoted(&mut chars, ch, Escapes::Standard);
                current.push(QUOTED_TOKEN.to_string());
            }
            '$' => {
                if skip_dollar_quoted(&mut chars) {
                    current.push(QUOTED_TOKEN.to_string());
                }
            }
            ';' => {
                if !current.is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            _ => {}
        }
    }

    if !word.is_empty() {
        current.push(word.to_uppercase());
    }
    if !current.is_empty() {
        statements.push(current);
    }
    statements
}

/// Consume up to and including the closing `quote`; a doubled quote is literal
fn skip_quoted(chars: &mut Peekable<Chars<'_>>, quote: char, escapes: Escapes) {
    while let Some(c) = chars.next() {
        if c == '\\' && escapes == Escapes::Backslash {
            chars.next();
        } else if c == quote {
            if chars.peek() == Some(&quote) {
                chars.next();
            } else {
                return;
            }
        }
    }
}

/// Consume a Postgres `$tag$ ... $tag$` body if one starts here
///
/// Returns false, consuming nothing, when the `$` opens no tag (`$1`).
fn skip_dollar_quoted(chars: &mut Peekable<Chars<'_>>) -> bool {
    let mut look = chars.clone();
    let mut tag = String::from("$");
    while let Some(&c) = look.peek() {
        if c.is_alphanumeric() || c == '_' {
            tag.push(c);
            look.next();
        } else {
            break;
        }
    }
    if tag[1..].starts_with(|c: char| c.is_ascii_digit()) || look.next() != Some('$') {
        return false;
    }
    tag.push('$');
    *chars = look;

    let mut body = String::new();
    for c in chars.by_ref() {
        body.push(c);
        if body.ends_with(&tag) {
            break;
        }
    }
    true
}

fn contains_sequence(tokens: &[String], pattern: &[&str]) -> bool {
    tokens
        .windows(pattern.len())
        .any(|window| window.iter().zip(pattern).all(|(token, keyword)| token == keyword))
}
