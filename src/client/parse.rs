//! DBeaver stdout parsing
//!
//! Query mode prints CSV: a header record, one record per row, and optionally
//! informational trailer lines such as `Execution time: 12 ms` or
//! `Updated Rows: 3`. Quoted fields may span lines.

use serde_json::Value;

/// Cell text DBeaver prints for SQL NULL
const NULL_MARKER: &str = "[NULL]";

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ParsedOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected_rows: Option<u64>,
    pub execution_ms: Option<u64>,
}

enum InfoLine {
    ExecutionTime(u64),
    AffectedRows(u64),
}

/// Where the parser is in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// No header yet
    Preamble,
    /// Header read; records are rows
    Rows,
    /// A blank line or an unfittable trailer ended the rows
    Trailer,
}

/// Parse captured stdout into columns and rows
///
/// Trailer lines are only recognised before the header, after a blank line
/// that ends the rows, or where the record's width cannot match the header.
/// A record that fits the header is always a row; any other record is an
/// error, so results are never truncated.
pub(crate) fn parse_query_output(stdout: &str) -> Result<ParsedOutput, String> {
    let mut parsed = ParsedOutput::default();
    let mut section = Section::Preamble;

    for record in split_records(stdout) {
        if record.trim().is_empty() {
            if section == Section::Rows {
                section = Section::Trailer;
            }
            continue;
        }

        if section != Section::Rows {
            if let Some(info) = info_line(&record) {
                parsed.apply(info);
                continue;
            }
        }

        let fields = parse_csv_record(&record);
        if section == Section::Preamble {
            parsed.columns = fields;
            section = Section::Rows;
            continue;
        }

        if fields.len() == parsed.columns.len() {
            parsed.rows.push(fields.into_iter().map(cell_value).collect());
            section = Section::Rows;
            continue;
        }

        if let Some(info) = info_line(&record) {
            parsed.apply(info);
            section = Section::Trailer;
            continue;
        }

        return Err(format!(
            "malformed result row {}: expected {} values, found {}",
            parsed.rows.len() + 1,
            parsed.columns.len(),
            fields.len()
        ));
    }

    Ok(parsed)
}

impl ParsedOutput {
    fn apply(&mut self, info: InfoLine) {
        match info {
            InfoLine::ExecutionTime(ms) => self.execution_ms = Some(ms),
            InfoLine::AffectedRows(count) => self.affected_rows = Some(count),
        }
    }
}

fn cell_value(text: String) -> Value {
    if text == NULL_MARKER {
        Value::Null
    } else {
        Value::String(text)
    }
}

/// Informational line; quoted records are always data
fn info_line(record: &str) -> Option<InfoLine> {
    let line = record.trim();
    if line.contains('"') {
        return None;
    }
    let lower = line.to_ascii_lowercase();

    if let Some(rest) = lower.strip_prefix("execution time:") {
        return leading_number(rest).map(InfoLine::ExecutionTime);
    }
    if let Some(rest) = lower.strip_prefix("updated rows:") {
        return leading_number(rest).map(InfoLine::AffectedRows);
    }
    if lower.ends_with(" row affected") || lower.ends_with(" rows affected") {
        return leading_number(&lower).map(InfoLine::AffectedRows);
    }
    None
}

fn leading_number(text: &str) -> Option<u64> {
    let digits: String = text.trim_start().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Split on line breaks that are not inside a quoted field
fn split_records(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\n' if !in_quotes => {
                records.push(std::mem::take(&mut current).trim_end_matches('\r').to_string());
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        records.push(current.trim_end_matches('\r').to_string());
    }

    records
}

/// Split one CSV record, honouring `""` escapes inside quoted fields
fn parse_csv_record(record: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = record.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(c);
            }
        } else if c == '"' {
            in_quotes = true;
        } else if c == ',' {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    fields.push(current);
    fields
}
