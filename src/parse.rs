//! Decoding of uploaded bytes into a header list and row records.
//!
//! CSV and `.txt` uploads are read with the `csv` crate; `.json` uploads must
//! be a single object or an array of objects sharing one key set. Cells that
//! are empty, JSON `null`, or one of the [`NULL_MARKERS`](crate::data::NULL_MARKERS)
//! (CSV only) are stored as missing.

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde_json::{Map, Value as JsonValue};

use crate::{
    config::SecurityLimits,
    data::cell_from_raw,
    error::ParseError,
    io_utils::{self, DEFAULT_CSV_DELIMITER},
};

const LONG_VALUE_THRESHOLD: usize = 1000;

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    headers: Vec<String>,
    rows: Vec<Row>,
    warnings: Vec<String>,
}

impl ParsedTable {
    /// Builds a table, padding short rows with missing cells.
    pub fn new(headers: Vec<String>, rows: Vec<Row>) -> Result<Self, ParseError> {
        ensure_unique_headers(&headers)?;
        let width = headers.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(ParseError::MalformedCsv {
                    line: idx as u64 + 2,
                    message: format!("Expected {width} fields, saw {}", row.len()),
                });
            }
            row.resize(width, None);
            padded.push(row);
        }
        Ok(Self {
            headers,
            rows: padded,
            warnings: Vec::new(),
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.headers.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(idx).and_then(|cell| cell.as_deref()))
    }

    /// A single row keyed by header.
    pub fn record(&self, row: usize) -> Option<BTreeMap<&str, Option<&str>>> {
        let values = self.rows.get(row)?;
        Some(
            self.headers
                .iter()
                .map(String::as_str)
                .zip(values.iter().map(|v| v.as_deref()))
                .collect(),
        )
    }

    /// Replaces the header list, keeping rows untouched.
    pub fn with_headers(mut self, headers: Vec<String>) -> Result<Self, ParseError> {
        if headers.len() != self.headers.len() {
            return Err(ParseError::MalformedCsv {
                line: 1,
                message: format!(
                    "Expected {} headers, got {}",
                    self.headers.len(),
                    headers.len()
                ),
            });
        }
        ensure_unique_headers(&headers)?;
        self.headers = headers;
        Ok(self)
    }

    fn collect_warnings(&mut self) {
        let mut warnings = Vec::new();
        let empty_columns = (0..self.column_count())
            .filter(|idx| self.column_values(*idx).all(|v| v.is_none()))
            .map(|idx| self.headers[idx].clone())
            .collect::<Vec<_>>();
        if !empty_columns.is_empty() {
            warnings.push(format!("Empty columns detected: {}", empty_columns.join(", ")));
        }
        for (idx, header) in self.headers.iter().enumerate() {
            let max_len = self
                .column_values(idx)
                .flatten()
                .map(|v| v.chars().count())
                .max()
                .unwrap_or(0);
            if max_len > LONG_VALUE_THRESHOLD {
                warnings.push(format!(
                    "Column '{header}' has very long values (max: {max_len} chars)"
                ));
            }
            if self.column_values(idx).flatten().any(|v| !v.is_ascii()) {
                warnings.push(format!("Column '{header}' contains non-ASCII characters"));
            }
        }
        self.warnings = warnings;
    }
}

fn ensure_unique_headers(headers: &[String]) -> Result<(), ParseError> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for header in headers {
        if !seen.insert(header.as_str()) && !duplicates.contains(header) {
            duplicates.push(header.clone());
        }
    }
    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(ParseError::DuplicateHeaders(duplicates))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    pub fn from_filename(filename: &str) -> Self {
        if io_utils::is_json_filename(filename) {
            TableFormat::Json
        } else {
            TableFormat::Csv
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableParser {
    max_columns: usize,
    max_rows: usize,
    /// When set, parsing stops after this many rows instead of failing.
    preview_rows: Option<usize>,
}

impl TableParser {
    pub fn new(limits: &SecurityLimits) -> Self {
        Self {
            max_columns: limits.max_columns,
            max_rows: limits.max_rows,
            preview_rows: None,
        }
    }

    pub fn preview(limits: &SecurityLimits) -> Self {
        Self {
            preview_rows: Some(limits.preview_rows),
            ..Self::new(limits)
        }
    }

    pub fn parse(&self, bytes: &[u8], filename: &str) -> Result<ParsedTable, ParseError> {
        self.parse_as(bytes, TableFormat::from_filename(filename))
    }

    pub fn parse_as(&self, bytes: &[u8], format: TableFormat) -> Result<ParsedTable, ParseError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::Empty);
        }
        let (text, encoding) = io_utils::decode_with_fallback(bytes)?;
        debug!("Decoded {} byte(s) as {}", bytes.len(), encoding.name());
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }
        let mut table = match format {
            TableFormat::Csv => self.parse_csv(&text)?,
            TableFormat::Json => self.parse_json(&text)?,
        };
        if table.rows.is_empty() {
            return Err(ParseError::NoRows);
        }
        table.collect_warnings();
        Ok(table)
    }

    fn check_columns(&self, count: usize) -> Result<(), ParseError> {
        if count == 0 {
            return Err(ParseError::NoColumns);
        }
        if count > self.max_columns {
            return Err(ParseError::TooManyColumns {
                count,
                max: self.max_columns,
            });
        }
        Ok(())
    }

    /// Returns `true` once the row budget is spent.
    fn row_budget_spent(&self, rows_read: usize) -> Result<bool, ParseError> {
        if let Some(limit) = self.preview_rows {
            return Ok(rows_read >= limit);
        }
        if rows_read >= self.max_rows {
            return Err(ParseError::TooManyRows { max: self.max_rows });
        }
        Ok(false)
    }

    fn parse_csv(&self, text: &str) -> Result<ParsedTable, ParseError> {
        let mut reader = io_utils::open_csv_reader(text.as_bytes(), DEFAULT_CSV_DELIMITER);
        let header_record = reader.headers().map_err(csv_error)?.clone();
        let headers = header_record
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let trimmed = name.trim();
                if trimmed.is_empty() {
                    format!("Unnamed: {idx}")
                } else {
                    trimmed.to_string()
                }
            })
            .collect::<Vec<_>>();
        self.check_columns(headers.len())?;
        ensure_unique_headers(&headers)?;

        let width = headers.len();
        let mut rows = Vec::new();
        for result in reader.records() {
            if self.row_budget_spent(rows.len())? {
                break;
            }
            let record = result.map_err(csv_error)?;
            if record.len() > width {
                return Err(ParseError::MalformedCsv {
                    line: record.position().map_or(rows.len() as u64 + 2, |p| p.line()),
                    message: format!("Expected {width} fields, saw {}", record.len()),
                });
            }
            let mut row = record.iter().map(cell_from_raw).collect::<Row>();
            row.resize(width, None);
            rows.push(row);
        }

        Ok(ParsedTable {
            headers,
            rows,
            warnings: Vec::new(),
        })
    }

    fn parse_json(&self, text: &str) -> Result<ParsedTable, ParseError> {
        let parsed: JsonValue =
            serde_json::from_str(text).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
        let records = match parsed {
            JsonValue::Object(object) => vec![object],
            JsonValue::Array(items) => {
                if items.is_empty() {
                    return Err(ParseError::EmptyJsonArray);
                }
                items
                    .into_iter()
                    .enumerate()
                    .map(|(idx, item)| match item {
                        JsonValue::Object(object) => Ok(object),
                        _ => Err(ParseError::NonObjectRecord { row: idx + 1 }),
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            _ => return Err(ParseError::NotTabularJson),
        };

        let headers = records[0].keys().cloned().collect::<Vec<_>>();
        self.check_columns(headers.len())?;
        let expected = headers.iter().map(String::as_str).collect::<HashSet<_>>();

        let mut rows = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let keys = record.keys().map(String::as_str).collect::<HashSet<_>>();
            if keys != expected {
                return Err(ParseError::InconsistentSchema { row: idx + 1 });
            }
            // Every record's key set is checked, even past the preview budget.
            if self.row_budget_spent(rows.len())? {
                continue;
            }
            rows.push(json_row(&headers, record));
        }

        Ok(ParsedTable {
            headers,
            rows,
            warnings: Vec::new(),
        })
    }
}

fn json_row(headers: &[String], record: &Map<String, JsonValue>) -> Row {
    headers
        .iter()
        .map(|header| match record.get(header) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(JsonValue::Bool(b)) => Some(b.to_string()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            Some(nested) => Some(nested.to_string()),
        })
        .collect()
}

fn csv_error(err: csv::Error) -> ParseError {
    let line = err.position().map_or(0, |p| p.line());
    let message = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("Expected {expected_len} fields, saw {len}"),
        _ => err.to_string(),
    };
    ParseError::MalformedCsv { line, message }
}
