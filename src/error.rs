//! Error taxonomy for the ingestion core.

use log::error;
use thiserror::Error;
use uuid::Uuid;

use crate::io_utils::format_bytes;

/// Fatal upload rejections raised by the security screen.
#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("File too large: {size} bytes ({}); max {max} bytes ({})", format_bytes(*.size), format_bytes(*.max))]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file extension for '{filename}'. Allowed: {}", .allowed.join(", "))]
    DisallowedExtension {
        filename: String,
        allowed: Vec<String>,
    },

    #[error(transparent)]
    Structure(#[from] ParseError),

    #[error("Malicious content detected: {}", .threats.join("; "))]
    MaliciousContent { threats: Vec<String> },

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl SecurityError {
    /// Individual messages, one per finding.
    pub fn messages(&self) -> Vec<String> {
        match self {
            SecurityError::MaliciousContent { threats } => threats.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Failures decoding bytes into a table.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("File is empty")]
    Empty,

    #[error("File contains no columns")]
    NoColumns,

    #[error("File contains no data rows")]
    NoRows,

    #[error("File has too many rows (max {max})")]
    TooManyRows { max: usize },

    #[error("File has too many columns: {count} (max {max})")]
    TooManyColumns { count: usize, max: usize },

    #[error("Could not decode file with any supported encoding (tried {})", .tried.join(", "))]
    Undecodable { tried: Vec<String> },

    #[error("CSV parsing error at line {line}: {message}")]
    MalformedCsv { line: u64, message: String },

    #[error("Invalid JSON format: {0}")]
    MalformedJson(String),

    #[error("JSON must contain an array of objects or a single object")]
    NotTabularJson,

    #[error("JSON array is empty")]
    EmptyJsonArray,

    #[error("JSON array contains a non-object element at row {row}")]
    NonObjectRecord { row: usize },

    #[error("Inconsistent schema at row {row}")]
    InconsistentSchema { row: usize },

    #[error("Duplicate column headers: {}", .0.join(", "))]
    DuplicateHeaders(Vec<String>),
}

/// A raw mapping that is not a string-to-string object.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingTypeError {
    #[error("Mapping must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Mapping value for '{header}' must be a string, got {found}")]
    NonStringValue { header: String, found: &'static str },

    #[error("Mapping keys cannot be empty or whitespace-only")]
    BlankHeader,

    #[error("Mapping value for '{0}' cannot be empty or whitespace-only")]
    BlankValue(String),
}

/// Unexpected failure surfaced to callers only through an opaque id.
#[derive(Debug, Error)]
#[error("Processing failed (Error ID: {correlation_id})")]
pub struct ProcessingError {
    pub correlation_id: String,
}

impl ProcessingError {
    /// Logs the full error chain and returns the opaque handle.
    pub fn wrap(context: &str, err: &anyhow::Error) -> Self {
        let correlation_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        error!("{context} failed (ID: {correlation_id}): {err:#}");
        Self { correlation_id }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    MappingType(#[from] MappingTypeError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}
