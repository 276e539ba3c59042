//! Error types shared across the crate.
//!
//! Ingestion, analytics and storage each have their own enum so callers can
//! tell "bad file" apart from "need more data" apart from "the disk failed".

use thiserror::Error;

/// Failures while turning an uploaded file into subject rows.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    /// The input had no header or no content at all.
    #[error("Input is empty")]
    Empty,

    /// A required column is missing from the header.
    #[error("Input must contain a '{0}' column")]
    MissingColumn(String),

    /// The text was readable but no line looked like a result row.
    #[error("No subject rows could be extracted")]
    NoRowsExtracted,

    /// A document contained no extractable text (e.g. a scanned image).
    #[error("Could not extract text from document")]
    EmptyDocument,

    /// File extension is not one of csv, xlsx, xls or pdf.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The underlying reader rejected the bytes.
    #[error("Malformed input: {0}")]
    Malformed(String),
}

/// Failures of the predictive and exploratory analyses.
#[derive(Debug, Error, PartialEq)]
pub enum AnalyticsError {
    /// Preconditions on the amount of data are not met.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The request itself is malformed (e.g. too few feature columns).
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AnalyticsError {
    pub fn insufficient(msg: impl Into<String>) -> Self {
        AnalyticsError::InsufficientData(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AnalyticsError::InvalidInput(msg.into())
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the result store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive encoding error: {0}")]
    Archive(#[from] bincode::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        StoreError::InvalidData(msg.into())
    }

    pub fn lock_poisoned(msg: impl Into<String>) -> Self {
        StoreError::LockPoisoned(msg.into())
    }
}

/// Errors while rendering a report document.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Unknown report kind: {0}")]
    UnknownKind(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sign-up and login failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("All fields are required")]
    MissingField,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors while drawing a chart.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Unknown chart: {0}")]
    UnknownKind(String),

    /// The chart depends on an analysis whose preconditions are not met.
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error("Drawing error: {0}")]
    Drawing(String),
}

/// Errors while reading configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown store backend '{0}' (expected json, archive, sqlite or memory)")]
    UnknownBackend(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
