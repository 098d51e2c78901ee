//! Error types for the field mapping pipeline.
//!
//! One enum per layer:
//!
//! - [`CsvError`] - reading and decoding the input file
//! - [`DecodeError`] - structured value decoding inside the extractor
//! - [`InputError`] - user-correctable preconditions
//! - [`CalculationError`] - calculation outcome (input problem or cancellation)
//! - [`ExportError`] - delimited / relational export
//! - [`RegistryError`] - saved mapping profiles
//! - [`ConfigError`] - configuration files and environment
//! - [`SessionError`] - top-level orchestration errors
//!
//! Conversion is automatic via `From` implementations, so `?` works across
//! layer boundaries.

use thiserror::Error;

// =============================================================================
// CSV Reading Errors
// =============================================================================

/// Errors while reading a CSV file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// No decoder of the fallback chain produced text.
    #[error("Could not decode file: {0}")]
    EncodingError(String),

    /// Malformed CSV content.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// Failure to decode a structured cell value.
///
/// Only the extractor produces this, and the calculation engine collapses
/// it to an empty string.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Cell is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A path segment exists but does not hold an object.
    #[error("Expected an object at '{segment}'")]
    UnexpectedShape { segment: String },
}

// =============================================================================
// Input Errors
// =============================================================================

/// User-correctable preconditions. Raising one never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("No mappings defined, map some fields first")]
    EmptyMapping,

    #[error("No CSV data loaded")]
    EmptySource,

    #[error("At least one target field is required")]
    EmptyFieldList,

    #[error("Duplicate target field: {0}")]
    DuplicateField(String),

    #[error("Unknown target field: {0}")]
    UnknownField(String),

    #[error("Unknown source column: {0}")]
    UnknownColumn(String),

    #[error("Run the calculation before exporting")]
    NotCalculated,
}

// =============================================================================
// Calculation Errors
// =============================================================================

/// Outcome of a calculation run that did not produce a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalculationError {
    #[error(transparent)]
    Input(#[from] InputError),

    /// Cancelled by the user. Previous results are left untouched.
    #[error("Calculation cancelled")]
    Cancelled,
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors during export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The relational driver is missing. Delimited export still works.
    #[error("Relational driver not available: {0}")]
    DriverUnavailable(String),

    /// The relational driver failed (connection, SQL).
    #[error("Relational driver error: {0}")]
    Driver(String),

    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Every column of the table is empty.
    #[error("No data to export")]
    NoData,
}

impl ExportError {
    /// Whether falling back to a delimited export is a sensible offer.
    pub fn suggests_delimited_fallback(&self) -> bool {
        matches!(self, ExportError::DriverUnavailable(_))
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the mapping profile registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Registry IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Registry JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Input(#[from] InputError),
}

// =============================================================================
// Session Errors (top-level)
// =============================================================================

/// Top-level errors returned by [`crate::session::Session`] and the binaries.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    #[error("{0}")]
    Input(#[from] InputError),

    #[error("{0}")]
    Calculation(#[from] CalculationError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type CsvResult<T> = Result<T, CsvError>;

pub type ExportResult<T> = Result<T, ExportError>;

pub type RegistryResult<T> = Result<T, RegistryError>;

pub type ConfigResult<T> = Result<T, ConfigError>;

pub type SessionResult<T> = Result<T, SessionError>;

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let csv_err = CsvError::EmptyFile;
        let session_err: SessionError = csv_err.into();
        assert!(session_err.to_string().contains("empty"));

        let calc_err: CalculationError = InputError::EmptyMapping.into();
        let session_err: SessionError = calc_err.into();
        assert!(session_err.to_string().contains("No mappings"));
    }

    #[test]
    fn test_only_missing_driver_suggests_fallback() {
        assert!(ExportError::DriverUnavailable("odbc".into()).suggests_delimited_fallback());
        assert!(!ExportError::Driver("locked".into()).suggests_delimited_fallback());
        assert!(!ExportError::NoData.suggests_delimited_fallback());
    }

    #[test]
    fn test_cancelled_is_distinct_from_input() {
        let err = CalculationError::Cancelled;
        assert_ne!(err, CalculationError::Input(InputError::EmptySource));
        assert_eq!(err.to_string(), "Calculation cancelled");
    }
}
