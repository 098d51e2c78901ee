//! # Fieldmap - CSV column to target field mapping
//!
//! Fieldmap loads a delimited file, binds a fixed list of target fields to
//! its columns, calculates the output table (applying per-field extraction
//! rules such as road code splitting or JSON field lookup) and exports it as
//! a semicolon CSV or a relational table.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Calculate  │────▶│   Export    │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (mapping)  │     │ (CSV / DB)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldmap::{CancelToken, NoProgress, Session};
//!
//! let mut session = Session::default();
//! session.load_file("survey.csv".as_ref())?;
//! session.auto_map_by_rules()?;
//! let table = session.calculate(&NoProgress, &CancelToken::new())?;
//! println!("Calculated {} fields", table.field_count());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Source table, target fields, calculated table
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Extraction rules, mapping and calculation engine
//! - [`export`] - Delimited and relational export
//! - [`session`] - Orchestration of one mapping session
//! - [`config`] - Environment configuration
//! - [`cache`] - Saved mapping profiles
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Export
pub mod export;

// Orchestration
pub mod session;

// Caching
pub mod cache;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CalculationError, ConfigError, CsvError, DecodeError, ExportError, InputError, RegistryError,
    ServerError, SessionError, SessionResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CalculatedColumn, CalculatedTable, MappingSummary, SourceTable, TargetFieldSet,
    DEFAULT_TARGET_FIELDS,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_str, ParseResult,
};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    calculate, extract, extract_or_empty, rules_description, AutoMapRule, AutoMapRules,
    CalcOptions, CancelToken, ExtractionRule, LogProgress, MappingTable, NoProgress,
    ProgressSink, RuleExtractor, RuleTable, ValueExtractor,
};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{
    default_writer, export_delimited, export_relational, export_with_fallback, DelimitedOptions,
    ExportSummary, RelationalWriter, DEFAULT_TABLE_NAME,
};

// =============================================================================
// Re-exports - Session, Config, Registry
// =============================================================================

pub use cache::{ProfileRegistry, StoredProfile};
pub use config::AppConfig;
pub use session::{AutoMapMode, CsvInfo, Session};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, CalculateResponse, CsvMetadata, FieldsResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
