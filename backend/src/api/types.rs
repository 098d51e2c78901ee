//! REST API types for frontend integration.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{CalculatedTable, MappingSummary, TargetFieldSet};
use crate::session::{CsvInfo, Session};
use crate::transform::mapping::{AutoMapRules, MappingTable};
use crate::transform::rules::RuleTable;

/// Response sent after a calculation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// One column per mapped field, in mapping order
    pub table: CalculatedTable,

    pub metadata: ResponseMetadata,
}

/// Metadata about the calculation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub field_count: usize,
    pub row_count: usize,
    /// Mapping the table was calculated from
    pub mapping: MappingTable,
    pub summary: MappingSummary,
    pub csv_info: CsvMetadata,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<CsvInfo> for CsvMetadata {
    fn from(info: CsvInfo) -> Self {
        Self {
            encoding: info.encoding,
            delimiter: info.delimiter.to_string(),
            row_count: info.row_count,
            columns: info.headers,
        }
    }
}

impl CalculateResponse {
    /// Build the response from a session holding a calculated table.
    ///
    /// Status is "warning" when some target fields remain unmapped.
    pub fn from_session(session: &Session, csv_info: CsvInfo) -> Option<Self> {
        let table = session.calculated()?.clone();
        let summary = session.summary();

        Some(Self {
            job_id: Uuid::new_v4().to_string(),
            status: if summary.remaining == 0 { "ready" } else { "warning" }.to_string(),
            metadata: ResponseMetadata {
                field_count: table.field_count(),
                row_count: table.row_count(),
                mapping: session.mapping().clone(),
                summary,
                csv_info: csv_info.into(),
            },
            table,
        })
    }
}

/// Default configuration exposed to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsResponse {
    pub fields: TargetFieldSet,
    pub auto_map_rules: AutoMapRules,
    pub extraction_rules: RuleTable,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "table": { "columns": [] },
        "metadata": {
            "fieldCount": 0,
            "rowCount": 0
        }
    })
}
