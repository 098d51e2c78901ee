//! Domain models for the field mapping pipeline.
//!
//! - [`SourceTable`] - headers and rows of the loaded CSV
//! - [`TargetFieldSet`] - ordered, user-editable list of output fields
//! - [`CalculatedTable`] - column-oriented result of a calculation run
//! - [`MappingSummary`] - counts shown next to the mapping

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::InputError;

// =============================================================================
// Source Table
// =============================================================================

/// Input table as produced by the CSV reader.
///
/// Rows may be shorter than the header; missing positions read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a header, matched exactly. With repeated headers the last one wins.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().rposition(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cell at `(row, column)`, `""` when either is out of range.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

// =============================================================================
// Target Fields
// =============================================================================

/// Field list of the road-survey database the tool was built for.
pub const DEFAULT_TARGET_FIELDS: &[&str] = &[
    "ID", "ZENDI", "KLASSE", "NUMMER", "BUCHSTABE", "LAGE", "FS", "VNK", "NNK",
    "VST", "BST", "VKM", "BKM", "FSANZAHL", "FBANZAHL", "OD_FS", "BAULAST",
    "RADWEG_FLA", "RAD", "Bauw_3", "BREITE", "RIS", "RISK", "FLI", "FLIK",
    "SUB", "VER", "AUS", "SEN", "HEB", "RISG", "FLIG", "RSF", "KUN", "GEF",
    "G", "BAUW_PR", "DATUM_3", "Uhr_3", "ZWRIS", "ZWRISK", "ZWFLI", "ZWFLIK",
    "ZWSUB", "ZWVER", "ZWAUS", "ZWSEN", "ZWHEB", "ZWRISG", "ZWFLIG", "ZWKUN",
    "TWGEB", "TWSUB", "GW", "NIC_L", "NIC_R", "NIC", "ZWNIC", "FUNKTION",
    "BAUW", "DATUM_1A", "UHRZEIT_1A", "VM_1A", "AUN", "ZWAUN", "PGR_AVG",
    "PGR_MAX", "ZWPGR", "SBL", "DBL", "W", "LWI_FS", "RML_LWI_FS", "LWI_OD",
    "RML_LWI_OD", "ZWLWI", "S03", "S10", "S30", "LN", "K", "DATUM_1B",
    "UHRZEIT_1B", "VM_1B", "MSPTR", "MSPTL", "MSPT", "ZWSPT", "MSPHR", "MSPHL",
    "MSPH", "ZWSPH", "SSPTR", "SSPTL", "SSPHR", "SSPHL", "QN", "DATUM_2",
    "UHRZEIT_2", "VMIN_2", "GRI_40", "GRI_60", "GRI_80", "ZWGRI", "UHRZEIT_3",
    "VM_3", "RISS", "ZWRISS", "EFLI", "AFLI", "ZWAFLI", "ONA", "BIN", "RSFA",
    "ZWRSFA", "LQRL", "ZWLQRL", "LQRP", "ZWLQRP", "LQR", "ZWLQR", "EABF",
    "ZWEABF", "EABP", "ZWEABP", "EAB", "ZWEAB", "KASL", "ZWKASL", "KASP",
    "ZWKASP", "ZWKAS", "RSFB", "ZWRSFB", "NTR", "FUF", "BTE", "TWUM", "ZK",
    "MESSJAHR", "ZWAUN_15", "ZWLWI_15", "ZWDBL_15", "ZWSBL_15", "ZWBPL_15",
    "ZWSPT_15", "ZWSPH_15", "ZWGRI_15", "ZWRISS_15", "ZWFLI_15", "ZWAFLI_15",
    "ZWRISG_15", "ZWLQRL_15", "ZWLQRP_15", "ZWLQR_15", "ZWRSFB_15", "ZWRSFA_15",
    "TWE_15", "TWN_15", "TWEQLQ_15", "TWRIO_15", "GEB_15", "SUB_15", "GW_15",
    "OFS", "IRI", "ZWPGR_AVG", "ZWPGR_MAX", "ZWEFLI", "ZWONA", "ZWBIN", "ZWOFS",
    "ZWSCH", "ZWBORD", "ZWWURZ", "ZWRSF", "GEB",
];

/// Ordered list of output fields.
///
/// Never empty and free of duplicates: a duplicated name would make two
/// mapping rows share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TargetFieldSet {
    fields: Vec<String>,
}

impl TargetFieldSet {
    /// Build a field set, rejecting empty lists and duplicate names.
    pub fn new<I, S>(fields: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(InputError::EmptyFieldList);
        }

        {
            let mut seen = HashSet::new();
            for field in &fields {
                if !seen.insert(field.as_str()) {
                    return Err(InputError::DuplicateField(field.clone()));
                }
            }
        }

        Ok(Self { fields })
    }

    /// Parse an edited field list: one name per line, blank lines dropped.
    pub fn parse_lines(text: &str) -> Result<Self, InputError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.fields
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

impl Default for TargetFieldSet {
    fn default() -> Self {
        Self {
            fields: DEFAULT_TARGET_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for TargetFieldSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let fields = Vec::<String>::deserialize(deserializer)?;
        TargetFieldSet::new(fields).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Calculated Table
// =============================================================================

/// One output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedColumn {
    pub field: String,
    pub values: Vec<String>,
}

/// Column-oriented result of a calculation run.
///
/// All columns have the same length, the row count of the source table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedTable {
    columns: Vec<CalculatedColumn>,
}

impl CalculatedTable {
    pub fn new(columns: Vec<CalculatedColumn>) -> Self {
        debug_assert!(
            columns.windows(2).all(|w| w[0].values.len() == w[1].values.len()),
            "calculated columns must have equal length"
        );
        Self { columns }
    }

    pub fn columns(&self) -> &[CalculatedColumn] {
        &self.columns
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.field.as_str()).collect()
    }

    pub fn column(&self, field: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.values.as_slice())
    }

    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns holding at least one value, in table order.
    pub fn exportable_columns(&self) -> Vec<&CalculatedColumn> {
        self.columns.iter().filter(|c| !c.values.is_empty()).collect()
    }

    /// Row-wise view over the given columns.
    pub fn rows_of<'a>(
        columns: &'a [&'a CalculatedColumn],
    ) -> impl Iterator<Item = Vec<&'a str>> + 'a {
        let count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        (0..count).map(move |i| {
            columns
                .iter()
                .map(|c| c.values.get(i).map(String::as_str).unwrap_or(""))
                .collect()
        })
    }
}

// =============================================================================
// Mapping Summary
// =============================================================================

/// Counts displayed next to the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSummary {
    /// Target fields bound to a column.
    pub mapped: usize,
    /// Target fields left unmapped.
    pub remaining: usize,
    /// Source columns feeding more than one field.
    pub shared_columns: usize,
}
