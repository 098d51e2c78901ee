//! Mapping session: the state one user works on.
//!
//! Holds the loaded table, the target field list, the mapping and the last
//! calculated table. Any change to the first three discards the calculated
//! table, so an export always reflects the current mapping.
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldmap::session::Session;
//! use fieldmap::transform::{CancelToken, NoProgress};
//!
//! let mut session = Session::default();
//! session.load_file("survey.csv")?;
//! session.auto_map_by_rules()?;
//! session.calculate(&NoProgress, &CancelToken::new())?;
//! session.export_delimited("mapped.csv".as_ref())?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::AppConfig;
use crate::error::{CalculationError, InputError, SessionResult};
use crate::export::{self, DelimitedOptions, ExportSummary, RelationalWriter};
use crate::models::{CalculatedTable, MappingSummary, SourceTable, TargetFieldSet};
use crate::parser::{delimiter_name, parse_bytes_auto, parse_csv_file_auto, ParseResult};
use crate::transform::engine::{calculate, CalcOptions};
use crate::transform::extractor::RuleExtractor;
use crate::transform::mapping::{AutoMapRules, MappingTable};
use crate::transform::progress::{CancelToken, ProgressSink};
use crate::transform::rules::RuleTable;

/// CSV file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Automatic mapping strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMapMode {
    /// i-th field to i-th column
    Position,
    /// Predefined column name rules
    Rules,
}

impl FromStr for AutoMapMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "position" => Ok(Self::Position),
            "rules" | "smart" => Ok(Self::Rules),
            other => Err(format!("unknown auto-map mode '{}' (expected position or rules)", other)),
        }
    }
}

/// A loaded input file with its reading metadata.
#[derive(Debug, Clone)]
struct LoadedSource {
    table: SourceTable,
    encoding: String,
    delimiter: char,
}

#[derive(Debug)]
pub struct Session {
    source: Option<LoadedSource>,
    fields: TargetFieldSet,
    mapping: MappingTable,
    calculated: Option<CalculatedTable>,
    extractor: RuleExtractor,
    rules: AutoMapRules,
    options: CalcOptions,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(TargetFieldSet::default(), AutoMapRules::default())
    }
}

impl Session {
    pub fn new(fields: TargetFieldSet, rules: AutoMapRules) -> Self {
        Self {
            source: None,
            fields,
            mapping: MappingTable::new(),
            calculated: None,
            extractor: RuleExtractor::default(),
            rules,
            options: CalcOptions::default(),
        }
    }

    /// Session with fields, auto-map rules, extraction rules and progress
    /// cadence from the configuration.
    pub fn from_config(config: &AppConfig) -> SessionResult<Self> {
        let mut session = Self::new(config.target_fields()?, config.auto_map_rules()?)
            .with_extraction_rules(config.extraction_rules()?);
        session.options.progress_every = config.progress_every;
        Ok(session)
    }

    /// Replace the extraction rule table.
    pub fn with_extraction_rules(mut self, table: RuleTable) -> Self {
        self.extractor = RuleExtractor::new(table);
        self.calculated = None;
        self
    }

    fn invalidate(&mut self) {
        self.calculated = None;
    }

    // =========================================================================
    // Source table
    // =========================================================================

    pub fn load_file(&mut self, path: &Path) -> SessionResult<CsvInfo> {
        log_info(format!("Reading {}...", path.display()));
        let parsed = parse_csv_file_auto(path)?;
        Ok(self.load_parsed(parsed))
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> SessionResult<CsvInfo> {
        let parsed = parse_bytes_auto(bytes)?;
        Ok(self.load_parsed(parsed))
    }

    /// Install an already parsed table. The mapping is kept as is.
    pub fn load_parsed(&mut self, parsed: ParseResult) -> CsvInfo {
        log_success(format!(
            "Loaded {} columns and {} rows (encoding {}, delimiter {})",
            parsed.table.headers.len(),
            parsed.table.row_count(),
            parsed.encoding,
            delimiter_name(parsed.delimiter)
        ));

        let info = CsvInfo {
            encoding: parsed.encoding.clone(),
            delimiter: parsed.delimiter,
            headers: parsed.table.headers.clone(),
            row_count: parsed.table.row_count(),
        };
        self.source = Some(LoadedSource {
            table: parsed.table,
            encoding: parsed.encoding,
            delimiter: parsed.delimiter,
        });
        self.invalidate();
        info
    }

    pub fn source(&self) -> Option<&SourceTable> {
        self.source.as_ref().map(|s| &s.table)
    }

    pub fn csv_info(&self) -> Option<CsvInfo> {
        self.source.as_ref().map(|s| CsvInfo {
            encoding: s.encoding.clone(),
            delimiter: s.delimiter,
            headers: s.table.headers.clone(),
            row_count: s.table.row_count(),
        })
    }

    fn headers(&self) -> SessionResult<&[String]> {
        self.source
            .as_ref()
            .map(|s| s.table.headers.as_slice())
            .ok_or_else(|| InputError::EmptySource.into())
    }

    // =========================================================================
    // Target fields
    // =========================================================================

    pub fn fields(&self) -> &TargetFieldSet {
        &self.fields
    }

    /// Replace the field list, keeping bindings whose field and column still exist.
    pub fn set_fields(&mut self, fields: TargetFieldSet) {
        match &self.source {
            Some(source) => self.mapping.retain_valid(&fields, &source.table.headers),
            None => self.mapping.clear(),
        }
        self.fields = fields;
        self.invalidate();
        log_success(format!("Updated to {} target fields", self.fields.len()));
    }

    // =========================================================================
    // Mapping
    // =========================================================================

    pub fn mapping(&self) -> &MappingTable {
        &self.mapping
    }

    /// Bind one field. An empty column removes the binding.
    pub fn set_mapping(&mut self, target: &str, source: &str) -> SessionResult<()> {
        if !self.fields.contains(target) {
            return Err(InputError::UnknownField(target.to_string()).into());
        }
        if !source.is_empty() {
            if let Some(loaded) = &self.source {
                if !loaded.table.has_column(source) {
                    return Err(InputError::UnknownColumn(source.to_string()).into());
                }
            }
        }

        self.mapping.set(target, source);
        self.invalidate();
        Ok(())
    }

    /// Replace the whole mapping, validating every entry first.
    pub fn replace_mapping(&mut self, mapping: MappingTable) -> SessionResult<()> {
        for entry in mapping.iter() {
            if !self.fields.contains(&entry.target) {
                return Err(InputError::UnknownField(entry.target.clone()).into());
            }
            if let Some(loaded) = &self.source {
                if !loaded.table.has_column(&entry.source) {
                    return Err(InputError::UnknownColumn(entry.source.clone()).into());
                }
            }
        }

        self.mapping = mapping;
        self.invalidate();
        Ok(())
    }

    pub fn remove_mapping(&mut self, target: &str) {
        self.mapping.remove(target);
        self.invalidate();
    }

    pub fn clear_mapping(&mut self) {
        self.mapping.clear();
        self.invalidate();
    }

    pub fn auto_map_by_position(&mut self) -> SessionResult<usize> {
        let headers = self.headers()?.to_vec();
        self.mapping.auto_map_by_position(&self.fields, &headers);
        self.invalidate();
        log_success(format!("Mapped {} fields by position", self.mapping.len()));
        Ok(self.mapping.len())
    }

    /// Smart auto-map: starts from an empty mapping and applies the rule table.
    pub fn auto_map_by_rules(&mut self) -> SessionResult<usize> {
        let headers = self.headers()?.to_vec();
        self.mapping.clear();
        let matched = self
            .mapping
            .auto_map_by_rules(&self.fields, &headers, &self.rules);
        self.invalidate();
        log_success(format!("Mapped {} fields based on predefined rules", matched));
        Ok(matched)
    }

    pub fn auto_map(&mut self, mode: AutoMapMode) -> SessionResult<usize> {
        match mode {
            AutoMapMode::Position => self.auto_map_by_position(),
            AutoMapMode::Rules => self.auto_map_by_rules(),
        }
    }

    pub fn usage_count(&self, source: &str) -> usize {
        self.mapping.usage_count(source)
    }

    pub fn summary(&self) -> MappingSummary {
        self.mapping.summary(&self.fields)
    }

    // =========================================================================
    // Calculation
    // =========================================================================

    /// Run the calculation. On failure or cancellation the previous result is kept.
    pub fn calculate<P>(&mut self, progress: &P, cancel: &CancelToken) -> SessionResult<&CalculatedTable>
    where
        P: ProgressSink + ?Sized,
    {
        let source = self
            .source
            .as_ref()
            .map(|s| &s.table)
            .ok_or(CalculationError::Input(InputError::EmptySource))?;

        log_info(format!(
            "Calculating {} fields x {} rows...",
            self.mapping.len(),
            source.row_count()
        ));

        let table = match calculate(
            source,
            &self.mapping,
            &self.extractor,
            &self.options,
            progress,
            cancel,
        ) {
            Ok(table) => table,
            Err(CalculationError::Cancelled) => {
                log_warning("Calculation cancelled, previous results kept");
                return Err(CalculationError::Cancelled.into());
            }
            Err(err) => return Err(err.into()),
        };

        log_success(format!(
            "Calculated {} fields x {} rows",
            table.field_count(),
            table.row_count()
        ));
        Ok(self.calculated.insert(table))
    }

    pub fn calculated(&self) -> Option<&CalculatedTable> {
        self.calculated.as_ref()
    }

    fn require_calculated(&self) -> SessionResult<&CalculatedTable> {
        self.calculated
            .as_ref()
            .ok_or_else(|| InputError::NotCalculated.into())
    }

    // =========================================================================
    // Export
    // =========================================================================

    pub fn export_delimited(&self, path: &Path) -> SessionResult<ExportSummary> {
        let table = self.require_calculated()?;
        Ok(export::export_delimited(table, path, &DelimitedOptions::default())?)
    }

    /// Relational export; with `allow_fallback` a missing driver writes CSV instead.
    pub fn export_relational(
        &self,
        path: &Path,
        writer: &dyn RelationalWriter,
        allow_fallback: bool,
    ) -> SessionResult<ExportSummary> {
        let table = self.require_calculated()?;
        Ok(export::export_with_fallback(
            table,
            path,
            export::DEFAULT_TABLE_NAME,
            writer,
            allow_fallback,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::transform::progress::NoProgress;

    fn loaded_session() -> Session {
        let mut session = Session::default();
        session
            .load_bytes(b"ID;hiline_road;hiline_section\n1;l0048;AABB\n2;b7;CCDD\n")
            .unwrap();
        session
    }

    fn is_input(err: &SessionError, expected: InputError) -> bool {
        match err {
            SessionError::Input(e) => *e == expected,
            SessionError::Calculation(CalculationError::Input(e)) => *e == expected,
            _ => false,
        }
    }

    #[test]
    fn test_mapping_change_invalidates_result() {
        let mut session = loaded_session();
        session.auto_map_by_rules().unwrap();
        session.calculate(&NoProgress, &CancelToken::new()).unwrap();
        assert!(session.calculated().is_some());

        session.set_mapping("LAGE", "ID").unwrap();
        assert!(session.calculated().is_none());

        session.calculate(&NoProgress, &CancelToken::new()).unwrap();
        session.remove_mapping("LAGE");
        assert!(session.calculated().is_none());
    }

    #[test]
    fn test_set_mapping_validates() {
        let mut session = loaded_session();
        let err = session.set_mapping("NOT_A_FIELD", "ID").unwrap_err();
        assert!(is_input(&err, InputError::UnknownField("NOT_A_FIELD".into())));

        let err = session.set_mapping("ID", "nope").unwrap_err();
        assert!(is_input(&err, InputError::UnknownColumn("nope".into())));

        session.set_mapping("ID", "ID").unwrap();
        session.set_mapping("ID", "").unwrap();
        assert!(session.mapping().is_empty());
    }

    #[test]
    fn test_cancellation_keeps_previous_result() {
        let mut session = loaded_session();
        session.auto_map_by_rules().unwrap();
        let first = session
            .calculate(&NoProgress, &CancelToken::new())
            .unwrap()
            .clone();

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = session.calculate(&NoProgress, &cancel).unwrap_err();
        assert!(matches!(err, SessionError::Calculation(CalculationError::Cancelled)));
        assert_eq!(session.calculated(), Some(&first));
    }

    #[test]
    fn test_preconditions() {
        let mut session = Session::default();
        let err = session.auto_map_by_position().unwrap_err();
        assert!(is_input(&err, InputError::EmptySource));

        let err = session.calculate(&NoProgress, &CancelToken::new()).unwrap_err();
        assert!(is_input(&err, InputError::EmptySource));

        let mut session = loaded_session();
        let err = session.calculate(&NoProgress, &CancelToken::new()).unwrap_err();
        assert!(is_input(&err, InputError::EmptyMapping));

        let err = session.export_delimited(Path::new("unused.csv")).unwrap_err();
        assert!(is_input(&err, InputError::NotCalculated));
    }

    #[test]
    fn test_smart_auto_map_and_calculate() {
        let mut session = loaded_session();
        let matched = session.auto_map_by_rules().unwrap();
        assert_eq!(matched, 5);

        let table = session.calculate(&NoProgress, &CancelToken::new()).unwrap();
        assert_eq!(table.column("KLASSE").unwrap(), ["L48", "B7"]);
        assert_eq!(table.column("NUMMER").unwrap(), ["0048", "7"]);
        assert_eq!(table.column("VNK").unwrap(), ["AA", "CC"]);
        assert_eq!(table.column("NNK").unwrap(), ["BB", "DD"]);

        let summary = session.summary();
        assert_eq!(summary.mapped, 5);
        assert_eq!(summary.shared_columns, 2);
        assert_eq!(session.usage_count("hiline_road"), 2);
    }

    #[test]
    fn test_editing_fields_keeps_surviving_bindings() {
        let mut session = loaded_session();
        session.auto_map_by_rules().unwrap();

        session.set_fields(TargetFieldSet::new(["KLASSE", "EXTRA"]).unwrap());
        assert_eq!(session.mapping().len(), 1);
        assert_eq!(session.mapping().get("KLASSE"), Some("hiline_road"));
        assert_eq!(session.summary().remaining, 1);
    }

    #[test]
    fn test_auto_map_mode_parsing() {
        assert_eq!("position".parse::<AutoMapMode>(), Ok(AutoMapMode::Position));
        assert_eq!(" Rules ".parse::<AutoMapMode>(), Ok(AutoMapMode::Rules));
        assert!("guess".parse::<AutoMapMode>().is_err());

        let mut session = loaded_session();
        assert_eq!(session.auto_map(AutoMapMode::Position).unwrap(), 3);
        assert_eq!(session.mapping().get("ID"), Some("ID"));
    }

    #[test]
    fn test_replace_mapping_is_all_or_nothing() {
        let mut session = loaded_session();
        session.set_mapping("ID", "ID").unwrap();

        let bad = MappingTable::from_pairs([("KLASSE", "hiline_road"), ("VNK", "missing")]);
        assert!(session.replace_mapping(bad).is_err());
        assert_eq!(session.mapping().len(), 1);

        let good = MappingTable::from_pairs([("KLASSE", "hiline_road")]);
        session.replace_mapping(good).unwrap();
        assert_eq!(session.mapping().get("KLASSE"), Some("hiline_road"));
        assert!(!session.mapping().is_mapped("ID"));
    }

    #[test]
    fn test_from_config_uses_extraction_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extraction.json");
        std::fs::write(
            &path,
            r#"[{"target":"KLASSE","source":"hiline_road","rule":{"type":"split_half","half":"first"}}]"#,
        )
        .unwrap();
        let config = AppConfig {
            extraction_rules_file: Some(path),
            ..AppConfig::default()
        };

        let mut session = Session::from_config(&config).unwrap();
        session
            .load_bytes(b"ID;hiline_road\n1;l0048\n")
            .unwrap();
        session.set_mapping("KLASSE", "hiline_road").unwrap();
        session.set_mapping("NUMMER", "hiline_road").unwrap();

        let table = session.calculate(&NoProgress, &CancelToken::new()).unwrap();
        assert_eq!(table.column("KLASSE").unwrap(), ["l0"]);
        // Pairs missing from the file pass through unchanged.
        assert_eq!(table.column("NUMMER").unwrap(), ["l0048"]);
    }
}
