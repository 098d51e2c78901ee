//! Calculation engine
//!
//! Applies the extractor to every mapped `(target field, source column)`
//! pair, row by row, and materializes a column-oriented [`CalculatedTable`].

use super::extractor::ValueExtractor;
use super::mapping::MappingTable;
use super::progress::{CancelToken, ProgressSink};
use crate::error::{CalculationError, InputError};
use crate::models::{CalculatedColumn, CalculatedTable, SourceTable};

/// Rows between progress notifications and cancellation checks.
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

/// Options for a calculation run
#[derive(Debug, Clone, Copy)]
pub struct CalcOptions {
    /// Report progress and check for cancellation every N rows
    pub progress_every: usize,
}

impl Default for CalcOptions {
    fn default() -> Self {
        Self {
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// A mapping entry with its column index resolved once per run.
struct ResolvedField<'a> {
    target: &'a str,
    source: &'a str,
    /// `None` when the column is not a header: every cell reads as `""`.
    index: Option<usize>,
}

/// Calculate the output table.
///
/// Fails with [`InputError::EmptyMapping`] / [`InputError::EmptySource`]
/// before doing any work, and with [`CalculationError::Cancelled`] when the
/// token is set at a checkpoint. Columns follow the mapping order.
pub fn calculate<E, P>(
    source: &SourceTable,
    mapping: &MappingTable,
    extractor: &E,
    options: &CalcOptions,
    progress: &P,
    cancel: &CancelToken,
) -> Result<CalculatedTable, CalculationError>
where
    E: ValueExtractor + ?Sized,
    P: ProgressSink + ?Sized,
{
    if mapping.is_empty() {
        return Err(InputError::EmptyMapping.into());
    }
    if source.is_empty() {
        return Err(InputError::EmptySource.into());
    }

    let resolved: Vec<ResolvedField> = mapping
        .iter()
        .map(|entry| ResolvedField {
            target: &entry.target,
            source: &entry.source,
            index: source.column_index(&entry.source),
        })
        .collect();

    let total = source.row_count();
    let every = options.progress_every.max(1);
    let mut columns: Vec<Vec<String>> = resolved.iter().map(|_| Vec::with_capacity(total)).collect();

    for (row_idx, row) in source.rows.iter().enumerate() {
        if row_idx % every == 0 {
            if cancel.is_cancelled() {
                return Err(CalculationError::Cancelled);
            }
            progress.report(row_idx, total, &format!("Processing row {}...", row_idx + 1));
        }

        for (field, column) in resolved.iter().zip(columns.iter_mut()) {
            let raw = field
                .index
                .and_then(|i| row.get(i))
                .map(String::as_str)
                .unwrap_or("");
            column.push(extractor.extract_or_empty(field.target, field.source, raw));
        }
    }

    progress.report(total, total, "Complete!");

    let columns = resolved
        .into_iter()
        .zip(columns)
        .map(|(field, values)| CalculatedColumn {
            field: field.target.to_string(),
            values,
        })
        .collect();

    Ok(CalculatedTable::new(columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::extractor::RuleExtractor;
    use crate::transform::progress::NoProgress;
    use std::sync::Mutex;

    fn survey_table() -> SourceTable {
        SourceTable::new(
            vec![
                "ID".into(),
                "hiline_road".into(),
                "hiline_section".into(),
                "business_data".into(),
            ],
            vec![
                vec![
                    "1".into(),
                    "l0048".into(),
                    "47110001".into(),
                    r#"{"evaluation_result":{"overall":{"geb":"3","gw":1.5}}}"#.into(),
                ],
                vec!["2".into(), "b7".into(), "AB".into(), "not json".into()],
                vec!["3".into()],
            ],
        )
    }

    fn run(source: &SourceTable, mapping: &MappingTable) -> Result<CalculatedTable, CalculationError> {
        calculate(
            source,
            mapping,
            &RuleExtractor::default(),
            &CalcOptions::default(),
            &NoProgress,
            &CancelToken::new(),
        )
    }

    #[test]
    fn test_calculate_applies_rules() {
        let mapping = MappingTable::from_pairs([
            ("ID", "ID"),
            ("KLASSE", "hiline_road"),
            ("NUMMER", "hiline_road"),
            ("VNK", "hiline_section"),
            ("NNK", "hiline_section"),
            ("GEB", "business_data"),
            ("GW", "business_data"),
        ]);
        let table = run(&survey_table(), &mapping).unwrap();

        assert_eq!(table.field_names(), vec!["ID", "KLASSE", "NUMMER", "VNK", "NNK", "GEB", "GW"]);
        assert_eq!(table.column("KLASSE").unwrap(), ["L48", "B7", ""]);
        assert_eq!(table.column("NUMMER").unwrap(), ["0048", "7", ""]);
        assert_eq!(table.column("VNK").unwrap(), ["4711", "A", ""]);
        assert_eq!(table.column("NNK").unwrap(), ["0001", "B", ""]);
        assert_eq!(table.column("GEB").unwrap(), ["3", "", ""]);
        assert_eq!(table.column("GW").unwrap(), ["1.5", "", ""]);
    }

    #[test]
    fn test_every_column_has_source_row_count() {
        let mapping = MappingTable::from_pairs([("ID", "ID"), ("X", "missing_column")]);
        let source = survey_table();
        let table = run(&source, &mapping).unwrap();

        for column in table.columns() {
            assert_eq!(column.values.len(), source.row_count());
        }
        assert_eq!(table.column("X").unwrap(), ["", "", ""]);
    }

    #[test]
    fn test_shared_column_feeds_both_fields() {
        let source = SourceTable::new(vec!["col1".into()], vec![vec!["v".into()]]);
        let mapping = MappingTable::from_pairs([("A", "col1"), ("B", "col1")]);
        let table = run(&source, &mapping).unwrap();

        assert_eq!(table.column("A").unwrap(), ["v"]);
        assert_eq!(table.column("B").unwrap(), ["v"]);
    }

    #[test]
    fn test_repeated_header_reads_last_column() {
        let source = SourceTable::new(
            vec!["ID".into(), "ID".into()],
            vec![vec!["first".into(), "last".into()]],
        );
        let table = run(&source, &MappingTable::from_pairs([("ID", "ID")])).unwrap();
        assert_eq!(table.column("ID").unwrap(), ["last"]);
    }

    #[test]
    fn test_calculate_is_idempotent() {
        let source = survey_table();
        let mapping = MappingTable::from_pairs([("KLASSE", "hiline_road"), ("GEB", "business_data")]);
        assert_eq!(run(&source, &mapping).unwrap(), run(&source, &mapping).unwrap());
    }

    #[test]
    fn test_preconditions() {
        let source = survey_table();
        assert_eq!(
            run(&source, &MappingTable::new()),
            Err(CalculationError::Input(InputError::EmptyMapping))
        );

        let empty = SourceTable::new(vec!["ID".into()], vec![]);
        let mapping = MappingTable::from_pairs([("ID", "ID")]);
        assert_eq!(
            run(&empty, &mapping),
            Err(CalculationError::Input(InputError::EmptySource))
        );
    }

    #[test]
    fn test_progress_cadence() {
        let rows: Vec<Vec<String>> = (0..250).map(|i| vec![i.to_string()]).collect();
        let source = SourceTable::new(vec!["n".into()], rows);
        let mapping = MappingTable::from_pairs([("N", "n")]);
        let seen = Mutex::new(Vec::new());
        let sink = |current: usize, total: usize, _msg: &str| {
            seen.lock().unwrap().push((current, total));
        };

        calculate(
            &source,
            &mapping,
            &RuleExtractor::default(),
            &CalcOptions::default(),
            &sink,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, 250), (100, 250), (200, 250), (250, 250)]
        );
    }

    #[test]
    fn test_cancellation_at_checkpoint() {
        let rows: Vec<Vec<String>> = (0..500).map(|i| vec![i.to_string()]).collect();
        let source = SourceTable::new(vec!["n".into()], rows);
        let mapping = MappingTable::from_pairs([("N", "n")]);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        // Cancel once the second batch has been reported.
        let sink = move |current: usize, _total: usize, _msg: &str| {
            if current >= 100 {
                trigger.cancel();
            }
        };

        let result = calculate(
            &source,
            &mapping,
            &RuleExtractor::default(),
            &CalcOptions { progress_every: 100 },
            &sink,
            &cancel,
        );
        assert_eq!(result, Err(CalculationError::Cancelled));
    }
}
