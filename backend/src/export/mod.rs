//! Export of a calculated table to a delimited file or a relational table.
//!
//! Only columns holding at least one value are written, in table order.
//! Every value is written as text.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::api::logs::{log_success, log_warning};
use crate::error::{ExportError, ExportResult};
use crate::models::{CalculatedColumn, CalculatedTable};

/// Default relational table name.
pub const DEFAULT_TABLE_NAME: &str = "MappedData";

/// Width of the text columns created by relational writers.
pub const TEXT_COLUMN_WIDTH: usize = 255;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options for delimited export
#[derive(Debug, Clone, Copy)]
pub struct DelimitedOptions {
    pub delimiter: u8,
    /// Write a UTF-8 byte-order mark first
    pub bom: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            bom: true,
        }
    }
}

/// What an export wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: PathBuf,
    pub fields: Vec<String>,
    pub rows: usize,
    /// Table name for relational exports
    pub table: Option<String>,
}

fn exportable(table: &CalculatedTable) -> ExportResult<Vec<&CalculatedColumn>> {
    let columns = table.exportable_columns();
    if columns.is_empty() {
        return Err(ExportError::NoData);
    }
    Ok(columns)
}

fn field_names(columns: &[&CalculatedColumn]) -> Vec<String> {
    columns.iter().map(|c| c.field.clone()).collect()
}

/// Write the table as delimited text to any writer.
pub fn write_delimited<W: Write>(
    table: &CalculatedTable,
    writer: W,
    options: &DelimitedOptions,
) -> ExportResult<(Vec<String>, usize)> {
    let columns = exportable(table)?;
    let mut writer = writer;

    if options.bom {
        writer.write_all(UTF8_BOM)?;
    }

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);

    let fields = field_names(&columns);
    csv_writer.write_record(&fields)?;

    let mut rows = 0;
    for row in CalculatedTable::rows_of(&columns) {
        csv_writer.write_record(&row)?;
        rows += 1;
    }
    csv_writer.flush()?;

    Ok((fields, rows))
}

/// Export to a delimited file (semicolon and BOM by default).
pub fn export_delimited(
    table: &CalculatedTable,
    path: &Path,
    options: &DelimitedOptions,
) -> ExportResult<ExportSummary> {
    let file = BufWriter::new(File::create(path)?);
    let (fields, rows) = write_delimited(table, file, options)?;

    log_success(format!(
        "CSV saved to {} ({} fields, {} rows)",
        path.display(),
        fields.len(),
        rows
    ));

    Ok(ExportSummary {
        path: path.to_path_buf(),
        fields,
        rows,
        table: None,
    })
}

/// Export to bytes, for HTTP downloads.
pub fn delimited_bytes(table: &CalculatedTable, options: &DelimitedOptions) -> ExportResult<Vec<u8>> {
    let mut buffer = Vec::new();
    write_delimited(table, &mut buffer, options)?;
    Ok(buffer)
}

// =============================================================================
// Relational export
// =============================================================================

/// A relational database driver able to write one text table to a file.
pub trait RelationalWriter {
    /// Driver name for messages.
    fn name(&self) -> &str;

    /// Replace any file at `path` with a database holding one table.
    fn write_table(
        &self,
        path: &Path,
        table_name: &str,
        fields: &[String],
        rows: &mut dyn Iterator<Item = Vec<&str>>,
    ) -> ExportResult<usize>;
}

/// Writer used when no driver is compiled in.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableWriter;

impl RelationalWriter for UnavailableWriter {
    fn name(&self) -> &str {
        "none"
    }

    fn write_table(
        &self,
        _path: &Path,
        _table_name: &str,
        _fields: &[String],
        _rows: &mut dyn Iterator<Item = Vec<&str>>,
    ) -> ExportResult<usize> {
        Err(ExportError::DriverUnavailable(
            "built without a relational driver (enable the `duckdb` feature)".to_string(),
        ))
    }
}

#[cfg(feature = "duckdb")]
pub use self::duck::DuckDbWriter;

/// The relational writer compiled into this build.
pub fn default_writer() -> Box<dyn RelationalWriter> {
    #[cfg(feature = "duckdb")]
    {
        Box::new(DuckDbWriter)
    }
    #[cfg(not(feature = "duckdb"))]
    {
        Box::new(UnavailableWriter)
    }
}

/// Quote an identifier for SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement with one text column per field.
pub fn create_table_sql(table_name: &str, fields: &[String]) -> String {
    let columns: Vec<String> = fields
        .iter()
        .map(|f| format!("{} VARCHAR({})", quote_identifier(f), TEXT_COLUMN_WIDTH))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table_name),
        columns.join(", ")
    )
}

/// Parameterized `INSERT` statement for the given fields.
pub fn insert_sql(table_name: &str, fields: &[String]) -> String {
    let names: Vec<String> = fields.iter().map(|f| quote_identifier(f)).collect();
    let placeholders = vec!["?"; fields.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table_name),
        names.join(", "),
        placeholders
    )
}

/// Export to a relational table through `writer`.
pub fn export_relational(
    table: &CalculatedTable,
    path: &Path,
    table_name: &str,
    writer: &dyn RelationalWriter,
) -> ExportResult<ExportSummary> {
    let columns = exportable(table)?;
    let fields = field_names(&columns);
    let mut rows = CalculatedTable::rows_of(&columns);

    let written = writer.write_table(path, table_name, &fields, &mut rows)?;

    log_success(format!(
        "Database saved to {} (table {}, {} fields, {} rows, driver {})",
        path.display(),
        table_name,
        fields.len(),
        written,
        writer.name()
    ));

    Ok(ExportSummary {
        path: path.to_path_buf(),
        fields,
        rows: written,
        table: Some(table_name.to_string()),
    })
}

/// Relational export that falls back to a delimited file next to `path`
/// when the driver is missing and `allow_fallback` is set.
pub fn export_with_fallback(
    table: &CalculatedTable,
    path: &Path,
    table_name: &str,
    writer: &dyn RelationalWriter,
    allow_fallback: bool,
) -> ExportResult<ExportSummary> {
    match export_relational(table, path, table_name, writer) {
        Err(err) if allow_fallback && err.suggests_delimited_fallback() => {
            let csv_path = path.with_extension("csv");
            log_warning(format!("{}; saving as CSV instead: {}", err, csv_path.display()));
            export_delimited(table, &csv_path, &DelimitedOptions::default())
        }
        other => other,
    }
}

#[cfg(feature = "duckdb")]
mod duck {
    use duckdb::{params_from_iter, Connection};
    use std::path::Path;

    use super::{create_table_sql, insert_sql, RelationalWriter};
    use crate::error::{ExportError, ExportResult};

    /// Writes the table into a DuckDB database file.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct DuckDbWriter;

    impl RelationalWriter for DuckDbWriter {
        fn name(&self) -> &str {
            "duckdb"
        }

        fn write_table(
            &self,
            path: &Path,
            table_name: &str,
            fields: &[String],
            rows: &mut dyn Iterator<Item = Vec<&str>>,
        ) -> ExportResult<usize> {
            if path.exists() {
                std::fs::remove_file(path)?;
            }

            let driver = |e: duckdb::Error| ExportError::Driver(e.to_string());

            // A file the driver cannot open is a data source failure, so the
            // delimited fallback applies as for a missing driver.
            let mut conn = Connection::open(path).map_err(|e| {
                ExportError::DriverUnavailable(format!("cannot open {}: {}", path.display(), e))
            })?;
            conn.execute_batch(&create_table_sql(table_name, fields))
                .map_err(driver)?;

            let tx = conn.transaction().map_err(driver)?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(&insert_sql(table_name, fields)).map_err(driver)?;
                for row in rows {
                    stmt.execute(params_from_iter(row.iter())).map_err(driver)?;
                    written += 1;
                }
            }
            tx.commit().map_err(driver)?;

            Ok(written)
        }
    }
}
