//! CSV reader with encoding fallback and delimiter auto-detection.
//!
//! Produces a [`SourceTable`]: trimmed headers plus raw string rows. No
//! mapping logic here.

use std::borrow::Cow;
use std::path::Path;

use crate::error::{CsvError, CsvResult};
use crate::models::SourceTable;

/// Encodings tried in order until one decodes the file.
pub const ENCODING_CHAIN: &[&str] = &["utf-8", "latin-1", "cp1252", "iso-8859-1"];

/// Delimiters considered by [`detect_delimiter`].
pub const CANDIDATE_DELIMITERS: &[char] = &[',', ';', '\t'];

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Headers and rows
    pub table: SourceTable,
    /// Encoding that decoded the file
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Guess the charset of raw bytes using chardet.
///
/// Only a hint: decoding still walks [`ENCODING_CHAIN`].
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "latin-1".to_string(),
        "windows-1252" | "cp1252" => "cp1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with one named encoding, `None` if the bytes are invalid for it.
pub fn decode_with(bytes: &[u8], encoding: &str) -> Option<String> {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => std::str::from_utf8(bytes).ok().map(str::to_string),
        "latin-1" | "latin1" | "iso-8859-1" => {
            // Every byte is a valid code point in ISO-8859-1.
            Some(bytes.iter().map(|&b| char::from(b)).collect())
        }
        "cp1252" | "windows-1252" => encoding_rs::WINDOWS_1252
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned),
        _ => None,
    }
}

/// Order in which encodings are tried for a given chardet hint.
///
/// This departs from [`ENCODING_CHAIN`] on purpose when the hint is cp1252:
/// latin-1 accepts every byte, so cp1252 would otherwise never be reached
/// and bytes such as `0x80` (`€`) would decode to C1 control characters.
pub fn encoding_order(hint: &str) -> Vec<&'static str> {
    let mut chain: Vec<&'static str> = ENCODING_CHAIN.to_vec();
    if hint == "cp1252" {
        chain.retain(|e| *e != "cp1252");
        chain.insert(1, "cp1252");
    }
    chain
}

/// Decode bytes by walking the fallback chain in [`encoding_order`].
pub fn decode_content(bytes: &[u8]) -> CsvResult<(String, String)> {
    let hint = detect_encoding(bytes);

    for encoding in encoding_order(&hint) {
        if let Some(text) = decode_with(bytes, encoding) {
            return Ok((text, encoding.to_string()));
        }
    }

    Err(CsvError::EncodingError(format!(
        "none of {} matched",
        ENCODING_CHAIN.join(", ")
    )))
}

/// Detect the delimiter by counting occurrences in the first line.
///
/// `;` or tab wins only with a strictly higher count than both others,
/// anything else falls back to `,`.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    let tabs = first_line.matches('\t').count();

    if semicolons > commas && semicolons > tabs {
        ';'
    } else if tabs > commas && tabs > semicolons {
        '\t'
    } else {
        ','
    }
}

/// Header cleanup: surrounding whitespace and a leading byte-order mark.
fn clean_header(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').trim().to_string()
}

/// For each physical record of `content`, whether it is blank.
///
/// Line breaks inside a quoted field do not end the record. A quote only
/// opens a quoted field at the start of a field, as in the csv reader.
fn blank_line_flags(content: &str, delimiter: char) -> Vec<bool> {
    let mut flags = Vec::new();
    let mut in_quotes = false;
    let mut field_start = true;
    let mut line_empty = true;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            continue;
        }

        match c {
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                flags.push(line_empty);
                line_empty = true;
                field_start = true;
            }
            '"' if field_start => {
                in_quotes = true;
                line_empty = false;
                field_start = false;
            }
            c if c == delimiter => {
                line_empty = false;
                field_start = true;
            }
            _ => {
                line_empty = false;
                field_start = false;
            }
        }
    }
    if !line_empty {
        flags.push(false);
    }
    flags
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// Rows shorter or longer than the header are kept as read. Blank lines
/// after the header become empty rows (every cell reads as `""`); the csv
/// reader itself skips them, so they are put back from a line scan.
/// Blank lines before the header are skipped.
pub fn parse_str(content: &str, delimiter: char) -> CsvResult<SourceTable> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header_record = records.next().ok_or(CsvError::EmptyFile)??;
    let headers: Vec<String> = header_record.iter().map(clean_header).collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::NoHeaders);
    }

    // Skip leading blanks and the header line itself.
    let mut layout = blank_line_flags(content, delimiter)
        .into_iter()
        .skip_while(|blank| *blank)
        .skip(1);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in records {
        let record = record?;
        for _ in layout.by_ref().take_while(|blank| *blank) {
            rows.push(Vec::new());
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    rows.extend(layout.filter(|blank| *blank).map(|_| Vec::new()));

    Ok(SourceTable::new(headers, rows))
}

/// Parse CSV bytes with encoding fallback and delimiter detection.
pub fn parse_bytes_auto(bytes: &[u8]) -> CsvResult<ParseResult> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let (content, encoding) = decode_content(bytes)?;
    let delimiter = detect_delimiter(&content);
    let table = parse_str(&content, delimiter)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
    })
}

/// Parse a CSV file with encoding fallback and delimiter detection.
///
/// # Example
/// ```ignore
/// let result = parse_csv_file_auto("/path/to/file.csv")?;
/// println!("Encoding: {}, Delimiter: '{}'", result.encoding, result.delimiter);
/// println!("Rows: {}", result.table.row_count());
/// ```
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}

/// Human-readable delimiter name.
pub fn delimiter_name(delimiter: char) -> &'static str {
    match delimiter {
        ',' => "comma",
        ';' => "semicolon",
        '\t' => "tab",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_csv() {
        let table = parse_str("name;age\nAlice;30\nBob;25", ';').unwrap();

        assert_eq!(table.headers, vec!["name", "age"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0], vec!["Alice", "30"]);
        assert_eq!(table.rows[1], vec!["Bob", "25"]);
    }

    #[test]
    fn test_quoted_values_keep_delimiters() {
        let csv = "id;business_data\n1;\"{\"\"a\"\";1}\"";
        let table = parse_str(csv, ';').unwrap();
        assert_eq!(table.rows[0][1], "{\"a\";1}");
    }

    #[test]
    fn test_ragged_rows_are_tolerated() {
        let table = parse_str("a,b,c\n1\n1,2,3,4", ',').unwrap();
        assert_eq!(table.rows[0], vec!["1"]);
        assert_eq!(table.cell(0, 2), "");
        assert_eq!(table.rows[1].len(), 4);
    }

    #[test]
    fn test_headers_are_trimmed_and_bom_stripped() {
        let table = parse_str("\u{feff}ID , hiline_road\n1,l0048", ',').unwrap();
        assert_eq!(table.headers, vec!["ID", "hiline_road"]);
    }

    #[test]
    fn test_values_are_not_trimmed() {
        let table = parse_str("a;b\n 1 ;2", ';').unwrap();
        assert_eq!(table.rows[0][0], " 1 ");
    }

    #[test]
    fn test_empty_csv_error() {
        assert!(matches!(parse_str("", ';'), Err(CsvError::EmptyFile)));
        assert!(matches!(parse_bytes_auto(b""), Err(CsvError::EmptyFile)));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_detect_delimiter_ties_fall_back_to_comma() {
        assert_eq!(detect_delimiter("a;b,c"), ',');
        assert_eq!(detect_delimiter("a;b\tc"), ',');
    }

    #[test]
    fn test_auto_parse() {
        let result = parse_bytes_auto(b"name;age\nAlice;30\nBob;25").unwrap();

        assert_eq!(result.delimiter, ';');
        assert_eq!(result.encoding, "utf-8");
        assert_eq!(result.table.row_count(), 2);
        assert_eq!(result.table.headers, vec!["name", "age"]);
    }

    #[test]
    fn test_latin1_fallback() {
        // "Straße;Köln" in ISO-8859-1
        let mut bytes = b"name;city\nStra".to_vec();
        bytes.push(0xDF);
        bytes.extend_from_slice(b"e;K");
        bytes.push(0xF6);
        bytes.extend_from_slice(b"ln");

        let result = parse_bytes_auto(&bytes).unwrap();
        assert_ne!(result.encoding, "utf-8");
        assert_eq!(result.table.rows[0], vec!["Straße", "Köln"]);
    }

    #[test]
    fn test_blank_lines_become_empty_rows() {
        let result = parse_bytes_auto(b"ID;X\n1;a\n\n2;b\n").unwrap();
        let table = result.table;

        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[0], vec!["1", "a"]);
        assert!(table.rows[1].is_empty());
        assert_eq!(table.cell(1, 0), "");
        assert_eq!(table.rows[2], vec!["2", "b"]);
    }

    #[test]
    fn test_blank_lines_inside_quotes_and_at_edges() {
        let table = parse_str("\r\nID;X\r\n1;\"a\r\n\r\nb\"\r\n2;c\r\n\r\n", ';').unwrap();

        assert_eq!(table.headers, vec!["ID", "X"]);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.rows[0], vec!["1", "a\r\n\r\nb"]);
        assert_eq!(table.rows[1], vec!["2", "c"]);
        assert!(table.rows[2].is_empty());
    }

    #[test]
    fn test_cp1252_hint_moves_ahead_of_latin1() {
        assert_eq!(encoding_order("utf-8"), ENCODING_CHAIN.to_vec());
        assert_eq!(
            encoding_order("cp1252"),
            vec!["utf-8", "cp1252", "latin-1", "iso-8859-1"]
        );
    }

    #[test]
    fn test_decode_with_unknown_encoding() {
        assert!(decode_with(b"abc", "utf-16").is_none());
        assert!(decode_with(&[0xff, 0xfe], "utf-8").is_none());
        assert_eq!(decode_with(&[0x80], "cp1252").as_deref(), Some("€"));
    }
}
