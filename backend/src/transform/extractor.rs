//! Value extractor
//!
//! Derives the value of one output cell from one raw source cell.

use once_cell::sync::Lazy;

use super::rules::RuleTable;
use crate::error::DecodeError;

/// Pure, stateless cell transformation.
///
/// Implementations must be deterministic and never panic on malformed
/// input; decode failures are reported as [`DecodeError`].
pub trait ValueExtractor: Send + Sync {
    fn extract(&self, target: &str, source: &str, raw: &str) -> Result<String, DecodeError>;

    /// Like [`ValueExtractor::extract`], with decode failures collapsed to `""`.
    fn extract_or_empty(&self, target: &str, source: &str, raw: &str) -> String {
        self.extract(target, source, raw).unwrap_or_default()
    }
}

/// Extractor backed by a [`RuleTable`].
#[derive(Debug, Clone, Default)]
pub struct RuleExtractor {
    table: RuleTable,
}

impl RuleExtractor {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }
}

impl ValueExtractor for RuleExtractor {
    fn extract(&self, target: &str, source: &str, raw: &str) -> Result<String, DecodeError> {
        match self.table.get(target, source) {
            Some(rule) => rule.apply(raw),
            None => Ok(raw.to_string()),
        }
    }
}

static DEFAULT_EXTRACTOR: Lazy<RuleExtractor> = Lazy::new(RuleExtractor::default);

/// Extract with the built-in rule table.
pub fn extract(target: &str, source: &str, raw: &str) -> Result<String, DecodeError> {
    DEFAULT_EXTRACTOR.extract(target, source, raw)
}

/// Extract with the built-in rule table, `""` on decode failure.
pub fn extract_or_empty(target: &str, source: &str, raw: &str) -> String {
    DEFAULT_EXTRACTOR.extract_or_empty(target, source, raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::rules::{ExtractionRule, Half};

    #[test]
    fn test_klasse_and_nummer() {
        assert_eq!(extract("KLASSE", "hiline_road", "l0048").unwrap(), "L48");
        assert_eq!(extract("KLASSE", "hiline_road", "x7").unwrap(), "X7");
        assert_eq!(extract("KLASSE", "hiline_road", "").unwrap(), "");
        assert_eq!(extract("NUMMER", "hiline_road", "l0048").unwrap(), "0048");
        assert_eq!(extract("NUMMER", "Hiline_Road", "l0048").unwrap(), "0048");
    }

    #[test]
    fn test_vnk_nnk_reconstruct_even_inputs() {
        assert_eq!(extract("VNK", "hiline_section", "ABCDEF").unwrap(), "ABC");
        assert_eq!(extract("NNK", "hiline_section", "ABCDEF").unwrap(), "DEF");

        for raw in ["", "AB", "12345678", "4711000047120000", "ÄÖÜß"] {
            let vnk = extract("VNK", "hiline_section", raw).unwrap();
            let nnk = extract("NNK", "hiline_section", raw).unwrap();
            if raw.is_empty() {
                assert_eq!(vnk, "");
                assert_eq!(nnk, "");
            } else {
                assert_eq!(format!("{}{}", vnk, nnk), raw);
            }
        }
    }

    #[test]
    fn test_business_data() {
        let json = r#"{"evaluation_result":{"overall":{"geb":"3"}}}"#;
        assert_eq!(extract("GEB", "business_data", json).unwrap(), "3");
        assert!(extract("GEB", "business_data", "{broken").is_err());
        assert_eq!(extract_or_empty("GEB", "business_data", "{broken"), "");
    }

    #[test]
    fn test_identity_for_unknown_pairs() {
        assert_eq!(extract("ID", "id", " 42 ").unwrap(), " 42 ");
        // rule fields mapped to other columns pass through
        assert_eq!(extract("KLASSE", "road", "l0048").unwrap(), "l0048");
        assert_eq!(extract("VNK", "hiline_road", "ABCDEF").unwrap(), "ABCDEF");
        // business_data mapped to a field outside the decoded set
        assert_eq!(extract("ID", "business_data", "{}").unwrap(), "{}");
    }

    #[test]
    fn test_extractors_are_total() {
        let inputs = ["", "a", "{", "[]", "null", "\u{0}", "l", "ÿ", "{\"evaluation_result\":1}"];
        for target in ["VNK", "NNK", "KLASSE", "NUMMER", "GEB", "EFLI", "ID"] {
            for source in ["hiline_section", "hiline_road", "business_data", "other"] {
                for raw in inputs {
                    let _ = extract_or_empty(target, source, raw);
                }
            }
        }
    }

    #[test]
    fn test_custom_rule_table() {
        let table = RuleTable::empty().with_rule(
            "LEFT",
            "code",
            ExtractionRule::SplitHalf { half: Half::First },
        );
        let extractor = RuleExtractor::new(table);
        assert_eq!(extractor.extract("LEFT", "CODE", "abcd").unwrap(), "ab");
        assert_eq!(extractor.extract("KLASSE", "hiline_road", "l0048").unwrap(), "l0048");
    }
}
