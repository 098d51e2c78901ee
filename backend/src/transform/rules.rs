//! Extraction rules
//!
//! A rule turns one raw cell into the value of one target field. Rules are
//! looked up in a [`RuleTable`] keyed by `(target field, source column)`;
//! pairs without an entry pass the raw value through.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::DecodeError;

/// Source column holding the section code split into VNK/NNK.
pub const SECTION_COLUMN: &str = "hiline_section";

/// Source column holding the road code (`l0048`).
pub const ROAD_COLUMN: &str = "hiline_road";

/// Source column holding the JSON survey document.
pub const BUSINESS_DATA_COLUMN: &str = "business_data";

/// Fields decoded from `business_data` when mapped to it.
pub const BUSINESS_DATA_FIELDS: &[&str] = &[
    "EFLI", "AFLI", "RISS", "ZWAUS", "ZWBIN", "ZWONA", "ZWRSF", "ZWSCH", "ZWAFLI", "ZWBORD",
    "ZWEFLI", "ZWRISS", "ZWWURZ", "GW", "GEB", "SUB",
];

/// Object path inside `business_data` for each known key.
///
/// `ONA` has a path but is not in [`BUSINESS_DATA_FIELDS`], so a mapping
/// `ONA -> business_data` passes the document through unchanged.
pub const BUSINESS_DATA_PATHS: &[(&str, &[&str])] = &[
    ("EFLI", &["survey_result", "tp3"]),
    ("AFLI", &["survey_result", "tp3"]),
    ("RISS", &["survey_result", "tp3"]),
    ("ONA", &["survey_result", "tp3"]),
    ("ZWAUS", &["evaluation_result", "tp3"]),
    ("ZWBIN", &["evaluation_result", "tp3"]),
    ("ZWONA", &["evaluation_result", "tp3"]),
    ("ZWRSF", &["evaluation_result", "tp3"]),
    ("ZWSCH", &["evaluation_result", "tp3"]),
    ("ZWAFLI", &["evaluation_result", "tp3"]),
    ("ZWBORD", &["evaluation_result", "tp3"]),
    ("ZWEFLI", &["evaluation_result", "tp3"]),
    ("ZWRISS", &["evaluation_result", "tp3"]),
    ("ZWWURZ", &["evaluation_result", "tp3"]),
    ("GW", &["evaluation_result", "overall"]),
    ("GEB", &["evaluation_result", "overall"]),
    ("SUB", &["evaluation_result", "overall"]),
];

/// Full JSON path for a `business_data` key: parent objects plus the lowercase key.
pub fn business_data_path(field: &str) -> Option<Vec<String>> {
    BUSINESS_DATA_PATHS
        .iter()
        .find(|(key, _)| *key == field)
        .map(|(key, parents)| {
            parents
                .iter()
                .map(|p| p.to_string())
                .chain(std::iter::once(key.to_lowercase()))
                .collect()
        })
}

/// Which half of a split value to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Half {
    First,
    Second,
}

/// Which part of a road code to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadPart {
    /// Uppercased class letter plus the number without leading zeros (`L48`).
    Class,
    /// Everything after the class letter, zero padding kept (`0048`).
    Number,
}

/// A per-field transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractionRule {
    /// Raw value unchanged
    Identity,

    /// Split at `len / 2` (in characters) and keep one half
    SplitHalf { half: Half },

    /// Decompose a road code such as `l0048`
    RoadCode { part: RoadPart },

    /// Parse the cell as JSON and read a nested value
    JsonPath { path: Vec<String> },
}

impl ExtractionRule {
    /// Apply this rule to a raw cell.
    pub fn apply(&self, raw: &str) -> Result<String, DecodeError> {
        match self {
            ExtractionRule::Identity => Ok(raw.to_string()),
            ExtractionRule::SplitHalf { half } => Ok(split_half(raw, *half)),
            ExtractionRule::RoadCode { part: RoadPart::Class } => Ok(road_class(raw)),
            ExtractionRule::RoadCode { part: RoadPart::Number } => Ok(road_number(raw)),
            ExtractionRule::JsonPath { path } => json_path(raw, path),
        }
    }
}

fn split_half(raw: &str, half: Half) -> String {
    let len = raw.chars().count();
    if len < 2 {
        return raw.to_string();
    }

    let mid = raw
        .char_indices()
        .nth(len / 2)
        .map(|(i, _)| i)
        .unwrap_or(raw.len());

    match half {
        Half::First => raw[..mid].to_string(),
        Half::Second => raw[mid..].to_string(),
    }
}

fn road_class(raw: &str) -> String {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let letter: String = first.to_uppercase().collect();
    let suffix = chars.as_str();

    match suffix.trim().parse::<i128>() {
        Ok(number) => format!("{}{}", letter, number),
        Err(_) => format!("{}{}", letter, suffix),
    }
}

fn road_number(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(_) => chars.as_str().to_string(),
        None => String::new(),
    }
}

fn json_path(raw: &str, path: &[String]) -> Result<String, DecodeError> {
    let document: Value = serde_json::from_str(raw)?;

    let Some((leaf, parents)) = path.split_last() else {
        return Ok(render(&document));
    };

    let mut current = &document;
    if !current.is_object() {
        return Err(DecodeError::UnexpectedShape {
            segment: "$".to_string(),
        });
    }

    for segment in parents {
        match current.get(segment) {
            None => return Ok(String::new()),
            Some(next) if next.is_object() => current = next,
            Some(_) => {
                return Err(DecodeError::UnexpectedShape {
                    segment: segment.clone(),
                })
            }
        }
    }

    Ok(current.get(leaf).map(render).unwrap_or_default())
}

/// Render a JSON value as cell text.
fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Rule Table
// =============================================================================

/// One row of a [`RuleTable`] in its serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub target: String,
    pub source: String,
    pub rule: ExtractionRule,
}

/// Dispatch table from `(target field, source column)` to a rule.
///
/// Target fields match exactly, source columns case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RuleEntry>", into = "Vec<RuleEntry>")]
pub struct RuleTable {
    rules: HashMap<(String, String), ExtractionRule>,
}

impl RuleTable {
    /// A table without entries: every pair is [`ExtractionRule::Identity`].
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn insert(&mut self, target: &str, source: &str, rule: ExtractionRule) {
        self.rules
            .insert((target.to_string(), source.to_lowercase()), rule);
    }

    pub fn with_rule(mut self, target: &str, source: &str, rule: ExtractionRule) -> Self {
        self.insert(target, source, rule);
        self
    }

    pub fn get(&self, target: &str, source: &str) -> Option<&ExtractionRule> {
        self.rules.get(&(target.to_string(), source.to_lowercase()))
    }

    /// Rule for a pair, identity when none is registered.
    pub fn rule_for(&self, target: &str, source: &str) -> ExtractionRule {
        self.get(target, source)
            .cloned()
            .unwrap_or(ExtractionRule::Identity)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Entries sorted by source column, then target field.
    pub fn entries(&self) -> Vec<RuleEntry> {
        let mut entries: Vec<RuleEntry> = self
            .rules
            .iter()
            .map(|((target, source), rule)| RuleEntry {
                target: target.clone(),
                source: source.clone(),
                rule: rule.clone(),
            })
            .collect();
        entries.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        entries
    }
}

impl Default for RuleTable {
    /// Road-survey rules: section split, road code, business data paths.
    fn default() -> Self {
        let mut table = Self::empty()
            .with_rule("VNK", SECTION_COLUMN, ExtractionRule::SplitHalf { half: Half::First })
            .with_rule("NNK", SECTION_COLUMN, ExtractionRule::SplitHalf { half: Half::Second })
            .with_rule("KLASSE", ROAD_COLUMN, ExtractionRule::RoadCode { part: RoadPart::Class })
            .with_rule("NUMMER", ROAD_COLUMN, ExtractionRule::RoadCode { part: RoadPart::Number });

        for field in BUSINESS_DATA_FIELDS {
            if let Some(path) = business_data_path(field) {
                table.insert(field, BUSINESS_DATA_COLUMN, ExtractionRule::JsonPath { path });
            }
        }

        table
    }
}

impl From<Vec<RuleEntry>> for RuleTable {
    fn from(entries: Vec<RuleEntry>) -> Self {
        let mut table = Self::empty();
        for entry in entries {
            table.insert(&entry.target, &entry.source, entry.rule);
        }
        table
    }
}

impl From<RuleTable> for Vec<RuleEntry> {
    fn from(table: RuleTable) -> Self {
        table.entries()
    }
}

/// Describe the rules for help output.
pub fn rules_description(table: &RuleTable) -> String {
    let mut out = String::from("Extraction rules (all other pairs pass the raw value through):\n");
    for entry in table.entries() {
        let what = match &entry.rule {
            ExtractionRule::Identity => "raw value".to_string(),
            ExtractionRule::SplitHalf { half: Half::First } => "first half".to_string(),
            ExtractionRule::SplitHalf { half: Half::Second } => "second half".to_string(),
            ExtractionRule::RoadCode { part: RoadPart::Class } => "road class (l0048 -> L48)".to_string(),
            ExtractionRule::RoadCode { part: RoadPart::Number } => "road number (l0048 -> 0048)".to_string(),
            ExtractionRule::JsonPath { path } => format!("JSON {}", path.join(".")),
        };
        out.push_str(&format!("  {:<8} <- {:<16} {}\n", entry.target, entry.source, what));
    }
    out
}
