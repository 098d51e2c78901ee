//! Mapping table
//!
//! Which source column backs which target field. Many target fields may
//! share one source column; a field without an entry is unmapped and left
//! out of calculation and export.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::models::{MappingSummary, TargetFieldSet};

/// One binding of a target field to a source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub target: String,
    pub source: String,
}

/// Target field -> source column, in insertion order.
///
/// Overwriting an entry keeps its position. Serialized as a JSON object
/// whose key order is the entry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(target, source)` pairs, applying [`MappingTable::set`] to each.
    pub fn from_pairs<I, T, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, S)>,
        T: AsRef<str>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for (target, source) in pairs {
            table.set(target.as_ref(), source.as_ref());
        }
        table
    }

    /// Bind a target field to a source column. An empty column removes the entry.
    pub fn set(&mut self, target: &str, source: &str) {
        if source.is_empty() {
            self.remove(target);
            return;
        }

        match self.entries.iter_mut().find(|e| e.target == target) {
            Some(entry) => entry.source = source.to_string(),
            None => self.entries.push(MappingEntry {
                target: target.to_string(),
                source: source.to_string(),
            }),
        }
    }

    /// Remove a binding; no-op when the field is unmapped.
    pub fn remove(&mut self, target: &str) {
        self.entries.retain(|e| e.target != target);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, target: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.target == target)
            .map(|e| e.source.as_str())
    }

    pub fn is_mapped(&self, target: &str) -> bool {
        self.get(target).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of target fields bound to a source column.
    pub fn usage_count(&self, source: &str) -> usize {
        self.entries.iter().filter(|e| e.source == source).count()
    }

    /// Usage count for every referenced column.
    pub fn column_usage(&self) -> HashMap<&str, usize> {
        let mut usage = HashMap::new();
        for entry in &self.entries {
            *usage.entry(entry.source.as_str()).or_insert(0) += 1;
        }
        usage
    }

    /// Mapped / remaining / shared-column counts against a field list.
    pub fn summary(&self, fields: &TargetFieldSet) -> MappingSummary {
        let mapped = fields.iter().filter(|f| self.is_mapped(f)).count();
        let shared_columns = self.column_usage().values().filter(|&&n| n > 1).count();

        MappingSummary {
            mapped,
            remaining: fields.len().saturating_sub(mapped),
            shared_columns,
        }
    }

    /// Replace the mapping by a positional one: field `i` binds to header `i`.
    ///
    /// Fields beyond the number of headers stay unmapped.
    pub fn auto_map_by_position(&mut self, fields: &TargetFieldSet, headers: &[String]) {
        self.clear();
        for (target, source) in fields.iter().zip(headers.iter()) {
            self.set(target, source);
        }
    }

    /// Bind fields according to a rule table; returns the number of bindings made.
    ///
    /// Source columns are matched case-insensitively and the header's own
    /// spelling is stored. Rules whose column is absent leave their fields
    /// untouched, as do listed fields missing from `fields`.
    pub fn auto_map_by_rules(
        &mut self,
        fields: &TargetFieldSet,
        headers: &[String],
        rules: &AutoMapRules,
    ) -> usize {
        let mut matched = 0;

        for rule in rules.iter() {
            let key = rule.source.to_lowercase();
            // Later headers win when two differ only in case.
            let Some(header) = headers.iter().rev().find(|h| h.to_lowercase() == key) else {
                continue;
            };

            for target in &rule.targets {
                if fields.contains(target) {
                    self.set(target, header);
                    matched += 1;
                }
            }
        }

        matched
    }

    /// Drop entries whose field left the list or whose column is not a header.
    ///
    /// Used after the field list is edited or another file is loaded.
    pub fn retain_valid(&mut self, fields: &TargetFieldSet, headers: &[String]) {
        self.entries
            .retain(|e| fields.contains(&e.target) && headers.contains(&e.source));
    }
}

impl Serialize for MappingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.target, &entry.source)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MappingTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = MappingTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of target field -> source column")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = MappingTable::new();
                while let Some((target, source)) = access.next_entry::<String, String>()? {
                    table.set(&target, &source);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

// =============================================================================
// Auto-map Rules
// =============================================================================

/// Expected source column and the target fields it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMapRule {
    pub source: String,
    pub targets: Vec<String>,
}

impl AutoMapRule {
    pub fn new(source: &str, targets: &[&str]) -> Self {
        Self {
            source: source.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Ordered rule table for smart auto-mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AutoMapRules {
    rules: Vec<AutoMapRule>,
}

impl AutoMapRules {
    pub fn new(rules: Vec<AutoMapRule>) -> Self {
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AutoMapRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for AutoMapRules {
    fn default() -> Self {
        Self::new(vec![
            AutoMapRule::new("ID", &["ID"]),
            AutoMapRule::new("hiline_carriageway", &["LAGE"]),
            AutoMapRule::new("hiline_road", &["KLASSE", "NUMMER"]),
            AutoMapRule::new(
                "business_data",
                &[
                    "EFLI", "AFLI", "RISS", "ZWAUS", "ZWBIN", "ZWONA", "ZWRSF", "ZWSCH",
                    "ZWAFLI", "ZWBORD", "ZWEFLI", "ZWRISS", "ZWWURZ", "GW", "GEB", "SUB",
                ],
            ),
            AutoMapRule::new("hiline_section", &["VNK", "NNK"]),
            AutoMapRule::new("hiline_lane", &["FS"]),
        ])
    }
}
