//! Transformation module.
//!
//! Turns a source table into the target field table:
//! - Rules: per `(field, column)` extraction rules
//! - Extractor: applies the rules to one raw value
//! - Mapping: which column feeds which field, plus auto-mapping
//! - Engine: row by row calculation with progress and cancellation

pub mod engine;
pub mod extractor;
pub mod mapping;
pub mod progress;
pub mod rules;

pub use engine::{calculate, CalcOptions, DEFAULT_PROGRESS_EVERY};
pub use extractor::{extract, extract_or_empty, RuleExtractor, ValueExtractor};
pub use mapping::{AutoMapRule, AutoMapRules, MappingEntry, MappingTable};
pub use progress::{CancelToken, LogProgress, NoProgress, ProgressSink};
pub use rules::{rules_description, ExtractionRule, Half, RoadPart, RuleEntry, RuleTable};
