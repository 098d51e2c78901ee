//! Configuration from the environment (and `.env`, loaded by the binary).
//!
//! | Variable                  | Meaning                                   | Default               |
//! |---------------------------|-------------------------------------------|-----------------------|
//! | `FIELDMAP_FIELDS_FILE`    | Target field list (lines or JSON array)   | built-in list         |
//! | `FIELDMAP_RULES_FILE`     | Smart auto-map rules (JSON)               | built-in rules        |
//! | `FIELDMAP_EXTRACTION_RULES_FILE` | Per-field extraction rules (JSON)  | built-in rules        |
//! | `FIELDMAP_PROFILE_DIR`    | Directory of saved mapping profiles       | `.fieldmap/profiles`  |
//! | `FIELDMAP_PORT`           | HTTP port                                 | `3000`                |
//! | `FIELDMAP_PROGRESS_EVERY` | Rows between progress notifications       | `100`                 |

use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::models::TargetFieldSet;
use crate::transform::engine::DEFAULT_PROGRESS_EVERY;
use crate::transform::mapping::AutoMapRules;
use crate::transform::rules::RuleTable;

pub const ENV_FIELDS_FILE: &str = "FIELDMAP_FIELDS_FILE";
pub const ENV_RULES_FILE: &str = "FIELDMAP_RULES_FILE";
pub const ENV_EXTRACTION_RULES_FILE: &str = "FIELDMAP_EXTRACTION_RULES_FILE";
pub const ENV_PROFILE_DIR: &str = "FIELDMAP_PROFILE_DIR";
pub const ENV_PORT: &str = "FIELDMAP_PORT";
pub const ENV_PROGRESS_EVERY: &str = "FIELDMAP_PROGRESS_EVERY";

pub const DEFAULT_PROFILE_DIR: &str = ".fieldmap/profiles";
pub const DEFAULT_PORT: u16 = 3000;

/// Settings shared by the CLI and the server
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub fields_file: Option<PathBuf>,
    pub rules_file: Option<PathBuf>,
    pub extraction_rules_file: Option<PathBuf>,
    pub profile_dir: PathBuf,
    pub port: u16,
    pub progress_every: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fields_file: None,
            rules_file: None,
            extraction_rules_file: None,
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            port: DEFAULT_PORT,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

impl AppConfig {
    /// Read settings from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through a lookup function (testable without touching the environment).
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.fields_file = non_empty(ENV_FIELDS_FILE).map(PathBuf::from);
        config.rules_file = non_empty(ENV_RULES_FILE).map(PathBuf::from);
        config.extraction_rules_file = non_empty(ENV_EXTRACTION_RULES_FILE).map(PathBuf::from);
        if let Some(dir) = non_empty(ENV_PROFILE_DIR) {
            config.profile_dir = PathBuf::from(dir);
        }
        if let Some(port) = non_empty(ENV_PORT) {
            config.port = parse_value(ENV_PORT, &port)?;
        }
        if let Some(every) = non_empty(ENV_PROGRESS_EVERY) {
            let every: usize = parse_value(ENV_PROGRESS_EVERY, &every)?;
            if every == 0 {
                return Err(ConfigError::InvalidValue {
                    key: ENV_PROGRESS_EVERY.to_string(),
                    value: "0".to_string(),
                });
            }
            config.progress_every = every;
        }

        Ok(config)
    }

    /// Target fields from the configured file, or the built-in list.
    pub fn target_fields(&self) -> ConfigResult<TargetFieldSet> {
        match &self.fields_file {
            Some(path) => load_fields(path),
            None => Ok(TargetFieldSet::default()),
        }
    }

    /// Auto-map rules from the configured file, or the built-in rules.
    pub fn auto_map_rules(&self) -> ConfigResult<AutoMapRules> {
        match &self.rules_file {
            Some(path) => load_rules(path),
            None => Ok(AutoMapRules::default()),
        }
    }

    /// Extraction rules from the configured file, or the built-in table.
    ///
    /// A file replaces the built-in table; pairs it does not list pass
    /// values through unchanged.
    pub fn extraction_rules(&self) -> ConfigResult<RuleTable> {
        match &self.extraction_rules_file {
            Some(path) => load_extraction_rules(path),
            None => Ok(RuleTable::default()),
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn read(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Parse a field list: a JSON array of names, or one name per line.
pub fn parse_fields(text: &str) -> ConfigResult<TargetFieldSet> {
    if text.trim_start().starts_with('[') {
        let names: Vec<String> = serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: "<fields>".to_string(),
            source,
        })?;
        let names = names.into_iter().map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        return Ok(TargetFieldSet::new(names)?);
    }
    Ok(TargetFieldSet::parse_lines(text)?)
}

/// Load a field list from a file.
pub fn load_fields(path: &Path) -> ConfigResult<TargetFieldSet> {
    parse_fields(&read(path)?).map_err(|err| match err {
        ConfigError::Json { source, .. } => ConfigError::Json {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

/// Load auto-map rules from a JSON file.
pub fn load_rules(path: &Path) -> ConfigResult<AutoMapRules> {
    serde_json::from_str(&read(path)?).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Load an extraction rule table from a JSON file.
pub fn load_extraction_rules(path: &Path) -> ConfigResult<RuleTable> {
    serde_json::from_str(&read(path)?).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;
    use crate::transform::rules::{ExtractionRule, Half};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.progress_every, 100);
        assert_eq!(config.profile_dir, PathBuf::from(".fieldmap/profiles"));
        assert_eq!(config.target_fields().unwrap(), TargetFieldSet::default());
        assert_eq!(config.auto_map_rules().unwrap(), AutoMapRules::default());
        assert_eq!(config.extraction_rules().unwrap(), RuleTable::default());
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_PORT, "8080"),
            (ENV_PROGRESS_EVERY, "10"),
            (ENV_PROFILE_DIR, "/tmp/profiles"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.progress_every, 10);

        assert!(matches!(
            AppConfig::from_lookup(lookup(&[(ENV_PORT, "http")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(AppConfig::from_lookup(lookup(&[(ENV_PROGRESS_EVERY, "0")])).is_err());
    }

    #[test]
    fn test_parse_fields_formats() {
        let lines = parse_fields("ID\nKLASSE\n\nNUMMER\n").unwrap();
        let json = parse_fields(r#"["ID", "KLASSE", "NUMMER"]"#).unwrap();
        assert_eq!(lines, json);

        assert!(matches!(
            parse_fields("ID\nID"),
            Err(ConfigError::Input(InputError::DuplicateField(_)))
        ));
        assert!(matches!(parse_fields("[1, 2]"), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_load_files() {
        let dir = tempdir().unwrap();
        let fields_path = dir.path().join("fields.txt");
        let rules_path = dir.path().join("rules.json");
        std::fs::write(&fields_path, "A\nB\n").unwrap();
        std::fs::write(&rules_path, r#"[{"source":"col","targets":["A"]}]"#).unwrap();

        let config = AppConfig {
            fields_file: Some(fields_path),
            rules_file: Some(rules_path),
            ..AppConfig::default()
        };
        assert_eq!(config.target_fields().unwrap().as_slice(), ["A", "B"]);
        assert_eq!(config.auto_map_rules().unwrap().len(), 1);

        let missing = AppConfig {
            fields_file: Some(dir.path().join("nope.txt")),
            ..AppConfig::default()
        };
        assert!(matches!(missing.target_fields(), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_extraction_rules_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extraction.json");
        std::fs::write(
            &path,
            r#"[{"target":"KLASSE","source":"hiline_road","rule":{"type":"split_half","half":"first"}}]"#,
        )
        .unwrap();

        let config = AppConfig::from_lookup(lookup(&[(
            ENV_EXTRACTION_RULES_FILE,
            path.to_str().unwrap(),
        )]))
        .unwrap();
        assert_eq!(config.extraction_rules_file.as_deref(), Some(path.as_path()));

        let table = config.extraction_rules().unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.rule_for("KLASSE", "HILINE_ROAD"),
            ExtractionRule::SplitHalf { half: Half::First }
        );

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(config.extraction_rules(), Err(ConfigError::Json { .. })));
    }
}
