//! Profile Registry - Store and reuse mappings
//!
//! Saves named mappings to disk and matches them to CSV files by their columns.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_PROFILE_DIR;
use crate::error::{RegistryError, RegistryResult};
use crate::models::TargetFieldSet;
use crate::transform::mapping::MappingTable;

/// Minimum column overlap for a profile to count as compatible.
const COMPATIBILITY_THRESHOLD: f64 = 0.5;

/// A stored mapping with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProfile {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Target field list the mapping was made for
    pub fields: TargetFieldSet,
    /// The mapping itself
    pub mapping: MappingTable,
    /// CSV columns of the file the profile was saved from
    pub csv_columns: Vec<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last time this profile was applied
    pub last_used: Option<String>,
    /// Number of times applied
    pub use_count: u32,
}

/// Registry for managing mapping profiles
pub struct ProfileRegistry {
    registry_dir: PathBuf,
    profiles: HashMap<String, StoredProfile>,
}

impl ProfileRegistry {
    /// Open the registry in the default directory
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_PROFILE_DIR)
    }

    /// Open a registry in a custom directory, loading existing profiles
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            profiles: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Unreadable or malformed files are skipped.
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Ok(content) = fs::read_to_string(&path) {
                    if let Ok(profile) = serde_json::from_str::<StoredProfile>(&content) {
                        self.profiles.insert(profile.id.clone(), profile);
                    }
                }
            }
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    fn write(&self, profile: &StoredProfile) -> RegistryResult<()> {
        fs::create_dir_all(&self.registry_dir)?;
        let content = serde_json::to_string_pretty(profile)?;
        fs::write(self.path_for(&profile.id), content)?;
        Ok(())
    }

    /// All profiles, most recently created first
    pub fn list(&self) -> Vec<&StoredProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        profiles
    }

    pub fn get(&self, id: &str) -> Option<&StoredProfile> {
        self.profiles.get(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles whose columns overlap `csv_columns` by more than half, best first
    pub fn find_compatible(&self, csv_columns: &[String]) -> Vec<(&StoredProfile, f64)> {
        let mut compatible: Vec<_> = self
            .profiles
            .values()
            .filter_map(|p| {
                let score = compatibility(&p.csv_columns, csv_columns);
                (score > COMPATIBILITY_THRESHOLD).then_some((p, score))
            })
            .collect();

        compatible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.use_count.cmp(&a.0.use_count))
        });

        compatible
    }

    /// Save a mapping under a new id
    pub fn save(
        &mut self,
        name: &str,
        fields: TargetFieldSet,
        mapping: MappingTable,
        csv_columns: Vec<String>,
    ) -> RegistryResult<String> {
        let id = generate_id(name);
        let stored = StoredProfile {
            id: id.clone(),
            name: name.to_string(),
            fields,
            mapping,
            csv_columns,
            created_at: chrono::Utc::now().to_rfc3339(),
            last_used: None,
            use_count: 0,
        };

        self.write(&stored)?;
        self.profiles.insert(id.clone(), stored);
        Ok(id)
    }

    /// Record that a profile was applied
    pub fn mark_used(&mut self, id: &str) -> RegistryResult<&StoredProfile> {
        let profile = self
            .profiles
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        profile.last_used = Some(chrono::Utc::now().to_rfc3339());
        profile.use_count += 1;

        let profile = &self.profiles[id];
        self.write(profile)?;
        Ok(profile)
    }

    pub fn delete(&mut self, id: &str) -> RegistryResult<StoredProfile> {
        let profile = self
            .profiles
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(profile)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Share of stored columns present in `csv` (case-insensitive)
fn compatibility(stored: &[String], csv: &[String]) -> f64 {
    if stored.is_empty() {
        return 0.0;
    }

    let csv_lower: Vec<String> = csv.iter().map(|c| c.to_lowercase()).collect();
    let match_count = stored
        .iter()
        .filter(|col| csv_lower.contains(&col.to_lowercase()))
        .count();

    match_count as f64 / stored.len() as f64
}

/// Slug of the name plus a millisecond timestamp
fn generate_id(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "profile".to_string() } else { slug };

    format!("{}-{}", slug, chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_mapping() -> MappingTable {
        MappingTable::from_pairs([("KLASSE", "hiline_road"), ("VNK", "hiline_section")])
    }

    #[test]
    fn test_compatibility_score() {
        let stored = columns(&["ID", "hiline_road", "hiline_section"]);
        let csv = columns(&["ID", "hiline_road", "other"]);
        assert!((compatibility(&stored, &csv) - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_case_insensitive_match() {
        let stored = columns(&["id", "HILINE_ROAD"]);
        let csv = columns(&["ID", "hiline_road"]);
        assert!((compatibility(&stored, &csv) - 1.0).abs() < 0.01);
        assert_eq!(compatibility(&[], &csv), 0.0);
    }

    #[test]
    fn test_generate_id_slug() {
        let id = generate_id("Road Survey 2024!");
        assert!(id.starts_with("road-survey-2024-"));
        assert!(generate_id("***").starts_with("profile-"));
    }

    #[test]
    fn test_save_reload_and_delete() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let fields = TargetFieldSet::new(["KLASSE", "VNK"]).unwrap();
        let id = registry
            .save("survey", fields.clone(), sample_mapping(), columns(&["hiline_road", "hiline_section"]))
            .unwrap();

        let reloaded = ProfileRegistry::with_dir(dir.path());
        let profile = reloaded.get(&id).unwrap();
        assert_eq!(profile.name, "survey");
        assert_eq!(profile.fields, fields);
        assert_eq!(profile.mapping, sample_mapping());
        assert_eq!(profile.use_count, 0);

        registry.delete(&id).unwrap();
        assert!(registry.is_empty());
        assert!(ProfileRegistry::with_dir(dir.path()).is_empty());
        assert!(matches!(registry.delete(&id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_mark_used_persists() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let id = registry
            .save("p", TargetFieldSet::default(), sample_mapping(), columns(&["hiline_road"]))
            .unwrap();

        registry.mark_used(&id).unwrap();
        registry.mark_used(&id).unwrap();

        let reloaded = ProfileRegistry::with_dir(dir.path());
        let profile = reloaded.get(&id).unwrap();
        assert_eq!(profile.use_count, 2);
        assert!(profile.last_used.is_some());
        assert!(matches!(registry.mark_used("missing"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_find_compatible_threshold_and_order() {
        let dir = tempdir().unwrap();
        let mut registry = ProfileRegistry::with_dir(dir.path());
        let fields = TargetFieldSet::default();
        registry
            .save("full", fields.clone(), sample_mapping(), columns(&["a", "b"]))
            .unwrap();
        registry
            .save("partial", fields.clone(), sample_mapping(), columns(&["a", "b", "x"]))
            .unwrap();
        registry
            .save("half", fields, sample_mapping(), columns(&["a", "y"]))
            .unwrap();

        let found = registry.find_compatible(&columns(&["A", "B", "C"]));
        let names: Vec<&str> = found.iter().map(|(p, _)| p.name.as_str()).collect();
        assert_eq!(names, ["full", "partial"]);
    }

    #[test]
    fn test_malformed_files_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert!(ProfileRegistry::with_dir(dir.path()).is_empty());
    }
}
