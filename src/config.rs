//! Tracker Configuration
//!
//! The set of known checklists: which record store key each class uses and
//! which page renders it.

use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// One known checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    /// Record store key of the checklist
    pub key: String,
    /// Page rendering the checklist
    pub href: String,
}

impl ChecklistEntry {
    pub fn new(key: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            href: href.into(),
        }
    }
}

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub checklists: Vec<ChecklistEntry>,
    /// File name suggested for exported backups
    #[serde(default = "default_backup_file_name")]
    pub backup_file_name: String,
}

fn default_backup_file_name() -> String {
    "edf-progress.json".to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            checklists: vec![
                ChecklistEntry::new("rangerSave", "Ranger.html"),
                ChecklistEntry::new("wingdiverSave", "Wingdiver.html"),
                ChecklistEntry::new("airraiderSave", "AirRaider.html"),
                ChecklistEntry::new("fencerSave", "Fencer.html"),
            ],
            backup_file_name: default_backup_file_name(),
        }
    }
}

impl TrackerConfig {
    /// Load from JSON; duplicate storage keys are rejected
    pub fn from_json(raw: &str) -> TrackerResult<Self> {
        let config: TrackerConfig = serde_json::from_str(raw)?;
        let mut seen = std::collections::HashSet::new();
        for entry in &config.checklists {
            if !seen.insert(entry.key.as_str()) {
                return Err(TrackerError::InvalidInput(format!(
                    "duplicate checklist key {}",
                    entry.key
                )));
            }
        }
        Ok(config)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.checklists.iter().map(|entry| entry.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classes() {
        let config = TrackerConfig::default();
        let keys: Vec<_> = config.keys().collect();
        assert_eq!(keys, vec!["rangerSave", "wingdiverSave", "airraiderSave", "fencerSave"]);
        assert_eq!(config.backup_file_name, "edf-progress.json");
    }

    #[test]
    fn test_from_json() {
        let config = TrackerConfig::from_json(
            r#"{"checklists":[{"key":"aSave","href":"A.html"}]}"#,
        )
        .unwrap();
        assert_eq!(config.checklists, vec![ChecklistEntry::new("aSave", "A.html")]);
        assert_eq!(config.backup_file_name, "edf-progress.json");
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let result = TrackerConfig::from_json(
            r#"{"checklists":[{"key":"a","href":"A.html"},{"key":"a","href":"B.html"}]}"#,
        );
        assert!(matches!(result, Err(TrackerError::InvalidInput(_))));
    }
}
