//! Remembers which template was last used for each property.
//!
//! Best effort only: a missing, unreadable or corrupt file behaves like an
//! empty one, and write failures are logged and otherwise ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePreference {
    pub template_id: String,
    pub last_used: DateTime<Utc>,
}

type PreferenceMap = HashMap<String, TemplatePreference>;

#[derive(Debug, Clone, Default)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A store that remembers nothing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn load(&self, property_id: &str) -> Option<TemplatePreference> {
        let path = self.path.as_ref()?;
        read_map(path).remove(property_id)
    }

    /// Remember `template_id` for the property, stamped with the current time
    pub fn save(&self, property_id: &str, template_id: &str) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let mut map = read_map(path);
        map.insert(
            property_id.to_string(),
            TemplatePreference {
                template_id: template_id.to_string(),
                last_used: Utc::now(),
            },
        );
        write_map(path, &map);
    }

    pub fn clear(&self, property_id: &str) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        let mut map = read_map(path);
        if map.remove(property_id).is_some() {
            write_map(path, &map);
        }
    }
}

fn read_map(path: &Path) -> PreferenceMap {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return PreferenceMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read preferences");
            return PreferenceMap::new();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt preferences");
        PreferenceMap::new()
    })
}

fn write_map(path: &Path, map: &PreferenceMap) {
    let result = serde_json::to_string_pretty(map)
        .map_err(std::io::Error::other)
        .and_then(|json| {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)
        });
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "Failed to save preferences");
    }
}
