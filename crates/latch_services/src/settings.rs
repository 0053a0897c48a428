//! Settings management

use latch_memory::{MemoryContext, Zone};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub memory: MemorySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub global_zone: ZoneSettings,
    pub system_zone: ZoneSettings,
    pub hash_set: HashSetSettings,
}

/// A zone's name and budget; a budget of 0 means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    pub name: String,
    #[serde(default)]
    pub budget_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSetSettings {
    pub initial_size: usize,
    pub growth_factor: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            global_zone: ZoneSettings::unbounded("global"),
            system_zone: ZoneSettings::unbounded("system"),
            hash_set: HashSetSettings::default(),
        }
    }
}

impl Default for HashSetSettings {
    fn default() -> Self {
        Self {
            initial_size: 16,
            growth_factor: 2,
        }
    }
}

impl ZoneSettings {
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            budget_bytes: 0,
        }
    }

    pub fn build(&self) -> Zone {
        Zone::new(self.name.clone(), self.budget_bytes)
    }
}

impl MemorySettings {
    pub fn build_context(&self) -> MemoryContext {
        MemoryContext::new(self.global_zone.build(), self.system_zone.build())
    }
}

impl Settings {
    /// Read settings from a JSON file. Missing sections take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let memory = &self.memory;
        for zone in [&memory.global_zone, &memory.system_zone] {
            if zone.name.trim().is_empty() {
                return Err(SettingsError::Invalid("zone name must not be empty".into()));
            }
        }
        if memory.hash_set.initial_size == 0 {
            return Err(SettingsError::Invalid(
                "hash_set.initial_size must be non-zero".into(),
            ));
        }
        if memory.hash_set.growth_factor < 2 {
            return Err(SettingsError::Invalid(format!(
                "hash_set.growth_factor must be at least 2, got {}",
                memory.hash_set.growth_factor
            )));
        }
        Ok(())
    }
}
