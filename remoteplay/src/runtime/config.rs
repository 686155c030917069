//! Persisted key-value config.
//!
//! Stores the last machine used and the API credential so they don't have to
//! be repeated on every invocation. Rewritten after every successful lookup.

use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// `<config dir>/remoteplay/config.json`
pub fn default_config_path() -> RemoteplayResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("remoteplay").join("config.json"))
        .ok_or_else(|| RemoteplayError::Config("cannot determine user config directory".into()))
}

impl StoredConfig {
    /// Load the config. A missing file yields an empty config.
    pub fn load(path: &Path) -> RemoteplayResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                RemoteplayError::Config(format!("invalid config at {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> RemoteplayResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        tracing::debug!(path = %path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let config = StoredConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, StoredConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = StoredConfig {
            machine: Some("Arcturus".into()),
            api_key: Some("MOCK_KEY".into()),
        };

        config.save(&path).unwrap();

        assert_eq!(StoredConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "machine = Arcturus").unwrap();

        let err = StoredConfig::load(&path).unwrap_err();
        assert!(matches!(err, RemoteplayError::Config(_)));
    }
}
