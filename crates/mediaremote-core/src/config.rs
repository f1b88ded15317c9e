//! Controller configuration.
//!
//! The controller identifier (`device_id`) and `unique_identifier` are created
//! once and written back to the config file, so that every later pairing
//! attempt presents the same identity to the peer.

use crate::device::DeviceId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const DEFAULT_NAME: &str = "MediaRemote Controller";

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

/// Persistent controller identity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name shown to the peer.
    #[serde(default = "default_name")]
    pub name: String,
    /// MAC-style identifier, used as the pairing identifier.
    #[serde(default)]
    pub device_id: String,
    /// Stable UUID for this controller installation.
    #[serde(default)]
    pub unique_identifier: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            device_id: String::new(),
            unique_identifier: String::new(),
        }
    }
}

impl DeviceConfig {
    /// Load config from `path`, generating and persisting any missing identifiers.
    ///
    /// A missing file is treated as an empty config.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let data = fs::read_to_string(path)?;
            serde_json::from_str::<Self>(&data)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        if config.fill_missing() {
            config.save(path)?;
            tracing::info!(
                path = %path.display(),
                device_id = %config.device_id,
                "Created controller identity"
            );
        }
        Ok(config)
    }

    /// Fill in absent identifiers. Returns true if anything changed.
    pub fn fill_missing(&mut self) -> bool {
        let mut changed = false;
        if self.unique_identifier.is_empty() {
            self.unique_identifier = uuid::Uuid::new_v4().to_string();
            changed = true;
        }
        if self.device_id.is_empty() {
            self.device_id = DeviceId::generate().to_mac_string();
            changed = true;
        }
        changed
    }

    /// Write config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Identifier bytes sent in the pairing handshakes.
    pub fn pairing_id(&self) -> Vec<u8> {
        self.device_id.as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_file_with_generated_identifiers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let config = DeviceConfig::load_or_create(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.device_id.len(), 17);
        assert_eq!(config.device_id.matches(':').count(), 5);
        assert!(uuid::Uuid::parse_str(&config.unique_identifier).is_ok());
    }

    #[test]
    fn reload_returns_same_identity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let first = DeviceConfig::load_or_create(&path).unwrap();
        let second = DeviceConfig::load_or_create(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn keeps_existing_values_and_fills_gaps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"name": "Living Room", "device_id": "aa:bb:cc:dd:ee:ff"}"#).unwrap();

        let config = DeviceConfig::load_or_create(&path).unwrap();
        assert_eq!(config.name, "Living Room");
        assert_eq!(config.device_id, "aa:bb:cc:dd:ee:ff");
        assert!(!config.unique_identifier.is_empty());

        let on_disk: DeviceConfig =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.unique_identifier, config.unique_identifier);
    }

    #[test]
    fn invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let result = DeviceConfig::load_or_create(&path);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn pairing_id_is_device_id_bytes() {
        let config = DeviceConfig {
            device_id: "01:02:03:04:05:06".to_string(),
            ..Default::default()
        };
        assert_eq!(config.pairing_id(), b"01:02:03:04:05:06".to_vec());
    }
}
