//! Service configuration.

use crate::platform::{
    get_default_config_path, get_default_local_store_path, get_default_remote_store_path,
};
use crate::{Result, SlatePassError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// File backing the local store
    pub local_store: PathBuf,
    /// File backing the remote store
    pub remote_store: PathBuf,
    /// Seconds between reconciliation passes
    pub sync_interval_secs: u64,
    /// Largest accepted native-messaging frame, in bytes
    pub max_frame_len: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            local_store: get_default_local_store_path(),
            remote_store: get_default_remote_store_path(),
            sync_interval_secs: 5,
            max_frame_len: 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SlatePassError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml_dep::from_str(&content)
            .map_err(|e| SlatePassError::Config(format!("Invalid {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default config file when it exists, or defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = get_default_config_path();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            debug!("No config at {}, using defaults", default_path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(SlatePassError::Config(
                "sync_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_frame_len == 0 {
            return Err(SlatePassError::Config(
                "max_frame_len must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.sync_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slatepass.toml");
        std::fs::write(
            &path,
            "local_store = \"/tmp/l.json\"\nsync_interval_secs = 30\n",
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.local_store, PathBuf::from("/tmp/l.json"));
        assert_eq!(config.sync_interval_secs, 30);
        assert_eq!(config.remote_store, get_default_remote_store_path());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slatepass.toml");

        std::fs::write(&path, "sync_interval_secs = 0\n").unwrap();
        assert!(matches!(
            ServiceConfig::load(&path),
            Err(SlatePassError::Config(_))
        ));

        std::fs::write(&path, "sync_interval_secs = \"soon\"\n").unwrap();
        assert!(matches!(
            ServiceConfig::load(&path),
            Err(SlatePassError::Config(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ServiceConfig::load_or_default(Some(&missing)).is_err());
    }
}
