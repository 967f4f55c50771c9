/// Picker configuration
///
/// These values tune the thumbnail pipeline and point the folder-backed
/// library at a directory. They are serialized to JSON and stored in the
/// user's configuration directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PickerError;
use crate::state::data::Size;

/// Size requested for list thumbnails (square)
const DEFAULT_THUMBNAIL_EDGE: u32 = 150;

/// All tunables for the picker core
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PickerConfig {
    /// Target size for list thumbnails
    pub thumbnail_size: Size,

    /// Maximum number of decoded thumbnails kept in the loader cache
    pub thumbnail_cache_capacity: usize,

    /// Maximum number of decodes running at once
    pub max_concurrent_loads: usize,

    /// Whether hidden assets are listed
    pub include_hidden: bool,

    /// Folder scanned by the folder-backed library (None = not configured)
    pub library_root: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    pub log_level: String,
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: Size::square(DEFAULT_THUMBNAIL_EDGE),
            thumbnail_cache_capacity: 256,
            max_concurrent_loads: 4,
            include_hidden: false,
            library_root: None,
            log_level: "info".to_string(),
        }
    }
}

impl PickerConfig {
    /// Get the path where the configuration file lives
    /// - Linux: ~/.config/photo-picker/config.json
    /// - macOS: ~/Library/Application Support/photo-picker/config.json
    /// - Windows: %APPDATA%\photo-picker\config.json
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir().or_else(dirs::home_dir)?;
        path.push("photo-picker");
        path.push("config.json");
        Some(path)
    }

    /// Load the configuration from its default location.
    /// A missing file yields the defaults.
    pub fn load() -> Result<Self, PickerError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load the configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, PickerError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "Loaded picker config");
        Ok(config)
    }

    /// Write the configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), PickerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reject values the loaders cannot work with
    pub fn validate(&self) -> Result<(), PickerError> {
        if self.thumbnail_size.is_empty() {
            return Err(PickerError::InvalidConfig(
                "thumbnail_size must be non-zero".into(),
            ));
        }
        if self.thumbnail_cache_capacity == 0 {
            return Err(PickerError::InvalidConfig(
                "thumbnail_cache_capacity must be at least 1".into(),
            ));
        }
        if self.max_concurrent_loads == 0 {
            return Err(PickerError::InvalidConfig(
                "max_concurrent_loads must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PickerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thumbnail_size, Size::square(150));
        assert!(!config.include_hidden);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = PickerConfig::from_json(r#"{ "max_concurrent_loads": 8 }"#).unwrap();

        assert_eq!(config.max_concurrent_loads, 8);
        assert_eq!(config.thumbnail_cache_capacity, 256);
        assert_eq!(config.library_root, None);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = PickerConfig::default();
        config.max_concurrent_loads = 0;

        assert!(matches!(
            config.validate(),
            Err(PickerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PickerConfig::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, PickerConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = PickerConfig::default();
        config.include_hidden = true;
        config.library_root = Some(PathBuf::from("/srv/photos"));
        config.save_to(&path).unwrap();

        assert_eq!(PickerConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            PickerConfig::load_from(&path),
            Err(PickerError::Config(_))
        ));
    }
}
