//! INI configuration file.
//!
//! Stored at `~/.config/gpxtrack/config.ini` (platform config dir). A missing
//! file yields defaults; unknown keys are ignored so older binaries can read
//! newer files.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::{debug, warn};

use super::preferences::ActivityType;
use crate::provider::{catalog, TileServerDescriptor};
use crate::units::Units;

/// Application directory name under the platform config/cache/data dirs.
pub const APP_DIR_NAME: &str = "gpxtrack";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default tile cache budget in megabytes.
pub const DEFAULT_MAX_CACHE_MB: u64 = 200;

/// Default tile fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

/// Default size of the tile fetch worker pool.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Default save-name pattern.
pub const DEFAULT_DATE_FORMAT: &str = "{dd}-{MMM}-{yyyy}-{HH}{mm}";

/// Errors reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: ini::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}

/// `[tiles]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesSettings {
    /// Provider id or catalog index.
    pub provider: String,
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub max_cache_mb: u64,
    pub fetch_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
}

impl Default for TilesSettings {
    fn default() -> Self {
        Self {
            provider: catalog::default_provider().id.to_string(),
            use_cache: true,
            cache_dir: default_cache_dir(),
            max_cache_mb: DEFAULT_MAX_CACHE_MB,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl TilesSettings {
    /// Resolves the configured provider against the catalog.
    ///
    /// Accepts a provider id or a numeric catalog index. Anything the catalog
    /// does not know, including an index past the end, falls back to the
    /// default provider.
    pub fn resolve_provider(&self) -> &'static TileServerDescriptor {
        resolve_provider(&self.provider)
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.max_cache_mb.saturating_mul(1024 * 1024)
    }
}

/// Resolves a provider id or index, falling back to the default provider.
pub fn resolve_provider(value: &str) -> &'static TileServerDescriptor {
    let value = value.trim();
    let resolved = match value.parse::<usize>() {
        Ok(index) => catalog::by_index(index),
        Err(_) => catalog::lookup(value),
    };
    resolved.unwrap_or_else(|e| {
        warn!(provider = value, error = %e, "Unsupported tile provider, using default");
        catalog::default_provider()
    })
}

/// `[tracking]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingSettings {
    pub units: Units,
    pub activity_type: ActivityType,
}

/// `[files]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesSettings {
    /// Directory GPX files are saved to.
    pub directory: PathBuf,
    /// Pattern for default save names.
    pub date_format: String,
    pub date_use_utc: bool,
}

impl Default for FilesSettings {
    fn default() -> Self {
        Self {
            directory: default_files_dir(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            date_use_utc: false,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    /// Directory for rolling log files; stderr only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub tiles: TilesSettings,
    pub tracking: TrackingSettings,
    pub files: FilesSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`. A missing file yields defaults; a malformed value
    /// is logged and replaced by its default.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_ini(&ini))
    }

    /// Saves to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Writes every setting to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        self.to_ini().write_to_file(path).map_err(write_err)
    }

    fn from_ini(ini: &Ini) -> Self {
        let mut config = Self::default();
        for key in super::ConfigKey::all() {
            let Some(value) = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()))
            else {
                continue;
            };
            if let Err(e) = key.set(&mut config, value) {
                warn!(key = key.name(), error = %e, "Ignoring invalid config value");
            }
        }
        config
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in super::ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }
}

/// Platform config directory for the application.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Default tile cache directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("tiles")
}

/// Default directory for application data (recovery journal).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default directory for saved GPX files.
pub fn default_files_dir() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(default_data_dir)
        .join("GPX")
}

/// Formats a byte count for humans, e.g. `1.5 GB`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("none.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert!(config.tiles.use_cache);
        assert_eq!(config.tiles.max_cache_mb, DEFAULT_MAX_CACHE_MB);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.tiles.provider = "openTopoMap".to_string();
        config.tiles.use_cache = false;
        config.tracking.units = Units::Imperial;
        config.tracking.activity_type = ActivityType::Fitness;
        config.files.date_use_utc = true;
        config.logging.directory = Some(temp.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_fall_back_and_unknown_keys_ignored() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[tiles]\nuse_cache = maybe\nmax_cache_mb = 64\nfuture_key = 1\n[extra]\nx = y\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert!(config.tiles.use_cache);
        assert_eq!(config.tiles.max_cache_mb, 64);
        assert_eq!(config.tiles.max_cache_bytes(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_resolve_provider_by_id_index_and_fallback() {
        assert_eq!(resolve_provider("cartoDB").id, "cartoDB");
        assert_eq!(resolve_provider("2").id, catalog::by_index(2).unwrap().id);
        assert_eq!(resolve_provider("99").id, catalog::default_provider().id);
        assert_eq!(resolve_provider("bing").id, catalog::default_provider().id);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
