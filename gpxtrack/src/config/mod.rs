//! Configuration: the INI file on disk and the live preferences derived
//! from it.

mod file;
mod keys;
mod preferences;

pub use file::{
    config_dir, config_file_path, default_cache_dir, default_data_dir, default_files_dir,
    format_size, resolve_provider, ConfigError, ConfigFile, FilesSettings, LoggingSettings,
    TilesSettings, TrackingSettings, APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_DATE_FORMAT,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CACHE_MB, DEFAULT_MAX_CONCURRENT_FETCHES,
};
pub use keys::ConfigKey;
pub use preferences::{ActivityType, ConfigSource, Preferences, SharedPreferences};
