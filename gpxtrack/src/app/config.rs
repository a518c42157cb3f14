//! Application configuration for `TrackerApp`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TileCacheConfig;
use crate::config::{default_data_dir, ConfigFile, DEFAULT_DATE_FORMAT};
use crate::stopwatch::DEFAULT_TICK_INTERVAL;

/// Sub-directory of a base directory holding cached tiles.
pub const TILES_DIR_NAME: &str = "tiles";

/// Sub-directory of a base directory holding saved GPX files.
pub const FILES_DIR_NAME: &str = "gpx";

/// Everything [`TrackerApp`](super::TrackerApp) needs besides preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub tile_cache: TileCacheConfig,

    /// Directory of the recovery journal.
    pub data_dir: PathBuf,

    /// Directory saved GPX files go to.
    pub files_dir: PathBuf,

    /// Pattern for default file names, see [`crate::filename`].
    pub date_format: String,

    pub date_use_utc: bool,

    /// Interval of elapsed-time ticks.
    pub tick_interval: Duration,
}

impl AppConfig {
    /// Keeps every file under `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            tile_cache: TileCacheConfig::new(base_dir.join(TILES_DIR_NAME)),
            data_dir: base_dir.to_path_buf(),
            files_dir: base_dir.join(FILES_DIR_NAME),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            date_use_utc: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Builds the application config from the INI file settings.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        Self {
            tile_cache: TileCacheConfig::from_config(config),
            data_dir: default_data_dir(),
            files_dir: config.files.directory.clone(),
            date_format: config.files.date_format.clone(),
            date_use_utc: config.files.date_use_utc,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn with_tile_cache(mut self, tile_cache: TileCacheConfig) -> Self {
        self.tile_cache = tile_cache;
        self
    }

    pub fn with_date_format(mut self, pattern: impl Into<String>, use_utc: bool) -> Self {
        self.date_format = pattern.into();
        self.date_use_utc = use_utc;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}
