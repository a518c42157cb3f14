//! Typed `section.key` access to [`ConfigFile`] settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile};
use super::preferences::ActivityType;
use crate::filename::parse_date_pattern;
use crate::provider::catalog;
use crate::units::Units;

/// Every user-settable configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TilesProvider,
    TilesUseCache,
    TilesCacheDir,
    TilesMaxCacheMb,
    TilesFetchTimeoutSecs,
    TilesMaxConcurrentFetches,
    TrackingUnits,
    TrackingActivityType,
    FilesDirectory,
    FilesDateFormat,
    FilesDateUseUtc,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            TilesProvider,
            TilesUseCache,
            TilesCacheDir,
            TilesMaxCacheMb,
            TilesFetchTimeoutSecs,
            TilesMaxConcurrentFetches,
            TrackingUnits,
            TrackingActivityType,
            FilesDirectory,
            FilesDateFormat,
            FilesDateUseUtc,
            LoggingLevel,
            LoggingDirectory,
        ]
    }

    /// Full name, e.g. `tiles.use_cache`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            TilesProvider
            | TilesUseCache
            | TilesCacheDir
            | TilesMaxCacheMb
            | TilesFetchTimeoutSecs
            | TilesMaxConcurrentFetches => "tiles",
            TrackingUnits | TrackingActivityType => "tracking",
            FilesDirectory | FilesDateFormat | FilesDateUseUtc => "files",
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            TilesProvider => "provider",
            TilesUseCache => "use_cache",
            TilesCacheDir => "cache_dir",
            TilesMaxCacheMb => "max_cache_mb",
            TilesFetchTimeoutSecs => "fetch_timeout_secs",
            TilesMaxConcurrentFetches => "max_concurrent_fetches",
            TrackingUnits => "units",
            TrackingActivityType => "activity_type",
            FilesDirectory => "directory",
            FilesDateFormat => "date_format",
            FilesDateUseUtc => "date_use_utc",
            LoggingLevel => "level",
            LoggingDirectory => "directory",
        }
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            TilesProvider => config.tiles.provider.clone(),
            TilesUseCache => config.tiles.use_cache.to_string(),
            TilesCacheDir => config.tiles.cache_dir.display().to_string(),
            TilesMaxCacheMb => config.tiles.max_cache_mb.to_string(),
            TilesFetchTimeoutSecs => config.tiles.fetch_timeout_secs.to_string(),
            TilesMaxConcurrentFetches => config.tiles.max_concurrent_fetches.to_string(),
            TrackingUnits => config.tracking.units.to_string(),
            TrackingActivityType => config.tracking.activity_type.to_string(),
            FilesDirectory => config.files.directory.display().to_string(),
            FilesDateFormat => config.files.date_format.clone(),
            FilesDateUseUtc => config.files.date_use_utc.to_string(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validates and stores a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        let invalid = |reason: String| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason,
        };

        match self {
            TilesProvider => {
                let descriptor = match value.parse::<usize>() {
                    Ok(index) => catalog::by_index(index),
                    Err(_) => catalog::lookup(value),
                }
                .map_err(|e| invalid(e.to_string()))?;
                config.tiles.provider = descriptor.id.to_string();
            }
            TilesUseCache => config.tiles.use_cache = parse_bool(value).map_err(invalid)?,
            TilesCacheDir => config.tiles.cache_dir = parse_path(value).map_err(invalid)?,
            TilesMaxCacheMb => {
                config.tiles.max_cache_mb = parse_positive(value).map_err(invalid)?;
            }
            TilesFetchTimeoutSecs => {
                config.tiles.fetch_timeout_secs = parse_positive(value).map_err(invalid)?;
            }
            TilesMaxConcurrentFetches => {
                config.tiles.max_concurrent_fetches =
                    parse_positive::<u64>(value).map_err(invalid)? as usize;
            }
            TrackingUnits => config.tracking.units = value.parse::<Units>().map_err(invalid)?,
            TrackingActivityType => {
                config.tracking.activity_type = value.parse::<ActivityType>().map_err(invalid)?;
            }
            FilesDirectory => config.files.directory = parse_path(value).map_err(invalid)?,
            FilesDateFormat => {
                parse_date_pattern(value).map_err(|e| invalid(e.to_string()))?;
                config.files.date_format = value.to_string();
            }
            FilesDateUseUtc => config.files.date_use_utc = parse_bool(value).map_err(invalid)?,
            LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !["error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
                    return Err(invalid(
                        "expected one of error, warn, info, debug, trace".to_string(),
                    ));
                }
                config.logging.level = level;
            }
            LoggingDirectory => {
                config.logging.directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        _ => Err("expected true or false".to_string()),
    }
}

fn parse_positive<T>(value: &str) -> Result<T, String>
where
    T: FromStr + Default + PartialOrd,
{
    match value.parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err("expected a positive whole number".to_string()),
    }
}

fn parse_path(value: &str) -> Result<PathBuf, String> {
    if value.is_empty() {
        return Err("path cannot be empty".to_string());
    }
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Ok(home.join(rest));
        }
    }
    Ok(PathBuf::from(value))
}
