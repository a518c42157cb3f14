//! CLI error type.

use std::fmt;
use std::io;
use std::path::PathBuf;

use gpxtrack::cache::{StoreError, TileError};
use gpxtrack::config::ConfigError;
use gpxtrack::coord::CoordError;
use gpxtrack::files::FileStoreError;
use gpxtrack::gpx::GpxError;
use gpxtrack::provider::HttpError;
use gpxtrack::recovery::RecoveryError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Invalid command line input.
    Config(String),

    /// Failed to read or write the configuration file.
    ConfigFile(ConfigError),

    /// Tile request failed.
    Tile(TileError),

    /// Tile cache directory unusable.
    TileCache(StoreError),

    /// HTTP client could not be created.
    Http(HttpError),

    /// GPX file could not be decoded.
    Gpx { path: PathBuf, source: GpxError },

    /// Saved-file operation failed.
    Files(FileStoreError),

    /// Recovery journal operation failed.
    Recovery(RecoveryError),

    /// Coordinate outside the tile grid.
    Coord(CoordError),

    /// Reading or writing a file named on the command line failed.
    Io { path: PathBuf, source: io::Error },

    /// Failed to create the Tokio runtime.
    Runtime(io::Error),

    /// `recover export` with an empty journal.
    NothingToRecover,
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            _ => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "Configuration file error: {}", e),
            CliError::Tile(e) => write!(f, "Tile request failed: {}", e),
            CliError::TileCache(e) => write!(f, "Tile cache unavailable: {}", e),
            CliError::Http(e) => write!(f, "{}", e),
            CliError::Gpx { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            CliError::Files(e) => write!(f, "{}", e),
            CliError::Recovery(e) => write!(f, "{}", e),
            CliError::Coord(e) => write!(f, "{}", e),
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CliError::Runtime(e) => write!(f, "Failed to create Tokio runtime: {}", e),
            CliError::NothingToRecover => write!(f, "There is no unfinished session to recover"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Tile(e) => Some(e),
            CliError::TileCache(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Gpx { source, .. } => Some(source),
            CliError::Files(e) => Some(e),
            CliError::Recovery(e) => Some(e),
            CliError::Coord(e) => Some(e),
            CliError::Io { source, .. } => Some(source),
            CliError::Runtime(e) => Some(e),
            CliError::Config(_) | CliError::NothingToRecover => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<TileError> for CliError {
    fn from(e: TileError) -> Self {
        CliError::Tile(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::TileCache(e)
    }
}

impl From<HttpError> for CliError {
    fn from(e: HttpError) -> Self {
        CliError::Http(e)
    }
}

impl From<FileStoreError> for CliError {
    fn from(e: FileStoreError) -> Self {
        CliError::Files(e)
    }
}

impl From<RecoveryError> for CliError {
    fn from(e: RecoveryError) -> Self {
        CliError::Recovery(e)
    }
}

impl From<CoordError> for CliError {
    fn from(e: CoordError) -> Self {
        CliError::Coord(e)
    }
}
