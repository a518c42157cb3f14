//! Application error types.

use thiserror::Error;

use crate::cache::{StoreError, TileError};
use crate::filename::DateFormatError;
use crate::files::FileStoreError;
use crate::gpx::GpxError;
use crate::provider::HttpError;
use crate::session::SessionError;

/// Errors surfaced by [`TrackerApp`](super::TrackerApp).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to open tile cache: {0}")]
    TileCache(#[from] StoreError),

    #[error("failed to create HTTP client: {0}")]
    Http(#[from] HttpError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("could not read GPX file: {0}")]
    Gpx(#[from] GpxError),

    #[error(transparent)]
    Files(#[from] FileStoreError),

    #[error("invalid file name pattern: {0}")]
    FilenamePattern(#[from] DateFormatError),

    #[error("no recovered session is pending")]
    NoRecoveredSession,

    #[error("no location fix received yet")]
    NoLocationFix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::from(GpxError::MalformedInput("unexpected end".to_string()));
        assert_eq!(
            err.to_string(),
            "could not read GPX file: malformed GPX: unexpected end"
        );
    }

    #[test]
    fn test_app_error_from_session_error() {
        let err: AppError = SessionError::NothingToSave.into();
        assert!(matches!(err, AppError::Session(SessionError::NothingToSave)));
        assert_eq!(err.to_string(), "nothing to save");
    }
}
