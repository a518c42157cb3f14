//! Shared cache types: errors, eviction results and the boxed future alias.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::provider::CatalogError;

/// Boxed future type for dyn-compatible async methods.
pub use futures::future::BoxFuture;

/// Result of an eviction pass over the disk cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Number of tiles removed.
    pub entries_removed: usize,
    /// Total bytes freed.
    pub bytes_freed: u64,
}

impl fmt::Display for EvictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "evicted {} tiles, freed {} bytes",
            self.entries_removed, self.bytes_freed
        )
    }
}

/// Errors from the on-disk tile store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write tile {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("tile of {size} bytes exceeds the whole cache budget of {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

/// Errors surfaced to callers of the tile request interface.
///
/// Cloneable because one fetch outcome is broadcast to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Zoom is outside the provider's bounds; no fetch is attempted.
    #[error("zoom {zoom} outside range of provider {provider} ({minimum}..={maximum})")]
    OutOfRange {
        provider: &'static str,
        zoom: u8,
        minimum: i32,
        /// Negative means unbounded.
        maximum: i32,
    },

    /// Network or storage failure while retrieving the tile. Never retried
    /// automatically; the renderer asks again on its next pass.
    #[error("tile fetch failed: {0}")]
    FetchFailed(String),

    /// The provider id is not in the catalog.
    #[error(transparent)]
    UnknownProvider(#[from] CatalogError),

    /// The provider is rendered natively and has no tile URL.
    #[error("provider {0} has no tile template and is never fetched")]
    NotFetchable(&'static str),
}
