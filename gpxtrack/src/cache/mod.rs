//! Map tile cache.
//!
//! Turns a tile request into either an immediate disk hit or a single
//! coalesced, throttled network fetch whose result is written back to a
//! byte-bounded disk cache.
//!
//! # Components
//!
//! - [`TileCache`] - request entry point
//! - [`DiskTileStore`] - on-disk tiles with least-recently-fetched eviction
//! - [`RequestCoalescer`] - one network fetch per tile at a time
//! - [`TileCacheMetrics`] - hit/miss/fetch counters

mod coalesce;
mod disk;
mod key;
mod service;
mod stats;
mod types;

pub use coalesce::{CoalesceResult, FetchOutcome, RequestCoalescer};
pub use disk::{disk_cache_stats, CachedTile, DiskStats, DiskTileStore};
pub use key::{TileKey, TILE_EXTENSION};
pub use service::{PendingTile, TileCache, TileCacheConfig, TileCacheStats, TileFetch};
pub use stats::{TileCacheMetrics, TileCacheSnapshot};
pub use types::{BoxFuture, EvictionResult, StoreError, TileError};
