//! Tile request service.
//!
//! ```text
//!  fetch(descriptor, z, x, y)
//!       │
//!       ├─ zoom out of range ──────────────► Err(OutOfRange)
//!       ├─ use_cache && on disk ───────────► Ready(bytes)
//!       └─ coalescer.register(key)
//!             ├─ in flight ────────────────► Pending (follower)
//!             └─ new ── spawn ─► permit ─► HTTP ─► disk ─► complete(key)
//!                                                            │
//!                               Pending (leader) ◄───────────┘
//! ```
//!
//! The whole fetch, including the wait for a worker permit, runs under one
//! timeout so a pending handle always resolves. On timeout every waiter gets
//! `FetchFailed` at once, while the download itself keeps running and its
//! tile is still written to disk when it arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use super::coalesce::{CoalesceResult, FetchOutcome, RequestCoalescer};
use super::disk::{DiskStats, DiskTileStore};
use super::key::TileKey;
use super::stats::{TileCacheMetrics, TileCacheSnapshot};
use super::types::{EvictionResult, StoreError, TileError};
use crate::config::{
    ConfigFile, ConfigSource, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CACHE_MB,
    DEFAULT_MAX_CONCURRENT_FETCHES,
};
use crate::provider::{catalog, AsyncHttpClient, TileServerDescriptor};

/// Tile cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCacheConfig {
    /// Root of the on-disk cache.
    pub directory: PathBuf,
    /// Byte budget of the on-disk cache.
    pub max_size_bytes: u64,
    /// Upper bound on one fetch, queueing included.
    pub fetch_timeout: Duration,
    /// Size of the fetch worker pool.
    pub max_concurrent_fetches: usize,
}

impl TileCacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size_bytes: DEFAULT_MAX_CACHE_MB * 1024 * 1024,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn from_config(config: &ConfigFile) -> Self {
        Self::new(&config.tiles.cache_dir)
            .with_max_size(config.tiles.max_cache_bytes())
            .with_fetch_timeout(Duration::from_secs(config.tiles.fetch_timeout_secs))
            .with_max_concurrent_fetches(config.tiles.max_concurrent_fetches)
    }

    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, workers: usize) -> Self {
        self.max_concurrent_fetches = workers.max(1);
        self
    }
}

/// Immediate answer to a tile request.
#[derive(Debug)]
pub enum TileFetch {
    /// Served from disk.
    Ready(Bytes),
    /// A network fetch is in flight; await the handle.
    Pending(PendingTile),
}

/// Handle to an in-flight fetch, shared by every caller that asked for the
/// same tile while it was outstanding.
#[derive(Debug)]
pub struct PendingTile {
    key: TileKey,
    rx: broadcast::Receiver<FetchOutcome>,
}

impl PendingTile {
    pub fn key(&self) -> TileKey {
        self.key
    }

    /// Waits for the fetch outcome.
    pub async fn wait(mut self) -> Result<Bytes, TileError> {
        match self.rx.recv().await {
            Ok(outcome) => outcome,
            Err(e) => Err(TileError::FetchFailed(format!(
                "fetch of {} ended without a result: {}",
                self.key, e
            ))),
        }
    }
}

/// Combined cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheStats {
    pub disk: DiskStats,
    pub requests: TileCacheSnapshot,
    pub in_flight: usize,
}

/// Coalescing, disk-backed tile cache.
pub struct TileCache {
    store: Arc<DiskTileStore>,
    client: Arc<dyn AsyncHttpClient>,
    coalescer: Arc<RequestCoalescer>,
    workers: Arc<Semaphore>,
    fetch_timeout: Duration,
    prefs: Arc<dyn ConfigSource>,
    metrics: Arc<TileCacheMetrics>,
}

impl TileCache {
    /// Opens the disk cache and prepares the worker pool.
    pub fn open(
        config: TileCacheConfig,
        client: Arc<dyn AsyncHttpClient>,
        prefs: Arc<dyn ConfigSource>,
    ) -> Result<Self, StoreError> {
        let store = DiskTileStore::open(&config.directory, config.max_size_bytes)?;
        info!(
            directory = %config.directory.display(),
            workers = config.max_concurrent_fetches,
            timeout_secs = config.fetch_timeout.as_secs_f64(),
            "Tile cache ready"
        );
        Ok(Self {
            store: Arc::new(store),
            client,
            coalescer: Arc::new(RequestCoalescer::new()),
            workers: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            fetch_timeout: config.fetch_timeout,
            prefs,
            metrics: Arc::new(TileCacheMetrics::new()),
        })
    }

    /// Requests a tile without blocking on the network.
    ///
    /// Must be called from within a Tokio runtime; network fetches run as
    /// spawned tasks.
    pub fn fetch(
        &self,
        descriptor: &'static TileServerDescriptor,
        zoom: u8,
        x: u32,
        y: u32,
    ) -> Result<TileFetch, TileError> {
        if !descriptor.supports_zoom(zoom) {
            debug!(provider = descriptor.id, zoom, "Zoom outside provider range");
            return Err(TileError::OutOfRange {
                provider: descriptor.id,
                zoom,
                minimum: descriptor.minimum_z,
                maximum: descriptor.maximum_z,
            });
        }
        let Some(url) = descriptor.tile_url(zoom, x, y) else {
            return Err(TileError::NotFetchable(descriptor.id));
        };

        let key = TileKey::new(descriptor, zoom, x, y);

        if self.prefs.use_cache() {
            if let Some(tile) = self.store.get(&key) {
                self.metrics.hit();
                debug!(tile = %key, "Tile cache hit");
                return Ok(TileFetch::Ready(tile.bytes));
            }
        }
        self.metrics.miss();

        match self.coalescer.register(key) {
            CoalesceResult::Coalesced(rx) => {
                self.metrics.coalesced();
                debug!(tile = %key, "Joined in-flight tile fetch");
                Ok(TileFetch::Pending(PendingTile { key, rx }))
            }
            CoalesceResult::NewRequest { key, rx } => {
                debug!(tile = %key, url = %url, "Fetching tile");
                let task = FetchTask {
                    key,
                    url,
                    client: Arc::clone(&self.client),
                    store: Arc::clone(&self.store),
                    coalescer: Arc::clone(&self.coalescer),
                    workers: Arc::clone(&self.workers),
                    timeout: self.fetch_timeout,
                    prefs: Arc::clone(&self.prefs),
                    metrics: Arc::clone(&self.metrics),
                };
                tokio::spawn(task.run());
                Ok(TileFetch::Pending(PendingTile { key, rx }))
            }
        }
    }

    /// Resolves a provider id and waits for the tile.
    pub async fn get(&self, provider_id: &str, zoom: u8, x: u32, y: u32) -> Result<Bytes, TileError> {
        let descriptor = catalog::lookup(provider_id)?;
        match self.fetch(descriptor, zoom, x, y)? {
            TileFetch::Ready(bytes) => Ok(bytes),
            TileFetch::Pending(pending) => pending.wait().await,
        }
    }

    /// Deletes every cached tile. Preferences are untouched.
    pub fn clear(&self) -> EvictionResult {
        self.store.clear()
    }

    /// Changes the byte budget, evicting immediately if now over it.
    pub fn set_max_size(&self, max_size_bytes: u64) -> EvictionResult {
        self.store
            .set_max_size(max_size_bytes, &self.coalescer.in_flight_keys())
    }

    pub fn in_flight_count(&self) -> usize {
        self.coalescer.in_flight_count()
    }

    pub fn stats(&self) -> TileCacheStats {
        TileCacheStats {
            disk: self.store.stats(),
            requests: self.metrics.snapshot(),
            in_flight: self.coalescer.in_flight_count(),
        }
    }

    pub fn store(&self) -> &DiskTileStore {
        &self.store
    }
}

/// Everything the leader task needs once detached from the cache.
struct FetchTask {
    key: TileKey,
    url: String,
    client: Arc<dyn AsyncHttpClient>,
    store: Arc<DiskTileStore>,
    coalescer: Arc<RequestCoalescer>,
    workers: Arc<Semaphore>,
    timeout: Duration,
    prefs: Arc<dyn ConfigSource>,
    metrics: Arc<TileCacheMetrics>,
}

impl FetchTask {
    async fn run(self) {
        let mut download = tokio::spawn(download(
            Arc::clone(&self.workers),
            Arc::clone(&self.client),
            self.url.clone(),
        ));

        match tokio::time::timeout(self.timeout, &mut download).await {
            Ok(joined) => {
                let outcome = joined_outcome(joined);
                match &outcome {
                    Ok(bytes) => {
                        self.metrics.fetch_succeeded(bytes.len() as u64);
                        self.persist_if_enabled(bytes.clone()).await;
                    }
                    Err(e) => {
                        self.metrics.fetch_failed();
                        warn!(tile = %self.key, error = %e, "Tile fetch failed");
                    }
                }
                let waiters = self.coalescer.complete(self.key, outcome);
                debug!(tile = %self.key, waiters, "Tile fetch complete");
            }
            Err(_) => {
                self.metrics.fetch_failed();
                let error = TileError::FetchFailed(format!("timed out after {:?}", self.timeout));
                warn!(tile = %self.key, error = %error, "Tile fetch failed");
                let waiters = self.coalescer.abandon(self.key, Err(error));
                debug!(tile = %self.key, waiters, "Waiters released, download continues");

                // the tile is still worth keeping once it arrives
                if let Ok(bytes) = joined_outcome(download.await) {
                    debug!(tile = %self.key, size_bytes = bytes.len(), "Late tile arrived");
                    self.persist_if_enabled(bytes).await;
                }
                self.coalescer.release(self.key);
            }
        }
    }

    async fn persist_if_enabled(&self, bytes: Bytes) {
        if self.prefs.use_cache() {
            self.persist(bytes).await;
        }
    }

    async fn persist(&self, bytes: Bytes) {
        let store = Arc::clone(&self.store);
        let pinned = self.coalescer.in_flight_keys();
        let key = self.key;

        let written = tokio::task::spawn_blocking(move || store.put(&key, &bytes, &pinned)).await;
        match written {
            Ok(Ok(evicted)) if evicted.entries_removed > 0 => {
                debug!(tile = %key, %evicted, "Stored tile with eviction");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(tile = %key, error = %e, "Failed to cache tile"),
            Err(e) => warn!(tile = %key, error = %e, "Tile write task failed"),
        }
    }
}

/// Waits for a worker permit, then downloads one tile.
async fn download(
    workers: Arc<Semaphore>,
    client: Arc<dyn AsyncHttpClient>,
    url: String,
) -> FetchOutcome {
    let _permit = workers
        .acquire_owned()
        .await
        .map_err(|_| TileError::FetchFailed("worker pool closed".to_string()))?;

    let body = client
        .get(&url)
        .await
        .map_err(|e| TileError::FetchFailed(e.to_string()))?;
    Ok(Bytes::from(body))
}

fn joined_outcome(joined: Result<FetchOutcome, JoinError>) -> FetchOutcome {
    joined.unwrap_or_else(|e| Err(TileError::FetchFailed(format!("download task failed: {}", e))))
}
