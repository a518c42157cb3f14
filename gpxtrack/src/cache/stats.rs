//! Lock-free tile cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters recorded by [`super::TileCache`].
#[derive(Debug, Default)]
pub struct TileCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    bytes_downloaded: AtomicU64,
}

impl TileCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_succeeded(&self, bytes: u64) {
        self.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> TileCacheSnapshot {
        TileCacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches_succeeded: self.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`TileCacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileCacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub bytes_downloaded: u64,
}

impl TileCacheSnapshot {
    /// Fraction of requests served from disk, 0.0 when nothing was requested.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of misses that piggybacked on an in-flight fetch.
    pub fn coalescing_rate(&self) -> f64 {
        if self.misses == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.misses as f64
        }
    }
}
