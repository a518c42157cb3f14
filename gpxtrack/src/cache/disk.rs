//! Byte-bounded on-disk tile store with least-recently-fetched eviction.
//!
//! Tiles live at `{root}/{server}/{zoom}/{x}/{y}.tile`. An in-memory index
//! tracks each tile's size and a monotonically increasing fetch sequence;
//! when an insert pushes the total over the budget, tiles with the lowest
//! sequence are deleted first. Tiles named in the caller's pinned set (those
//! with a fetch in flight) are never evicted.
//!
//! The index is rebuilt from the directory on open, ordered by file
//! modification time.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::key::TileKey;
use super::types::{EvictionResult, StoreError};

/// Extension of a tile file while it is being written.
const TEMP_EXTENSION: &str = "tile.tmp";

/// A tile read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    pub key: TileKey,
    pub bytes: Bytes,
    /// When the tile was downloaded.
    pub fetched_at: SystemTime,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    sequence: u64,
    fetched_at: SystemTime,
}

#[derive(Debug, Default)]
struct TileIndex {
    entries: HashMap<TileKey, IndexEntry>,
    total_bytes: u64,
    clock: u64,
}

impl TileIndex {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert(&mut self, key: TileKey, size: u64, fetched_at: SystemTime) {
        let sequence = self.tick();
        if let Some(old) = self.entries.insert(
            key,
            IndexEntry {
                size,
                sequence,
                fetched_at,
            },
        ) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, key: &TileKey) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size;
        Some(entry)
    }

    /// Oldest entry that is neither pinned nor `keep`.
    fn eviction_candidate(
        &self,
        pinned: &HashSet<TileKey>,
        keep: Option<&TileKey>,
    ) -> Option<TileKey> {
        self.entries
            .iter()
            .filter(|(k, _)| Some(*k) != keep && !pinned.contains(*k))
            .min_by_key(|(_, e)| e.sequence)
            .map(|(k, _)| *k)
    }
}

/// Statistics about the disk store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    pub entries: usize,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
}

/// On-disk tile store bounded by total byte size.
#[derive(Debug)]
pub struct DiskTileStore {
    root: PathBuf,
    max_size_bytes: AtomicU64,
    index: Mutex<TileIndex>,
}

impl DiskTileStore {
    /// Opens (creating if needed) a store rooted at `root`.
    ///
    /// Existing tiles are indexed oldest-first and trimmed to the budget.
    pub fn open(root: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;

        let mut found = Vec::new();
        let mut leftovers = Vec::new();
        scan_tiles(&root, &root, &mut found, &mut leftovers);
        if !leftovers.is_empty() {
            info!(files = leftovers.len(), "Removing interrupted tile writes");
            for path in &leftovers {
                remove_file_quietly(path);
            }
        }
        found.sort_by_key(|(_, _, modified)| *modified);

        let mut index = TileIndex::default();
        for (key, size, modified) in found {
            index.insert(key, size, modified);
        }

        info!(
            root = %root.display(),
            tiles = index.entries.len(),
            size_bytes = index.total_bytes,
            max_size_bytes,
            "Opened tile disk cache"
        );

        let store = Self {
            root,
            max_size_bytes: AtomicU64::new(max_size_bytes),
            index: Mutex::new(index),
        };
        store.enforce_budget(&HashSet::new(), None);
        Ok(store)
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path a key is stored at.
    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Whether the index knows this tile.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.index.lock().entries.contains_key(key)
    }

    /// Reads a tile, marking it as the most recently fetched.
    ///
    /// A tile that vanished from disk underneath the index is dropped from
    /// the index and reported as a miss.
    pub fn get(&self, key: &TileKey) -> Option<CachedTile> {
        let fetched_at = {
            let mut index = self.index.lock();
            let sequence = index.tick();
            let entry = index.entries.get_mut(key)?;
            entry.sequence = sequence;
            entry.fetched_at
        };

        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(data) => Some(CachedTile {
                key: *key,
                bytes: Bytes::from(data),
                fetched_at,
            }),
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(tile = %key, error = %e, "Failed to read cached tile");
                }
                self.index.lock().remove(key);
                None
            }
        }
    }

    /// Stores a tile and evicts least-recently-fetched tiles until the store
    /// is back under budget.
    ///
    /// `pinned` tiles (fetches in flight) and the tile being inserted are
    /// never evicted, so the store may stay over budget when everything else
    /// is pinned.
    pub fn put(
        &self,
        key: &TileKey,
        data: &[u8],
        pinned: &HashSet<TileKey>,
    ) -> Result<EvictionResult, StoreError> {
        let size = data.len() as u64;
        let max = self.max_size_bytes();
        if size > max {
            return Err(StoreError::TooLarge { size, max });
        }

        let path = self.path_for(key);
        write_atomically(&path, data)?;

        self.index.lock().insert(*key, size, SystemTime::now());
        debug!(tile = %key, size_bytes = size, "Stored tile");

        Ok(self.enforce_budget(pinned, Some(key)))
    }

    /// Removes one tile.
    pub fn remove(&self, key: &TileKey) -> bool {
        let existed = self.index.lock().remove(key).is_some();
        if existed {
            remove_file_quietly(&self.path_for(key));
        }
        existed
    }

    /// Removes every tile and returns what was freed.
    pub fn clear(&self) -> EvictionResult {
        let drained: Vec<(TileKey, IndexEntry)> = {
            let mut index = self.index.lock();
            index.total_bytes = 0;
            index.entries.drain().collect()
        };

        let mut result = EvictionResult::default();
        for (key, entry) in drained {
            remove_file_quietly(&self.path_for(&key));
            result.entries_removed += 1;
            result.bytes_freed += entry.size;
        }
        info!(%result, "Cleared tile disk cache");
        result
    }

    /// Current total size of stored tiles.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().total_bytes
    }

    /// Number of stored tiles.
    pub fn entry_count(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Configured byte budget.
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes.load(Ordering::Relaxed)
    }

    /// Changes the byte budget, evicting immediately if now over it.
    pub fn set_max_size(&self, max_size_bytes: u64, pinned: &HashSet<TileKey>) -> EvictionResult {
        self.max_size_bytes.store(max_size_bytes, Ordering::Relaxed);
        self.enforce_budget(pinned, None)
    }

    pub fn stats(&self) -> DiskStats {
        let index = self.index.lock();
        DiskStats {
            entries: index.entries.len(),
            size_bytes: index.total_bytes,
            max_size_bytes: self.max_size_bytes(),
        }
    }

    fn enforce_budget(&self, pinned: &HashSet<TileKey>, keep: Option<&TileKey>) -> EvictionResult {
        let max = self.max_size_bytes();
        let mut result = EvictionResult::default();
        let mut victims = Vec::new();

        {
            let mut index = self.index.lock();
            while index.total_bytes > max {
                let Some(victim) = index.eviction_candidate(pinned, keep) else {
                    warn!(
                        size_bytes = index.total_bytes,
                        max_size_bytes = max,
                        "Tile cache over budget but every remaining tile is pinned"
                    );
                    break;
                };
                if let Some(entry) = index.remove(&victim) {
                    result.entries_removed += 1;
                    result.bytes_freed += entry.size;
                    victims.push(victim);
                }
            }
        }

        for victim in &victims {
            debug!(tile = %victim, "Evicted tile");
            remove_file_quietly(&self.path_for(victim));
        }
        if result.entries_removed > 0 {
            debug!(%result, "Tile cache eviction");
        }
        result
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let tmp = path.with_extension(TEMP_EXTENSION);
    fs::write(&tmp, data)
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|source| {
            remove_file_quietly(&tmp);
            StoreError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(&format!(".{}", TEMP_EXTENSION)))
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove tile file");
        }
    }
}

/// Collects tiles under `dir`, and temp files left by interrupted writes
/// into `leftovers`.
fn scan_tiles(
    root: &Path,
    dir: &Path,
    found: &mut Vec<(TileKey, u64, SystemTime)>,
    leftovers: &mut Vec<PathBuf>,
) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.is_dir() {
            scan_tiles(root, &path, found, leftovers);
            continue;
        }
        if is_temp_file(&path) {
            leftovers.push(path);
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        match TileKey::from_relative_path(relative) {
            Some(key) => {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push((key, metadata.len(), modified));
            }
            None => debug!(path = %path.display(), "Ignoring non-tile file in cache"),
        }
    }
}

/// Size and file count of a cache directory without opening a store.
pub fn disk_cache_stats(root: &Path) -> (usize, u64) {
    let mut found = Vec::new();
    scan_tiles(root, root, &mut found, &mut Vec::new());
    let bytes = found.iter().map(|(_, size, _)| size).sum();
    (found.len(), bytes)
}
