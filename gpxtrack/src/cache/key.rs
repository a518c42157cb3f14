//! Tile cache keys and their on-disk layout.
//!
//! # Key Format
//!
//! Keys display as `tile:{server}:{zoom}:{x}:{y}` for logs, and map to the
//! relative path `{server}/{zoom}/{x}/{y}.tile` inside the cache directory.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::provider::{catalog, TileServerDescriptor};

/// File extension of cached tile images.
pub const TILE_EXTENSION: &str = "tile";

/// Identifies one cached tile image: provider plus slippy-map address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Catalog id of the provider.
    pub server: &'static str,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(descriptor: &'static TileServerDescriptor, zoom: u8, x: u32, y: u32) -> Self {
        Self {
            server: descriptor.id,
            zoom,
            x,
            y,
        }
    }

    /// Path of this tile relative to the cache root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.server)
            .join(self.zoom.to_string())
            .join(self.x.to_string())
            .join(format!("{}.{}", self.y, TILE_EXTENSION))
    }

    /// Parses a path relative to the cache root back into a key.
    ///
    /// Returns `None` for anything that is not a tile of a catalog provider
    /// (temporary files, stray files, retired providers).
    pub fn from_relative_path(path: &Path) -> Option<Self> {
        let parts: Vec<&str> = path
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let [server, zoom, x, file] = parts.as_slice() else {
            return None;
        };

        let descriptor = catalog::lookup(server).ok()?;
        let y = file.strip_suffix(&format!(".{}", TILE_EXTENSION))?;

        Some(Self {
            server: descriptor.id,
            zoom: zoom.parse().ok()?,
            x: x.parse().ok()?,
            y: y.parse().ok()?,
        })
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile:{}:{}:{}:{}", self.server, self.zoom, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osm() -> &'static TileServerDescriptor {
        catalog::lookup("openStreetMap").unwrap()
    }

    #[test]
    fn test_key_display() {
        let key = TileKey::new(osm(), 15, 5279, 12754);
        assert_eq!(key.to_string(), "tile:openStreetMap:15:5279:12754");
    }

    #[test]
    fn test_relative_path_round_trip() {
        let key = TileKey::new(osm(), 12, 2200, 1343);
        let path = key.relative_path();
        assert_eq!(path, PathBuf::from("openStreetMap/12/2200/1343.tile"));
        assert_eq!(TileKey::from_relative_path(&path), Some(key));
    }

    #[test]
    fn test_rejects_unknown_provider_and_temp_files() {
        assert_eq!(
            TileKey::from_relative_path(Path::new("bing/1/1/1.tile")),
            None
        );
        assert_eq!(
            TileKey::from_relative_path(Path::new("openStreetMap/1/1/1.tile.tmp")),
            None
        );
        assert_eq!(
            TileKey::from_relative_path(Path::new("openStreetMap/1/1.tile")),
            None
        );
    }
}
