//! Compiled-in table of map tile servers.
//!
//! Every provider the application can draw is one [`TileServerDescriptor`]
//! record in [`TILE_SERVERS`]. Behaviour that differs between providers (URL
//! shape, zoom limits, subdomains, tile size) is data in the table, so adding
//! a provider means adding a row.
//!
//! The index of a row is also its persisted preference value, so rows are
//! only ever appended.

use std::fmt;

use thiserror::Error;

/// Static description of one tile provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileServerDescriptor {
    /// Stable identifier used in configuration and cache paths.
    pub id: &'static str,

    /// Human readable name.
    pub name: &'static str,

    /// URL template with `{s}`, `{z}`, `{x}` and `{y}` placeholders.
    ///
    /// Empty for natively rendered maps, which never enter the fetch path.
    pub template_url: &'static str,

    /// Subdomain labels substituted for `{s}`; empty when unused.
    pub subdomains: &'static [&'static str],

    /// Lowest zoom level served (0 or greater).
    pub minimum_z: i32,

    /// Highest zoom level served; negative means unbounded.
    pub maximum_z: i32,

    /// Edge length of one tile in pixels (256, or 512 for retina tiles).
    pub tile_size: u32,

    /// Whether the overlay fully replaces the base map.
    pub replaces_map_content: bool,

    /// Whether the UI must switch to dark rendering with this provider.
    pub force_dark_mode: bool,
}

impl TileServerDescriptor {
    /// Whether tiles for this provider are fetched over HTTP.
    pub fn has_template(&self) -> bool {
        !self.template_url.is_empty()
    }

    /// Whether `zoom` lies within the provider's advertised range.
    pub fn supports_zoom(&self, zoom: u8) -> bool {
        let zoom = i32::from(zoom);
        zoom >= self.minimum_z && (self.maximum_z < 0 || zoom <= self.maximum_z)
    }

    /// Picks the subdomain for a tile.
    ///
    /// `(x + y) mod len` is deterministic per tile and spreads neighbouring
    /// tiles across hosts.
    pub fn subdomain_for(&self, x: u32, y: u32) -> Option<&'static str> {
        if self.subdomains.is_empty() {
            return None;
        }
        let index = (u64::from(x) + u64::from(y)) % self.subdomains.len() as u64;
        Some(self.subdomains[index as usize])
    }

    /// Builds the request URL for a tile, or `None` for templateless providers.
    pub fn tile_url(&self, zoom: u8, x: u32, y: u32) -> Option<String> {
        if !self.has_template() {
            return None;
        }
        let url = self
            .template_url
            .replace("{z}", &zoom.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        Some(match self.subdomain_for(x, y) {
            Some(subdomain) => url.replace("{s}", subdomain),
            None => url,
        })
    }
}

impl fmt::Display for TileServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

const ABC: &[&str] = &["a", "b", "c"];

/// All known tile servers, in preference-index order.
pub static TILE_SERVERS: [TileServerDescriptor; 7] = [
    TileServerDescriptor {
        id: "apple",
        name: "Apple Mapkit (no offline cache)",
        template_url: "",
        subdomains: &[],
        minimum_z: 0,
        maximum_z: -1,
        tile_size: 256,
        replaces_map_content: true,
        force_dark_mode: false,
    },
    TileServerDescriptor {
        id: "appleSatellite",
        name: "Apple Satellite (no offline cache)",
        template_url: "",
        subdomains: &[],
        minimum_z: 0,
        maximum_z: -1,
        tile_size: 256,
        replaces_map_content: true,
        force_dark_mode: true,
    },
    TileServerDescriptor {
        id: "openStreetMap",
        name: "Open Street Map",
        template_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
        subdomains: ABC,
        minimum_z: 0,
        maximum_z: 19,
        tile_size: 256,
        replaces_map_content: true,
        force_dark_mode: false,
    },
    TileServerDescriptor {
        id: "cartoDB",
        name: "Carto DB",
        template_url: "https://{s}.basemaps.cartocdn.com/rastertiles/voyager/{z}/{x}/{y}.png",
        subdomains: ABC,
        minimum_z: 0,
        maximum_z: 21,
        tile_size: 256,
        replaces_map_content: true,
        force_dark_mode: false,
    },
    TileServerDescriptor {
        id: "cartoDBRetina",
        name: "Carto DB (Retina resolution)",
        template_url: "https://{s}.basemaps.cartocdn.com/rastertiles/voyager/{z}/{x}/{y}@2x.png",
        subdomains: ABC,
        minimum_z: 0,
        maximum_z: 21,
        tile_size: 512,
        replaces_map_content: true,
        force_dark_mode: false,
    },
    TileServerDescriptor {
        id: "openTopoMap",
        name: "OpenTopoMap",
        template_url: "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
        subdomains: ABC,
        minimum_z: 0,
        maximum_z: 17,
        tile_size: 256,
        replaces_map_content: true,
        force_dark_mode: false,
    },
    TileServerDescriptor {
        id: "openSeaMap",
        name: "OpenSeaMap",
        template_url: "https://tiles.openseamap.org/seamark/{z}/{x}/{y}.png",
        subdomains: &[],
        minimum_z: 0,
        maximum_z: 16,
        tile_size: 256,
        replaces_map_content: false,
        force_dark_mode: false,
    },
];

/// Index of the provider used when no valid preference exists.
pub const DEFAULT_PROVIDER_INDEX: usize = 0;

/// Catalog lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown tile provider '{0}'")]
    UnknownProvider(String),

    #[error("tile provider index {index} out of range (catalog has {count} providers)")]
    IndexOutOfRange { index: usize, count: usize },
}

/// Looks up a provider by id (ASCII case-insensitive).
pub fn lookup(id: &str) -> Result<&'static TileServerDescriptor, CatalogError> {
    TILE_SERVERS
        .iter()
        .find(|d| d.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| CatalogError::UnknownProvider(id.to_string()))
}

/// Looks up a provider by its persisted preference index.
pub fn by_index(index: usize) -> Result<&'static TileServerDescriptor, CatalogError> {
    TILE_SERVERS.get(index).ok_or(CatalogError::IndexOutOfRange {
        index,
        count: TILE_SERVERS.len(),
    })
}

/// Number of providers; bounds persisted preference indices.
pub fn count() -> usize {
    TILE_SERVERS.len()
}

/// Provider used when the preference is missing or stale.
pub fn default_provider() -> &'static TileServerDescriptor {
    &TILE_SERVERS[DEFAULT_PROVIDER_INDEX]
}

/// Iterates the catalog in index order.
pub fn all() -> impl Iterator<Item = &'static TileServerDescriptor> {
    TILE_SERVERS.iter()
}
