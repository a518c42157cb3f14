//! Map tile provider abstraction
//!
//! The [`catalog`] holds the fixed table of tile servers; the `http` module is the
//! transport used to download their tiles.
//!
//! ```ignore
//! use gpxtrack::provider::catalog;
//!
//! let osm = catalog::lookup("openStreetMap")?;
//! let url = osm.tile_url(12, 2200, 1343);
//! ```

pub mod catalog;
mod http;

pub use catalog::{CatalogError, TileServerDescriptor, TILE_SERVERS};
pub use http::{AsyncHttpClient, HttpError, ReqwestClient, DEFAULT_HTTP_TIMEOUT, USER_AGENT};

#[cfg(test)]
pub use http::tests::MockHttpClient;
