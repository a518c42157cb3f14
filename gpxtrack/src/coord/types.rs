//! Coordinate types and validation limits.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum latitude representable in Web Mercator.
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum latitude representable in Web Mercator.
pub const MIN_LAT: f64 = -85.05112878;

/// Minimum longitude.
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude.
pub const MAX_LON: f64 = 180.0;

/// Minimum zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Maximum zoom level any catalog provider can serve.
pub const MAX_ZOOM: u8 = 22;

/// A geographic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to another coordinate, in metres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        super::haversine_distance(self, other)
    }

    /// Whether both components lie within the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (MIN_LON..=MAX_LON).contains(&self.longitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Web Mercator tile address (slippy map convention: x grows east, y grows south).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Column, 0 to 2^zoom - 1.
    pub x: u32,
    /// Row, 0 to 2^zoom - 1.
    pub y: u32,
    /// Zoom level.
    pub zoom: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }
}

/// Errors from coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("invalid latitude {0} (must be within ±{MAX_LAT})")]
    InvalidLatitude(f64),

    #[error("invalid longitude {0} (must be within ±180)")]
    InvalidLongitude(f64),

    #[error("invalid zoom level {0} (maximum is {MAX_ZOOM})")]
    InvalidZoom(u8),
}
