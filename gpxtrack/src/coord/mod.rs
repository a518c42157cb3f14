//! Coordinate math
//!
//! Great-circle distance between geographic positions, which is the single
//! distance function used for all track metrics, and conversions between
//! latitude/longitude and the Web Mercator tile grid the map renderer requests
//! tiles in.

mod types;

pub use types::{
    Coordinate, CoordError, TileCoord, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM,
};

use std::f64::consts::PI;

/// Mean Earth radius in metres used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres between two coordinates (haversine formula).
///
/// Symmetric, zero for identical points, and numerically stable for the
/// short hops between consecutive GPS fixes.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push h just past 1 for near-antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Sum of haversine distances between consecutive coordinates.
pub fn path_length<'a, I>(points: I) -> f64
where
    I: IntoIterator<Item = &'a Coordinate>,
{
    let mut total = 0.0;
    let mut previous: Option<&Coordinate> = None;
    for point in points {
        if let Some(prev) = previous {
            total += haversine_distance(prev, point);
        }
        previous = Some(point);
    }
    total
}

/// Converts geographic coordinates to the tile containing them.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 22)
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let n = 2.0_f64.powi(i32::from(zoom));
    let max_index = (n as u32).saturating_sub(1);

    // lon = 180 lands exactly on the wrap boundary; clamp to the last column
    let x = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);

    let lat_rad = lat.to_radians();
    let y = (((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32).min(max_index);

    Ok(TileCoord { x, y, zoom })
}

/// Converts a tile address back to the coordinate of its northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> Coordinate {
    let n = 2.0_f64.powi(i32::from(tile.zoom));

    let lon = f64::from(tile.x) / n * 360.0 - 180.0;

    let y = f64::from(tile.y) / n;
    let lat = (PI * (1.0 - 2.0 * y)).sinh().atan().to_degrees();

    Coordinate::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_haversine_zero_for_same_point() {
        let p = Coordinate::new(45.0, 7.0);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_thousandth_degree_at_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001);
        let d = haversine_distance(&a, &b);
        assert!((d - 111.2).abs() < 1.0, "expected ~111.2 m, got {}", d);
    }

    #[test]
    fn test_haversine_one_degree_longitude() {
        let d = haversine_distance(&Coordinate::new(0.0, 0.0), &Coordinate::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_haversine_antipodal_is_half_circumference() {
        let d = haversine_distance(&Coordinate::new(0.0, 0.0), &Coordinate::new(0.0, 180.0));
        assert!((d - PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_path_length_empty_and_single() {
        assert_eq!(path_length(&[]), 0.0);
        assert_eq!(path_length(&[Coordinate::new(1.0, 1.0)]), 0.0);
    }

    #[test]
    fn test_new_york_city_at_zoom_16() {
        let tile = to_tile_coords(40.7128, -74.0060, 16).unwrap();
        assert_eq!(tile.y, 24640);
        assert_eq!(tile.x, 19295);
        assert_eq!(tile.zoom, 16);
    }

    #[test]
    fn test_invalid_latitude() {
        assert!(matches!(
            to_tile_coords(90.0, 0.0, 10),
            Err(CoordError::InvalidLatitude(_))
        ));
    }

    #[test]
    fn test_invalid_zoom() {
        assert!(matches!(
            to_tile_coords(0.0, 0.0, 23),
            Err(CoordError::InvalidZoom(23))
        ));
    }

    #[test]
    fn test_max_longitude_clamps_to_last_column() {
        let tile = to_tile_coords(0.0, 180.0, 2).unwrap();
        assert_eq!(tile.x, 3);
    }

    #[test]
    fn test_tile_to_lat_lon_northwest_corner() {
        let corner = tile_to_lat_lon(&TileCoord::new(0, 0, 1));
        assert!((corner.latitude - MAX_LAT).abs() < 1e-6);
        assert!((corner.longitude + 180.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_haversine_symmetric(
            lat1 in -89.0f64..89.0, lon1 in -179.0f64..179.0,
            lat2 in -89.0f64..89.0, lon2 in -179.0f64..179.0,
        ) {
            let a = Coordinate::new(lat1, lon1);
            let b = Coordinate::new(lat2, lon2);
            prop_assert!((haversine_distance(&a, &b) - haversine_distance(&b, &a)).abs() < 1e-6);
        }

        #[test]
        fn prop_haversine_finite_and_bounded(
            lat in -90.0f64..=90.0, lon in -180.0f64..=180.0,
            d_lat in -1e-9f64..1e-9, d_lon in -1e-9f64..1e-9,
        ) {
            // near-antipodal pairs
            let a = Coordinate::new(lat, lon);
            let b = Coordinate::new((-lat + d_lat).clamp(-90.0, 90.0), lon + 180.0 + d_lon);
            let d = haversine_distance(&a, &b);
            prop_assert!(d.is_finite());
            prop_assert!(d <= std::f64::consts::PI * EARTH_RADIUS_M + 1e-6);
        }

        #[test]
        fn prop_tile_round_trip_contains_point(
            lat in -85.0f64..85.0, lon in -179.9f64..179.9, zoom in 0u8..=18,
        ) {
            let tile = to_tile_coords(lat, lon, zoom).unwrap();
            let nw = tile_to_lat_lon(&tile);
            prop_assert!(nw.latitude >= lat - 1e-9);
            prop_assert!(nw.longitude <= lon + 1e-9);
        }
    }
}
