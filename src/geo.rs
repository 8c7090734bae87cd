//! Search region derivation for a map location.
//!
//! A pin's coordinate is turned into a bounding box `half_width` degrees of
//! longitude and `half_height` degrees of latitude either side of the point,
//! clamped to the globally valid coordinate ranges. The box is what the photo
//! search API receives as its `bbox` parameter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Valid longitude range, in degrees
pub const LON_RANGE: (f64, f64) = (-180.0, 180.0);
/// Valid latitude range, in degrees
pub const LAT_RANGE: (f64, f64) = (-90.0, 90.0);
/// Default half-width of the query window, in degrees of longitude
pub const DEFAULT_HALF_WIDTH: f64 = 1.0;
/// Default half-height of the query window, in degrees of latitude
pub const DEFAULT_HALF_HEIGHT: f64 = 1.0;

/// A point on the map
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside `LAT_RANGE`/`LON_RANGE`
    pub fn is_valid(&self) -> bool {
        let in_range = |v: f64, (lo, hi): (f64, f64)| v.is_finite() && v >= lo && v <= hi;
        in_range(self.latitude, LAT_RANGE) && in_range(self.longitude, LON_RANGE)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Size of the query window and the ranges it is clamped to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchWindow {
    pub half_width: f64,
    pub half_height: f64,
    pub lon_range: (f64, f64),
    pub lat_range: (f64, f64),
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self {
            half_width: DEFAULT_HALF_WIDTH,
            half_height: DEFAULT_HALF_HEIGHT,
            lon_range: LON_RANGE,
            lat_range: LAT_RANGE,
        }
    }
}

/// A clamped search region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Builds the query box around `location`.
    ///
    /// Never fails. For any valid coordinate the box stays inside the window's
    /// ranges; near the poles or the antimeridian it is simply truncated.
    pub fn around(location: Coordinate, window: &SearchWindow) -> Self {
        Self {
            min_lon: (location.longitude - window.half_width).max(window.lon_range.0),
            min_lat: (location.latitude - window.half_height).max(window.lat_range.0),
            max_lon: (location.longitude + window.half_width).min(window.lon_range.1),
            max_lat: (location.latitude + window.half_height).min(window.lat_range.1),
        }
    }

    /// Whether every edge lies inside the given ranges
    pub fn is_within(&self, lon_range: (f64, f64), lat_range: (f64, f64)) -> bool {
        let lon_ok = |v: f64| v >= lon_range.0 && v <= lon_range.1;
        let lat_ok = |v: f64| v >= lat_range.0 && v <= lat_range.1;
        lon_ok(self.min_lon) && lon_ok(self.max_lon) && lat_ok(self.min_lat) && lat_ok(self.max_lat)
    }
}

/// Formats as the API's `bbox` value: `minLon,minLat,maxLon,maxLat`
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(Coordinate::new(90.0, -180.0).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());

        assert!(!Coordinate::new(500.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_box_around_origin() {
        let bbox = BoundingBox::around(Coordinate::new(0.0, 0.0), &SearchWindow::default());

        assert_eq!(bbox.min_lon, -1.0);
        assert_eq!(bbox.min_lat, -1.0);
        assert_eq!(bbox.max_lon, 1.0);
        assert_eq!(bbox.max_lat, 1.0);
        assert_eq!(bbox.to_string(), "-1,-1,1,1");
    }

    #[test]
    fn test_box_clamps_at_pole_and_antimeridian() {
        let window = SearchWindow::default();

        let north = BoundingBox::around(Coordinate::new(89.5, 179.5), &window);
        assert_eq!(north.max_lat, 90.0);
        assert_eq!(north.max_lon, 180.0);
        assert_eq!(north.min_lat, 88.5);
        assert_eq!(north.min_lon, 178.5);

        let south = BoundingBox::around(Coordinate::new(-90.0, -180.0), &window);
        assert_eq!(south.min_lat, -90.0);
        assert_eq!(south.min_lon, -180.0);
        assert_eq!(south.max_lat, -89.0);
        assert_eq!(south.max_lon, -179.0);
    }

    #[test]
    fn test_box_respects_custom_window() {
        let window = SearchWindow {
            half_width: 0.25,
            half_height: 0.5,
            ..SearchWindow::default()
        };
        let bbox = BoundingBox::around(Coordinate::new(10.0, 20.0), &window);

        assert_eq!(bbox.to_string(), "19.75,9.5,20.25,10.5");
    }

    #[test]
    fn test_box_always_within_global_ranges() {
        let window = SearchWindow::default();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..2000 {
            let location = Coordinate::new(rng.gen_range(-90.0..=90.0), rng.gen_range(-180.0..=180.0));
            let bbox = BoundingBox::around(location, &window);
            assert!(
                bbox.is_within(LON_RANGE, LAT_RANGE),
                "box {bbox} escaped the valid range for {location}"
            );
        }

        // Edge and non-finite input still yields a contained box
        for location in [
            Coordinate::new(90.0, -180.0),
            Coordinate::new(f64::NAN, f64::NAN),
            Coordinate::new(-90.0, 180.0),
        ] {
            let bbox = BoundingBox::around(location, &window);
            assert!(bbox.is_within(LON_RANGE, LAT_RANGE), "box {bbox} escaped for {location:?}");
        }
    }
}
