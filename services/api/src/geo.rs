//! Geospatial helpers for the proximity duplicate check
//!
//! The store prefilters candidates with a bounding box over the indexed
//! latitude/longitude columns; the exact haversine distance then decides
//! membership, with an inclusive bound at the radius.

use std::f64::consts::PI;

use crate::models::Location;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two points in meters.
pub fn distance_meters(a: &Location, b: &Location) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(b.latitude - a.latitude);
    let dlon = to_rad(b.longitude - a.longitude);

    let h = (dlat / 2.0).sin().powi(2)
        + to_rad(a.latitude).cos() * to_rad(b.latitude).cos() * (dlon / 2.0).sin().powi(2);

    EARTH_RADIUS_METERS * 2.0 * h.sqrt().asin()
}

/// An axis-aligned box in degree space enclosing a circle around a point.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

/// Bounding box that encloses a circle of `radius_meters` around `center`.
///
/// The longitude span is computed at the widest latitude the box reaches,
/// where degrees of longitude are narrowest, so the circle is fully
/// enclosed. Near the poles the span degenerates and widens to the full
/// range. Antimeridian wrap is not handled; reports do not straddle it in
/// practice.
pub fn bounding_box(center: &Location, radius_meters: f64) -> BoundingBox {
    // One degree of latitude is ~111.32 km everywhere
    let meters_per_degree = 2.0 * PI * EARTH_RADIUS_METERS / 360.0;
    let lat_delta = radius_meters / meters_per_degree;

    let min_latitude = (center.latitude - lat_delta).max(-90.0);
    let max_latitude = (center.latitude + lat_delta).min(90.0);

    let widest_lat = min_latitude.abs().max(max_latitude.abs());
    let cos_lat = (widest_lat * PI / 180.0).cos();
    let lon_delta = if cos_lat <= f64::EPSILON {
        360.0
    } else {
        lat_delta / cos_lat
    };

    BoundingBox {
        min_latitude,
        max_latitude,
        min_longitude: (center.longitude - lon_delta).max(-180.0),
        max_longitude: (center.longitude + lon_delta).min(180.0),
    }
}

impl BoundingBox {
    pub fn contains(&self, point: &Location) -> bool {
        point.latitude >= self.min_latitude
            && point.latitude <= self.max_latitude
            && point.longitude >= self.min_longitude
            && point.longitude <= self.max_longitude
    }
}
