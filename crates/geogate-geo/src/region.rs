//! Rectangular regions used as a coarse pre-filter before radius checks.

use serde::{Deserialize, Serialize};

use crate::distance::{GeoPoint, EARTH_RADIUS_M};

/// Latitude/longitude rectangle. Edges are inclusive.
///
/// Boxes crossing the antimeridian are not supported; `min_lng` must not
/// exceed `max_lng`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// The island of Cyprus with a small sea margin.
    pub const CYPRUS: BoundingBox = BoundingBox {
        min_lat: 34.50,
        max_lat: 35.75,
        min_lng: 32.20,
        max_lng: 34.65,
    };

    /// Smallest box containing a circle of `radius_m` around `center`.
    pub fn around(center: &GeoPoint, radius_m: f64) -> Self {
        let d_lat = (radius_m / EARTH_RADIUS_M).to_degrees();
        let cos_lat = center.latitude.to_radians().cos().abs().max(1e-9);
        let d_lng = (d_lat / cos_lat).min(180.0);
        Self {
            min_lat: (center.latitude - d_lat).max(-90.0),
            max_lat: (center.latitude + d_lat).min(90.0),
            min_lng: (center.longitude - d_lng).max(-180.0),
            max_lng: (center.longitude + d_lng).min(180.0),
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        is_within_region(latitude, longitude, self)
    }
}

/// Whether a coordinate falls inside `bounds`.
pub fn is_within_region(latitude: f64, longitude: f64, bounds: &BoundingBox) -> bool {
    latitude >= bounds.min_lat
        && latitude <= bounds.max_lat
        && longitude >= bounds.min_lng
        && longitude <= bounds.max_lng
}
