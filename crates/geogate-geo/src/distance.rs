//! Great-circle distance.

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Mean Earth radius (IUGG), in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two WGS84 coordinates, in meters.
///
/// Symmetric, and exactly `0.0` for identical inputs. Error against the
/// ellipsoid stays well under 0.5% which is a few meters at geofence scale.
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    if lat1 == lat2 && lng1 == lng2 {
        return 0.0;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Clamp guards against a > 1.0 from rounding on antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// A validated latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::new(
                "latitude",
                "must be a finite number between -90 and 90",
            ));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::new(
                "longitude",
                "must be a finite number between -180 and 180",
            ));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Distance to another point in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Limassol marina and Nicosia Ledra street.
    const LIMASSOL: (f64, f64) = (34.6703, 33.0426);
    const NICOSIA: (f64, f64) = (35.1725, 33.3617);

    #[test]
    fn identical_points_are_zero() {
        assert_eq!(
            haversine_distance_m(LIMASSOL.0, LIMASSOL.1, LIMASSOL.0, LIMASSOL.1),
            0.0
        );
        assert_eq!(haversine_distance_m(-90.0, 0.0, -90.0, 0.0), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let ab = haversine_distance_m(LIMASSOL.0, LIMASSOL.1, NICOSIA.0, NICOSIA.1);
        let ba = haversine_distance_m(NICOSIA.0, NICOSIA.1, LIMASSOL.0, LIMASSOL.1);
        assert_eq!(ab, ba);
    }

    #[test]
    fn limassol_to_nicosia_is_about_63km() {
        let d = haversine_distance_m(LIMASSOL.0, LIMASSOL.1, NICOSIA.0, NICOSIA.1);
        assert!((62_000.0..64_500.0).contains(&d), "got {d}");
    }

    #[test]
    fn one_millidegree_latitude_is_about_111m() {
        let d = haversine_distance_m(35.0, 33.0, 35.001, 33.0);
        assert!((d - 111.2).abs() < 1.0, "got {d}");
    }

    #[test]
    fn antipodal_points_do_not_nan() {
        let d = haversine_distance_m(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(35.0, 33.0).is_ok());
    }

    #[test]
    fn geo_point_serializes_field_names() {
        let p = GeoPoint::new(35.0, 33.0).unwrap();
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["latitude"], 35.0);
        assert_eq!(json["longitude"], 33.0);
    }
}
