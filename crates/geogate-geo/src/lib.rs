//! Geo math and regional validators for geogate.
//!
//! Everything in this crate is pure: no I/O, no clocks, no shared state.
//! The location engine builds on [`haversine_distance_m`] and
//! [`BoundingBox`]; the invitation API uses the validators to reject
//! malformed recipient data before anything is persisted.

mod distance;
mod region;
mod validate;

pub use distance::{haversine_distance_m, GeoPoint, EARTH_RADIUS_M};
pub use region::{is_within_region, BoundingBox};
pub use validate::{
    validate_business_registration, validate_country_code, validate_mobile_number,
    validate_postal_code,
};

use thiserror::Error;

/// Field-level validation failure.
///
/// Safe to show to API callers: it names the field and the rule that failed,
/// never anything internal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display_names_field() {
        let err = ValidationError::new("mobile", "must start with 9");
        assert_eq!(err.to_string(), "invalid mobile: must start with 9");
    }
}
