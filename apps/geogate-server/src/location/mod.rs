//! Location verification: geofence distance, corroborating network signals
//! and anti-spoofing heuristics. Everything here is pure; persisting
//! attempts and lockout live in the invitation service.

mod cidr;
mod engine;
mod fingerprint;
mod spoofing;

pub use cidr::Cidr;
pub use engine::{LocationEngine, LocationFailure, LocationVerdict};
pub use fingerprint::DeviceInfo;

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use geogate_geo::{GeoPoint, ValidationError};
use geogate_storage::{Geofence, LocationAttempt};
use serde::Deserialize;

use crate::ip_intel::IpAssessment;

/// One position fix as reported by the activation page.
#[derive(Clone, Debug, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
    /// Device clock at the time of the fix.
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub wifi_networks: Vec<String>,
    pub device: DeviceInfo,
}

impl LocationSample {
    /// Reject fixes no real device reports: coordinates out of range or not
    /// finite, negative accuracy.
    pub fn validate(&self) -> Result<GeoPoint, ValidationError> {
        let point = GeoPoint::new(self.latitude, self.longitude)?;
        if self.accuracy_m.is_some_and(|a| !a.is_finite() || a < 0.0) {
            return Err(ValidationError::new(
                "accuracy_m",
                "must be a non-negative number",
            ));
        }
        Ok(point)
    }
}

pub struct LocationInput<'a> {
    pub sample: &'a LocationSample,
    pub client_ip: Option<IpAddr>,
    pub geofence: &'a Geofence,
    pub previous: Option<&'a LocationAttempt>,
    pub ip: &'a IpAssessment,
    pub received_at: DateTime<Utc>,
}
