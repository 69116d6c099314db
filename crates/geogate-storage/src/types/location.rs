//! Location verification attempts, spoofing indicators and device fingerprints.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InvitationId, LocationAttemptId, ParseEnumError};

/// Independent anti-spoofing heuristics, all evaluated on every attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoofingIndicators {
    pub vpn_detected: bool,
    pub proxy_detected: bool,
    pub tor_detected: bool,
    pub datacenter_ip: bool,
    pub gps_spoofing_likely: bool,
    pub device_time_inconsistent: bool,
    pub suspicious_user_agent: bool,
    pub rapid_location_change: bool,
    pub impossible_speed: bool,
    pub suspiciously_perfect_accuracy: bool,
}

impl SpoofingIndicators {
    /// Indicators strong enough on their own to refuse an activation.
    pub fn has_high_confidence(&self) -> bool {
        self.vpn_detected
            || self.tor_detected
            || self.gps_spoofing_likely
            || self.impossible_speed
            || self.suspicious_user_agent
    }

    /// Names of the indicators that fired, in declaration order.
    pub fn active(&self) -> Vec<&'static str> {
        [
            (self.vpn_detected, "vpn_detected"),
            (self.proxy_detected, "proxy_detected"),
            (self.tor_detected, "tor_detected"),
            (self.datacenter_ip, "datacenter_ip"),
            (self.gps_spoofing_likely, "gps_spoofing_likely"),
            (self.device_time_inconsistent, "device_time_inconsistent"),
            (self.suspicious_user_agent, "suspicious_user_agent"),
            (self.rapid_location_change, "rapid_location_change"),
            (self.impossible_speed, "impossible_speed"),
            (
                self.suspiciously_perfect_accuracy,
                "suspiciously_perfect_accuracy",
            ),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }

    pub fn any(&self) -> bool {
        !self.active().is_empty()
    }
}

/// Which signals corroborated the GPS fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Gps,
    GpsWifi,
    GpsIp,
    GpsWifiIp,
}

impl VerificationMethod {
    pub fn from_signals(wifi_matched: bool, ip_matched: bool) -> Self {
        match (wifi_matched, ip_matched) {
            (true, true) => VerificationMethod::GpsWifiIp,
            (true, false) => VerificationMethod::GpsWifi,
            (false, true) => VerificationMethod::GpsIp,
            (false, false) => VerificationMethod::Gps,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::Gps => "gps",
            VerificationMethod::GpsWifi => "gps_wifi",
            VerificationMethod::GpsIp => "gps_ip",
            VerificationMethod::GpsWifiIp => "gps_wifi_ip",
        }
    }
}

impl FromStr for VerificationMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gps" => Ok(VerificationMethod::Gps),
            "gps_wifi" => Ok(VerificationMethod::GpsWifi),
            "gps_ip" => Ok(VerificationMethod::GpsIp),
            "gps_wifi_ip" => Ok(VerificationMethod::GpsWifiIp),
            _ => Err(ParseEnumError::new("verification method", s)),
        }
    }
}

/// One scan/activation try. Immutable once written.
#[derive(Clone, Debug, Serialize)]
pub struct LocationAttempt {
    pub id: LocationAttemptId,
    pub invitation_id: InvitationId,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
    pub client_timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    /// Distance to the nearest allowed zone center.
    pub distance_m: f64,
    pub matched_zone: Option<String>,
    pub method: VerificationMethod,
    pub success: bool,
    pub confidence: f64,
    pub indicators: SpoofingIndicators,
    pub client_ip: Option<String>,
    pub fingerprint_hash: Option<String>,
}

/// Parameters for appending an attempt.
#[derive(Clone, Debug)]
pub struct NewLocationAttempt {
    pub invitation_id: InvitationId,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
    pub client_timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub distance_m: f64,
    pub matched_zone: Option<String>,
    pub method: VerificationMethod,
    pub success: bool,
    pub confidence: f64,
    pub indicators: SpoofingIndicators,
    pub client_ip: Option<String>,
    pub fingerprint_hash: Option<String>,
}

/// Derived identifier for a client device plus the signals it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub hash: String,
    pub user_agent: String,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub canvas_hash: Option<String>,
    pub webgl_hash: Option<String>,
    pub audio_hash: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}
