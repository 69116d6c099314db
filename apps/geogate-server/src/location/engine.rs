use geogate_geo::{haversine_distance_m, BoundingBox};
use geogate_storage::{GeofenceZone, SpoofingIndicators, VerificationMethod};
use serde::Serialize;

use super::{spoofing, Cidr, LocationInput};
use crate::config::LocationConfig;

/// Why an attempt did not verify.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationFailure {
    OutsideServiceRegion,
    OutsideGeofence { radius_m: f64 },
    SpoofingDetected { indicators: Vec<&'static str> },
}

impl LocationFailure {
    pub fn reason(&self) -> String {
        match self {
            LocationFailure::OutsideServiceRegion => "outside the service region".to_string(),
            LocationFailure::OutsideGeofence { radius_m } => {
                format!("outside the {radius_m:.0} m activation area")
            }
            LocationFailure::SpoofingDetected { indicators } => {
                format!("spoofing suspected: {}", indicators.join(", "))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LocationVerdict {
    pub verified: bool,
    pub within_geofence: bool,
    /// Distance to the nearest zone center.
    pub distance_m: f64,
    pub nearest_zone: String,
    pub matched_zone: Option<String>,
    pub method: VerificationMethod,
    pub confidence: f64,
    pub indicators: SpoofingIndicators,
    pub failure: Option<LocationFailure>,
}

#[derive(Clone, Debug)]
pub struct LocationEngine {
    config: LocationConfig,
    service_region: Option<BoundingBox>,
}

impl LocationEngine {
    pub fn new(config: LocationConfig, service_region: Option<BoundingBox>) -> Self {
        Self {
            config,
            service_region,
        }
    }

    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    pub fn service_region(&self) -> Option<&BoundingBox> {
        self.service_region.as_ref()
    }

    pub fn evaluate(&self, input: &LocationInput<'_>) -> LocationVerdict {
        let sample = input.sample;

        // Nearest zone for reporting; the closest containing zone for matching.
        let mut measured: Vec<(&GeofenceZone, f64)> = input
            .geofence
            .zones()
            .map(|z| {
                let d = haversine_distance_m(
                    z.point.latitude,
                    z.point.longitude,
                    sample.latitude,
                    sample.longitude,
                );
                (z, d)
            })
            .collect();
        measured.sort_by(|a, b| a.1.total_cmp(&b.1));
        // zones() always yields the primary
        let (nearest, distance_m) = measured[0];
        let matched = measured.iter().find(|(z, d)| *d <= z.radius_m).map(|(z, _)| *z);

        let in_region = self
            .service_region
            .map_or(true, |r| r.contains(sample.latitude, sample.longitude));
        let within_geofence = in_region && matched.is_some();

        let wifi_matched = sample.wifi_networks.iter().any(|seen| {
            input
                .geofence
                .allowed_wifi
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(seen.trim()))
        });
        let ip_in_range = input.client_ip.is_some_and(|ip| {
            input
                .geofence
                .allowed_ip_ranges
                .iter()
                .filter_map(|r| r.parse::<Cidr>().ok())
                .any(|r| r.contains(&ip))
        });
        let country_matched = input.ip.country.as_deref().is_some_and(|c| {
            input
                .geofence
                .allowed_countries
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(c))
        });
        let ip_matched = ip_in_range || country_matched;
        let method = VerificationMethod::from_signals(wifi_matched, ip_matched);

        let indicators = spoofing::evaluate(input, &self.config);

        let failure = if !in_region {
            Some(LocationFailure::OutsideServiceRegion)
        } else if matched.is_none() {
            Some(LocationFailure::OutsideGeofence {
                radius_m: nearest.radius_m,
            })
        } else if indicators.has_high_confidence() {
            Some(LocationFailure::SpoofingDetected {
                indicators: indicators.active(),
            })
        } else {
            None
        };

        let confidence = confidence(
            distance_m,
            matched.map_or(nearest.radius_m, |z| z.radius_m),
            within_geofence,
            wifi_matched,
            ip_matched,
            &indicators,
        );

        LocationVerdict {
            verified: failure.is_none(),
            within_geofence,
            distance_m,
            nearest_zone: nearest.label.clone(),
            matched_zone: matched.map(|z| z.label.clone()),
            method,
            confidence,
            indicators,
            failure,
        }
    }
}

/// Distance ratio plus corroboration bonuses minus indicator penalties,
/// clamped to `[0, 1]`.
fn confidence(
    distance_m: f64,
    radius_m: f64,
    within: bool,
    wifi_matched: bool,
    ip_matched: bool,
    indicators: &SpoofingIndicators,
) -> f64 {
    let radius_m = radius_m.max(1.0);
    let mut score = if within {
        0.6 + 0.2 * (1.0 - distance_m / radius_m).max(0.0)
    } else {
        0.3 * (radius_m / distance_m.max(radius_m))
    };
    if wifi_matched {
        score += 0.1;
    }
    if ip_matched {
        score += 0.1;
    }
    let active = indicators.active().len() as f64;
    let severe = [
        indicators.vpn_detected,
        indicators.tor_detected,
        indicators.gps_spoofing_likely,
        indicators.impossible_speed,
        indicators.suspicious_user_agent,
    ]
    .into_iter()
    .filter(|on| *on)
    .count() as f64;
    score -= 0.3 * severe + 0.1 * (active - severe);
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip_intel::IpAssessment;
    use crate::location::tests::{geofence, sample_at};
    use crate::location::LocationSample;
    use geogate_geo::GeoPoint;

    fn engine() -> LocationEngine {
        LocationEngine::new(LocationConfig::default(), Some(BoundingBox::CYPRUS))
    }

    fn verdict_for(
        engine: &LocationEngine,
        sample: &LocationSample,
        fence: &geogate_storage::Geofence,
        client_ip: Option<&str>,
        ip: &IpAssessment,
    ) -> LocationVerdict {
        engine.evaluate(&LocationInput {
            sample,
            client_ip: client_ip.map(|s| s.parse().unwrap()),
            geofence: fence,
            previous: None,
            ip,
            received_at: sample.timestamp,
        })
    }

    /// Point `meters` due north of the primary center.
    fn north_of_primary(meters: f64) -> (f64, f64) {
        let center = geofence().primary.point;
        let d_lat = (meters / geogate_geo::EARTH_RADIUS_M).to_degrees();
        (center.latitude + d_lat, center.longitude)
    }

    #[test]
    fn exact_point_with_zero_accuracy_verifies() {
        let mut s = sample_at(34.6786, 33.0413);
        s.accuracy_m = Some(0.0);
        let v = verdict_for(&engine(), &s, &geofence(), None, &IpAssessment::default());
        assert!(v.verified, "{v:?}");
        assert_eq!(v.distance_m, 0.0);
        assert_eq!(v.matched_zone.as_deref(), Some("main entrance"));
        assert!(v.indicators.suspiciously_perfect_accuracy);
        assert!(v.confidence > 0.5);
    }

    #[test]
    fn boundary_is_inside() {
        let fence = geofence();
        let (lat, lng) = north_of_primary(50.0);
        let s = sample_at(lat, lng);
        let d = fence.primary.point.distance_to(&GeoPoint::new(lat, lng).unwrap());
        let mut exact = fence.clone();
        exact.primary.radius_m = d;
        let v = verdict_for(&engine(), &s, &exact, None, &IpAssessment::default());
        assert!(v.within_geofence);
        assert!(v.verified);
    }

    #[test]
    fn ten_times_radius_fails_with_distance() {
        let (lat, lng) = north_of_primary(1_000.0);
        let s = sample_at(lat, lng);
        let v = verdict_for(&engine(), &s, &geofence(), None, &IpAssessment::default());
        assert!(!v.verified);
        assert!((v.distance_m - 1_000.0).abs() < 1.0, "{}", v.distance_m);
        assert_eq!(
            v.failure,
            Some(LocationFailure::OutsideGeofence { radius_m: 100.0 })
        );
    }

    #[test]
    fn alternate_zone_matches() {
        let mut fence = geofence();
        fence.alternates.push(GeofenceZone {
            label: "back office".into(),
            point: GeoPoint::new(34.7000, 33.0500).unwrap(),
            radius_m: 50.0,
        });
        let s = sample_at(34.7000, 33.0500);
        let v = verdict_for(&engine(), &s, &fence, None, &IpAssessment::default());
        assert!(v.verified);
        assert_eq!(v.matched_zone.as_deref(), Some("back office"));
        assert_eq!(v.nearest_zone, "back office");
    }

    #[test]
    fn outside_service_region_is_prefiltered() {
        let mut fence = geofence();
        fence.primary.point = GeoPoint::new(37.9838, 23.7275).unwrap();
        let s = sample_at(37.9838, 23.7275);
        let v = verdict_for(&engine(), &s, &fence, None, &IpAssessment::default());
        assert!(!v.verified);
        assert_eq!(v.failure, Some(LocationFailure::OutsideServiceRegion));
        assert_eq!(v.distance_m, 0.0);

        let anywhere = LocationEngine::new(LocationConfig::default(), None);
        assert!(verdict_for(&anywhere, &s, &fence, None, &IpAssessment::default()).verified);
    }

    #[test]
    fn vpn_blocks_even_inside() {
        let s = sample_at(34.6786, 33.0413);
        let ip = IpAssessment {
            vpn: true,
            ..Default::default()
        };
        let v = verdict_for(&engine(), &s, &geofence(), None, &ip);
        assert!(v.within_geofence);
        assert!(!v.verified);
        assert!(matches!(
            v.failure,
            Some(LocationFailure::SpoofingDetected { ref indicators }) if indicators == &["vpn_detected"]
        ));
    }

    #[test]
    fn corroborating_signals_raise_confidence() {
        let mut fence = geofence();
        fence.allowed_wifi = vec!["LimassolBay-Guest".into()];
        fence.allowed_ip_ranges = vec!["82.116.192.0/19".into()];
        let mut s = sample_at(34.6786, 33.0413);
        let plain = verdict_for(&engine(), &s, &fence, None, &IpAssessment::default());
        s.wifi_networks = vec!["limassolbay-guest".into()];
        let v = verdict_for(
            &engine(),
            &s,
            &fence,
            Some("82.116.200.4"),
            &IpAssessment::default(),
        );
        assert_eq!(plain.method, VerificationMethod::Gps);
        assert_eq!(v.method, VerificationMethod::GpsWifiIp);
        assert!(v.confidence > plain.confidence);
    }

    #[test]
    fn allowed_country_counts_as_ip_signal() {
        let mut fence = geofence();
        fence.allowed_countries = vec!["CY".into()];
        let s = sample_at(34.6786, 33.0413);
        let ip = IpAssessment {
            country: Some("CY".into()),
            ..Default::default()
        };
        let v = verdict_for(&engine(), &s, &fence, None, &ip);
        assert_eq!(v.method, VerificationMethod::GpsIp);
    }
}
