//! Anti-spoofing heuristics. Each indicator is evaluated on its own; the
//! engine decides which ones are fatal.

use chrono::{DateTime, Utc};
use geogate_geo::haversine_distance_m;
use geogate_storage::SpoofingIndicators;

use super::fingerprint::is_suspicious_user_agent;
use super::LocationInput;
use crate::config::LocationConfig;

/// Floor for the time between two attempts, so replays with identical
/// timestamps still produce a finite speed.
const MIN_ELAPSED_SECS: f64 = 1.0;

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

pub fn evaluate(input: &LocationInput<'_>, config: &LocationConfig) -> SpoofingIndicators {
    let sample = input.sample;

    let perfect_accuracy = sample
        .accuracy_m
        .is_some_and(|a| a < config.perfect_accuracy_m);

    let too_fast = sample
        .speed_mps
        .is_some_and(|s| s > config.max_scan_speed_mps);
    let implausible_altitude = sample
        .altitude_m
        .is_some_and(|a| a < config.min_altitude_m || a > config.max_altitude_m);
    let heading_while_still =
        sample.heading_deg.is_some() && sample.speed_mps == Some(0.0) && perfect_accuracy;

    let drift = (sample.timestamp - input.received_at)
        .num_milliseconds()
        .unsigned_abs();
    let device_time_inconsistent = u128::from(drift) > config.max_clock_drift.as_millis();

    let (impossible_speed, rapid_location_change) = match input.previous {
        Some(prev) => {
            let moved_m = haversine_distance_m(
                prev.latitude,
                prev.longitude,
                sample.latitude,
                sample.longitude,
            );
            // The device clock is attacker controlled; it may only shorten
            // the interval we measured ourselves.
            let server_secs = seconds_between(prev.received_at, input.received_at);
            let client_secs = seconds_between(prev.client_timestamp, sample.timestamp);
            let elapsed_secs = server_secs.min(client_secs);
            let speed_kmh = moved_m / elapsed_secs.max(MIN_ELAPSED_SECS) * 3.6;
            (
                speed_kmh > config.max_travel_speed_kmh,
                moved_m > config.rapid_change_m
                    && elapsed_secs <= config.rapid_change_window.as_secs_f64(),
            )
        }
        None => (false, false),
    };

    SpoofingIndicators {
        vpn_detected: input.ip.vpn,
        proxy_detected: input.ip.proxy,
        tor_detected: input.ip.tor,
        datacenter_ip: input.ip.datacenter,
        gps_spoofing_likely: too_fast || implausible_altitude || heading_while_still,
        device_time_inconsistent,
        suspicious_user_agent: is_suspicious_user_agent(&sample.device.user_agent),
        rapid_location_change,
        impossible_speed,
        suspiciously_perfect_accuracy: perfect_accuracy,
    }
}
