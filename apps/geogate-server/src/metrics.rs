//! Prometheus metrics for geogate-server.
//!
//! Exposes server metrics in Prometheus format at the `/metrics` endpoint.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "geogate_invitations_created_total",
        "Invitations created, by tier"
    );
    describe_counter!(
        "geogate_invitation_transitions_total",
        "Invitation status transitions"
    );
    describe_counter!(
        "geogate_location_verifications_total",
        "Location verification attempts by outcome"
    );
    describe_counter!(
        "geogate_courier_lookups_total",
        "Courier tracking lookups by carrier and status"
    );
    describe_counter!(
        "geogate_campaigns_fired_total",
        "Trial campaigns fired, by campaign"
    );
    describe_counter!("geogate_http_requests_total", "HTTP requests processed");
    describe_histogram!(
        "geogate_http_request_duration_seconds",
        "Duration of HTTP requests in seconds"
    );

    Ok(handle)
}

pub fn record_invitation_created(tier: &'static str) {
    counter!("geogate_invitations_created_total", "tier" => tier).increment(1);
}

pub fn record_transition(from: &'static str, to: &'static str) {
    counter!("geogate_invitation_transitions_total", "from" => from, "to" => to).increment(1);
}

pub fn record_location_verification(outcome: &'static str) {
    counter!("geogate_location_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_courier_lookup(carrier: &'static str, status: &'static str) {
    counter!("geogate_courier_lookups_total", "carrier" => carrier, "status" => status)
        .increment(1);
}

pub fn record_campaign(campaign: &'static str) {
    counter!("geogate_campaigns_fired_total", "campaign" => campaign).increment(1);
}

/// A helper to time a request and record metrics on completion.
pub struct RequestTimer {
    method: String,
    route: String,
    start: Instant,
}

impl RequestTimer {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
            start: Instant::now(),
        }
    }

    pub fn finish(self, status: u16) {
        let labels = [
            ("method", self.method),
            ("route", self.route),
            ("status", status.to_string()),
        ];
        counter!("geogate_http_requests_total", &labels[..]).increment(1);
        histogram!("geogate_http_request_duration_seconds", &labels[..2])
            .record(self.start.elapsed().as_secs_f64());
    }
}

/// Axum middleware timing every request by matched route. Install with
/// `route_layer` so [`MatchedPath`] is already set.
pub async fn track_http(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let timer = RequestTimer::new(request.method().as_str(), route);
    let response = next.run(request).await;
    timer.finish(response.status().as_u16());
    response
}
