//! HTTP routes.

mod activation;
mod admin;
mod courier;
mod health;
mod invitations;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::Request;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::redact_errors;
use crate::metrics::track_http;
use crate::state::AppState;

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Operator API
        .route(
            "/api/invitations",
            get(invitations::list_invitations).post(invitations::create_invitation),
        )
        .route("/api/invitations/:number", get(invitations::get_invitation))
        .route("/api/invitations/:number/dispatch", post(invitations::dispatch))
        .route(
            "/api/invitations/:number/tracking/refresh",
            post(invitations::refresh_tracking),
        )
        .route("/api/invitations/:number/trial", post(invitations::start_trial))
        .route("/api/invitations/:number/convert", post(invitations::convert))
        .route("/api/invitations/:number/expire", post(invitations::expire))
        .route("/api/invitations/:number/review/clear", post(invitations::clear_review))
        .route("/api/analytics/conversion", get(admin::conversion_funnel))
        .route("/api/admin/events", get(admin::event_stream))
        // Recipient flow
        .route("/qr/:number", get(activation::scan))
        .route("/api/activation/location", post(activation::verify_location))
        .route("/api/activation/sms", post(activation::request_sms_code))
        .route("/api/activation", post(activation::activate))
        // Couriers
        .route("/api/courier/webhook/:carrier", post(courier::webhook))
        .route("/api/courier/track/:tracking_number", get(courier::track))
        // Operations
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route_layer(middleware::from_fn(track_http))
        .layer(middleware::from_fn_with_state(state.clone(), redact_errors))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Best-effort client address: the first `X-Forwarded-For` hop when the
/// deployment trusts it, otherwise the peer address.
pub struct ClientIp(pub Option<IpAddr>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.config.trust_forwarded_for {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return Ok(ClientIp(forwarded));
            }
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(peer))
    }
}
