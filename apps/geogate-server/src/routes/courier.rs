//! Carrier webhooks and tracking lookups.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use geogate_courier::{parse_webhook, TrackingResult};
use geogate_storage::CarrierKind;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ServiceError;
use crate::invitations::WebhookOutcome;
use crate::state::AppState;

fn parse_carrier(value: &str) -> Result<CarrierKind, ServiceError> {
    value
        .parse()
        .map_err(|e: geogate_storage::ParseEnumError| ServiceError::Validation(e.to_string()))
}

/// POST /api/courier/webhook/:carrier
///
/// Carriers retry until they get a 2xx, so replays are expected and are
/// acknowledged without side effects.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(carrier): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<WebhookOutcome>, ServiceError> {
    let carrier = parse_carrier(&carrier)?;
    let events =
        parse_webhook(carrier, &payload).map_err(|e| ServiceError::Validation(e.to_string()))?;
    let outcome = state.service.record_courier_events(carrier, events).await?;
    tracing::info!(
        carrier = carrier.as_str(),
        received = outcome.received,
        recorded = outcome.recorded,
        duplicates = outcome.duplicates,
        unmatched = outcome.unmatched,
        "courier webhook processed"
    );
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    pub carrier: Option<String>,
}

/// GET /api/courier/track/:tracking_number?carrier=
pub async fn track(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Result<Json<TrackingResult>, ServiceError> {
    let hint = query.carrier.as_deref().map(parse_carrier).transpose()?;
    Ok(Json(state.service.track(&tracking_number, hint).await))
}
