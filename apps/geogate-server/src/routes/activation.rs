//! Recipient-facing endpoints: QR landing, location check, SMS and activation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use super::ClientIp;
use crate::error::ServiceError;
use crate::invitations::{
    ActivationReceipt, ActivationRequest, LocationCheck, LocationResult, ScanView, SmsRequest,
    SmsRequested,
};
use crate::location::DeviceInfo;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanQuery {
    pub token: String,
}

/// GET /qr/:number?token=
pub async fn scan(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    Query(query): Query<ScanQuery>,
    headers: HeaderMap,
) -> Result<Json<ScanView>, ServiceError> {
    let device = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(DeviceInfo::from_user_agent);
    Ok(Json(state.service.scan(&number, &query.token, device).await?))
}

/// POST /api/activation/location
pub async fn verify_location(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(req): Json<LocationCheck>,
) -> Result<Json<LocationResult>, ServiceError> {
    let verdict = state.service.verify_location(req, ip).await?;
    Ok(Json(LocationResult::from(&verdict)))
}

/// POST /api/activation/sms
pub async fn request_sms_code(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmsRequest>,
) -> Result<Json<SmsRequested>, ServiceError> {
    Ok(Json(state.service.request_sms_code(req).await?))
}

/// POST /api/activation
pub async fn activate(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(req): Json<ActivationRequest>,
) -> Result<Json<ActivationReceipt>, ServiceError> {
    let outcome = state.service.activate(req, ip).await?;
    Ok(Json(outcome.into()))
}
