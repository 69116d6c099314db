//! Operator endpoints for the invitation lifecycle.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use geogate_storage::{ConversionDetails, Invitation, InvitationFilter, InvitationStatus};
use serde::Deserialize;

use crate::error::ServiceError;
use crate::invitations::{
    CreateInvitation, CreatedInvitation, DispatchRequest, InvitationDetail, RefreshOutcome,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub flagged: bool,
}

/// POST /api/invitations
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateInvitation>,
) -> Result<(StatusCode, Json<CreatedInvitation>), ServiceError> {
    let created = state.service.create(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/invitations?status=&flagged=
pub async fn list_invitations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Invitation>>, ServiceError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InvitationStatus>)
        .transpose()
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
    let filter = InvitationFilter {
        status,
        flagged_only: query.flagged,
    };
    Ok(Json(state.service.list(&filter).await?))
}

/// GET /api/invitations/:number
pub async fn get_invitation(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<InvitationDetail>, ServiceError> {
    Ok(Json(state.service.get(&number).await?))
}

/// POST /api/invitations/:number/dispatch
///
/// The body is optional; without one the default carrier books a shipment.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    body: Option<Json<DispatchRequest>>,
) -> Result<Json<Invitation>, ServiceError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.service.dispatch(&number, request).await?))
}

/// POST /api/invitations/:number/tracking/refresh
pub async fn refresh_tracking(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<RefreshOutcome>, ServiceError> {
    Ok(Json(state.service.refresh_tracking(&number).await?))
}

/// POST /api/invitations/:number/trial
pub async fn start_trial(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<InvitationDetail>, ServiceError> {
    Ok(Json(state.service.start_trial(&number).await?))
}

/// POST /api/invitations/:number/convert
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    Json(details): Json<ConversionDetails>,
) -> Result<Json<Invitation>, ServiceError> {
    Ok(Json(state.service.convert(&number, details).await?))
}

/// POST /api/invitations/:number/expire
pub async fn expire(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<Invitation>, ServiceError> {
    Ok(Json(state.service.expire(&number).await?))
}

/// POST /api/invitations/:number/review/clear
pub async fn clear_review(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<Json<Invitation>, ServiceError> {
    Ok(Json(state.service.clear_review(&number).await?))
}
