//! Service error type and its HTTP mapping.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use geogate_crypto::TokenError;
use geogate_geo::ValidationError;
use geogate_storage::{CacheError, InvitationStatus, StoreError};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("cannot move invitation from {from} to {to}")]
    InvalidStateTransition {
        from: InvitationStatus,
        to: InvitationStatus,
    },

    #[error("location verification failed: {reason} ({distance_m:.0} m from the nearest zone)")]
    Geofencing {
        reason: String,
        distance_m: f64,
        latitude: f64,
        longitude: f64,
    },

    #[error("invitation is locked pending manual review")]
    LockedOut,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("courier error: {0}")]
    Courier(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServiceError::NotFound("invitation".to_string()),
            StoreError::AlreadyExists => ServiceError::Validation("record already exists".into()),
            StoreError::Conflict => ServiceError::Storage("concurrent update".into()),
            StoreError::Backend(msg) => ServiceError::Storage(msg),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(e: CacheError) -> Self {
        ServiceError::Storage(e.to_string())
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            ServiceError::Geofencing { .. } | ServiceError::LockedOut => StatusCode::FORBIDDEN,
            ServiceError::Token(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Courier(_) => StatusCode::BAD_GATEWAY,
            ServiceError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::InvalidStateTransition { .. } => "invalid_state_transition",
            ServiceError::Geofencing { .. } => "geofencing",
            ServiceError::LockedOut => "locked_out",
            ServiceError::Token(_) => "token",
            ServiceError::Courier(_) => "courier",
            ServiceError::RateLimited(_) => "rate_limited",
            ServiceError::Storage(_) | ServiceError::Internal(_) => "internal",
        }
    }

    /// Replacement message used in production, `None` when the detailed
    /// message is already safe to show.
    fn public_message(&self) -> Option<&'static str> {
        match self {
            ServiceError::Token(e) => Some(e.public_message()),
            ServiceError::Geofencing { .. } => Some("location verification failed"),
            ServiceError::Courier(_) => Some("courier service unavailable"),
            ServiceError::Storage(_) | ServiceError::Internal(_) => {
                Some("an internal error occurred")
            }
            _ => None,
        }
    }
}

/// Marker left on error responses so [`redact_errors`] can swap the body.
#[derive(Clone, Copy, Debug)]
pub struct PublicMessage {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let mut body = json!({
            "success": false,
            "error": self.code(),
            "reason": self.to_string(),
        });
        if let ServiceError::Geofencing {
            distance_m,
            latitude,
            longitude,
            ..
        } = &self
        {
            body["distance_m"] = json!(distance_m);
            body["latitude"] = json!(latitude);
            body["longitude"] = json!(longitude);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(message) = self.public_message() {
            response.extensions_mut().insert(PublicMessage {
                code: self.code(),
                message,
            });
        }
        response
    }
}

/// In production, replace detailed error bodies with their public message.
pub async fn redact_errors(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    if !state.config.production {
        return response;
    }
    let Some(public) = response.extensions().get::<PublicMessage>().copied() else {
        return response;
    };
    let (mut parts, _) = response.into_parts();
    let body = json!({"success": false, "error": public.code, "reason": public.message});
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServiceError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::NotFound("invitation".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidStateTransition {
                from: InvitationStatus::Sent,
                to: InvitationStatus::Activated
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Token(TokenError::Tampered).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ServiceError::LockedOut.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ServiceError::Courier("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::RateLimited("slow down".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServiceError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_errors_convert() {
        assert!(matches!(
            ServiceError::from(StoreError::NotFound),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::from(StoreError::Backend("locked".into())),
            ServiceError::Storage(_)
        ));
    }

    #[test]
    fn token_errors_share_public_message() {
        let tampered = ServiceError::Token(TokenError::Tampered).public_message();
        let malformed = ServiceError::Token(TokenError::Malformed).public_message();
        assert_eq!(tampered, malformed);
        assert!(ServiceError::Validation("x".into())
            .public_message()
            .is_none());
    }

    #[test]
    fn geofencing_message_cites_distance() {
        let e = ServiceError::Geofencing {
            reason: "outside geofence".into(),
            distance_m: 1000.4,
            latitude: 34.7,
            longitude: 33.0,
        };
        assert!(e.to_string().contains("1000 m"), "{e}");
    }
}
