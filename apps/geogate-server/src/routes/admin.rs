//! Operator dashboard feeds.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::Deserialize;

use crate::analytics::ConversionFunnel;
use crate::error::ServiceError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only this invitation's events.
    pub invitation: Option<String>,
}

/// GET /api/admin/events
pub async fn event_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServiceError> {
    let events = match &query.invitation {
        Some(number) => state.events.subscribe(number).await,
        None => state.events.subscribe_all().await,
    }
    .map_err(|e| ServiceError::Internal(e.to_string()))?;

    let stream = events.map(|event| {
        let sse = Event::default().event("invitation");
        Ok(match sse.json_data(&event) {
            Ok(sse) => sse,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode event");
                Event::default().comment("encoding error")
            }
        })
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// GET /api/analytics/conversion
pub async fn conversion_funnel(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConversionFunnel>, ServiceError> {
    Ok(Json(state.service.conversion_funnel().await?))
}
