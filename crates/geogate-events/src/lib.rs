//! Event bus abstraction for invitation lifecycle notifications.
//!
//! Every status transition, courier update, location attempt and review
//! change is published here so operator dashboards can follow along.
//! Implementations:
//! - Memory (single server, tokio broadcast channels)

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use geogate_storage::{CampaignKind, CourierEventType, InvitationStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened to an invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Created,
    StatusChanged {
        from: InvitationStatus,
        to: InvitationStatus,
    },
    CourierUpdate {
        event_type: CourierEventType,
    },
    LocationAttempt {
        success: bool,
        distance_m: f64,
    },
    FlaggedForReview {
        consecutive_failures: u32,
    },
    ReviewCleared,
    DeviceMismatch {
        fingerprint_hash: String,
    },
    CampaignFired {
        campaign: CampaignKind,
    },
}

/// Event published for one invitation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvitationEvent {
    pub invitation_number: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl InvitationEvent {
    pub fn new(invitation_number: impl Into<String>, kind: EventKind, at: DateTime<Utc>) -> Self {
        Self {
            invitation_number: invitation_number.into(),
            kind,
            at,
        }
    }
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of invitation events
pub type EventStream = Pin<Box<dyn Stream<Item = InvitationEvent> + Send>>;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish to subscribers of this invitation and to firehose subscribers.
    /// Publishing with nobody listening is not an error.
    async fn publish(&self, event: InvitationEvent) -> Result<(), EventBusError>;

    /// Every event, for the admin dashboard.
    async fn subscribe_all(&self) -> Result<EventStream, EventBusError>;

    /// Events for a single invitation number.
    async fn subscribe(&self, invitation_number: &str) -> Result<EventStream, EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_serializes_flat_with_type_tag() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let event = InvitationEvent::new(
            "HTL-000001",
            EventKind::StatusChanged {
                from: InvitationStatus::Delivered,
                to: InvitationStatus::Activated,
            },
            at,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["from"], "delivered");
        assert_eq!(json["to"], "activated");
        assert_eq!(json["invitation_number"], "HTL-000001");

        let back: InvitationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_variants_carry_only_the_tag() {
        let event = InvitationEvent::new("RST-000002", EventKind::ReviewCleared, Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "review_cleared");
    }
}
