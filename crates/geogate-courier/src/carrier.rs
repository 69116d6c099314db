use chrono::{DateTime, Utc};
use geogate_storage::{CarrierKind, CourierEventType, SignatureCapture};
use serde::{Deserialize, Serialize};

use crate::CourierError;

/// Shipment state as reported by a carrier, in a carrier-neutral vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    LabelCreated,
    PickedUp,
    InTransit,
    Delivered,
    DeliveryFailed,
    NotFound,
    Unknown,
    Error,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::LabelCreated => "label_created",
            TrackingStatus::PickedUp => "picked_up",
            TrackingStatus::InTransit => "in_transit",
            TrackingStatus::Delivered => "delivered",
            TrackingStatus::DeliveryFailed => "delivery_failed",
            TrackingStatus::NotFound => "not_found",
            TrackingStatus::Unknown => "unknown",
            TrackingStatus::Error => "error",
        }
    }

    /// Overall status implied by the latest event.
    pub fn from_latest_event(event_type: Option<CourierEventType>) -> Self {
        match event_type {
            None => TrackingStatus::Unknown,
            Some(CourierEventType::Created) => TrackingStatus::LabelCreated,
            Some(CourierEventType::PickedUp) => TrackingStatus::PickedUp,
            Some(CourierEventType::InTransit | CourierEventType::OutForDelivery) => {
                TrackingStatus::InTransit
            }
            Some(CourierEventType::Delivered) => TrackingStatus::Delivered,
            Some(
                CourierEventType::DeliveryAttempted
                | CourierEventType::Exception
                | CourierEventType::Returned,
            ) => TrackingStatus::DeliveryFailed,
        }
    }
}

/// One carrier event mapped onto [`CourierEventType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCourierEvent {
    pub tracking_number: String,
    pub event_type: CourierEventType,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub location: Option<String>,
    pub signature: Option<SignatureCapture>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrackingResult {
    pub success: bool,
    pub tracking_number: String,
    pub carrier: Option<CarrierKind>,
    pub status: TrackingStatus,
    /// Oldest first.
    pub events: Vec<NormalizedCourierEvent>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl TrackingResult {
    /// Successful lookup; derives status and delivery time from the events.
    pub fn found(
        carrier: CarrierKind,
        tracking_number: &str,
        mut events: Vec<NormalizedCourierEvent>,
        estimated_delivery: Option<DateTime<Utc>>,
    ) -> Self {
        events.sort_by_key(|e| e.occurred_at);
        let status = TrackingStatus::from_latest_event(events.last().map(|e| e.event_type));
        let actual_delivery = events
            .iter()
            .rev()
            .find(|e| e.event_type == CourierEventType::Delivered)
            .map(|e| e.occurred_at);
        Self {
            success: true,
            tracking_number: tracking_number.to_string(),
            carrier: Some(carrier),
            status,
            events,
            estimated_delivery,
            actual_delivery,
            error: None,
        }
    }

    pub fn failed(
        carrier: Option<CarrierKind>,
        tracking_number: &str,
        status: TrackingStatus,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            tracking_number: tracking_number.to_string(),
            carrier,
            status,
            events: Vec::new(),
            estimated_delivery: None,
            actual_delivery: None,
            error: Some(error.into()),
        }
    }
}

/// What the carrier needs to pick up and deliver one invitation card.
#[derive(Clone, Debug, Serialize)]
pub struct ShipmentRequest {
    /// Our reference, the invitation number.
    pub reference: String,
    pub recipient_name: String,
    pub organization: String,
    pub address: String,
    pub phone: Option<String>,
    pub signature_required: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Shipment {
    pub carrier: CarrierKind,
    pub tracking_number: String,
    pub label_url: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
}

/// A carrier binding.
#[async_trait::async_trait]
pub trait Carrier: Send + Sync {
    fn kind(&self) -> CarrierKind;

    /// Whether the tracking number has this carrier's shape.
    fn matches_tracking_number(&self, tracking_number: &str) -> bool;

    /// Returns `NotFound` when the carrier does not know the number.
    async fn track(&self, tracking_number: &str) -> Result<TrackingResult, CourierError>;

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ev(event_type: CourierEventType, hour: u32) -> NormalizedCourierEvent {
        NormalizedCourierEvent {
            tracking_number: "1234567890".into(),
            event_type,
            occurred_at: Utc.with_ymd_and_hms(2025, 3, 2, hour, 0, 0).unwrap(),
            description: String::new(),
            location: None,
            signature: None,
        }
    }

    #[test]
    fn found_sorts_events_and_derives_status() {
        let r = TrackingResult::found(
            CarrierKind::Acs,
            "1234567890",
            vec![
                ev(CourierEventType::Delivered, 15),
                ev(CourierEventType::PickedUp, 8),
                ev(CourierEventType::OutForDelivery, 11),
            ],
            None,
        );
        assert!(r.success);
        assert_eq!(r.status, TrackingStatus::Delivered);
        assert_eq!(r.events[0].event_type, CourierEventType::PickedUp);
        assert_eq!(
            r.actual_delivery,
            Some(Utc.with_ymd_and_hms(2025, 3, 2, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn no_events_is_unknown() {
        let r = TrackingResult::found(CarrierKind::Dhl, "1234567890", vec![], None);
        assert_eq!(r.status, TrackingStatus::Unknown);
        assert!(r.actual_delivery.is_none());
    }

    #[test]
    fn failed_attempt_maps_to_delivery_failed() {
        assert_eq!(
            TrackingStatus::from_latest_event(Some(CourierEventType::DeliveryAttempted)),
            TrackingStatus::DeliveryFailed
        );
    }
}
