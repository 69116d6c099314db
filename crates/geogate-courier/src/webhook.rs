use geogate_storage::CarrierKind;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::carriers::{AcsTracking, DhlTracking, ManualEvent, PostTracking};
use crate::{CourierError, NormalizedCourierEvent};

fn decode<T: DeserializeOwned>(payload: &Value) -> Result<T, CourierError> {
    T::deserialize(payload).map_err(|e| CourierError::InvalidWebhook(e.to_string()))
}

/// Normalize a carrier webhook body.
///
/// ACS, Cyprus Post and DHL push the same documents their tracking endpoints
/// return. Manual deliveries post one event, or `{"events": [...]}`, in the
/// normalized vocabulary. Unmapped carrier codes are skipped.
pub fn parse_webhook(
    carrier: CarrierKind,
    payload: &Value,
) -> Result<Vec<NormalizedCourierEvent>, CourierError> {
    match carrier {
        CarrierKind::Acs => decode::<AcsTracking>(payload)?.normalize(),
        CarrierKind::CyprusPost => decode::<PostTracking>(payload)?.normalize(),
        CarrierKind::Dhl => decode::<DhlTracking>(payload)?.normalize(),
        CarrierKind::Manual => match payload.get("events") {
            Some(events) => decode::<Vec<ManualEvent>>(events)?
                .into_iter()
                .map(ManualEvent::normalize)
                .collect(),
            None => Ok(vec![decode::<ManualEvent>(payload)?.normalize()?]),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geogate_storage::CourierEventType;
    use serde_json::json;

    #[test]
    fn acs_webhook() {
        let events = parse_webhook(
            CarrierKind::Acs,
            &json!({
                "voucher_no": "1234567890",
                "events": [{
                    "checkpoint_date_time": "2025-03-02T11:30:00Z",
                    "checkpoint_action": "DELIVERED",
                    "signed_by": "Reception"
                }]
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tracking_number, "1234567890");
        assert_eq!(events[0].event_type, CourierEventType::Delivered);
    }

    #[test]
    fn cyprus_post_webhook() {
        let events = parse_webhook(
            CarrierKind::CyprusPost,
            &json!({
                "item": {
                    "id": "RR123456789CY",
                    "events": [
                        {"date": "2025-03-01T08:00:00Z", "code": "EMA", "office": "NICOSIA"},
                        {"date": "2025-03-02T10:00:00Z", "code": "EMI", "office": "LARNACA"}
                    ]
                }
            }),
        )
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].location.as_deref(), Some("LARNACA"));
    }

    #[test]
    fn manual_single_and_batch() {
        let single = parse_webhook(
            CarrierKind::Manual,
            &json!({
                "tracking_number": "HD-HTL000001-ABCDEF",
                "event_type": "delivered",
                "occurred_at": "2025-03-02T11:30:00Z",
                "signed_by": "Eleni Georgiou"
            }),
        )
        .unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].description, "delivered");
        assert!(single[0].signature.is_some());

        let batch = parse_webhook(
            CarrierKind::Manual,
            &json!({"events": [
                {"tracking_number": "HD-HTL000001-ABCDEF", "event_type": "picked_up",
                 "occurred_at": "2025-03-02T08:00:00Z"},
                {"tracking_number": "HD-HTL000001-ABCDEF", "event_type": "out_for_delivery",
                 "occurred_at": "2025-03-02T09:00:00Z", "description": "With driver"}
            ]}),
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].description, "picked up");
        assert_eq!(batch[1].description, "With driver");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let err = parse_webhook(CarrierKind::Acs, &json!({"nope": true})).unwrap_err();
        assert!(matches!(err, CourierError::InvalidWebhook(_)));
        let err = parse_webhook(
            CarrierKind::Manual,
            &json!({"tracking_number": "x", "event_type": "teleported", "occurred_at": "2025-03-02T08:00:00Z"}),
        )
        .unwrap_err();
        assert!(matches!(err, CourierError::InvalidWebhook(_)));
    }
}
