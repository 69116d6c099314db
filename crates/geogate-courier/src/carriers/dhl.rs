//! DHL Express (shipment tracking unified API shape).

use std::sync::LazyLock;

use geogate_storage::{CarrierKind, CourierEventType};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{parse_timestamp, trim_base};
use crate::{Carrier, CourierError, NormalizedCourierEvent, Shipment, ShipmentRequest, TrackingResult};

static WAYBILL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{10}|J?JD\d{18})$").expect("valid regex"));

const API_KEY_HEADER: &str = "DHL-API-Key";

#[derive(Debug, Deserialize)]
struct DhlAddress {
    #[serde(rename = "addressLocality")]
    locality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DhlLocation {
    address: Option<DhlAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlEvent {
    timestamp: String,
    status_code: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<DhlLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlShipment {
    id: String,
    #[serde(default)]
    estimated_time_of_delivery: Option<String>,
    #[serde(default)]
    events: Vec<DhlEvent>,
}

/// Tracking response body; DHL push notifications use the same envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct DhlTracking {
    #[serde(default)]
    shipments: Vec<DhlShipment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DhlShipmentBody<'a> {
    customer_reference: &'a str,
    receiver_name: &'a str,
    receiver_company: &'a str,
    receiver_address: &'a str,
    receiver_phone: Option<&'a str>,
    signature_on_delivery: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlShipmentResponse {
    shipment_tracking_number: String,
    #[serde(default)]
    label_url: Option<String>,
}

fn map_status(code: &str) -> Option<CourierEventType> {
    match code {
        "pre-transit" => Some(CourierEventType::Created),
        "pickup" => Some(CourierEventType::PickedUp),
        "transit" => Some(CourierEventType::InTransit),
        "out-for-delivery" => Some(CourierEventType::OutForDelivery),
        "delivery-attempt" => Some(CourierEventType::DeliveryAttempted),
        "delivered" => Some(CourierEventType::Delivered),
        "failure" => Some(CourierEventType::Exception),
        "returned" => Some(CourierEventType::Returned),
        _ => None,
    }
}

impl DhlTracking {
    pub(crate) fn normalize(&self) -> Result<Vec<NormalizedCourierEvent>, CourierError> {
        let mut out = Vec::new();
        for shipment in &self.shipments {
            for ev in &shipment.events {
                let Some(event_type) = map_status(&ev.status_code) else {
                    tracing::debug!(status = %ev.status_code, "skipping unmapped DHL event");
                    continue;
                };
                out.push(NormalizedCourierEvent {
                    tracking_number: shipment.id.clone(),
                    event_type,
                    occurred_at: parse_timestamp(&ev.timestamp)?,
                    description: ev
                        .description
                        .clone()
                        .unwrap_or_else(|| ev.status_code.clone()),
                    location: ev
                        .location
                        .as_ref()
                        .and_then(|l| l.address.as_ref())
                        .and_then(|a| a.locality.clone()),
                    signature: None,
                });
            }
        }
        Ok(out)
    }
}

pub struct DhlCarrier {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DhlCarrier {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
            api_key,
        }
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl Carrier for DhlCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Dhl
    }

    fn matches_tracking_number(&self, tracking_number: &str) -> bool {
        WAYBILL.is_match(tracking_number)
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult, CourierError> {
        let url = format!("{}/track/shipments", self.base_url);
        let resp = self
            .with_key(self.http.get(url))
            .query(&[("trackingNumber", tracking_number)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CourierError::NotFound);
        }
        let body: DhlTracking = resp.error_for_status()?.json().await?;
        let Some(shipment) = body.shipments.first() else {
            return Err(CourierError::NotFound);
        };
        let estimated = shipment
            .estimated_time_of_delivery
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        Ok(TrackingResult::found(
            CarrierKind::Dhl,
            tracking_number,
            body.normalize()?,
            estimated,
        ))
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
        let url = format!("{}/shipments", self.base_url);
        let body = DhlShipmentBody {
            customer_reference: &request.reference,
            receiver_name: &request.recipient_name,
            receiver_company: &request.organization,
            receiver_address: &request.address,
            receiver_phone: request.phone.as_deref(),
            signature_on_delivery: request.signature_required,
        };
        let resp: DhlShipmentResponse = self
            .with_key(self.http.post(url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Shipment {
            carrier: CarrierKind::Dhl,
            tracking_number: resp.shipment_tracking_number,
            label_url: resp.label_url,
            estimated_delivery: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waybill_shapes() {
        let c = DhlCarrier::new(Client::new(), "http://localhost", None);
        assert!(c.matches_tracking_number("1234567890"));
        assert!(c.matches_tracking_number("JJD000390007882301234"));
        assert!(!c.matches_tracking_number("RR123456789CY"));
    }

    #[test]
    fn nested_locality_becomes_location() {
        let body: DhlTracking = serde_json::from_value(serde_json::json!({
            "shipments": [{
                "id": "1234567890",
                "events": [{
                    "timestamp": "2025-03-02T11:30:00",
                    "statusCode": "delivered",
                    "description": "Delivered",
                    "location": {"address": {"addressLocality": "Nicosia"}}
                }]
            }]
        }))
        .unwrap();
        let events = body.normalize().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location.as_deref(), Some("Nicosia"));
        assert_eq!(events[0].event_type, CourierEventType::Delivered);
    }
}
