//! Cyprus Post (UPU S10 item identifiers, EMSEVT event codes).

use std::sync::LazyLock;

use geogate_storage::{CarrierKind, CourierEventType};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{parse_timestamp, trim_base};
use crate::{Carrier, CourierError, NormalizedCourierEvent, Shipment, ShipmentRequest, TrackingResult};

static ITEM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}\d{9}CY$").expect("valid regex"));

#[derive(Debug, Deserialize)]
pub(crate) struct PostEvent {
    date: String,
    code: String,
    #[serde(default)]
    office: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    signatory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostItem {
    id: String,
    #[serde(default)]
    events: Vec<PostEvent>,
}

/// Tracking response body; webhook pushes carry the same document.
#[derive(Debug, Deserialize)]
pub(crate) struct PostTracking {
    item: Option<PostItem>,
}

fn map_code(code: &str) -> Option<CourierEventType> {
    match code {
        "EMA" => Some(CourierEventType::PickedUp),
        "EMB" | "EMC" | "EMD" | "EME" | "EMF" => Some(CourierEventType::InTransit),
        "EMG" => Some(CourierEventType::OutForDelivery),
        "EMH" => Some(CourierEventType::DeliveryAttempted),
        "EMI" => Some(CourierEventType::Delivered),
        "EXX" => Some(CourierEventType::Exception),
        "RET" => Some(CourierEventType::Returned),
        _ => None,
    }
}

impl PostTracking {
    pub(crate) fn normalize(&self) -> Result<Vec<NormalizedCourierEvent>, CourierError> {
        let Some(item) = &self.item else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(item.events.len());
        for ev in &item.events {
            let Some(event_type) = map_code(&ev.code) else {
                tracing::debug!(code = %ev.code, "skipping unmapped Cyprus Post event");
                continue;
            };
            out.push(NormalizedCourierEvent {
                tracking_number: item.id.clone(),
                event_type,
                occurred_at: parse_timestamp(&ev.date)?,
                description: ev.description.clone().unwrap_or_else(|| ev.code.clone()),
                location: ev.office.clone(),
                signature: ev
                    .signatory
                    .clone()
                    .map(|signed_by| geogate_storage::SignatureCapture {
                        signed_by,
                        image_url: None,
                    }),
            });
        }
        Ok(out)
    }
}

pub struct CyprusPostCarrier {
    http: Client,
    base_url: String,
}

impl CyprusPostCarrier {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait::async_trait]
impl Carrier for CyprusPostCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::CyprusPost
    }

    fn matches_tracking_number(&self, tracking_number: &str) -> bool {
        ITEM_ID.is_match(tracking_number)
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult, CourierError> {
        let url = format!("{}/track", self.base_url);
        let resp = self
            .http
            .get(url)
            .query(&[("itemId", tracking_number)])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CourierError::NotFound);
        }
        let body: PostTracking = resp.error_for_status()?.json().await?;
        if body.item.is_none() {
            return Err(CourierError::NotFound);
        }
        Ok(TrackingResult::found(
            CarrierKind::CyprusPost,
            tracking_number,
            body.normalize()?,
            None,
        ))
    }

    async fn create_shipment(&self, _request: &ShipmentRequest) -> Result<Shipment, CourierError> {
        Err(CourierError::Unsupported(
            "Cyprus Post items are registered at the counter; supply the tracking number",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s10_shape() {
        let c = CyprusPostCarrier::new(Client::new(), "http://localhost");
        assert!(c.matches_tracking_number("RR123456789CY"));
        assert!(!c.matches_tracking_number("RR123456789GR"));
        assert!(!c.matches_tracking_number("1234567890"));
    }

    #[test]
    fn missing_item_normalizes_to_nothing() {
        let body: PostTracking = serde_json::from_str(r#"{"item": null}"#).unwrap();
        assert!(body.normalize().unwrap().is_empty());
    }

    #[test]
    fn emsevt_codes_map() {
        assert_eq!(map_code("EMI"), Some(CourierEventType::Delivered));
        assert_eq!(map_code("EMH"), Some(CourierEventType::DeliveryAttempted));
        assert_eq!(map_code("ZZZ"), None);
    }
}
