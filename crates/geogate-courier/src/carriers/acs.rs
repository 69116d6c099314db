//! ACS Courier.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use geogate_storage::{CarrierKind, CourierEventType, SignatureCapture};
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{parse_timestamp, trim_base};
use crate::{Carrier, CourierError, NormalizedCourierEvent, Shipment, ShipmentRequest, TrackingResult};

static VOUCHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("valid regex"));

const API_KEY_HEADER: &str = "AcsApiKey";

#[derive(Debug, Deserialize)]
pub(crate) struct AcsCheckpoint {
    checkpoint_date_time: String,
    checkpoint_action: String,
    #[serde(default)]
    checkpoint_location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    signed_by: Option<String>,
}

/// Tracking response body; ACS webhooks post the same document.
#[derive(Debug, Deserialize)]
pub(crate) struct AcsTracking {
    voucher_no: String,
    #[serde(default)]
    estimated_delivery: Option<String>,
    #[serde(default)]
    events: Vec<AcsCheckpoint>,
}

#[derive(Debug, Serialize)]
struct AcsShipmentBody<'a> {
    reference: &'a str,
    recipient_name: &'a str,
    recipient_company: &'a str,
    recipient_address: &'a str,
    recipient_phone: Option<&'a str>,
    delivery_with_signature: bool,
}

#[derive(Debug, Deserialize)]
struct AcsShipmentResponse {
    voucher_no: String,
    #[serde(default)]
    label_url: Option<String>,
    #[serde(default)]
    estimated_delivery: Option<String>,
}

fn map_action(action: &str) -> Option<CourierEventType> {
    match action.to_ascii_uppercase().as_str() {
        "VOUCHER_CREATED" | "CREATED" => Some(CourierEventType::Created),
        "PICKUP" | "PICKED_UP" => Some(CourierEventType::PickedUp),
        "IN_TRANSIT" | "HUB_SCAN" | "ARRIVED_AT_STATION" => Some(CourierEventType::InTransit),
        "OUT_FOR_DELIVERY" => Some(CourierEventType::OutForDelivery),
        "DELIVERY_ATTEMPT" | "RECIPIENT_ABSENT" => Some(CourierEventType::DeliveryAttempted),
        "DELIVERED" => Some(CourierEventType::Delivered),
        "EXCEPTION" | "DAMAGED" => Some(CourierEventType::Exception),
        "RETURNED" | "RETURN_TO_SENDER" => Some(CourierEventType::Returned),
        _ => None,
    }
}

impl AcsTracking {
    pub(crate) fn normalize(&self) -> Result<Vec<NormalizedCourierEvent>, CourierError> {
        let mut out = Vec::with_capacity(self.events.len());
        for cp in &self.events {
            let Some(event_type) = map_action(&cp.checkpoint_action) else {
                tracing::debug!(action = %cp.checkpoint_action, "skipping unmapped ACS checkpoint");
                continue;
            };
            out.push(NormalizedCourierEvent {
                tracking_number: self.voucher_no.clone(),
                event_type,
                occurred_at: parse_timestamp(&cp.checkpoint_date_time)?,
                description: cp
                    .description
                    .clone()
                    .unwrap_or_else(|| cp.checkpoint_action.clone()),
                location: cp.checkpoint_location.clone(),
                signature: cp.signed_by.clone().map(|signed_by| SignatureCapture {
                    signed_by,
                    image_url: None,
                }),
            });
        }
        Ok(out)
    }

    fn estimated(&self) -> Result<Option<DateTime<Utc>>, CourierError> {
        self.estimated_delivery
            .as_deref()
            .map(parse_timestamp)
            .transpose()
    }
}

pub struct AcsCarrier {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AcsCarrier {
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
impl Carrier for AcsCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Acs
    }

    fn matches_tracking_number(&self, tracking_number: &str) -> bool {
        VOUCHER.is_match(tracking_number)
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult, CourierError> {
        let url = format!("{}/tracking/{}", self.base_url, tracking_number);
        let resp = self.with_key(self.http.get(url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(CourierError::NotFound);
        }
        let body: AcsTracking = resp.error_for_status()?.json().await?;
        Ok(TrackingResult::found(
            CarrierKind::Acs,
            tracking_number,
            body.normalize()?,
            body.estimated()?,
        ))
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
        let url = format!("{}/shipments", self.base_url);
        let body = AcsShipmentBody {
            reference: &request.reference,
            recipient_name: &request.recipient_name,
            recipient_company: &request.organization,
            recipient_address: &request.address,
            recipient_phone: request.phone.as_deref(),
            delivery_with_signature: request.signature_required,
        };
        let resp: AcsShipmentResponse = self
            .with_key(self.http.post(url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Shipment {
            carrier: CarrierKind::Acs,
            tracking_number: resp.voucher_no,
            label_url: resp.label_url,
            estimated_delivery: resp
                .estimated_delivery
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}
