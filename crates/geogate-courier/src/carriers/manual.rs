//! Hand delivery by staff. There is no carrier API: tracking numbers are
//! generated locally and events arrive through the manual webhook.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use geogate_storage::{CarrierKind, CourierEventType, SignatureCapture};
use rand::Rng;
use regex::Regex;
use serde::Deserialize;

use super::parse_timestamp;
use crate::{Carrier, CourierError, NormalizedCourierEvent, Shipment, ShipmentRequest, TrackingResult};

static MANUAL_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^HD-[A-Z0-9]{4,}-[A-Z0-9]{6}$").expect("valid regex"));

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Staff-submitted event, already in the normalized vocabulary.
#[derive(Debug, Deserialize)]
pub(crate) struct ManualEvent {
    tracking_number: String,
    event_type: CourierEventType,
    occurred_at: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    signed_by: Option<String>,
}

impl ManualEvent {
    pub(crate) fn normalize(self) -> Result<NormalizedCourierEvent, CourierError> {
        let occurred_at: DateTime<Utc> = parse_timestamp(&self.occurred_at)?;
        Ok(NormalizedCourierEvent {
            description: self
                .description
                .unwrap_or_else(|| self.event_type.as_str().replace('_', " ")),
            tracking_number: self.tracking_number,
            event_type: self.event_type,
            occurred_at,
            location: self.location,
            signature: self.signed_by.map(|signed_by| SignatureCapture {
                signed_by,
                image_url: None,
            }),
        })
    }
}

#[derive(Debug, Default)]
pub struct ManualCarrier;

impl ManualCarrier {
    pub fn new() -> Self {
        Self
    }

    /// `HD-<reference without punctuation>-<6 random chars>`.
    pub fn generate_tracking_number(reference: &str) -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..6)
            .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        let compact: String = reference
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        format!("HD-{compact}-{suffix}")
    }
}

#[async_trait::async_trait]
impl Carrier for ManualCarrier {
    fn kind(&self) -> CarrierKind {
        CarrierKind::Manual
    }

    fn matches_tracking_number(&self, tracking_number: &str) -> bool {
        MANUAL_NUMBER.is_match(tracking_number)
    }

    async fn track(&self, _tracking_number: &str) -> Result<TrackingResult, CourierError> {
        Err(CourierError::Unsupported(
            "hand deliveries have no tracking API",
        ))
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<Shipment, CourierError> {
        Ok(Shipment {
            carrier: CarrierKind::Manual,
            tracking_number: Self::generate_tracking_number(&request.reference),
            label_url: None,
            estimated_delivery: None,
        })
    }
}
