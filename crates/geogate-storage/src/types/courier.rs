//! Courier event log.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CourierEventId, InvitationId, ParseEnumError};

/// Supported carriers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierKind {
    Acs,
    CyprusPost,
    Dhl,
    /// Hand delivery by staff; no carrier API.
    Manual,
}

impl CarrierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierKind::Acs => "acs",
            CarrierKind::CyprusPost => "cyprus_post",
            CarrierKind::Dhl => "dhl",
            CarrierKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for CarrierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarrierKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acs" => Ok(CarrierKind::Acs),
            "cyprus_post" => Ok(CarrierKind::CyprusPost),
            "dhl" => Ok(CarrierKind::Dhl),
            "manual" => Ok(CarrierKind::Manual),
            _ => Err(ParseEnumError::new("carrier", s)),
        }
    }
}

/// Normalized shipment milestone, independent of carrier vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourierEventType {
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    DeliveryAttempted,
    Delivered,
    Exception,
    Returned,
}

impl CourierEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourierEventType::Created => "created",
            CourierEventType::PickedUp => "picked_up",
            CourierEventType::InTransit => "in_transit",
            CourierEventType::OutForDelivery => "out_for_delivery",
            CourierEventType::DeliveryAttempted => "delivery_attempted",
            CourierEventType::Delivered => "delivered",
            CourierEventType::Exception => "exception",
            CourierEventType::Returned => "returned",
        }
    }
}

impl FromStr for CourierEventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(CourierEventType::Created),
            "picked_up" => Ok(CourierEventType::PickedUp),
            "in_transit" => Ok(CourierEventType::InTransit),
            "out_for_delivery" => Ok(CourierEventType::OutForDelivery),
            "delivery_attempted" => Ok(CourierEventType::DeliveryAttempted),
            "delivered" => Ok(CourierEventType::Delivered),
            "exception" => Ok(CourierEventType::Exception),
            "returned" => Ok(CourierEventType::Returned),
            _ => Err(ParseEnumError::new("courier event type", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignatureCapture {
    pub signed_by: String,
    pub image_url: Option<String>,
}

/// Append-only courier log entry.
#[derive(Clone, Debug, Serialize)]
pub struct CourierEvent {
    pub id: CourierEventId,
    pub invitation_id: InvitationId,
    pub tracking_number: String,
    pub carrier: CarrierKind,
    pub event_type: CourierEventType,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub location: Option<String>,
    pub signature: Option<SignatureCapture>,
    pub recorded_at: DateTime<Utc>,
}

/// Parameters for appending a courier event. `(tracking_number, event_type,
/// occurred_at)` identifies an event; appending it twice is a no-op.
#[derive(Clone, Debug)]
pub struct NewCourierEvent {
    pub invitation_id: InvitationId,
    pub tracking_number: String,
    pub carrier: CarrierKind,
    pub event_type: CourierEventType,
    pub occurred_at: DateTime<Utc>,
    pub description: String,
    pub location: Option<String>,
    pub signature: Option<SignatureCapture>,
}
