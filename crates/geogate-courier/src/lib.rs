//! Courier tracking adapter.
//!
//! Each supported carrier implements [`Carrier`]; [`CourierTracker`] picks the
//! right one for a tracking number and degrades every failure into a
//! [`TrackingResult`] instead of an error.

mod carrier;
pub mod carriers;
mod error;
mod tracker;
mod webhook;

pub use carrier::{
    Carrier, NormalizedCourierEvent, Shipment, ShipmentRequest, TrackingResult, TrackingStatus,
};
pub use error::CourierError;
pub use tracker::{build_http_client, CourierTracker, DEFAULT_COURIER_TIMEOUT};
pub use webhook::parse_webhook;
