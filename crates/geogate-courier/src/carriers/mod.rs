//! Carrier bindings.

mod acs;
mod cyprus_post;
mod dhl;
mod manual;

pub use acs::AcsCarrier;
pub use cyprus_post::CyprusPostCarrier;
pub use dhl::DhlCarrier;
pub use manual::ManualCarrier;

pub(crate) use acs::AcsTracking;
pub(crate) use cyprus_post::PostTracking;
pub(crate) use dhl::DhlTracking;
pub(crate) use manual::ManualEvent;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::CourierError;

/// Carrier timestamps: RFC 3339, or a naive local form taken as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CourierError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(CourierError::UnexpectedResponse(format!(
        "unparseable timestamp: {raw}"
    )))
}

pub(crate) fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
