use std::sync::Arc;
use std::time::Duration;

use geogate_storage::CarrierKind;
use reqwest::Client;

use crate::{Carrier, CourierError, Shipment, ShipmentRequest, TrackingResult, TrackingStatus};

pub const DEFAULT_COURIER_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared HTTP client for carrier bindings.
pub fn build_http_client(timeout: Duration) -> Result<Client, CourierError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("geogate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CourierError::Http(format!("failed to build HTTP client: {e}")))
}

/// Routes lookups to the right carrier and never fails: errors, timeouts and
/// unknown numbers come back as an unsuccessful [`TrackingResult`].
#[derive(Clone)]
pub struct CourierTracker {
    carriers: Vec<Arc<dyn Carrier>>,
    timeout: Duration,
}

impl CourierTracker {
    /// Carriers are probed in the order given.
    pub fn new(carriers: Vec<Arc<dyn Carrier>>, timeout: Duration) -> Self {
        Self { carriers, timeout }
    }

    pub fn carrier(&self, kind: CarrierKind) -> Option<&Arc<dyn Carrier>> {
        self.carriers.iter().find(|c| c.kind() == kind)
    }

    /// Carriers whose tracking-number shape matches.
    pub fn infer_carriers(&self, tracking_number: &str) -> Vec<CarrierKind> {
        self.carriers
            .iter()
            .filter(|c| c.matches_tracking_number(tracking_number))
            .map(|c| c.kind())
            .collect()
    }

    pub async fn track(&self, tracking_number: &str, hint: Option<CarrierKind>) -> TrackingResult {
        if let Some(kind) = hint {
            return match self.carrier(kind) {
                Some(carrier) => self.track_with(carrier.as_ref(), tracking_number).await,
                None => TrackingResult::failed(
                    Some(kind),
                    tracking_number,
                    TrackingStatus::Error,
                    CourierError::NotConfigured(kind.to_string()).to_string(),
                ),
            };
        }

        let inferred = self.infer_carriers(tracking_number);
        let candidates: Vec<&Arc<dyn Carrier>> = if inferred.is_empty() {
            self.carriers.iter().collect()
        } else {
            self.carriers
                .iter()
                .filter(|c| inferred.contains(&c.kind()))
                .collect()
        };
        tracing::debug!(
            tracking_number,
            candidates = candidates.len(),
            "probing carriers"
        );

        let mut fallback: Option<TrackingResult> = None;
        for carrier in candidates {
            let result = self.track_with(carrier.as_ref(), tracking_number).await;
            if result.success {
                return result;
            }
            // Prefer the most informative failure: error > unknown > not_found.
            let keep = match (&fallback, result.status) {
                (None, _) => true,
                (Some(prev), TrackingStatus::Error) => prev.status != TrackingStatus::Error,
                (Some(prev), TrackingStatus::Unknown) => prev.status == TrackingStatus::NotFound,
                _ => false,
            };
            if keep {
                fallback = Some(result);
            }
        }

        fallback.unwrap_or_else(|| {
            TrackingResult::failed(
                None,
                tracking_number,
                TrackingStatus::NotFound,
                "no carrier recognised this tracking number",
            )
        })
    }

    async fn track_with(&self, carrier: &dyn Carrier, tracking_number: &str) -> TrackingResult {
        let kind = carrier.kind();
        match tokio::time::timeout(self.timeout, carrier.track(tracking_number)).await {
            Ok(Ok(result)) => result,
            Ok(Err(CourierError::NotFound)) => TrackingResult::failed(
                Some(kind),
                tracking_number,
                TrackingStatus::NotFound,
                CourierError::NotFound.to_string(),
            ),
            Ok(Err(CourierError::Timeout)) | Err(_) => {
                tracing::warn!(carrier = %kind, tracking_number, "carrier lookup timed out");
                TrackingResult::failed(
                    Some(kind),
                    tracking_number,
                    TrackingStatus::Unknown,
                    CourierError::Timeout.to_string(),
                )
            }
            Ok(Err(e @ CourierError::Unsupported(_))) => TrackingResult::failed(
                Some(kind),
                tracking_number,
                TrackingStatus::Unknown,
                e.to_string(),
            ),
            Ok(Err(e)) => {
                tracing::warn!(carrier = %kind, tracking_number, error = %e, "carrier lookup failed");
                TrackingResult::failed(
                    Some(kind),
                    tracking_number,
                    TrackingStatus::Error,
                    e.to_string(),
                )
            }
        }
    }

    /// Book a shipment with a specific carrier, bounded by the same timeout.
    pub async fn create_shipment(
        &self,
        kind: CarrierKind,
        request: &ShipmentRequest,
    ) -> Result<Shipment, CourierError> {
        let carrier = self
            .carrier(kind)
            .ok_or_else(|| CourierError::NotConfigured(kind.to_string()))?;
        tokio::time::timeout(self.timeout, carrier.create_shipment(request))
            .await
            .map_err(|_| CourierError::Timeout)?
    }
}
