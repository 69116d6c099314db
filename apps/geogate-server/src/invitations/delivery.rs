use chrono::{DateTime, Utc};
use geogate_courier::{NormalizedCourierEvent, ShipmentRequest, TrackingResult};
use geogate_events::EventKind;
use geogate_storage::{
    CarrierKind, CourierEventType, DeliveryMethod, Invitation, InvitationCounter,
    InvitationStatus, NewCourierEvent, StoreError, Transition,
};

use super::requests::{DispatchRequest, RefreshOutcome, WebhookOutcome};
use super::InvitationService;
use crate::error::ServiceError;
use crate::metrics;

fn default_carrier(method: DeliveryMethod) -> CarrierKind {
    match method {
        DeliveryMethod::Courier => CarrierKind::Acs,
        DeliveryMethod::Postal => CarrierKind::CyprusPost,
        DeliveryMethod::HandDelivery => CarrierKind::Manual,
    }
}

impl InvitationService {
    /// Hand the card to a carrier and move the invitation to `sent`.
    ///
    /// With a tracking number the shipment was booked elsewhere and is only
    /// recorded; without one a shipment is created with the carrier.
    pub async fn dispatch(
        &self,
        number: &str,
        request: DispatchRequest,
    ) -> Result<Invitation, ServiceError> {
        let invitation = self.load_current(number).await?;
        if invitation.status != InvitationStatus::Created {
            return Err(ServiceError::InvalidStateTransition {
                from: invitation.status,
                to: InvitationStatus::Sent,
            });
        }

        let (carrier, tracking_number) = match request.tracking_number {
            Some(tracking_number) => {
                let tracking_number = tracking_number.trim().to_string();
                if tracking_number.is_empty() {
                    return Err(ServiceError::Validation(
                        "tracking_number must not be empty".into(),
                    ));
                }
                let carrier = request
                    .carrier
                    .or_else(|| self.courier.infer_carriers(&tracking_number).first().copied())
                    .unwrap_or_else(|| default_carrier(invitation.config.delivery_method));
                (carrier, tracking_number)
            }
            None => {
                let carrier = request
                    .carrier
                    .unwrap_or_else(|| default_carrier(invitation.config.delivery_method));
                let recipient = &invitation.recipient;
                let shipment = self
                    .courier
                    .create_shipment(
                        carrier,
                        &ShipmentRequest {
                            reference: invitation.number.clone(),
                            recipient_name: recipient.name.clone(),
                            organization: recipient.organization.clone(),
                            address: recipient.address.clone(),
                            phone: recipient.mobile.clone(),
                            signature_required: invitation.config.signature_required,
                        },
                    )
                    .await
                    .map_err(|e| ServiceError::Courier(e.to_string()))?;
                tracing::info!(
                    invitation = %invitation.number,
                    carrier = carrier.as_str(),
                    tracking_number = %shipment.tracking_number,
                    "shipment booked"
                );
                (shipment.carrier, shipment.tracking_number)
            }
        };

        self.store
            .increment_counter(&invitation.id, InvitationCounter::DeliveryAttempts)
            .await?;
        let transition = Transition {
            carrier: Some(carrier),
            tracking_number: Some(tracking_number),
            ..Transition::to(InvitationStatus::Sent, self.now())
        };
        self.apply(&invitation, transition).await
    }

    /// Apply normalized carrier events, from a webhook or a tracking refresh.
    ///
    /// Replays are harmless: an event already stored is counted as a
    /// duplicate and only the delivery transition is retried for it.
    pub async fn record_courier_events(
        &self,
        carrier: CarrierKind,
        events: Vec<NormalizedCourierEvent>,
    ) -> Result<WebhookOutcome, ServiceError> {
        let mut outcome = WebhookOutcome {
            received: events.len(),
            ..WebhookOutcome::default()
        };

        for event in events {
            let invitation = match self
                .store
                .get_invitation_by_tracking(&event.tracking_number)
                .await
            {
                Ok(invitation) => invitation,
                Err(StoreError::NotFound) => {
                    tracing::warn!(
                        carrier = carrier.as_str(),
                        tracking_number = %event.tracking_number,
                        "courier event for unknown tracking number"
                    );
                    outcome.unmatched += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let invitation = self.expire_if_due(invitation).await?;

            let stored = self
                .store
                .append_courier_event(&NewCourierEvent {
                    invitation_id: invitation.id.clone(),
                    tracking_number: event.tracking_number.clone(),
                    carrier,
                    event_type: event.event_type,
                    occurred_at: event.occurred_at,
                    description: event.description.clone(),
                    location: event.location.clone(),
                    signature: event.signature.clone(),
                })
                .await?;
            if stored {
                outcome.recorded += 1;
                tracing::debug!(
                    invitation = %invitation.number,
                    event_type = event.event_type.as_str(),
                    "courier event recorded"
                );
                self.publish(
                    &invitation.number,
                    EventKind::CourierUpdate {
                        event_type: event.event_type,
                    },
                    event.occurred_at,
                )
                .await;
                if event.event_type == CourierEventType::DeliveryAttempted {
                    self.store
                        .increment_counter(&invitation.id, InvitationCounter::DeliveryAttempts)
                        .await?;
                }
            } else {
                outcome.duplicates += 1;
            }

            // A replayed delivery still completes a transition that failed
            // after its event was stored.
            if event.event_type == CourierEventType::Delivered
                && invitation.status == InvitationStatus::Sent
                && self.mark_delivered(&invitation, event.occurred_at).await?
            {
                outcome.delivered.push(invitation.number.clone());
            }
        }

        Ok(outcome)
    }

    async fn mark_delivered(
        &self,
        invitation: &Invitation,
        at: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        // Carrier clocks can run behind ours; never deliver before sending.
        let at = invitation.sent_at.map_or(at, |sent| at.max(sent));
        match self
            .apply(invitation, Transition::to(InvitationStatus::Delivered, at))
            .await
        {
            Ok(_) => Ok(true),
            // A concurrent webhook got there first.
            Err(ServiceError::InvalidStateTransition { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Pull the carrier's current view and apply any events we haven't seen.
    pub async fn refresh_tracking(&self, number: &str) -> Result<RefreshOutcome, ServiceError> {
        let invitation = self.load_current(number).await?;
        let Some(tracking_number) = invitation.tracking_number.as_deref() else {
            return Err(ServiceError::Validation(format!(
                "invitation {} has not been dispatched",
                invitation.number
            )));
        };
        let tracking = self.track(tracking_number, invitation.carrier).await;
        let applied = match (tracking.success, tracking.carrier) {
            (true, Some(carrier)) => {
                self.record_courier_events(carrier, tracking.events.clone())
                    .await?
            }
            _ => WebhookOutcome::default(),
        };
        Ok(RefreshOutcome { tracking, applied })
    }

    /// Carrier lookup. Never fails; problems come back in the result.
    pub async fn track(&self, tracking_number: &str, hint: Option<CarrierKind>) -> TrackingResult {
        let result = self.courier.track(tracking_number, hint).await;
        metrics::record_courier_lookup(
            result.carrier.map_or("unknown", |c| c.as_str()),
            result.status.as_str(),
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carrier_follows_delivery_method() {
        assert_eq!(default_carrier(DeliveryMethod::Courier), CarrierKind::Acs);
        assert_eq!(default_carrier(DeliveryMethod::Postal), CarrierKind::CyprusPost);
        assert_eq!(
            default_carrier(DeliveryMethod::HandDelivery),
            CarrierKind::Manual
        );
    }
}
