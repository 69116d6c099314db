//! Invitation lifecycle manager.
//!
//! `created → sent → delivered → activated → trial → converted`, with
//! `expired` reachable from every non-terminal status. Each transition is a
//! conditional store update on the expected current status, so two
//! concurrent requests cannot both move the same invitation.

mod activation;
mod delivery;
mod lifecycle;
mod numbering;
mod requests;

pub use numbering::parse_invitation_number;
pub use requests::*;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use geogate_courier::CourierTracker;
use geogate_crypto::{TokenCodec, TokenError, TokenPolicy};
use geogate_events::{EventBus, EventKind, InvitationEvent};
use geogate_storage::{
    ActivationPolicy, Invitation, InvitationStatus, KvCache, Store, StoreError, Transition,
};

use crate::campaigns::CampaignScheduler;
use crate::clock::Clock;
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::ip_intel::IpIntelligence;
use crate::location::LocationEngine;
use crate::metrics;
use crate::sms::{SmsProvider, SmsVerifier};

/// Collaborators injected at startup.
pub struct ServiceDeps {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn KvCache>,
    pub events: Arc<dyn EventBus>,
    pub tokens: Arc<TokenCodec>,
    pub courier: CourierTracker,
    pub sms: Arc<dyn SmsProvider>,
    pub ip_intel: Arc<dyn IpIntelligence>,
    pub clock: Arc<dyn Clock>,
}

pub struct InvitationService {
    store: Arc<dyn Store>,
    events: Arc<dyn EventBus>,
    tokens: Arc<TokenCodec>,
    courier: CourierTracker,
    sms: SmsVerifier,
    ip_intel: Arc<dyn IpIntelligence>,
    location: LocationEngine,
    campaigns: CampaignScheduler,
    clock: Arc<dyn Clock>,
    default_expiration_hours: u32,
    auto_start_trial: bool,
}

pub(crate) fn token_policy(policy: &ActivationPolicy) -> TokenPolicy {
    TokenPolicy {
        sms_verification_required: policy.sms_verification_required,
        device_binding_required: policy.device_binding_required,
        location_required: policy.location_required,
    }
}

impl InvitationService {
    pub fn new(deps: ServiceDeps, config: &ServerConfig) -> Self {
        Self {
            sms: SmsVerifier::new(deps.cache, deps.sms, config.sms.clone()),
            location: LocationEngine::new(config.location.clone(), config.service_region),
            campaigns: CampaignScheduler::new(
                deps.store.clone(),
                deps.events.clone(),
                config.urgency,
            ),
            store: deps.store,
            events: deps.events,
            tokens: deps.tokens,
            courier: deps.courier,
            ip_intel: deps.ip_intel,
            clock: deps.clock,
            default_expiration_hours: config.default_expiration_hours,
            auto_start_trial: config.auto_start_trial,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn load(&self, number: &str) -> Result<Invitation, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("invitation {number}"));
        if parse_invitation_number(number).is_none() {
            return Err(not_found());
        }
        match self.store.get_invitation_by_number(number).await {
            Err(StoreError::NotFound) => Err(not_found()),
            other => Ok(other?),
        }
    }

    /// Load and expire first if the deadline has passed.
    async fn load_current(&self, number: &str) -> Result<Invitation, ServiceError> {
        let invitation = self.load(number).await?;
        self.expire_if_due(invitation).await
    }

    async fn expire_if_due(&self, invitation: Invitation) -> Result<Invitation, ServiceError> {
        let now = self.now();
        if !invitation.is_past_deadline(now) {
            return Ok(invitation);
        }
        match self
            .apply(&invitation, Transition::to(InvitationStatus::Expired, now))
            .await
        {
            Ok(expired) => {
                self.campaigns.evaluate(&expired, now).await?;
                Ok(expired)
            }
            // Someone else moved it first; report what is stored now.
            Err(ServiceError::InvalidStateTransition { .. }) => {
                Ok(self.store.get_invitation(&invitation.id).await?)
            }
            Err(e) => Err(e),
        }
    }

    /// Conditionally move `invitation` from its current status.
    async fn apply(
        &self,
        invitation: &Invitation,
        transition: Transition,
    ) -> Result<Invitation, ServiceError> {
        let from = invitation.status;
        let to = transition.to;
        if !from.can_transition_to(to) {
            return Err(ServiceError::InvalidStateTransition { from, to });
        }
        let updated = match self
            .store
            .transition_invitation(&invitation.id, from, &transition)
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::Conflict) => {
                let current = self.store.get_invitation(&invitation.id).await?;
                return Err(ServiceError::InvalidStateTransition {
                    from: current.status,
                    to,
                });
            }
            Err(StoreError::AlreadyExists) => {
                return Err(ServiceError::Validation(
                    "tracking number is already assigned to another invitation".into(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            invitation = %updated.number,
            from = from.as_str(),
            to = to.as_str(),
            "invitation transitioned"
        );
        metrics::record_transition(from.as_str(), to.as_str());
        self.publish(&updated.number, EventKind::StatusChanged { from, to }, transition.at)
            .await;
        Ok(updated)
    }

    async fn publish(&self, number: &str, kind: EventKind, at: DateTime<Utc>) {
        if let Err(e) = self
            .events
            .publish(InvitationEvent::new(number, kind, at))
            .await
        {
            tracing::warn!(invitation = number, error = %e, "failed to publish event");
        }
    }
}

/// Token issue failures are ours, not the caller's.
fn issue_error(e: TokenError) -> ServiceError {
    ServiceError::Internal(format!("failed to issue activation token: {e}"))
}
