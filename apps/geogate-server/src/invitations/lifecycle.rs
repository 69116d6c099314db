use chrono::{DateTime, Duration, Utc};
use geogate_crypto::IssueOptions;
use geogate_events::EventKind;
use geogate_storage::{
    ConversionDetails, Invitation, InvitationConfig, InvitationFilter, InvitationStatus,
    NewInvitation, Transition,
};
use serde::Serialize;

use super::numbering::allocate_number;
use super::requests::{validate_conversion, CreateInvitation, CreatedInvitation, InvitationDetail};
use super::{issue_error, token_policy, InvitationService};
use crate::analytics::{conversion_funnel, ConversionFunnel};
use crate::error::ServiceError;
use crate::metrics;

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: Vec<String>,
}

impl InvitationService {
    pub async fn create(&self, request: CreateInvitation) -> Result<CreatedInvitation, ServiceError> {
        let geofence = request.validate(self.location.service_region())?;
        let now = self.now();
        let overrides = &request.overrides;

        let config = InvitationConfig {
            expiration_hours: overrides
                .expiration_hours
                .unwrap_or(self.default_expiration_hours),
            trial_days: overrides
                .trial_days
                .unwrap_or_else(|| request.tier.default_trial_days()),
            delivery_method: request.delivery_method,
            signature_required: overrides.signature_required.unwrap_or(true),
            tracking_webhooks: overrides.tracking_webhooks.unwrap_or(true),
            platform_access: overrides
                .platform_access
                .unwrap_or_else(|| request.tier.default_platform_access()),
            policy: overrides.policy.unwrap_or_default(),
        };

        let number = allocate_number(self.store.as_ref(), request.business_type).await?;
        let issued = self
            .tokens
            .issue_at(
                &number,
                &IssueOptions {
                    expiration_hours: config.expiration_hours,
                    policy: token_policy(&config.policy),
                },
                now,
            )
            .map_err(issue_error)?;

        let invitation = self
            .store
            .create_invitation(&NewInvitation {
                number,
                business_type: request.business_type,
                tier: request.tier,
                recipient: request.recipient,
                geofence,
                config,
                created_at: now,
                expires_at: issued.expires_at,
            })
            .await?;

        tracing::info!(
            invitation = %invitation.number,
            tier = invitation.tier.as_str(),
            "invitation created"
        );
        metrics::record_invitation_created(invitation.tier.as_str());
        self.publish(&invitation.number, EventKind::Created, now).await;

        Ok(CreatedInvitation {
            invitation,
            token: issued.token,
            activation_url: issued.activation_url,
            qr_svg: issued.qr_svg,
            token_expires_at: issued.expires_at,
        })
    }

    /// Detail view. Expires the invitation if due and runs the campaign
    /// scheduler, so reads drive the trial timeline.
    pub async fn get(&self, number: &str) -> Result<InvitationDetail, ServiceError> {
        let invitation = self.load_current(number).await?;
        let trial = self.campaigns.evaluate(&invitation, self.now()).await?;
        let courier_events = self.store.list_courier_events(&invitation.id).await?;
        Ok(InvitationDetail {
            invitation,
            trial,
            courier_events,
        })
    }

    pub async fn list(&self, filter: &InvitationFilter) -> Result<Vec<Invitation>, ServiceError> {
        Ok(self.store.list_invitations(filter).await?)
    }

    pub async fn conversion_funnel(&self) -> Result<ConversionFunnel, ServiceError> {
        let all = self
            .store
            .list_invitations(&InvitationFilter::default())
            .await?;
        Ok(conversion_funnel(&all))
    }

    pub async fn start_trial(&self, number: &str) -> Result<InvitationDetail, ServiceError> {
        let invitation = self.load_current(number).await?;
        let invitation = self.open_trial(&invitation, self.now()).await?;
        let trial = self.campaigns.evaluate(&invitation, self.now()).await?;
        let courier_events = self.store.list_courier_events(&invitation.id).await?;
        Ok(InvitationDetail {
            invitation,
            trial,
            courier_events,
        })
    }

    pub(super) async fn open_trial(
        &self,
        invitation: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<Invitation, ServiceError> {
        let trial_ends_at = now + Duration::days(i64::from(invitation.config.trial_days));
        let transition = Transition {
            trial_ends_at: Some(trial_ends_at),
            ..Transition::to(InvitationStatus::Trial, now)
        };
        let updated = self.apply(invitation, transition).await?;
        tracing::info!(
            invitation = %updated.number,
            trial_days = updated.config.trial_days,
            "trial opened"
        );
        Ok(updated)
    }

    pub async fn convert(
        &self,
        number: &str,
        details: ConversionDetails,
    ) -> Result<Invitation, ServiceError> {
        validate_conversion(&details)?;
        let invitation = self.load_current(number).await?;
        let transition = Transition {
            conversion: Some(details),
            ..Transition::to(InvitationStatus::Converted, self.now())
        };
        self.apply(&invitation, transition).await
    }

    /// Operator expiry. Terminal invitations are rejected.
    pub async fn expire(&self, number: &str) -> Result<Invitation, ServiceError> {
        let invitation = self.load(number).await?;
        let now = self.now();
        let expired = self
            .apply(&invitation, Transition::to(InvitationStatus::Expired, now))
            .await?;
        self.campaigns.evaluate(&expired, now).await?;
        Ok(expired)
    }

    /// Lift a lockout. Failures before now stop counting.
    pub async fn clear_review(&self, number: &str) -> Result<Invitation, ServiceError> {
        let invitation = self.load(number).await?;
        if !invitation.flagged_for_review {
            return Ok(invitation);
        }
        let now = self.now();
        self.store
            .set_review_flag(&invitation.id, false, now)
            .await?;
        tracing::info!(invitation = %invitation.number, "review cleared");
        self.publish(&invitation.number, EventKind::ReviewCleared, now)
            .await;
        Ok(self.store.get_invitation(&invitation.id).await?)
    }

    /// Expire everything past its deadline and bring trial campaigns up to date.
    pub async fn sweep_expired(&self) -> Result<SweepReport, ServiceError> {
        let now = self.now();
        let mut report = SweepReport::default();
        for invitation in self.store.list_invitations(&InvitationFilter::default()).await? {
            if invitation.status.is_terminal() && invitation.status != InvitationStatus::Expired {
                continue;
            }
            report.examined += 1;
            let was = invitation.status;
            let current = self.expire_if_due(invitation).await?;
            if was != InvitationStatus::Expired && current.status == InvitationStatus::Expired {
                report.expired.push(current.number.clone());
            }
            self.campaigns.evaluate(&current, now).await?;
        }
        if !report.expired.is_empty() {
            tracing::info!(count = report.expired.len(), "expired invitations swept");
        }
        Ok(report)
    }
}
