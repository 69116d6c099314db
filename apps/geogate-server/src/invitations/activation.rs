use std::net::IpAddr;

use chrono::{DateTime, Utc};
use geogate_events::EventKind;
use geogate_storage::{
    Invitation, InvitationCounter, InvitationStatus, NewLocationAttempt, Transition,
};

use super::requests::{
    mask_phone, ActivationOutcome, ActivationRequest, LocationCheck, ScanView, SmsRequest,
    SmsRequested,
};
use super::InvitationService;
use crate::error::ServiceError;
use crate::ip_intel::IpAssessment;
use crate::location::{DeviceInfo, LocationFailure, LocationInput, LocationSample, LocationVerdict};
use crate::metrics;
use crate::sms::SmsError;

fn sms_error(e: SmsError) -> ServiceError {
    match e {
        SmsError::RateLimited => ServiceError::RateLimited(e.to_string()),
        SmsError::NoActiveCode | SmsError::Mismatch { .. } | SmsError::Burned => {
            ServiceError::Validation(e.to_string())
        }
        SmsError::SendFailed(_) | SmsError::InvalidConfig(_) | SmsError::Backend(_) => {
            ServiceError::Internal(e.to_string())
        }
    }
}

fn outcome_label(verdict: &LocationVerdict) -> &'static str {
    match &verdict.failure {
        None => "verified",
        Some(LocationFailure::OutsideServiceRegion) => "outside_region",
        Some(LocationFailure::OutsideGeofence { .. }) => "outside_geofence",
        Some(LocationFailure::SpoofingDetected { .. }) => "spoofing",
    }
}

fn geofencing_error(sample: &LocationSample, verdict: &LocationVerdict) -> ServiceError {
    ServiceError::Geofencing {
        reason: verdict
            .failure
            .as_ref()
            .map_or_else(|| "location not verified".to_string(), |f| f.reason()),
        distance_m: verdict.distance_m,
        latitude: sample.latitude,
        longitude: sample.longitude,
    }
}

fn is_activated(status: InvitationStatus) -> bool {
    matches!(
        status,
        InvitationStatus::Activated | InvitationStatus::Trial | InvitationStatus::Converted
    )
}

impl InvitationService {
    /// Validate a QR token and load the invitation it names. With `number`,
    /// the token must have been issued for that invitation.
    async fn authorize(
        &self,
        token: &str,
        number: Option<&str>,
    ) -> Result<Invitation, ServiceError> {
        let validated = self.tokens.validate_at(token, number, self.now())?;
        self.load_current(&validated.invitation_number).await
    }

    /// QR landing page. Counts the view and reports whether activation can
    /// proceed.
    pub async fn scan(
        &self,
        number: &str,
        token: &str,
        device: Option<DeviceInfo>,
    ) -> Result<ScanView, ServiceError> {
        let invitation = self.authorize(token, Some(number)).await?;
        self.store
            .increment_counter(&invitation.id, InvitationCounter::PageViews)
            .await?;
        if let Some(device) = &device {
            self.check_device(&invitation, device, self.now()).await?;
        }
        tracing::debug!(invitation = %invitation.number, "qr scanned");

        Ok(ScanView {
            can_activate: invitation.status == InvitationStatus::Delivered
                && !invitation.flagged_for_review,
            invitation_number: invitation.number,
            organization: invitation.recipient.organization,
            recipient_name: invitation.recipient.name,
            status: invitation.status,
            policy: invitation.config.policy,
            flagged_for_review: invitation.flagged_for_review,
            expires_at: invitation.expires_at,
        })
    }

    /// Check a position ahead of activation. Every call is recorded and
    /// counts toward the lockout threshold when it fails.
    pub async fn verify_location(
        &self,
        check: LocationCheck,
        client_ip: Option<IpAddr>,
    ) -> Result<LocationVerdict, ServiceError> {
        let invitation = self.authorize(&check.token, None).await?;
        if is_activated(invitation.status) {
            self.check_device(&invitation, &check.location.device, self.now())
                .await?;
        }
        if invitation.status != InvitationStatus::Delivered {
            return Err(ServiceError::InvalidStateTransition {
                from: invitation.status,
                to: InvitationStatus::Activated,
            });
        }
        if invitation.flagged_for_review {
            return Err(ServiceError::LockedOut);
        }

        let verdict = self
            .check_location(&invitation, &check.location, client_ip)
            .await?;
        if !verdict.verified {
            return Err(geofencing_error(&check.location, &verdict));
        }
        Ok(verdict)
    }

    /// Evaluate, persist, publish and apply the lockout rule.
    async fn check_location(
        &self,
        invitation: &Invitation,
        sample: &LocationSample,
        client_ip: Option<IpAddr>,
    ) -> Result<LocationVerdict, ServiceError> {
        // Malformed fixes are rejected before they count as attempts.
        sample.validate()?;
        let now = self.now();
        let previous = self.store.last_location_attempt(&invitation.id).await?;
        let ip = match client_ip {
            Some(addr) => self.ip_intel.assess(addr).await,
            None => IpAssessment::default(),
        };

        let verdict = self.location.evaluate(&LocationInput {
            sample,
            client_ip,
            geofence: &invitation.geofence,
            previous: previous.as_ref(),
            ip: &ip,
            received_at: now,
        });

        self.store
            .append_location_attempt(&NewLocationAttempt {
                invitation_id: invitation.id.clone(),
                latitude: sample.latitude,
                longitude: sample.longitude,
                accuracy_m: sample.accuracy_m,
                altitude_m: sample.altitude_m,
                heading_deg: sample.heading_deg,
                speed_mps: sample.speed_mps,
                client_timestamp: sample.timestamp,
                received_at: now,
                distance_m: verdict.distance_m,
                matched_zone: verdict.matched_zone.clone(),
                method: verdict.method,
                success: verdict.verified,
                confidence: verdict.confidence,
                indicators: verdict.indicators,
                client_ip: client_ip.map(|ip| ip.to_string()),
                fingerprint_hash: Some(sample.device.fingerprint_hash()),
            })
            .await?;

        metrics::record_location_verification(outcome_label(&verdict));
        tracing::info!(
            invitation = %invitation.number,
            verified = verdict.verified,
            distance_m = verdict.distance_m,
            method = verdict.method.as_str(),
            indicators = ?verdict.indicators.active(),
            "location attempt"
        );
        self.publish(
            &invitation.number,
            EventKind::LocationAttempt {
                success: verdict.verified,
                distance_m: verdict.distance_m,
            },
            now,
        )
        .await;

        if !verdict.verified {
            let failures = self.consecutive_failures(invitation).await?;
            let threshold = self.location.config().lockout_threshold;
            if failures >= threshold {
                self.store
                    .set_review_flag(&invitation.id, true, now)
                    .await?;
                tracing::warn!(
                    invitation = %invitation.number,
                    consecutive_failures = failures,
                    "invitation flagged for review"
                );
                self.publish(
                    &invitation.number,
                    EventKind::FlaggedForReview {
                        consecutive_failures: failures,
                    },
                    now,
                )
                .await;
            }
        }

        Ok(verdict)
    }

    /// Failed attempts since the last success or review clearance.
    async fn consecutive_failures(&self, invitation: &Invitation) -> Result<u32, ServiceError> {
        let attempts = self.store.list_location_attempts(&invitation.id).await?;
        let cleared_at = self
            .store
            .get_invitation(&invitation.id)
            .await?
            .review_cleared_at;
        let count = attempts
            .iter()
            .rev()
            .take_while(|a| !a.success && cleared_at.map_or(true, |c| a.received_at > c))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Compare `device` with the one that activated the invitation. A
    /// mismatch is recorded and published, not rejected. Returns whether
    /// the device matched.
    async fn check_device(
        &self,
        invitation: &Invitation,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        if !invitation.config.policy.device_binding_required || !is_activated(invitation.status) {
            return Ok(true);
        }
        let Some(bound) = invitation.device_fingerprints.first() else {
            return Ok(true);
        };
        if device.matches(bound) {
            return Ok(true);
        }

        let hash = device.fingerprint_hash();
        tracing::warn!(
            invitation = %invitation.number,
            fingerprint = %hash,
            "device does not match the activating device"
        );
        if !device.is_user_agent_only() {
            self.store
                .append_device_fingerprint(&invitation.id, &device.to_fingerprint(now))
                .await?;
        }
        self.publish(
            &invitation.number,
            EventKind::DeviceMismatch {
                fingerprint_hash: hash,
            },
            now,
        )
        .await;
        Ok(false)
    }

    pub async fn request_sms_code(&self, request: SmsRequest) -> Result<SmsRequested, ServiceError> {
        let invitation = self.authorize(&request.token, None).await?;
        if invitation.status != InvitationStatus::Delivered {
            return Err(ServiceError::InvalidStateTransition {
                from: invitation.status,
                to: InvitationStatus::Activated,
            });
        }
        if invitation.flagged_for_review {
            return Err(ServiceError::LockedOut);
        }
        let Some(mobile) = invitation.recipient.mobile.as_deref() else {
            return Err(ServiceError::Validation(
                "invitation has no mobile number on file".into(),
            ));
        };

        self.sms
            .issue(&invitation.number, mobile)
            .await
            .map_err(sms_error)?;
        Ok(SmsRequested {
            sent_to: mask_phone(mobile),
            expires_in_secs: self.sms.code_ttl().as_secs(),
        })
    }

    /// Activate a delivered invitation. Each requirement of the invitation's
    /// policy must be met; the first unmet one is the error.
    pub async fn activate(
        &self,
        request: ActivationRequest,
        client_ip: Option<IpAddr>,
    ) -> Result<ActivationOutcome, ServiceError> {
        let invitation = self.authorize(&request.token, None).await?;
        let now = self.now();
        self.store
            .increment_counter(&invitation.id, InvitationCounter::ActivationAttempts)
            .await?;

        let device = request
            .device
            .clone()
            .or_else(|| request.location.as_ref().map(|l| l.device.clone()));

        if is_activated(invitation.status) {
            if let Some(device) = &device {
                self.check_device(&invitation, device, now).await?;
            }
        }
        if invitation.status != InvitationStatus::Delivered {
            return Err(ServiceError::InvalidStateTransition {
                from: invitation.status,
                to: InvitationStatus::Activated,
            });
        }
        if invitation.flagged_for_review {
            return Err(ServiceError::LockedOut);
        }

        let policy = invitation.config.policy;
        if policy.device_binding_required && device.is_none() {
            return Err(ServiceError::Validation(
                "device information is required".into(),
            ));
        }

        let sms_code = match (policy.sms_verification_required, request.sms_code.as_deref()) {
            (true, None) => return Err(ServiceError::Validation("sms_code is required".into())),
            (required, code) => code.filter(|_| required),
        };

        let verdict = match &request.location {
            Some(sample) => {
                let verdict = self.check_location(&invitation, sample, client_ip).await?;
                if policy.location_required && !verdict.verified {
                    return Err(geofencing_error(sample, &verdict));
                }
                Some(verdict)
            }
            None if policy.location_required => {
                return Err(ServiceError::Validation("location is required".into()));
            }
            None => None,
        };

        // Consumed last so a failed location check keeps the code usable.
        if let Some(code) = sms_code {
            self.sms
                .verify(&invitation.number, code)
                .await
                .map_err(sms_error)?;
        }

        let mut activated = self
            .apply(&invitation, Transition::to(InvitationStatus::Activated, now))
            .await?;
        // Only the request that won the transition binds its device.
        if let Some(device) = &device {
            self.store
                .append_device_fingerprint(&activated.id, &device.to_fingerprint(now))
                .await?;
        }
        if self.auto_start_trial {
            activated = self.open_trial(&activated, now).await?;
        }
        let trial = self.campaigns.evaluate(&activated, now).await?;
        // Pick up the fingerprint written above.
        let activated = self.store.get_invitation(&activated.id).await?;

        Ok(ActivationOutcome {
            invitation: activated,
            location: verdict,
            trial,
        })
    }
}
