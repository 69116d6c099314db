//! Request and response bodies for the invitation service, with the
//! validation that runs before anything is persisted.

use chrono::{DateTime, Utc};
use geogate_courier::TrackingResult;
use geogate_geo::{
    validate_business_registration, validate_country_code, validate_mobile_number, BoundingBox,
    GeoPoint, ValidationError,
};
use geogate_storage::{
    ActivationPolicy, BusinessType, CarrierKind, ConversionDetails, CourierEvent, DeliveryMethod,
    Geofence, GeofenceZone, Invitation, InvitationStatus, PlatformAccess, Recipient, Tier,
};
use serde::{Deserialize, Serialize};

use crate::campaigns::TrialStatus;
use crate::location::{Cidr, DeviceInfo, LocationSample, LocationVerdict};

const MAX_RADIUS_M: f64 = 50_000.0;
const MAX_EXPIRATION_HOURS: u32 = 24 * 365;
const MAX_TRIAL_DAYS: u32 = 365;

#[derive(Clone, Debug, Deserialize)]
pub struct ZoneRequest {
    #[serde(default)]
    pub label: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_radius")]
    pub radius_m: f64,
}

fn default_radius() -> f64 {
    100.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct GeofenceRequest {
    pub primary: ZoneRequest,
    #[serde(default)]
    pub alternates: Vec<ZoneRequest>,
    #[serde(default)]
    pub allowed_wifi: Vec<String>,
    #[serde(default)]
    pub allowed_ip_ranges: Vec<String>,
    #[serde(default)]
    pub allowed_countries: Vec<String>,
}

/// Per-invitation overrides of tier and service defaults.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Overrides {
    pub expiration_hours: Option<u32>,
    pub trial_days: Option<u32>,
    pub platform_access: Option<PlatformAccess>,
    pub policy: Option<ActivationPolicy>,
    pub signature_required: Option<bool>,
    pub tracking_webhooks: Option<bool>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreateInvitation {
    pub business_type: BusinessType,
    pub tier: Tier,
    pub recipient: Recipient,
    pub location: GeofenceRequest,
    #[serde(default = "default_delivery")]
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub overrides: Overrides,
}

fn default_delivery() -> DeliveryMethod {
    DeliveryMethod::Courier
}

fn zone(request: &ZoneRequest, fallback_label: String) -> Result<GeofenceZone, ValidationError> {
    let point = GeoPoint::new(request.latitude, request.longitude)?;
    if !request.radius_m.is_finite() || request.radius_m <= 0.0 || request.radius_m > MAX_RADIUS_M
    {
        return Err(ValidationError::new(
            "radius_m",
            format!("must be between 0 and {MAX_RADIUS_M} meters"),
        ));
    }
    let label = request
        .label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or(fallback_label);
    Ok(GeofenceZone {
        label,
        point,
        radius_m: request.radius_m,
    })
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(())
}

impl CreateInvitation {
    /// Check the request and build the geofence it describes.
    pub fn validate(&self, service_region: Option<&BoundingBox>) -> Result<Geofence, ValidationError> {
        let r = &self.recipient;
        required("recipient.name", &r.name)?;
        required("recipient.organization", &r.organization)?;
        required("recipient.address", &r.address)?;
        if let Some(email) = &r.email {
            let (local, domain) = email
                .split_once('@')
                .ok_or_else(|| ValidationError::new("recipient.email", "missing @"))?;
            if local.is_empty() || !domain.contains('.') {
                return Err(ValidationError::new("recipient.email", "not an email address"));
            }
        }
        if let Some(mobile) = &r.mobile {
            validate_mobile_number(mobile)?;
        }
        if let Some(reg) = &r.business_registration {
            validate_business_registration(reg)?;
        }

        let primary = zone(&self.location.primary, "primary".to_string())?;
        if let Some(region) = service_region {
            if !region.contains(primary.point.latitude, primary.point.longitude) {
                return Err(ValidationError::new(
                    "location.primary",
                    "outside the service region",
                ));
            }
        }
        let alternates = self
            .location
            .alternates
            .iter()
            .enumerate()
            .map(|(i, z)| zone(z, format!("alternate {}", i + 1)))
            .collect::<Result<Vec<_>, _>>()?;

        for range in &self.location.allowed_ip_ranges {
            range
                .parse::<Cidr>()
                .map_err(|e| ValidationError::new("location.allowed_ip_ranges", e.to_string()))?;
        }
        for country in &self.location.allowed_countries {
            validate_country_code(country)?;
        }

        if let Some(hours) = self.overrides.expiration_hours {
            if hours == 0 || hours > MAX_EXPIRATION_HOURS {
                return Err(ValidationError::new(
                    "overrides.expiration_hours",
                    format!("must be between 1 and {MAX_EXPIRATION_HOURS}"),
                ));
            }
        }
        if let Some(days) = self.overrides.trial_days {
            if days == 0 || days > MAX_TRIAL_DAYS {
                return Err(ValidationError::new(
                    "overrides.trial_days",
                    format!("must be between 1 and {MAX_TRIAL_DAYS}"),
                ));
            }
        }
        let policy = self.overrides.policy.unwrap_or_default();
        if policy.sms_verification_required && r.mobile.is_none() {
            return Err(ValidationError::new(
                "recipient.mobile",
                "required when SMS verification is enabled",
            ));
        }

        Ok(Geofence {
            primary,
            alternates,
            allowed_wifi: self
                .location
                .allowed_wifi
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            allowed_ip_ranges: self.location.allowed_ip_ranges.clone(),
            allowed_countries: self
                .location
                .allowed_countries
                .iter()
                .map(|c| c.to_uppercase())
                .collect(),
        })
    }
}

pub fn validate_conversion(details: &ConversionDetails) -> Result<(), ValidationError> {
    required("plan", &details.plan)?;
    if details.monthly_amount_cents < 0 {
        return Err(ValidationError::new(
            "monthly_amount_cents",
            "must not be negative",
        ));
    }
    if details.currency.len() != 3 || !details.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            "must be an ISO 4217 code such as EUR",
        ));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct CreatedInvitation {
    pub invitation: Invitation,
    pub token: String,
    pub activation_url: String,
    pub qr_svg: String,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct InvitationDetail {
    pub invitation: Invitation,
    pub trial: Option<TrialStatus>,
    pub courier_events: Vec<CourierEvent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DispatchRequest {
    pub carrier: Option<CarrierKind>,
    /// Supply when the card was booked outside the service.
    pub tracking_number: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct WebhookOutcome {
    pub received: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub unmatched: usize,
    pub delivered: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshOutcome {
    pub tracking: TrackingResult,
    pub applied: WebhookOutcome,
}

/// What the QR landing page needs to render.
#[derive(Debug, Serialize)]
pub struct ScanView {
    pub invitation_number: String,
    pub organization: String,
    pub recipient_name: String,
    pub status: InvitationStatus,
    pub policy: ActivationPolicy,
    pub can_activate: bool,
    pub flagged_for_review: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LocationCheck {
    pub token: String,
    pub location: LocationSample,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SmsRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SmsRequested {
    pub sent_to: String,
    pub expires_in_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ActivationRequest {
    pub token: String,
    #[serde(default)]
    pub location: Option<LocationSample>,
    /// Defaults to the device reported with the location sample.
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub sms_code: Option<String>,
}

#[derive(Debug)]
pub struct ActivationOutcome {
    pub invitation: Invitation,
    pub location: Option<LocationVerdict>,
    pub trial: Option<TrialStatus>,
}

/// What the recipient learns about a location check. Zones, distances and
/// spoofing indicators stay on the operator side.
#[derive(Debug, Serialize)]
pub struct LocationResult {
    pub verified: bool,
    pub confidence: f64,
}

impl From<&LocationVerdict> for LocationResult {
    fn from(verdict: &LocationVerdict) -> Self {
        Self {
            verified: verdict.verified,
            confidence: verdict.confidence,
        }
    }
}

/// Recipient view of a completed activation.
#[derive(Debug, Serialize)]
pub struct ActivationReceipt {
    pub invitation_number: String,
    pub status: InvitationStatus,
    pub activated_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub platform_access: PlatformAccess,
    pub location: Option<LocationResult>,
    pub trial: Option<TrialStatus>,
}

impl From<ActivationOutcome> for ActivationReceipt {
    fn from(outcome: ActivationOutcome) -> Self {
        let invitation = outcome.invitation;
        Self {
            invitation_number: invitation.number,
            status: invitation.status,
            activated_at: invitation.activated_at,
            trial_ends_at: invitation.trial_ends_at,
            platform_access: invitation.config.platform_access,
            location: outcome.location.as_ref().map(LocationResult::from),
            trial: outcome.trial,
        }
    }
}

/// `+35799123456` → `*********456`.
pub fn mask_phone(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
    let keep = digits.len().min(3);
    let mut masked: String = "*".repeat(digits.len() - keep);
    masked.extend(&digits[digits.len() - keep..]);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> CreateInvitation {
        serde_json::from_value(json!({
            "business_type": "hotel",
            "tier": "founder",
            "recipient": {
                "name": "Eleni Georgiou",
                "title": "General Manager",
                "organization": "Limassol Bay Hotel",
                "address": "28 Oktovriou 1, 3035 Limassol",
                "mobile": "+357 99 123456",
                "business_registration": "HE123456"
            },
            "location": {
                "primary": {"latitude": 34.6786, "longitude": 33.0413}
            }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_in() {
        let req = request();
        assert_eq!(req.delivery_method, DeliveryMethod::Courier);
        let fence = req.validate(Some(&BoundingBox::CYPRUS)).unwrap();
        assert_eq!(fence.primary.label, "primary");
        assert_eq!(fence.primary.radius_m, 100.0);
    }

    #[test]
    fn rejects_bad_recipient_fields() {
        let mut req = request();
        req.recipient.mobile = Some("12345".into());
        assert_eq!(req.validate(None).unwrap_err().field, "mobile");

        let mut req = request();
        req.recipient.organization = "  ".into();
        assert_eq!(
            req.validate(None).unwrap_err().field,
            "recipient.organization"
        );

        let mut req = request();
        req.recipient.email = Some("nobody".into());
        assert!(req.validate(None).is_err());
    }

    #[test]
    fn rejects_bad_geofence() {
        let mut req = request();
        req.location.primary.radius_m = 0.0;
        assert_eq!(req.validate(None).unwrap_err().field, "radius_m");

        let mut req = request();
        req.location.primary.latitude = 95.0;
        assert!(req.validate(None).is_err());

        let mut req = request();
        req.location.allowed_ip_ranges = vec!["10.0.0.0/40".into()];
        assert!(req.validate(None).is_err());

        let mut req = request();
        req.location.primary.latitude = 37.98;
        req.location.primary.longitude = 23.72;
        assert!(req.validate(Some(&BoundingBox::CYPRUS)).is_err());
        assert!(req.validate(None).is_ok());
    }

    #[test]
    fn sms_policy_needs_mobile() {
        let mut req = request();
        req.recipient.mobile = None;
        req.overrides.policy = Some(ActivationPolicy {
            sms_verification_required: true,
            ..Default::default()
        });
        assert_eq!(req.validate(None).unwrap_err().field, "recipient.mobile");
    }

    #[test]
    fn override_ranges() {
        let mut req = request();
        req.overrides.expiration_hours = Some(0);
        assert!(req.validate(None).is_err());
        req.overrides.expiration_hours = Some(72);
        req.overrides.trial_days = Some(400);
        assert!(req.validate(None).is_err());
    }

    #[test]
    fn conversion_details() {
        let ok = ConversionDetails {
            plan: "professional".into(),
            monthly_amount_cents: 14_900,
            currency: "EUR".into(),
        };
        assert!(validate_conversion(&ok).is_ok());
        assert!(validate_conversion(&ConversionDetails {
            currency: "eur".into(),
            ..ok.clone()
        })
        .is_err());
        assert!(validate_conversion(&ConversionDetails {
            monthly_amount_cents: -1,
            ..ok
        })
        .is_err());
    }

    #[test]
    fn phone_masking() {
        assert_eq!(mask_phone("+35799123456"), "*********456");
        assert_eq!(mask_phone("99"), "99");
    }
}
