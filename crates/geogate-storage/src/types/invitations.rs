//! Invitation aggregate and its value types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use geogate_geo::GeoPoint;
use serde::{Deserialize, Serialize};

use super::{CarrierKind, DeviceFingerprint, InvitationId, LocationAttempt, ParseEnumError};

/// Kind of business an invitation is addressed to. Determines the
/// invitation-number prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Hotel,
    BoutiqueHotel,
    Resort,
    GuestHouse,
    Villa,
    Restaurant,
    TravelAgency,
    TourOperator,
    Other,
}

impl BusinessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::Hotel => "hotel",
            BusinessType::BoutiqueHotel => "boutique_hotel",
            BusinessType::Resort => "resort",
            BusinessType::GuestHouse => "guest_house",
            BusinessType::Villa => "villa",
            BusinessType::Restaurant => "restaurant",
            BusinessType::TravelAgency => "travel_agency",
            BusinessType::TourOperator => "tour_operator",
            BusinessType::Other => "other",
        }
    }

    /// Category prefix of invitation numbers (`HTL-000042`).
    pub fn number_prefix(&self) -> &'static str {
        match self {
            BusinessType::Hotel => "HTL",
            BusinessType::BoutiqueHotel => "BTQ",
            BusinessType::Resort => "RES",
            BusinessType::GuestHouse => "GST",
            BusinessType::Villa => "VIL",
            BusinessType::Restaurant => "RST",
            BusinessType::TravelAgency => "TRV",
            BusinessType::TourOperator => "TOP",
            BusinessType::Other => "BIZ",
        }
    }
}

impl FromStr for BusinessType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hotel" => Ok(BusinessType::Hotel),
            "boutique_hotel" => Ok(BusinessType::BoutiqueHotel),
            "resort" => Ok(BusinessType::Resort),
            "guest_house" => Ok(BusinessType::GuestHouse),
            "villa" => Ok(BusinessType::Villa),
            "restaurant" => Ok(BusinessType::Restaurant),
            "travel_agency" => Ok(BusinessType::TravelAgency),
            "tour_operator" => Ok(BusinessType::TourOperator),
            "other" => Ok(BusinessType::Other),
            _ => Err(ParseEnumError::new("business type", s)),
        }
    }
}

/// Invitation tier: controls platform-access grants and default trial length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Founder,
    EarlyAccess,
    Beta,
    Standard,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Founder => "founder",
            Tier::EarlyAccess => "early_access",
            Tier::Beta => "beta",
            Tier::Standard => "standard",
        }
    }

    pub fn default_trial_days(&self) -> u32 {
        match self {
            Tier::Founder => 90,
            Tier::EarlyAccess => 60,
            Tier::Beta => 45,
            Tier::Standard => 30,
        }
    }

    pub fn default_platform_access(&self) -> PlatformAccess {
        let core = PlatformAccess {
            pms: true,
            booking_engine: true,
            guest_portal: true,
            ..PlatformAccess::default()
        };
        match self {
            Tier::Founder => PlatformAccess::all(),
            Tier::EarlyAccess => PlatformAccess {
                api_access: false,
                ..PlatformAccess::all()
            },
            Tier::Beta => PlatformAccess {
                analytics: true,
                ..core
            },
            Tier::Standard => core,
        }
    }
}

impl FromStr for Tier {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "founder" => Ok(Tier::Founder),
            "early_access" => Ok(Tier::EarlyAccess),
            "beta" => Ok(Tier::Beta),
            "standard" => Ok(Tier::Standard),
            _ => Err(ParseEnumError::new("tier", s)),
        }
    }
}

/// Lifecycle status. `Converted` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Created,
    Sent,
    Delivered,
    Activated,
    Trial,
    Converted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Created => "created",
            InvitationStatus::Sent => "sent",
            InvitationStatus::Delivered => "delivered",
            InvitationStatus::Activated => "activated",
            InvitationStatus::Trial => "trial",
            InvitationStatus::Converted => "converted",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvitationStatus::Converted | InvitationStatus::Expired)
    }

    /// The only status `to` may be entered from; `None` for `Expired`, which
    /// any non-terminal status may move to, and for `Created`, which is only
    /// ever the initial status.
    pub fn required_predecessor(to: InvitationStatus) -> Option<InvitationStatus> {
        match to {
            InvitationStatus::Sent => Some(InvitationStatus::Created),
            InvitationStatus::Delivered => Some(InvitationStatus::Sent),
            InvitationStatus::Activated => Some(InvitationStatus::Delivered),
            InvitationStatus::Trial => Some(InvitationStatus::Activated),
            InvitationStatus::Converted => Some(InvitationStatus::Trial),
            InvitationStatus::Created | InvitationStatus::Expired => None,
        }
    }

    pub fn can_transition_to(&self, to: InvitationStatus) -> bool {
        match to {
            InvitationStatus::Expired => !self.is_terminal(),
            InvitationStatus::Created => false,
            other => InvitationStatus::required_predecessor(other) == Some(*self),
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(InvitationStatus::Created),
            "sent" => Ok(InvitationStatus::Sent),
            "delivered" => Ok(InvitationStatus::Delivered),
            "activated" => Ok(InvitationStatus::Activated),
            "trial" => Ok(InvitationStatus::Trial),
            "converted" => Ok(InvitationStatus::Converted),
            "expired" => Ok(InvitationStatus::Expired),
            _ => Err(ParseEnumError::new("invitation status", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Courier,
    HandDelivery,
    Postal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub title: String,
    pub organization: String,
    pub address: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub business_registration: Option<String>,
}

/// One allowed activation area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeofenceZone {
    pub label: String,
    pub point: GeoPoint,
    pub radius_m: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub primary: GeofenceZone,
    #[serde(default)]
    pub alternates: Vec<GeofenceZone>,
    #[serde(default)]
    pub allowed_wifi: Vec<String>,
    /// CIDR notation, e.g. `82.116.192.0/19`.
    #[serde(default)]
    pub allowed_ip_ranges: Vec<String>,
    /// ISO 3166-1 alpha-2.
    #[serde(default)]
    pub allowed_countries: Vec<String>,
}

impl Geofence {
    /// Primary zone first, then alternates in order.
    pub fn zones(&self) -> impl Iterator<Item = &GeofenceZone> {
        std::iter::once(&self.primary).chain(self.alternates.iter())
    }
}

/// Platform areas an activated invitation unlocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformAccess {
    pub pms: bool,
    pub channel_manager: bool,
    pub booking_engine: bool,
    pub revenue_management: bool,
    pub guest_portal: bool,
    pub analytics: bool,
    pub api_access: bool,
}

impl PlatformAccess {
    pub fn all() -> Self {
        Self {
            pms: true,
            channel_manager: true,
            booking_engine: true,
            revenue_management: true,
            guest_portal: true,
            analytics: true,
            api_access: true,
        }
    }
}

/// What an activation must prove. Fixed per invitation and embedded in its
/// QR token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationPolicy {
    pub sms_verification_required: bool,
    pub device_binding_required: bool,
    pub location_required: bool,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            sms_verification_required: false,
            device_binding_required: true,
            location_required: true,
        }
    }
}

/// Configuration snapshot taken when the invitation is created. Later changes
/// to service defaults never touch existing invitations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvitationConfig {
    pub expiration_hours: u32,
    pub trial_days: u32,
    pub delivery_method: DeliveryMethod,
    pub signature_required: bool,
    pub tracking_webhooks: bool,
    pub platform_access: PlatformAccess,
    pub policy: ActivationPolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversionDetails {
    pub plan: String,
    pub monthly_amount_cents: i64,
    pub currency: String,
}

/// Invitation record (aggregate root).
#[derive(Clone, Debug, Serialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub number: String,
    pub business_type: BusinessType,
    pub tier: Tier,
    pub status: InvitationStatus,
    pub recipient: Recipient,
    pub geofence: Geofence,
    pub config: InvitationConfig,
    pub carrier: Option<CarrierKind>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub converted_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    /// Activation deadline (created_at + expiration_hours).
    pub expires_at: DateTime<Utc>,
    pub delivery_attempts: i64,
    pub activation_attempts: i64,
    pub page_views: i64,
    pub flagged_for_review: bool,
    pub review_cleared_at: Option<DateTime<Utc>>,
    pub conversion: Option<ConversionDetails>,
    pub failed_location_attempts: Vec<LocationAttempt>,
    pub device_fingerprints: Vec<DeviceFingerprint>,
}

impl Invitation {
    /// Instant after which the invitation expires in its current status.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.status {
            InvitationStatus::Created
            | InvitationStatus::Sent
            | InvitationStatus::Delivered
            | InvitationStatus::Activated => Some(self.expires_at),
            InvitationStatus::Trial => self.trial_ends_at,
            InvitationStatus::Converted | InvitationStatus::Expired => None,
        }
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }
}

/// Parameters for creating an invitation.
#[derive(Clone, Debug)]
pub struct NewInvitation {
    pub number: String,
    pub business_type: BusinessType,
    pub tier: Tier,
    pub recipient: Recipient,
    pub geofence: Geofence,
    pub config: InvitationConfig,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A status change plus the data that travels with it. The store sets the
/// timestamp column belonging to `to` and never overwrites one already set.
#[derive(Clone, Debug)]
pub struct Transition {
    pub to: InvitationStatus,
    pub at: DateTime<Utc>,
    pub carrier: Option<CarrierKind>,
    pub tracking_number: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub conversion: Option<ConversionDetails>,
}

impl Transition {
    pub fn to(status: InvitationStatus, at: DateTime<Utc>) -> Self {
        Self {
            to: status,
            at,
            carrier: None,
            tracking_number: None,
            trial_ends_at: None,
            conversion: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvitationCounter {
    DeliveryAttempts,
    ActivationAttempts,
    PageViews,
}

#[derive(Clone, Debug, Default)]
pub struct InvitationFilter {
    pub status: Option<InvitationStatus>,
    pub flagged_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for s in [
            InvitationStatus::Created,
            InvitationStatus::Sent,
            InvitationStatus::Delivered,
            InvitationStatus::Activated,
            InvitationStatus::Trial,
            InvitationStatus::Converted,
            InvitationStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<InvitationStatus>().unwrap(), s);
        }
        assert!("pending".parse::<InvitationStatus>().is_err());
    }

    #[test]
    fn lifecycle_order_is_enforced() {
        use InvitationStatus::*;
        assert!(Created.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Activated));
        assert!(Activated.can_transition_to(Trial));
        assert!(Trial.can_transition_to(Converted));

        assert!(!Created.can_transition_to(Activated));
        assert!(!Sent.can_transition_to(Activated));
        assert!(!Trial.can_transition_to(Activated));
        assert!(!Converted.can_transition_to(Trial));
    }

    #[test]
    fn only_non_terminal_states_expire() {
        use InvitationStatus::*;
        for s in [Created, Sent, Delivered, Activated, Trial] {
            assert!(s.can_transition_to(Expired), "{s}");
        }
        assert!(!Converted.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Expired));
    }

    #[test]
    fn business_prefixes_are_unique() {
        use std::collections::HashSet;
        let all = [
            BusinessType::Hotel,
            BusinessType::BoutiqueHotel,
            BusinessType::Resort,
            BusinessType::GuestHouse,
            BusinessType::Villa,
            BusinessType::Restaurant,
            BusinessType::TravelAgency,
            BusinessType::TourOperator,
            BusinessType::Other,
        ];
        let prefixes: HashSet<_> = all.iter().map(|b| b.number_prefix()).collect();
        assert_eq!(prefixes.len(), all.len());
        for b in all {
            assert_eq!(b.as_str().parse::<BusinessType>().unwrap(), b);
        }
    }

    #[test]
    fn tier_defaults() {
        assert_eq!(Tier::Founder.default_trial_days(), 90);
        assert_eq!(Tier::Standard.default_trial_days(), 30);
        assert_eq!(Tier::Founder.default_platform_access(), PlatformAccess::all());
        assert!(!Tier::EarlyAccess.default_platform_access().api_access);
        let standard = Tier::Standard.default_platform_access();
        assert!(standard.pms && !standard.analytics && !standard.channel_manager);
        assert!(Tier::Beta.default_platform_access().analytics);
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Tier::EarlyAccess).unwrap(),
            "\"early_access\""
        );
        assert_eq!(
            serde_json::from_str::<BusinessType>("\"guest_house\"").unwrap(),
            BusinessType::GuestHouse
        );
    }
}
