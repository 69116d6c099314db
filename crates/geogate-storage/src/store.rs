//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait the invitation service depends on.
///
/// Invitation status changes go through [`Store::transition_invitation`],
/// which is conditional on the expected current status so concurrent
/// writers cannot both win.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Numbering ──────────────────────────────────────

    /// Atomically allocate the next sequence value for a number prefix (starts at 1).
    async fn next_invitation_sequence(&self, prefix: &str) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Invitations ────────────────────────────────────

    /// Persist a new invitation in `created` status.
    /// Returns `AlreadyExists` if the number is taken.
    async fn create_invitation(&self, params: &NewInvitation) -> Result<Invitation, StoreError>;

    async fn get_invitation(&self, id: &InvitationId) -> Result<Invitation, StoreError>;

    async fn get_invitation_by_number(&self, number: &str) -> Result<Invitation, StoreError>;

    async fn get_invitation_by_tracking(
        &self,
        tracking_number: &str,
    ) -> Result<Invitation, StoreError>;

    /// Newest first.
    async fn list_invitations(
        &self,
        filter: &InvitationFilter,
    ) -> Result<Vec<Invitation>, StoreError>;

    /// Move an invitation from `expected` to `transition.to`.
    /// Returns `Conflict` if the stored status is no longer `expected`.
    async fn transition_invitation(
        &self,
        id: &InvitationId,
        expected: InvitationStatus,
        transition: &Transition,
    ) -> Result<Invitation, StoreError>;

    /// Returns the new counter value.
    async fn increment_counter(
        &self,
        id: &InvitationId,
        counter: InvitationCounter,
    ) -> Result<i64, StoreError>;

    /// Set or clear the manual-review flag. Clearing records `at` as the
    /// review time so earlier failures stop counting toward lockout.
    async fn set_review_flag(
        &self,
        id: &InvitationId,
        flagged: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Location ───────────────────────────────────────

    async fn append_location_attempt(
        &self,
        attempt: &NewLocationAttempt,
    ) -> Result<LocationAttempt, StoreError>;

    /// Oldest first.
    async fn list_location_attempts(
        &self,
        id: &InvitationId,
    ) -> Result<Vec<LocationAttempt>, StoreError>;

    async fn last_location_attempt(
        &self,
        id: &InvitationId,
    ) -> Result<Option<LocationAttempt>, StoreError>;

    // ───────────────────────────────────── Devices ────────────────────────────────────────

    /// Returns false if this fingerprint hash was already recorded for the invitation.
    async fn append_device_fingerprint(
        &self,
        id: &InvitationId,
        fingerprint: &DeviceFingerprint,
    ) -> Result<bool, StoreError>;

    /// In insertion order; the first entry is the activating device.
    async fn list_device_fingerprints(
        &self,
        id: &InvitationId,
    ) -> Result<Vec<DeviceFingerprint>, StoreError>;

    // ───────────────────────────────────── Courier ────────────────────────────────────────

    /// Returns false if the same event was already recorded.
    async fn append_courier_event(&self, event: &NewCourierEvent) -> Result<bool, StoreError>;

    /// Ordered by occurrence time.
    async fn list_courier_events(&self, id: &InvitationId)
        -> Result<Vec<CourierEvent>, StoreError>;

    // ───────────────────────────────────── Campaigns ──────────────────────────────────────

    /// Returns false if this campaign already fired for the invitation.
    async fn record_campaign(
        &self,
        id: &InvitationId,
        kind: CampaignKind,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn list_campaigns(&self, id: &InvitationId) -> Result<Vec<FiredCampaign>, StoreError>;
}
