//! Trial countdown and conversion campaigns.
//!
//! Nothing here is stored except which campaigns already fired. The trial
//! view is recomputed on every read, and firing is insert-if-absent, so
//! evaluating the same invitation repeatedly is harmless.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use geogate_events::{EventBus, EventKind, InvitationEvent};
use geogate_storage::{CampaignKind, Invitation, InvitationStatus, Store};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::metrics;

const FINAL_DAYS: i64 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyThresholds {
    pub critical_days: i64,
    pub high_days: i64,
    pub medium_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            critical_days: 1,
            high_days: 3,
            medium_days: 7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyThresholds {
    pub fn classify(&self, days_remaining: i64) -> Urgency {
        if days_remaining <= self.critical_days {
            Urgency::Critical
        } else if days_remaining <= self.high_days {
            Urgency::High
        } else if days_remaining <= self.medium_days {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }
}

/// Whole days left, rounded up, never negative.
pub fn days_remaining(trial_ends_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (trial_ends_at - now).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    let day = Duration::days(1).num_milliseconds();
    (ms + day - 1) / day
}

/// Campaigns whose moment has come. `ended` covers trials closed early.
pub fn due_campaigns(
    started_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
    ended: bool,
) -> Vec<CampaignKind> {
    let ended = ended || now >= ends_at;
    let mut due = vec![CampaignKind::Welcome];
    if ended {
        due.push(CampaignKind::Expired);
        return due;
    }
    let midpoint = started_at + (ends_at - started_at) / 2;
    if now >= midpoint {
        due.push(CampaignKind::MidTrial);
    }
    if days_remaining(ends_at, now) <= FINAL_DAYS {
        due.push(CampaignKind::FinalDays);
    }
    due
}

#[derive(Clone, Debug, Serialize)]
pub struct TrialStatus {
    pub trial_started_at: DateTime<Utc>,
    pub trial_ends_at: DateTime<Utc>,
    pub days_remaining: i64,
    pub urgency: Urgency,
    /// Share of the trial already used, `0.0..=1.0`.
    pub elapsed_fraction: f64,
    pub campaigns_fired: Vec<CampaignKind>,
}

pub struct CampaignScheduler {
    store: Arc<dyn Store>,
    events: Arc<dyn EventBus>,
    thresholds: UrgencyThresholds,
}

impl CampaignScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventBus>,
        thresholds: UrgencyThresholds,
    ) -> Self {
        Self {
            store,
            events,
            thresholds,
        }
    }

    /// Trial view for an invitation that has had a trial, firing any
    /// campaigns that became due. `None` if no trial was ever opened.
    pub async fn evaluate(
        &self,
        invitation: &Invitation,
        now: DateTime<Utc>,
    ) -> Result<Option<TrialStatus>, ServiceError> {
        let Some(ends_at) = invitation.trial_ends_at else {
            return Ok(None);
        };
        let started_at = ends_at - Duration::days(i64::from(invitation.config.trial_days));

        if matches!(
            invitation.status,
            InvitationStatus::Trial | InvitationStatus::Expired
        ) {
            let ended = invitation.status == InvitationStatus::Expired;
            for kind in due_campaigns(started_at, ends_at, now, ended) {
                self.fire(invitation, kind, now).await?;
            }
        }

        let mut campaigns_fired: Vec<CampaignKind> = self
            .store
            .list_campaigns(&invitation.id)
            .await?
            .into_iter()
            .map(|c| c.kind)
            .collect();
        campaigns_fired.sort();

        let total = (ends_at - started_at).num_milliseconds().max(1) as f64;
        let elapsed = (now - started_at).num_milliseconds() as f64;
        let remaining = days_remaining(ends_at, now);

        Ok(Some(TrialStatus {
            trial_started_at: started_at,
            trial_ends_at: ends_at,
            days_remaining: remaining,
            urgency: self.thresholds.classify(remaining),
            elapsed_fraction: (elapsed / total).clamp(0.0, 1.0),
            campaigns_fired,
        }))
    }

    async fn fire(
        &self,
        invitation: &Invitation,
        kind: CampaignKind,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if !self.store.record_campaign(&invitation.id, kind, now).await? {
            return Ok(());
        }
        tracing::info!(
            invitation = %invitation.number,
            campaign = kind.as_str(),
            "campaign fired"
        );
        metrics::record_campaign(kind.as_str());
        let event = InvitationEvent::new(
            invitation.number.clone(),
            EventKind::CampaignFired { campaign: kind },
            now,
        );
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, "failed to publish campaign event");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn days_remaining_rounds_up_and_floors() {
        let end = t0() + Duration::days(30);
        assert_eq!(days_remaining(end, t0()), 30);
        assert_eq!(days_remaining(end, t0() + Duration::hours(1)), 30);
        assert_eq!(days_remaining(end, end - Duration::minutes(1)), 1);
        assert_eq!(days_remaining(end, end), 0);
        assert_eq!(days_remaining(end, end + Duration::days(4)), 0);
    }

    #[test]
    fn urgency_bands() {
        let t = UrgencyThresholds::default();
        assert_eq!(t.classify(0), Urgency::Critical);
        assert_eq!(t.classify(1), Urgency::Critical);
        assert_eq!(t.classify(3), Urgency::High);
        assert_eq!(t.classify(7), Urgency::Medium);
        assert_eq!(t.classify(8), Urgency::Low);
    }

    #[test]
    fn campaign_schedule_over_a_trial() {
        let start = t0();
        let end = start + Duration::days(30);
        assert_eq!(
            due_campaigns(start, end, start, false),
            vec![CampaignKind::Welcome]
        );
        assert_eq!(
            due_campaigns(start, end, start + Duration::days(15), false),
            vec![CampaignKind::Welcome, CampaignKind::MidTrial]
        );
        assert_eq!(
            due_campaigns(start, end, start + Duration::days(28), false),
            vec![
                CampaignKind::Welcome,
                CampaignKind::MidTrial,
                CampaignKind::FinalDays
            ]
        );
        assert_eq!(
            due_campaigns(start, end, end, false),
            vec![CampaignKind::Welcome, CampaignKind::Expired]
        );
        assert_eq!(
            due_campaigns(start, end, start + Duration::days(2), true),
            vec![CampaignKind::Welcome, CampaignKind::Expired]
        );
    }
}
