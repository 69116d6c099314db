//! Trial countdown and conversion campaigns.

use super::common::*;
use crate::campaigns::Urgency;
use chrono::Duration;
use futures::StreamExt;
use geogate_events::{EventBus, EventKind};
use geogate_storage::{CampaignKind, InvitationStatus, Store};

#[tokio::test]
async fn campaigns_follow_the_trial_timeline() {
    let h = create_harness().await;
    let (created, _) = h.delivered(founder_hotel()).await;
    let number = created.invitation.number.clone();
    h.activate_at_hotel(&created.token).await;
    let ends_at = t0() + Duration::days(90);

    h.clock.set(t0() + Duration::days(44));
    let trial = h.service.get(&number).await.unwrap().trial.unwrap();
    assert_eq!(trial.campaigns_fired, vec![CampaignKind::Welcome]);
    assert_eq!(trial.days_remaining, 46);
    assert_eq!(trial.urgency, Urgency::Low);

    h.clock.set(t0() + Duration::days(46));
    let trial = h.service.get(&number).await.unwrap().trial.unwrap();
    assert_eq!(
        trial.campaigns_fired,
        vec![CampaignKind::Welcome, CampaignKind::MidTrial]
    );
    assert!(trial.elapsed_fraction > 0.5);

    h.clock.set(ends_at - Duration::days(2));
    let trial = h.service.get(&number).await.unwrap().trial.unwrap();
    assert_eq!(
        trial.campaigns_fired,
        vec![
            CampaignKind::Welcome,
            CampaignKind::MidTrial,
            CampaignKind::FinalDays
        ]
    );
    assert_eq!(trial.days_remaining, 2);
    assert_eq!(trial.urgency, Urgency::High);

    h.clock.set(ends_at);
    let detail = h.service.get(&number).await.unwrap();
    assert_eq!(detail.invitation.status, InvitationStatus::Expired);
    assert_eq!(detail.invitation.expired_at, Some(ends_at));
    let trial = detail.trial.unwrap();
    assert_eq!(trial.days_remaining, 0);
    assert_eq!(trial.urgency, Urgency::Critical);
    assert_eq!(trial.campaigns_fired, CampaignKind::ALL.to_vec());
}

#[tokio::test]
async fn campaigns_fire_once() {
    let h = create_harness().await;
    let (created, _) = h.delivered(founder_hotel()).await;
    let number = created.invitation.number.clone();
    h.activate_at_hotel(&created.token).await;
    let mut events = h.events.subscribe(&number).await.unwrap();

    h.clock.advance(Duration::days(50));
    for _ in 0..3 {
        h.service.get(&number).await.unwrap();
    }

    let campaigns = h
        .store
        .list_campaigns(&created.invitation.id)
        .await
        .unwrap();
    assert_eq!(campaigns.len(), 2);

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event.kind,
        EventKind::CampaignFired {
            campaign: CampaignKind::MidTrial
        }
    );
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(50), events.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn sweep_closes_missed_trials() {
    let h = create_harness().await;
    let (created, _) = h.delivered(founder_hotel()).await;
    h.activate_at_hotel(&created.token).await;

    // Nobody looked at the invitation during the trial.
    h.clock.advance(Duration::days(120));
    let report = h.service.sweep_expired().await.unwrap();
    assert_eq!(report.expired, vec![created.invitation.number.clone()]);

    let detail = h.service.get(&created.invitation.number).await.unwrap();
    assert_eq!(detail.invitation.status, InvitationStatus::Expired);
    assert_eq!(
        detail.trial.unwrap().campaigns_fired,
        vec![CampaignKind::Welcome, CampaignKind::Expired]
    );
}

#[tokio::test]
async fn early_expiry_fires_the_closing_campaign() {
    let h = create_harness().await;
    let (created, _) = h.delivered(founder_hotel()).await;
    h.activate_at_hotel(&created.token).await;
    h.clock.advance(Duration::days(10));

    let expired = h
        .service
        .expire(&created.invitation.number)
        .await
        .unwrap();
    assert_eq!(expired.status, InvitationStatus::Expired);

    let fired: Vec<_> = h
        .store
        .list_campaigns(&expired.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.kind)
        .collect();
    assert!(fired.contains(&CampaignKind::Expired));
    assert!(!fired.contains(&CampaignKind::MidTrial));
}

#[tokio::test]
async fn no_trial_view_before_activation() {
    let h = create_harness().await;
    let created = h.create(founder_hotel()).await;
    let detail = h.service.get(&created.invitation.number).await.unwrap();
    assert!(detail.trial.is_none());
}
