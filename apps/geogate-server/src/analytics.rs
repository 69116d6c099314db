//! Conversion funnel over all invitations.

use std::collections::BTreeMap;

use geogate_storage::{Invitation, InvitationStatus};
use serde::Serialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub created: u64,
    pub sent: u64,
    pub delivered: u64,
    pub activated: u64,
    pub trial: u64,
    pub converted: u64,
    pub expired: u64,
}

impl StageCounts {
    /// Stages are counted by the timestamps an invitation has collected, so
    /// an expired invitation still counts for every stage it reached.
    fn add(&mut self, invitation: &Invitation) {
        self.created += 1;
        self.sent += u64::from(invitation.sent_at.is_some());
        self.delivered += u64::from(invitation.delivered_at.is_some());
        self.activated += u64::from(invitation.activated_at.is_some());
        self.trial += u64::from(invitation.trial_ends_at.is_some());
        self.converted += u64::from(invitation.converted_at.is_some());
        self.expired += u64::from(invitation.status == InvitationStatus::Expired);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ConversionRates {
    pub delivery_rate: f64,
    pub activation_rate: f64,
    pub trial_rate: f64,
    pub conversion_rate: f64,
    /// Converted over created.
    pub overall_rate: f64,
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl From<&StageCounts> for ConversionRates {
    fn from(c: &StageCounts) -> Self {
        Self {
            delivery_rate: ratio(c.delivered, c.sent),
            activation_rate: ratio(c.activated, c.delivered),
            trial_rate: ratio(c.trial, c.activated),
            conversion_rate: ratio(c.converted, c.trial),
            overall_rate: ratio(c.converted, c.created),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TierFunnel {
    pub stages: StageCounts,
    pub rates: ConversionRates,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversionFunnel {
    pub stages: StageCounts,
    pub rates: ConversionRates,
    pub by_tier: BTreeMap<&'static str, TierFunnel>,
    pub flagged_for_review: u64,
    /// Mean days from creation to activation, over activated invitations.
    pub avg_days_to_activation: Option<f64>,
}

pub fn conversion_funnel(invitations: &[Invitation]) -> ConversionFunnel {
    let mut stages = StageCounts::default();
    let mut tiers: BTreeMap<&'static str, StageCounts> = BTreeMap::new();
    let mut flagged = 0;
    let mut activation_days = Vec::new();

    for invitation in invitations {
        stages.add(invitation);
        tiers.entry(invitation.tier.as_str()).or_default().add(invitation);
        flagged += u64::from(invitation.flagged_for_review);
        if let Some(at) = invitation.activated_at {
            activation_days.push((at - invitation.created_at).num_seconds() as f64 / 86_400.0);
        }
    }

    let avg_days_to_activation = (!activation_days.is_empty())
        .then(|| activation_days.iter().sum::<f64>() / activation_days.len() as f64);

    ConversionFunnel {
        rates: ConversionRates::from(&stages),
        stages,
        by_tier: tiers
            .into_iter()
            .map(|(tier, stages)| {
                (
                    tier,
                    TierFunnel {
                        rates: ConversionRates::from(&stages),
                        stages,
                    },
                )
            })
            .collect(),
        flagged_for_review: flagged,
        avg_days_to_activation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_funnel_has_zero_rates() {
        let funnel = conversion_funnel(&[]);
        assert_eq!(funnel.stages, StageCounts::default());
        assert_eq!(funnel.rates.overall_rate, 0.0);
        assert!(funnel.by_tier.is_empty());
        assert_eq!(funnel.avg_days_to_activation, None);
    }

    #[test]
    fn rates_divide_adjacent_stages() {
        let stages = StageCounts {
            created: 10,
            sent: 8,
            delivered: 6,
            activated: 3,
            trial: 3,
            converted: 1,
            expired: 2,
        };
        let rates = ConversionRates::from(&stages);
        assert_eq!(rates.delivery_rate, 0.75);
        assert_eq!(rates.activation_rate, 0.5);
        assert_eq!(rates.trial_rate, 1.0);
        assert!((rates.conversion_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(rates.overall_rate, 0.1);
    }
}
