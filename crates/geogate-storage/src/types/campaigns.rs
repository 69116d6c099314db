//! Trial conversion campaigns.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InvitationId, ParseEnumError};

/// Campaign touch points during a trial, in firing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    Welcome,
    MidTrial,
    FinalDays,
    Expired,
}

impl CampaignKind {
    pub const ALL: [CampaignKind; 4] = [
        CampaignKind::Welcome,
        CampaignKind::MidTrial,
        CampaignKind::FinalDays,
        CampaignKind::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignKind::Welcome => "welcome",
            CampaignKind::MidTrial => "mid_trial",
            CampaignKind::FinalDays => "final_days",
            CampaignKind::Expired => "expired",
        }
    }
}

impl FromStr for CampaignKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(CampaignKind::Welcome),
            "mid_trial" => Ok(CampaignKind::MidTrial),
            "final_days" => Ok(CampaignKind::FinalDays),
            "expired" => Ok(CampaignKind::Expired),
            _ => Err(ParseEnumError::new("campaign", s)),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FiredCampaign {
    pub invitation_id: InvitationId,
    pub kind: CampaignKind,
    pub fired_at: DateTime<Utc>,
}
