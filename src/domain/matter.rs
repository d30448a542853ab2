use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::Banana;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatterStatus {
    Active,
    Passed,
    Failed,
    Tabled,
    Withdrawn,
    Referred,
    Amended,
    Vetoed,
    Enacted,
}

impl MatterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Tabled => "tabled",
            Self::Withdrawn => "withdrawn",
            Self::Referred => "referred",
            Self::Amended => "amended",
            Self::Vetoed => "vetoed",
            Self::Enacted => "enacted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "tabled" => Some(Self::Tabled),
            "withdrawn" => Some(Self::Withdrawn),
            "referred" => Some(Self::Referred),
            "amended" => Some(Self::Amended),
            "vetoed" => Some(Self::Vetoed),
            "enacted" => Some(Self::Enacted),
            _ => None,
        }
    }

    /// A terminal status freezes `last_seen`: once reached, further
    /// appearances no longer advance it automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Passed | Self::Failed | Self::Tabled | Self::Withdrawn | Self::Vetoed | Self::Enacted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteOutcome {
    Passed,
    Failed,
    Tabled,
    Withdrawn,
    Referred,
    Amended,
    Unknown,
    NoVote,
}

impl VoteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Tabled => "tabled",
            Self::Withdrawn => "withdrawn",
            Self::Referred => "referred",
            Self::Amended => "amended",
            Self::Unknown => "unknown",
            Self::NoVote => "no_vote",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoteTally {
    pub yes: u32,
    pub no: u32,
    pub abstain: u32,
    pub absent: u32,
}

/// A legislative object tracked across meetings.
///
/// Identity is chosen by fallback hierarchy (`matter_file` > vendor
/// `matter_id` > normalized title) and hashed with the owning city's
/// `banana` into `id` — see `crate::ids::matter_id`. Within a city, no two
/// matters may share an identity string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterRecord {
    pub id: String,
    pub banana: Banana,
    pub matter_file: Option<String>,
    pub matter_id_vendor: Option<String>,
    pub matter_type: Option<String>,
    pub title: String,
    pub sponsors: Option<Vec<String>>,
    pub canonical_summary: Option<String>,
    pub canonical_topics: Option<Vec<String>>,
    pub attachments: Option<JsonValue>,
    pub metadata: Option<JsonValue>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub appearance_count: i32,
    pub status: MatterStatus,
    pub final_vote_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterAppearance {
    pub matter_id: String,
    pub meeting_id: String,
    pub item_id: String,
    pub appeared_at: DateTime<Utc>,
    pub committee: Option<String>,
    pub vote_outcome: Option<VoteOutcome>,
    pub vote_tally: Option<VoteTally>,
    pub sequence: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_match_spec() {
        for status in [
            MatterStatus::Passed,
            MatterStatus::Failed,
            MatterStatus::Tabled,
            MatterStatus::Withdrawn,
            MatterStatus::Vetoed,
            MatterStatus::Enacted,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!MatterStatus::Active.is_terminal());
        assert!(!MatterStatus::Referred.is_terminal());
        assert!(!MatterStatus::Amended.is_terminal());
    }
}
