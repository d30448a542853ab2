use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::Banana;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Meeting,
    Matter,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meeting => "meeting",
            Self::Matter => "matter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "meeting" => Some(Self::Meeting),
            "matter" => Some(Self::Matter),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// One row of durable work. `source_url` is the deduplication key: at most
/// one live (pending/processing) row may exist per URL at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    pub id: i64,
    pub source_url: String,
    pub job_type: JobType,
    pub payload: JsonValue,
    pub meeting_id: Option<String>,
    pub banana: Option<Banana>,
    pub status: JobStatus,
    pub priority: i32,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Priority contribution of "how soon is this meeting", per the fetcher's
/// enqueue policy: `base_priority - max(0, days_until_meeting)`, strongly
/// positive for imminent meetings and negative for past ones.
pub fn meeting_priority(base_priority: i32, days_until_meeting: i64) -> i32 {
    base_priority - days_until_meeting.max(0) as i32
}

/// Retry-ladder priority penalty applied on each transient failure.
pub const RETRY_PRIORITY_PENALTY: i32 = 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meeting_priority_favors_imminent_meetings() {
        assert!(meeting_priority(100, 0) > meeting_priority(100, 10));
        assert_eq!(meeting_priority(100, -5), 100, "past meetings do not get a priority bonus");
    }

    #[test]
    fn job_type_and_status_round_trip_through_str() {
        for t in [JobType::Meeting, JobType::Matter] {
            assert_eq!(JobType::parse(t.as_str()), Some(t));
        }
        for s in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::DeadLetter,
        ] {
            assert_eq!(JobStatus::parse(s.as_str()), Some(s));
        }
    }
}
