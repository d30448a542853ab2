use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::Banana;

/// Vendor-reported disposition of a meeting. `None` means "scheduled as
/// normal" — this is intentionally not folded into `ProcessingStatus`,
/// which tracks our own pipeline state, not the vendor's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Cancelled,
    Postponed,
    Revised,
    Rescheduled,
}

impl MeetingStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cancelled" => Some(Self::Cancelled),
            "postponed" => Some(Self::Postponed),
            "revised" => Some(Self::Revised),
            "rescheduled" => Some(Self::Rescheduled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Postponed => "postponed",
            Self::Revised => "revised",
            Self::Rescheduled => "rescheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub banana: Banana,
    pub title: String,
    pub date: DateTime<Utc>,
    pub agenda_url: Option<String>,
    pub packet_url: Option<String>,
    /// LLM-authored summary. Preserved across re-sync (§4.3 preservation
    /// rule) — the adapter must never be allowed to clobber this.
    pub summary: Option<String>,
    pub participation: Option<JsonValue>,
    pub status: Option<MeetingStatus>,
    pub processing_status: ProcessingStatus,
    pub processing_method: Option<String>,
    pub processing_time_seconds: Option<f64>,
    /// Per-topic frequency across this meeting's items, sorted descending.
    pub topics: Option<Vec<String>>,
}

impl Meeting {
    pub fn new(id: String, banana: Banana, title: String, date: DateTime<Utc>) -> Self {
        Self {
            id,
            banana,
            title,
            date,
            agenda_url: None,
            packet_url: None,
            summary: None,
            participation: None,
            status: None,
            processing_status: ProcessingStatus::Pending,
            processing_method: None,
            processing_time_seconds: None,
            topics: None,
        }
    }
}
