use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    /// Mandatory at the domain-model boundary; adapters default to `"pdf"`
    /// when the vendor doesn't report one, so the processor never silently
    /// skips an attachment for lack of a type.
    #[serde(rename = "type")]
    pub attachment_type: String,
    pub pages: Option<u32>,
}

impl Attachment {
    pub fn new(url: String, name: String, attachment_type: Option<String>) -> Self {
        Self {
            url,
            name,
            attachment_type: attachment_type.unwrap_or_else(|| "pdf".to_string()),
            pages: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaItem {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub sequence: u32,
    pub attachments: Vec<Attachment>,
    pub attachment_hash: String,
    /// Vendor-raw at ingestion (adapters set this from the vendor's own
    /// matter id, e.g. Legistar's `EventItemMatterId`). The store rewrites
    /// it to the computed `matters.id` hash before the row is persisted, so
    /// once read back from storage this is the FK, not the vendor value.
    pub matter_id: Option<String>,
    /// Denormalized for fast display without a join; the authoritative
    /// value lives on the referenced `MatterRecord`.
    pub matter_file: Option<String>,
    pub sponsors: Option<Vec<String>>,
    pub summary: Option<String>,
    pub topics: Option<Vec<String>>,
}

/// Agenda items with no substantive content, excluded from LLM work but
/// still stored for completeness. Matched case-insensitively.
pub const PROCEDURAL_ITEM_PATTERNS: &[&str] = &[
    r"(?i)^roll call$",
    r"(?i)^approval of (the )?minutes$",
    r"(?i)^pledge of allegiance$",
    r"(?i)^invocation$",
    r"(?i)^adjournment$",
    r"(?i)^call to order$",
    r"(?i)^public comment(s)?$",
];

impl AgendaItem {
    pub fn is_procedural(&self) -> bool {
        crate::vendors::procedural_item_regex().is_match(&self.title)
    }
}
