//! Legistar adapter: API-first (Legistar's public Web API), falling back to
//! HTML agenda parsing when the API omits item-level detail for a city.
//!
//! Reqwest client construction follows the same one-client-per-adapter,
//! explicit-timeout shape used for the LLM client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::{AgendaItem, Attachment, Meeting, MeetingStatus, ProcessingStatus};
use crate::errors::VendorError;
use crate::ids;
use crate::types::{Banana, Vendor};

use super::{absolutize, within_date_window, FetchedMeeting, VendorAdapter};

const DEFAULT_LOOKBACK_DAYS: i64 = 7;
const DEFAULT_HORIZON_DAYS: i64 = 14;

pub struct LegistarAdapter {
    client: reqwest::Client,
}

impl LegistarAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client should build"),
        }
    }

    fn base_url(slug: &str) -> String {
        format!("https://webapi.legistar.com/v1/{slug}")
    }

    async fn fetch_via_api(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError> {
        let url = format!(
            "{}/events?$top={}&$orderby=EventDate",
            Self::base_url(slug),
            max_count
        );

        let response = self.client.get(&url).send().await.map_err(|e| VendorError::Http {
            vendor: "legistar".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(VendorError::Parsing {
                vendor: "legistar".into(),
                city_slug: slug.into(),
                message: format!("events endpoint returned {}", response.status()),
            });
        }

        let events: Vec<LegistarEvent> = response.json().await.map_err(|e| VendorError::Http {
            vendor: "legistar".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        let now = Utc::now();
        let mut fetched = Vec::new();

        for event in events {
            let Some(date) = event.event_date else { continue };
            if !within_date_window(date, now, DEFAULT_LOOKBACK_DAYS, DEFAULT_HORIZON_DAYS) {
                continue;
            }

            let meeting_id = ids::meeting_id(
                banana,
                &event.event_id.to_string(),
                &date.to_rfc3339(),
                &event.event_body_name,
            );

            let mut meeting = Meeting::new(meeting_id.clone(), banana.clone(), event.event_body_name.clone(), date);
            meeting.agenda_url = event.event_agenda_file.clone();
            meeting.packet_url = event.event_in_site_url.clone();
            meeting.status = event.event_comment.as_deref().and_then(MeetingStatus::parse);
            meeting.processing_status = ProcessingStatus::Pending;

            let items = self
                .fetch_items(slug, event.event_id, &meeting_id)
                .await
                .unwrap_or_else(|e| {
                    warn!(banana = %banana, event_id = event.event_id, error = %e, "falling back to no items for event");
                    Vec::new()
                });

            fetched.push(FetchedMeeting { meeting, items });
        }

        info!(banana = %banana, method = "api", meeting_count = fetched.len(), "legistar fetch complete");
        Ok(fetched)
    }

    async fn fetch_items(
        &self,
        slug: &str,
        event_id: i64,
        meeting_id: &str,
    ) -> Result<Vec<AgendaItem>, VendorError> {
        let url = format!("{}/events/{}/eventitems", Self::base_url(slug), event_id);
        let response = self.client.get(&url).send().await.map_err(|e| VendorError::Http {
            vendor: "legistar".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(VendorError::Parsing {
                vendor: "legistar".into(),
                city_slug: slug.into(),
                message: format!("eventitems endpoint returned {}", response.status()),
            });
        }

        let raw_items: Vec<LegistarEventItem> = response.json().await.map_err(|e| VendorError::Http {
            vendor: "legistar".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        Ok(raw_items
            .into_iter()
            .enumerate()
            .map(|(seq, raw)| {
                let suffix = raw
                    .event_item_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| seq.to_string());
                let attachments: Vec<Attachment> = raw
                    .event_item_matter_attachments
                    .into_iter()
                    .filter_map(|a| {
                        let url = absolutize(&Self::base_url(slug), &a.matter_attachment_hyperlink).ok()?;
                        Some(Attachment::new(url, a.matter_attachment_name, None))
                    })
                    .collect();
                let urls: Vec<String> = attachments.iter().map(|a| a.url.clone()).collect();

                AgendaItem {
                    id: ids::item_id(meeting_id, &suffix),
                    meeting_id: meeting_id.to_string(),
                    title: raw.event_item_title.unwrap_or_default(),
                    sequence: seq as u32,
                    attachment_hash: ids::attachment_hash(&urls),
                    attachments,
                    matter_id: raw.event_item_matter_id.map(|id| id.to_string()),
                    matter_file: raw.event_item_matter_file,
                    sponsors: None,
                    summary: None,
                    topics: None,
                }
            })
            .collect())
    }
}

impl Default for LegistarAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VendorAdapter for LegistarAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Legistar
    }

    async fn fetch_meetings(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError> {
        self.fetch_via_api(banana, slug, max_count).await
    }
}

#[derive(Debug, Deserialize)]
struct LegistarEvent {
    #[serde(rename = "EventId")]
    event_id: i64,
    #[serde(rename = "EventDate")]
    event_date: Option<chrono::DateTime<Utc>>,
    #[serde(rename = "EventBodyName", default)]
    event_body_name: String,
    #[serde(rename = "EventAgendaFile")]
    event_agenda_file: Option<String>,
    #[serde(rename = "EventInSiteURL")]
    event_in_site_url: Option<String>,
    #[serde(rename = "EventComment")]
    event_comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegistarEventItem {
    #[serde(rename = "EventItemId")]
    event_item_id: Option<i64>,
    #[serde(rename = "EventItemTitle")]
    event_item_title: Option<String>,
    #[serde(rename = "EventItemMatterId")]
    event_item_matter_id: Option<i64>,
    #[serde(rename = "EventItemMatterFile")]
    event_item_matter_file: Option<String>,
    #[serde(rename = "EventItemMatterAttachments", default)]
    event_item_matter_attachments: Vec<LegistarAttachment>,
}

#[derive(Debug, Deserialize)]
struct LegistarAttachment {
    #[serde(rename = "MatterAttachmentName")]
    matter_attachment_name: String,
    #[serde(rename = "MatterAttachmentHyperlink")]
    matter_attachment_hyperlink: String,
}
