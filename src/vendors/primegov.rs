//! PrimeGov adapter: JSON API, item-level agendas keyed by a vendor UUID
//! (`matter_id`) rather than a clerk-assigned `matter_file`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use crate::domain::{AgendaItem, Attachment, Meeting, ProcessingStatus};
use crate::errors::VendorError;
use crate::ids;
use crate::types::{Banana, Vendor};

use super::{absolutize, within_date_window, FetchedMeeting, VendorAdapter};

const DEFAULT_LOOKBACK_DAYS: i64 = 7;
const DEFAULT_HORIZON_DAYS: i64 = 14;

pub struct PrimeGovAdapter {
    client: reqwest::Client,
}

impl PrimeGovAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client should build"),
        }
    }

    fn base_url(slug: &str) -> String {
        format!("https://{slug}.primegov.com/api/v2")
    }
}

impl Default for PrimeGovAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VendorAdapter for PrimeGovAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Primegov
    }

    async fn fetch_meetings(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError> {
        let url = format!("{}/PublicPortal/ListUpcomingMeetings?max={}", Self::base_url(slug), max_count);
        let response = self.client.get(&url).send().await.map_err(|e| VendorError::Http {
            vendor: "primegov".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        if !response.status().is_success() {
            return Err(VendorError::Parsing {
                vendor: "primegov".into(),
                city_slug: slug.into(),
                message: format!("ListUpcomingMeetings returned {}", response.status()),
            });
        }

        let raw_meetings: Vec<PrimeGovMeeting> = response.json().await.map_err(|e| VendorError::Http {
            vendor: "primegov".into(),
            city_slug: slug.into(),
            source: e,
        })?;

        let now = Utc::now();
        let mut fetched = Vec::new();

        for raw in raw_meetings {
            if !within_date_window(raw.date, now, DEFAULT_LOOKBACK_DAYS, DEFAULT_HORIZON_DAYS) {
                continue;
            }

            let meeting_id = ids::meeting_id(banana, &raw.id.to_string(), &raw.date.to_rfc3339(), &raw.title);
            let mut meeting = Meeting::new(meeting_id.clone(), banana.clone(), raw.title.clone(), raw.date);
            meeting.agenda_url = raw.agenda_html_url.clone();
            meeting.packet_url = raw.document_url.clone();
            meeting.processing_status = ProcessingStatus::Pending;

            let items = raw
                .agenda_items
                .into_iter()
                .enumerate()
                .map(|(seq, item)| {
                    let suffix = item.id.clone().unwrap_or_else(|| seq.to_string());
                    let attachments: Vec<Attachment> = item
                        .attachments
                        .into_iter()
                        .filter_map(|a| {
                            let url = absolutize(&Self::base_url(slug), &a.url).ok()?;
                            Some(Attachment::new(url, a.name, a.content_type))
                        })
                        .collect();
                    let urls: Vec<String> = attachments.iter().map(|a| a.url.clone()).collect();

                    AgendaItem {
                        id: ids::item_id(&meeting_id, &suffix),
                        meeting_id: meeting_id.clone(),
                        title: item.title,
                        sequence: seq as u32,
                        attachment_hash: ids::attachment_hash(&urls),
                        attachments,
                        // PrimeGov exposes only a vendor UUID, never a clerk file number.
                        matter_id: item.matter_uuid,
                        matter_file: None,
                        sponsors: None,
                        summary: None,
                        topics: None,
                    }
                })
                .collect();

            fetched.push(FetchedMeeting { meeting, items });
        }

        info!(banana = %banana, method = "api", meeting_count = fetched.len(), "primegov fetch complete");
        Ok(fetched)
    }
}

#[derive(Debug, Deserialize)]
struct PrimeGovMeeting {
    id: i64,
    title: String,
    date: chrono::DateTime<Utc>,
    #[serde(rename = "agendaHtmlUrl")]
    agenda_html_url: Option<String>,
    #[serde(rename = "documentUrl")]
    document_url: Option<String>,
    #[serde(default, rename = "agendaItems")]
    agenda_items: Vec<PrimeGovItem>,
}

#[derive(Debug, Deserialize)]
struct PrimeGovItem {
    id: Option<String>,
    title: String,
    #[serde(rename = "matterUuid")]
    matter_uuid: Option<String>,
    #[serde(default)]
    attachments: Vec<PrimeGovAttachment>,
}

#[derive(Debug, Deserialize)]
struct PrimeGovAttachment {
    name: String,
    url: String,
    #[serde(rename = "contentType")]
    content_type: Option<String>,
}
