//! CivicClerk adapter: public meeting list is an HTML table served from the
//! city's CivicClerk portal. Item-level agendas are not exposed publicly.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tracing::info;

use crate::domain::{Meeting, ProcessingStatus};
use crate::errors::VendorError;
use crate::ids;
use crate::types::{Banana, Vendor};

use super::{absolutize, scrape_meeting_table, within_date_window, FetchedMeeting, VendorAdapter};

const DEFAULT_LOOKBACK_DAYS: i64 = 7;
const DEFAULT_HORIZON_DAYS: i64 = 14;

pub struct CivicClerkAdapter {
    client: reqwest::Client,
}

impl CivicClerkAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client should build"),
        }
    }

    fn base_url(slug: &str) -> String {
        format!("https://{slug}.civicclerk.com/Portal/MeetingTypeList.aspx")
    }
}

impl Default for CivicClerkAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VendorAdapter for CivicClerkAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Civicclerk
    }

    async fn fetch_meetings(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError> {
        let base = Self::base_url(slug);
        let html = self
            .client
            .get(&base)
            .send()
            .await
            .map_err(|e| VendorError::Http {
                vendor: "civicclerk".into(),
                city_slug: slug.into(),
                source: e,
            })?
            .text()
            .await
            .map_err(|e| VendorError::Http {
                vendor: "civicclerk".into(),
                city_slug: slug.into(),
                source: e,
            })?;

        let rows = scrape_meeting_table(
            &html,
            "div.meeting-row",
            "span.meeting-title",
            "span.meeting-date",
            "a.meeting-packet",
        );

        let now = Utc::now();
        let mut fetched = Vec::new();

        for row in rows.into_iter().take(max_count) {
            let Some(date) = parse_civicclerk_date(&row.date_text) else {
                continue;
            };
            if !within_date_window(date, now, DEFAULT_LOOKBACK_DAYS, DEFAULT_HORIZON_DAYS) {
                continue;
            }

            let meeting_id = ids::meeting_id(banana, slug, &date.to_rfc3339(), &row.title);
            let mut meeting = Meeting::new(meeting_id, banana.clone(), row.title, date);
            meeting.packet_url = row
                .packet_href
                .and_then(|href| absolutize(&base, &href).ok());
            meeting.processing_status = ProcessingStatus::Pending;

            fetched.push(FetchedMeeting { meeting, items: Vec::new() });
        }

        info!(banana = %banana, method = "html_table", meeting_count = fetched.len(), "civicclerk fetch complete");
        Ok(fetched)
    }
}

fn parse_civicclerk_date(text: &str) -> Option<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(text.trim(), "%b %d, %Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_abbreviated_month_dates() {
        let parsed = parse_civicclerk_date("Nov 3, 2025").unwrap();
        assert_eq!(parsed.date_naive().to_string(), "2025-11-03");
    }
}
