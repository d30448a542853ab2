//! Vendor adapter layer: one `VendorAdapter` implementation per government
//! meeting-management platform. Callers only ever see the trait object —
//! strategy selection (API-first with HTML fallback, HTML-table parsing, or
//! a bespoke per-city scraper) is entirely internal to each adapter and is
//! logged so the chosen method is never silent.

pub mod civicclerk;
pub mod civicplus;
pub mod custom;
pub mod granicus;
pub mod legistar;
pub mod novusagenda;
pub mod primegov;

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;

use crate::domain::{AgendaItem, Meeting};
use crate::errors::VendorError;
use crate::types::{Banana, Vendor};

/// A meeting together with the agenda items the adapter was able to extract
/// from it. `items` is empty for vendors that only expose a packet PDF
/// (monolithic processing fallback).
#[derive(Debug, Clone)]
pub struct FetchedMeeting {
    pub meeting: Meeting,
    pub items: Vec<AgendaItem>,
}

#[async_trait]
pub trait VendorAdapter {
    fn vendor(&self) -> Vendor;

    /// Fetch up to `max_count` meetings for the given city, already
    /// filtered to the configured date window. Never returns an empty `Ok`
    /// to mean "failed" — use `Err(VendorError)` for that; an empty vector
    /// is only ever "nothing currently scheduled".
    async fn fetch_meetings(
        &self,
        banana: &Banana,
        slug: &str,
        max_count: usize,
    ) -> Result<Vec<FetchedMeeting>, VendorError>;
}

fn procedural_patterns() -> &'static [&'static str] {
    crate::domain::item::PROCEDURAL_ITEM_PATTERNS
}

/// Compiled once: matches agenda item titles with no substantive content.
pub fn procedural_item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let joined = procedural_patterns().join("|");
        Regex::new(&joined).expect("procedural item patterns must compile")
    })
}

/// Matches a trailing `VerN` suffix, e.g. "Staff Report Ver2" -> ("Staff
/// Report", 2). Used by the processor's version-filtering phase.
pub fn version_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.*?)\s*Ver(\d+)\b").expect("version suffix regex must compile"))
}

/// `[now - lookback_days, now + horizon_days]`, with both endpoints' time
/// component zeroed for day-granularity comparison.
pub fn within_date_window(
    date: DateTime<Utc>,
    now: DateTime<Utc>,
    lookback_days: i64,
    horizon_days: i64,
) -> bool {
    let start = (now - ChronoDuration::days(lookback_days))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    let end = (now + ChronoDuration::days(horizon_days))
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .unwrap()
        .and_utc();
    date >= start && date <= end
}

/// Normalizes a possibly-relative attachment URL against the vendor's base
/// URL.
pub fn absolutize(base: &str, maybe_relative: &str) -> Result<String, VendorError> {
    let base_url = url::Url::parse(base).map_err(|e| VendorError::Parsing {
        vendor: "unknown".into(),
        city_slug: "unknown".into(),
        message: format!("invalid base URL {base}: {e}"),
    })?;
    base_url
        .join(maybe_relative)
        .map(|u| u.to_string())
        .map_err(|e| VendorError::Parsing {
            vendor: "unknown".into(),
            city_slug: "unknown".into(),
            message: format!("could not resolve attachment URL {maybe_relative}: {e}"),
        })
}

/// One row scraped from a vendor's HTML meeting-list table.
pub struct ScrapedMeetingRow {
    pub title: String,
    pub date_text: String,
    pub packet_href: Option<String>,
}

/// Shared HTML-table scraping used by the vendors that expose meetings only
/// as an HTML table with a packet-PDF link per row (Granicus, NovusAgenda's
/// MeetingView, CivicClerk, CivicPlus) — no item-level agenda, so these
/// adapters only ever populate `packet_url`, never `agenda_items`.
pub fn scrape_meeting_table(
    html: &str,
    row_selector: &str,
    title_selector: &str,
    date_selector: &str,
    link_selector: &str,
) -> Vec<ScrapedMeetingRow> {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let Ok(row_sel) = Selector::parse(row_selector) else {
        return Vec::new();
    };
    let Ok(title_sel) = Selector::parse(title_selector) else {
        return Vec::new();
    };
    let Ok(date_sel) = Selector::parse(date_selector) else {
        return Vec::new();
    };
    let Ok(link_sel) = Selector::parse(link_selector) else {
        return Vec::new();
    };

    document
        .select(&row_sel)
        .filter_map(|row| {
            let title = row.select(&title_sel).next()?.text().collect::<String>().trim().to_string();
            let date_text = row.select(&date_sel).next()?.text().collect::<String>().trim().to_string();
            let packet_href = row
                .select(&link_sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .map(|s| s.to_string());

            if title.is_empty() || date_text.is_empty() {
                return None;
            }

            Some(ScrapedMeetingRow {
                title,
                date_text,
                packet_href,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedural_regex_matches_documented_examples() {
        let re = procedural_item_regex();
        for title in [
            "Roll Call",
            "Approval of Minutes",
            "Approval of the Minutes",
            "Pledge of Allegiance",
            "Invocation",
            "Adjournment",
        ] {
            assert!(re.is_match(title), "expected {title} to match");
        }
        assert!(!re.is_match("Ordinance to Rezone 123 Main St"));
    }

    #[test]
    fn version_suffix_regex_extracts_base_and_number() {
        let re = version_suffix_regex();
        let caps = re.captures("Staff Report Ver2").unwrap();
        assert_eq!(&caps[1], "Staff Report");
        assert_eq!(&caps[2], "2");

        assert!(re.captures("Parcel Tables").is_none());
    }

    #[test]
    fn date_window_respects_lookback_and_horizon() {
        let now = Utc::now();
        assert!(within_date_window(now, now, 7, 14));
        assert!(within_date_window(now - ChronoDuration::days(7), now, 7, 14));
        assert!(!within_date_window(now - ChronoDuration::days(8), now, 7, 14));
        assert!(within_date_window(now + ChronoDuration::days(14), now, 7, 14));
        assert!(!within_date_window(now + ChronoDuration::days(15), now, 7, 14));
    }

    #[test]
    fn absolutize_resolves_relative_paths() {
        let resolved = absolutize("https://nashville.legistar.com/", "/View.ashx?M=F&ID=123").unwrap();
        assert_eq!(resolved, "https://nashville.legistar.com/View.ashx?M=F&ID=123");
    }

    #[test]
    fn scrape_meeting_table_extracts_rows() {
        let html = r#"
            <table>
              <tr class="meeting-row">
                <td class="title">City Council</td>
                <td class="date">11/03/2025</td>
                <td><a class="packet" href="/packet.pdf">Packet</a></td>
              </tr>
            </table>
        "#;

        let rows = scrape_meeting_table(html, "tr.meeting-row", "td.title", "td.date", "a.packet");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "City Council");
        assert_eq!(rows[0].date_text, "11/03/2025");
        assert_eq!(rows[0].packet_href.as_deref(), Some("/packet.pdf"));
    }
}
