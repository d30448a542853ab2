//! PDF/HTML extractor: turns a URL into normalized plain text plus a page
//! count. Purely mechanical — no summarization, no topic inference, no
//! knowledge of agenda items or matters.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::ExtractionError;
use crate::wrappers::DocumentByteCache;

/// Result of extracting one document. `page_count` is `None` for HTML
/// sources, where "pages" has no meaning.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: Option<u32>,
}

pub struct Extractor {
    client: reqwest::Client,
    cache: Arc<DocumentByteCache>,
}

impl Extractor {
    pub fn new(cache: Arc<DocumentByteCache>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client should build"),
            cache,
        }
    }

    /// Downloads (or reuses a cached copy of) the document at `url`,
    /// detects PDF vs HTML by content-type first and a `%PDF-` magic-byte
    /// sniff as fallback, and returns normalized text.
    pub async fn extract(&self, url: &str) -> Result<ExtractedDocument, ExtractionError> {
        let (bytes, content_type) = self.fetch_bytes(url).await?;

        if bytes.is_empty() {
            return Err(ExtractionError::Empty { url: url.to_string() });
        }

        if is_pdf(&content_type, &bytes) {
            extract_pdf(url, &bytes)
        } else if is_html(&content_type) {
            Ok(extract_html(&bytes))
        } else {
            Err(ExtractionError::UnsupportedContentType {
                url: url.to_string(),
                content_type,
            })
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, String), ExtractionError> {
        if let Some(cached) = self.cache.get(url).await {
            return Ok((cached, String::new()));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtractionError::Download {
                url: url.to_string(),
                source: e,
            })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExtractionError::Download {
                url: url.to_string(),
                source: e,
            })?
            .to_vec();

        self.cache.insert(url, bytes.clone()).await;
        Ok((bytes, content_type))
    }
}

fn is_pdf(content_type: &str, bytes: &[u8]) -> bool {
    content_type.contains("application/pdf") || bytes.starts_with(b"%PDF-")
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.is_empty()
}

fn extract_pdf(url: &str, bytes: &[u8]) -> Result<ExtractedDocument, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let page_count = count_pdf_pages(bytes);
    let normalized = normalize_text(&text);

    if normalized.is_empty() {
        return Err(ExtractionError::Empty { url: url.to_string() });
    }

    Ok(ExtractedDocument {
        text: normalized,
        page_count: Some(page_count),
    })
}

fn extract_html(bytes: &[u8]) -> ExtractedDocument {
    use scraper::{Html, Selector};

    let raw = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&raw);
    let body_selector = Selector::parse("body").expect("static selector must compile");

    let text = document
        .select(&body_selector)
        .next()
        .map(|body| body.text().collect::<Vec<_>>().join(" "))
        .unwrap_or_else(|| document.root_element().text().collect::<Vec<_>>().join(" "));

    ExtractedDocument {
        text: normalize_text(&text),
        page_count: None,
    }
}

/// Collapses consecutive whitespace without altering word content.
fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn count_pdf_pages(bytes: &[u8]) -> u32 {
    let needle = b"/Type/Page";
    let needle_spaced = b"/Type /Page";
    let haystack = bytes;
    let mut count = 0u32;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle || (i + needle_spaced.len() <= haystack.len() && &haystack[i..i + needle_spaced.len()] == needle_spaced) {
            count += 1;
        }
        i += 1;
    }
    count.max(1)
}

/// Logs the chosen extraction path once per call; extraction errors for one
/// URL never abort processing of other items in the same meeting.
pub fn log_extraction_outcome(url: &str, result: &Result<ExtractedDocument, ExtractionError>) {
    match result {
        Ok(doc) => info!(url, bytes = doc.text.len(), pages = ?doc.page_count, "extraction succeeded"),
        Err(e) => warn!(url, error = %e, "extraction failed, continuing with remaining items"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("a\n\n  b\t c"), "a b c");
    }

    #[test]
    fn is_pdf_detects_by_content_type_or_magic_bytes() {
        assert!(is_pdf("application/pdf", b""));
        assert!(is_pdf("", b"%PDF-1.4"));
        assert!(!is_pdf("text/html", b"<html></html>"));
    }

    #[test]
    fn is_html_defaults_when_content_type_missing() {
        assert!(is_html(""));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(!is_html("application/pdf"));
    }

    #[test]
    fn extract_html_strips_tags() {
        let doc = extract_html(b"<html><body><h1>Agenda</h1><p>Item one</p></body></html>");
        assert!(doc.text.contains("Agenda"));
        assert!(doc.text.contains("Item one"));
        assert!(doc.page_count.is_none());
    }

    #[test]
    fn count_pdf_pages_finds_page_markers() {
        let synthetic = b"/Type/Page /Type/Page /Type/Catalog";
        assert_eq!(count_pdf_pages(synthetic), 2);
    }
}
