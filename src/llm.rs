//! LLM client: an abstracted batch-summarization capability plus an
//! explicit context-cache primitive. Mirrors the shape of the teacher's
//! `OpenAIEmbeddingProvider` (one client built once, bearer auth, explicit
//! timeout) but the operation is "batch-summarize" rather than "embed".

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::errors::LlmError;

/// Tokens are approximated at 4 chars/token; precise enough to decide
/// whether a context needs an explicit cache.
const CACHE_THRESHOLD_TOKENS: usize = 1024;
const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

/// One item's summarization request, keyed by `item_id` so batch responses
/// can be matched back without relying on response order.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub key: String,
    pub prompt: String,
    pub cache_ref: Option<String>,
    pub large_item: bool,
}

/// A structured `{summary, topics}` response, or an error for that one key.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    pub key: String,
    pub summary: Option<String>,
    pub topics: Option<Vec<String>>,
    pub error: Option<String>,
}

pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl LlmClient {
    pub fn new(api_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .expect("reqwest client should build"),
            api_key,
            api_base,
        }
    }

    /// Submits one batch call carrying `[{key, prompt, response_schema}]`
    /// and returns responses keyed the same way, in whatever order the
    /// provider returns them.
    pub async fn batch_summarize(&self, requests: &[LlmRequest]) -> Result<Vec<LlmResponse>, LlmError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Serialize)]
        struct BatchEntry<'a> {
            key: &'a str,
            prompt: &'a str,
            cache_ref: Option<&'a str>,
            response_schema: JsonValue,
        }

        #[derive(Serialize)]
        struct BatchRequest<'a> {
            requests: Vec<BatchEntry<'a>>,
        }

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string"},
                "topics": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["summary", "topics"],
        });

        let body = BatchRequest {
            requests: requests
                .iter()
                .map(|r| BatchEntry {
                    key: &r.key,
                    prompt: &r.prompt,
                    cache_ref: r.cache_ref.as_deref(),
                    response_schema: schema.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/batch/summarize", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        #[derive(Deserialize)]
        struct BatchResponse {
            responses: Vec<LlmResponse>,
        }

        let parsed: BatchResponse = response.json().await?;
        Ok(parsed.responses)
    }

    /// Creates an explicit context cache for shared meeting context, with a
    /// 1-hour TTL. Returns a handle string referenced from item requests'
    /// `cache_ref`.
    pub async fn create_context_cache(&self, content: &str, ttl: Duration) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct CacheCreateRequest<'a> {
            content: &'a str,
            ttl_seconds: u64,
        }
        #[derive(Deserialize)]
        struct CacheCreateResponse {
            handle: String,
        }

        let response = self
            .client
            .post(format!("{}/cache", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&CacheCreateRequest {
                content,
                ttl_seconds: ttl.as_secs(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        let parsed: CacheCreateResponse = response.json().await?;
        Ok(parsed.handle)
    }

    pub async fn release_context_cache(&self, handle: &str) -> Result<(), LlmError> {
        let response = self
            .client
            .delete(format!("{}/cache/{}", self.api_base, handle))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(handle, status = %response.status(), "context cache release returned non-success, leaking server-side until TTL expiry");
        }
        Ok(())
    }
}

/// Guaranteed-on-all-exit-paths cache release: `Drop` fires the delete even
/// if the processor returns early on an error, mirroring the teacher's
/// `PerfTimer` guaranteed-cleanup pattern.
pub struct ContextCacheGuard {
    client: std::sync::Arc<LlmClient>,
    handle: Option<String>,
}

impl ContextCacheGuard {
    pub fn new(client: std::sync::Arc<LlmClient>, handle: String) -> Self {
        Self { client, handle: Some(handle) }
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }
}

impl Drop for ContextCacheGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let client = self.client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.release_context_cache(&handle).await {
                    warn!(handle, error = %e, "failed to release context cache on drop");
                }
            });
        }
    }
}

/// Matches batch responses back to their originating keys. Any key present
/// in `requests` but absent from `responses` is reported as an
/// `UnresolvedRemap` so the caller can mark just that item failed without
/// discarding the rest of the batch.
pub fn match_responses(
    requests: &[LlmRequest],
    responses: Vec<LlmResponse>,
) -> HashMap<String, Result<LlmResponse, LlmError>> {
    let mut by_key: HashMap<String, LlmResponse> = responses.into_iter().map(|r| (r.key.clone(), r)).collect();
    let mut out = HashMap::new();

    for req in requests {
        match by_key.remove(&req.key) {
            Some(resp) if resp.error.is_none() => {
                out.insert(req.key.clone(), Ok(resp));
            }
            Some(resp) => {
                out.insert(
                    req.key.clone(),
                    Err(LlmError::Provider {
                        status: 0,
                        body: resp.error.unwrap_or_default(),
                    }),
                );
            }
            None => {
                out.insert(req.key.clone(), Err(LlmError::UnresolvedRemap { item_key: req.key.clone() }));
            }
        }
    }

    if !by_key.is_empty() {
        info!(orphaned = by_key.len(), "batch returned keys with no matching request, ignoring");
    }

    out
}

/// Whether the concatenated shared-context text should be promoted to an
/// explicit LLM context cache rather than inlined in every item prompt.
pub fn needs_context_cache(shared_context: &str) -> bool {
    estimate_tokens(shared_context) >= CACHE_THRESHOLD_TOKENS
}

/// Chooses between the `large-item` and `standard` prompt variants based on
/// the item's total attached page count.
pub fn select_prompt_variant(total_pages: u32) -> &'static str {
    if total_pages >= 100 {
        "large-item"
    } else {
        "standard"
    }
}

/// Word-overlap defense against observed rare batch-service key scrambling:
/// the fraction of the item title's significant words that also appear in
/// the candidate summary.
pub fn keyword_overlap(title: &str, summary: &str) -> f64 {
    let title_words: Vec<String> = title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 3)
        .collect();
    if title_words.is_empty() {
        return 1.0;
    }

    let summary_lower = summary.to_lowercase();
    let matches = title_words.iter().filter(|w| summary_lower.contains(w.as_str())).count();
    matches as f64 / title_words.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_context_cache_respects_threshold() {
        assert!(!needs_context_cache(&"word ".repeat(100)));
        assert!(needs_context_cache(&"word ".repeat(2000)));
    }

    #[test]
    fn select_prompt_variant_switches_at_100_pages() {
        assert_eq!(select_prompt_variant(99), "standard");
        assert_eq!(select_prompt_variant(100), "large-item");
    }

    #[test]
    fn keyword_overlap_detects_mismatch() {
        let high = keyword_overlap("Ordinance Rezoning Parcel", "This ordinance rezones the parcel for mixed use");
        let low = keyword_overlap("Ordinance Rezoning Parcel", "Minutes of the prior meeting were approved");
        assert!(high > low);
    }

    #[test]
    fn match_responses_reports_missing_keys_without_losing_others() {
        let requests = vec![
            LlmRequest { key: "a".into(), prompt: "p".into(), cache_ref: None, large_item: false },
            LlmRequest { key: "b".into(), prompt: "p".into(), cache_ref: None, large_item: false },
        ];
        let responses = vec![LlmResponse {
            key: "a".into(),
            summary: Some("s".into()),
            topics: Some(vec!["t".into()]),
            error: None,
        }];

        let matched = match_responses(&requests, responses);
        assert!(matched.get("a").unwrap().is_ok());
        assert!(matches!(matched.get("b").unwrap(), Err(LlmError::UnresolvedRemap { .. })));
    }
}
