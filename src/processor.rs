//! Processor: the LLM pipeline. Dequeues a job, filters versioned
//! attachments, partitions shared vs item-specific context, batches one LLM
//! request per substantive item, and persists results without ever trusting
//! batch response order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::domain::{AgendaItem, Attachment, Meeting};
use crate::errors::{LlmError, StoreError};
use crate::extractor::Extractor;
use crate::ids;
use crate::llm::{
    keyword_overlap, match_responses, needs_context_cache, select_prompt_variant, ContextCacheGuard, LlmClient,
    LlmRequest,
};
use crate::store::Store;
use crate::types::Banana;
use crate::vendors::version_suffix_regex;

const KEYWORD_OVERLAP_THRESHOLD: f64 = 0.3;
const CONTEXT_CACHE_TTL: Duration = Duration::from_secs(3600);

pub struct Processor {
    store: Store,
    extractor: Extractor,
    llm: Arc<LlmClient>,
}

/// What happened to one item during Phase 4/5 persistence; surfaced for
/// the `processing_method` / logging summary, not returned to callers.
enum ItemOutcome {
    Summarized,
    SkippedProcedural,
    AlreadySummarized,
    AppliedFromMatter,
    Failed,
}

impl Processor {
    pub fn new(store: Store, extractor: Extractor, llm: Arc<LlmClient>) -> Self {
        Self { store, extractor, llm }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Processes one `meeting` job. Dispatches to the item-level pipeline
    /// when the meeting has agenda items, or the monolithic packet fallback
    /// when it doesn't.
    pub async fn process_meeting(&self, meeting_id: &str) -> Result<(), ProcessorError> {
        let started = Instant::now();

        let meeting = self
            .store
            .get_meeting(meeting_id)
            .await?
            .ok_or_else(|| ProcessorError::MeetingNotFound(meeting_id.to_string()))?;
        let items = self.store.get_items_for_meeting(meeting_id).await?;

        if items.is_empty() {
            self.process_monolithic(&meeting, started).await
        } else {
            self.process_item_level(&meeting, items, started).await
        }
    }

    async fn process_monolithic(&self, meeting: &Meeting, started: Instant) -> Result<(), ProcessorError> {
        let Some(packet_url) = &meeting.packet_url else {
            return Err(ProcessorError::NoContent(meeting.id.clone()));
        };

        let document = self
            .extractor
            .extract(packet_url)
            .await
            .map_err(|e| ProcessorError::Extraction(packet_url.clone(), e.to_string()))?;

        let prompt = format!(
            "Summarize the following government meeting packet in 2-3 sentences and list up to 5 topics.\n\n{}",
            document.text
        );
        let request = LlmRequest {
            key: meeting.id.clone(),
            prompt,
            cache_ref: None,
            large_item: document.page_count.unwrap_or(0) >= 100,
        };

        let responses = self.llm.batch_summarize(&[request]).await?;
        let Some(response) = responses.into_iter().find(|r| r.key == meeting.id) else {
            return Err(ProcessorError::Llm(LlmError::MissingKey { item_key: meeting.id.clone() }));
        };

        let summary = response.summary.unwrap_or_default();
        let topics = response.topics.unwrap_or_default();

        self.store
            .mark_meeting_processed(
                &meeting.id,
                "monolithic",
                started.elapsed().as_secs_f64(),
                &topics,
                Some(&summary),
            )
            .await?;

        info!(meeting_id = %meeting.id, method = "monolithic", "meeting processed");
        Ok(())
    }

    async fn process_item_level(
        &self,
        meeting: &Meeting,
        items: Vec<AgendaItem>,
        started: Instant,
    ) -> Result<(), ProcessorError> {
        // Phase 1: version filtering, per item.
        let filtered: Vec<(AgendaItem, Vec<Attachment>)> = items
            .into_iter()
            .map(|item| {
                let kept = filter_versions(&item.attachments);
                (item, kept)
            })
            .collect();

        // Phase 2: URL deduplication across items.
        let mut url_item_counts: HashMap<String, u32> = HashMap::new();
        for (_, attachments) in &filtered {
            for url in attachments.iter().map(|a| &a.url).collect::<HashSet<_>>() {
                *url_item_counts.entry(url.clone()).or_insert(0) += 1;
            }
        }
        let shared_urls: HashSet<String> = url_item_counts
            .iter()
            .filter(|(_, count)| **count >= 2)
            .map(|(url, _)| url.clone())
            .collect();

        let mut extracted_text: HashMap<String, String> = HashMap::new();
        for url in url_item_counts.keys() {
            match self.extractor.extract(url).await {
                Ok(doc) => {
                    extracted_text.insert(url.clone(), doc.text);
                }
                Err(e) => {
                    warn!(url, error = %e, "extraction failed for attachment, item proceeds without it");
                }
            }
        }

        // Phase 3: context partitioning.
        let shared_context: String = shared_urls
            .iter()
            .filter_map(|u| extracted_text.get(u))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut cache_guard: Option<ContextCacheGuard> = None;
        let cache_ref = if !shared_context.is_empty() && needs_context_cache(&shared_context) {
            let handle = self.llm.create_context_cache(&shared_context, CONTEXT_CACHE_TTL).await?;
            cache_guard = Some(ContextCacheGuard::new(self.llm.clone(), handle.clone()));
            Some(handle)
        } else {
            None
        };

        let result = self
            .run_batch_and_persist(meeting, filtered, &extracted_text, &shared_urls, &shared_context, cache_ref.as_deref())
            .await;

        drop(cache_guard);
        let (item_count, topics) = result?;

        self.store
            .mark_meeting_processed(
                &meeting.id,
                &format!("item_level_{item_count}_items"),
                started.elapsed().as_secs_f64(),
                &topics,
                None,
            )
            .await?;

        Ok(())
    }

    async fn run_batch_and_persist(
        &self,
        meeting: &Meeting,
        filtered: Vec<(AgendaItem, Vec<Attachment>)>,
        extracted_text: &HashMap<String, String>,
        shared_urls: &HashSet<String>,
        shared_context: &str,
        cache_ref: Option<&str>,
    ) -> Result<(usize, Vec<String>), ProcessorError> {
        let mut requests = Vec::new();
        let mut outcomes: HashMap<String, ItemOutcome> = HashMap::new();
        let mut items_by_key: HashMap<String, &AgendaItem> = HashMap::new();
        // Seeded from the pre-fetch snapshot, then updated as this run writes
        // new summaries/topics — `aggregate_topics` must see this run's
        // results, not just what was already on disk before we started.
        let mut topics_by_item: HashMap<String, Vec<String>> = filtered
            .iter()
            .filter_map(|(item, _)| item.topics.clone().map(|t| (item.id.clone(), t)))
            .collect();

        for (item, attachments) in &filtered {
            // Item filters: procedural, already summarized, matter already
            // canonical — any one skips the LLM call entirely.
            if item.is_procedural() {
                outcomes.insert(item.id.clone(), ItemOutcome::SkippedProcedural);
                continue;
            }
            if item.summary.is_some() {
                outcomes.insert(item.id.clone(), ItemOutcome::AlreadySummarized);
                continue;
            }
            let matter_id = matter_id_for(&meeting.banana, item);
            if let Some((summary, topics)) = self.store.get_matter_canonical_summary(&matter_id).await? {
                self.store.apply_canonical_summary(&matter_id, &summary, &topics).await?;
                topics_by_item.insert(item.id.clone(), topics);
                outcomes.insert(item.id.clone(), ItemOutcome::AppliedFromMatter);
                continue;
            }

            let item_specific_text: String = attachments
                .iter()
                .filter(|a| !shared_urls.contains(&a.url))
                .filter_map(|a| extracted_text.get(&a.url))
                .cloned()
                .collect::<Vec<_>>()
                .join("\n\n");

            let total_pages: u32 = attachments.iter().filter_map(|a| a.pages).sum();
            let variant = select_prompt_variant(total_pages);

            let prompt = if cache_ref.is_some() {
                format!(
                    "[{variant} prompt] Item: {}\n\n{item_specific_text}\n\n(shared meeting context attached via cache)",
                    item.title
                )
            } else if !shared_context.is_empty() {
                format!(
                    "[{variant} prompt] Item: {}\n\nShared context:\n{shared_context}\n\nItem documents:\n{item_specific_text}",
                    item.title
                )
            } else {
                format!("[{variant} prompt] Item: {}\n\n{item_specific_text}", item.title)
            };

            items_by_key.insert(item.id.clone(), item);
            requests.push(LlmRequest {
                key: item.id.clone(),
                prompt,
                cache_ref: cache_ref.map(|s| s.to_string()),
                large_item: total_pages >= 100,
            });
        }

        if requests.is_empty() {
            let topics = aggregate_topics(&topics_by_item);
            log_outcomes(&meeting.id, &outcomes);
            return Ok((filtered.len(), topics));
        }

        let responses = self.llm.batch_summarize(&requests).await?;
        let matched = match_responses(&requests, responses);

        for (key, result) in matched {
            let Some(item) = items_by_key.get(&key) else { continue };
            match result {
                Ok(response) => {
                    let summary = response.summary.unwrap_or_default();
                    let overlap = keyword_overlap(&item.title, &summary);
                    if overlap < KEYWORD_OVERLAP_THRESHOLD {
                        warn!(item_id = %key, overlap, "low keyword overlap, response may be mismatched, no remap performed, storing as-is for manual review");
                    }
                    let topics = response.topics.unwrap_or_default();

                    self.store.update_item_summary(&key, &summary, &topics).await?;

                    let matter_id = matter_id_for(&meeting.banana, item);
                    self.store.apply_canonical_summary(&matter_id, &summary, &topics).await?;

                    topics_by_item.insert(key.clone(), topics);
                    outcomes.insert(key, ItemOutcome::Summarized);
                }
                Err(e) => {
                    warn!(item_id = %key, error = %e, "item summarization failed, rest of batch still applied");
                    outcomes.insert(key, ItemOutcome::Failed);
                }
            }
        }

        let topics = aggregate_topics(&topics_by_item);
        log_outcomes(&meeting.id, &outcomes);
        Ok((filtered.len(), topics))
    }
}

fn log_outcomes(meeting_id: &str, outcomes: &HashMap<String, ItemOutcome>) {
    let mut summarized = 0;
    let mut procedural = 0;
    let mut already_summarized = 0;
    let mut from_matter = 0;
    let mut failed = 0;

    for outcome in outcomes.values() {
        match outcome {
            ItemOutcome::Summarized => summarized += 1,
            ItemOutcome::SkippedProcedural => procedural += 1,
            ItemOutcome::AlreadySummarized => already_summarized += 1,
            ItemOutcome::AppliedFromMatter => from_matter += 1,
            ItemOutcome::Failed => failed += 1,
        }
    }

    info!(
        meeting_id,
        summarized, procedural, already_summarized, from_matter, failed, "item processing outcomes"
    );
}

/// Keeps only the highest `VerN` per base name; attachments with no
/// version suffix are always kept.
fn filter_versions(attachments: &[Attachment]) -> Vec<Attachment> {
    let re = version_suffix_regex();
    let mut best: HashMap<String, (u32, Attachment)> = HashMap::new();
    let mut unversioned = Vec::new();

    for attachment in attachments {
        if let Some(caps) = re.captures(&attachment.name) {
            let base = caps[1].to_string();
            let n: u32 = caps[2].parse().unwrap_or(0);
            match best.get(&base) {
                Some((existing_n, _)) if *existing_n >= n => {}
                _ => {
                    best.insert(base, (n, attachment.clone()));
                }
            }
        } else {
            unversioned.push(attachment.clone());
        }
    }

    let mut result: Vec<Attachment> = best.into_values().map(|(_, a)| a).collect();
    result.extend(unversioned);
    result
}

/// Meeting-level topic aggregation: frequency count across all items'
/// current-run topics, sorted descending, ties broken by first occurrence.
fn aggregate_topics(topics_by_item: &HashMap<String, Vec<String>>) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for topics in topics_by_item.values() {
        for topic in topics {
            if !counts.contains_key(topic) {
                order.push(topic.clone());
            }
            *counts.entry(topic.clone()).or_insert(0) += 1;
        }
    }

    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
}

/// `item.matter_id` already holds the computed hash once the item has gone
/// through `StoreMeetingFromSync` — only recompute it (via the same
/// fallback hierarchy, minus the now-unavailable vendor id) as a defensive
/// fallback for items read before that rewrite ever ran.
fn matter_id_for(banana: &Banana, item: &AgendaItem) -> String {
    item.matter_id.clone().unwrap_or_else(|| {
        let identity = ids::matter_identity(item.matter_file.as_deref(), None, &item.title);
        ids::matter_id(banana, identity)
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("meeting {0} not found")]
    MeetingNotFound(String),

    #[error("meeting {0} has no items and no packet to process")]
    NoContent(String),

    #[error("failed to extract {0}: {1}")]
    Extraction(String, String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProcessorError {
    /// Whether this failure is worth retrying through the job queue's ladder
    /// (§4.4/§7): a not-found meeting, missing content, or extraction
    /// failure won't resolve itself on retry, so those skip straight to
    /// dead-letter; LLM/store errors delegate to their own classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessorError::MeetingNotFound(_) => false,
            ProcessorError::NoContent(_) => false,
            ProcessorError::Extraction(_, _) => false,
            ProcessorError::Llm(e) => e.is_retryable(),
            ProcessorError::Store(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str) -> Attachment {
        Attachment::new(format!("https://example.com/{name}"), name.to_string(), None)
    }

    #[test]
    fn filter_versions_keeps_only_highest_n() {
        let attachments = vec![attachment("Legislative Digest Ver1"), attachment("Legislative Digest Ver2"), attachment("Parcel Tables")];
        let kept = filter_versions(&attachments);
        let names: Vec<&str> = kept.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"Legislative Digest Ver2"));
        assert!(!names.contains(&"Legislative Digest Ver1"));
        assert!(names.contains(&"Parcel Tables"));
    }

    #[test]
    fn aggregate_topics_sorts_by_frequency() {
        let topics_by_item: HashMap<String, Vec<String>> = [
            ("a".to_string(), vec!["housing".to_string(), "zoning".to_string()]),
            ("b".to_string(), vec!["housing".to_string()]),
        ]
        .into_iter()
        .collect();

        let topics = aggregate_topics(&topics_by_item);
        assert_eq!(topics[0], "housing");
    }
}
