//! Unified store: the only module that touches SQL directly. Repositories
//! never commit — callers own the transaction boundary (`sqlx::Transaction`
//! is threaded through explicitly rather than hidden behind a `with_tx`
//! closure, matching how callers in the teacher's `job_worker` drive
//! `SupabaseRepositoryStore` against a pool they own).

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use tracing::{instrument, warn};

use crate::domain::{
    AgendaItem, City, JobStatus, JobType, MatterStatus, Meeting, MeetingStatus, ProcessingStatus, QueueJob,
};
use crate::domain::queue::{meeting_priority, RETRY_PRIORITY_PENALTY};
use crate::errors::StoreError;
use crate::ids;
use crate::types::Banana;

const RETRY_LIMIT: i32 = 3;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

/// Outcome of a `StoreMeetingFromSync` call, surfaced for logging.
pub struct SyncOutcome {
    pub meeting_id: String,
    pub new_matters: u32,
    pub duplicate_matters: u32,
    pub enqueued: bool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// One transaction per meeting: upsert meeting, items, matters and
    /// appearances, then enqueue a processing job if work remains.
    #[instrument(skip(self, meeting, items))]
    pub async fn store_meeting_from_sync(
        &self,
        meeting: &Meeting,
        items: &[AgendaItem],
    ) -> Result<SyncOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        upsert_meeting(&mut tx, meeting).await?;

        // Matter hashes are computed up front so `agenda_items.matter_id`
        // stores the same `matters.id` value the row it references uses,
        // not the vendor's raw id — `item.matter_id` only ever carries the
        // latter (e.g. Legistar's integer EventItemMatterId).
        let matter_ids: HashMap<&str, String> = items
            .iter()
            .filter(|item| !item.is_procedural())
            .map(|item| {
                let identity = ids::matter_identity(item.matter_file.as_deref(), item.matter_id.as_deref(), &item.title);
                (item.id.as_str(), ids::matter_id(&meeting.banana, identity))
            })
            .collect();

        for item in items {
            upsert_agenda_item(&mut tx, item, matter_ids.get(item.id.as_str()).map(String::as_str)).await?;
        }

        let mut new_matters = 0;
        let mut duplicate_matters = 0;
        for item in items {
            let Some(matter_id) = matter_ids.get(item.id.as_str()) else { continue };
            let is_new = upsert_matter_and_appearance(&mut tx, matter_id, item, meeting).await?;
            if is_new {
                new_matters += 1;
            } else {
                duplicate_matters += 1;
            }
        }

        let enqueued = if !items.is_empty() {
            enqueue_within_tx(
                &mut tx,
                &format!("items://{}", meeting.id),
                JobType::Meeting,
                serde_json::json!({ "meeting_id": meeting.id }),
                meeting_priority(100, (meeting.date - Utc::now()).num_days()),
                Some(&meeting.id),
                Some(&meeting.banana),
                false,
            )
            .await?
        } else if let Some(packet_url) = &meeting.packet_url {
            enqueue_within_tx(
                &mut tx,
                packet_url,
                JobType::Meeting,
                serde_json::json!({ "meeting_id": meeting.id }),
                meeting_priority(100, (meeting.date - Utc::now()).num_days()),
                Some(&meeting.id),
                Some(&meeting.banana),
                false,
            )
            .await?
        } else {
            false
        };

        tx.commit().await?;

        Ok(SyncOutcome {
            meeting_id: meeting.id.clone(),
            new_matters,
            duplicate_matters,
            enqueued,
        })
    }

    /// Writes the matter's canonical summary/topics, then fans out to every
    /// item referencing this matter where `summary` is still null.
    #[instrument(skip(self, summary, topics))]
    pub async fn apply_canonical_summary(
        &self,
        matter_id: &str,
        summary: &str,
        topics: &[String],
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE matters
            SET canonical_summary = $2,
                canonical_topics = $3
            WHERE id = $1
            "#,
        )
        .bind(matter_id)
        .bind(summary)
        .bind(Json(topics))
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE agenda_items
            SET summary = $2,
                topics = $3
            WHERE matter_id = $1 AND summary IS NULL
            "#,
        )
        .bind(matter_id)
        .bind(summary)
        .bind(Json(topics))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Transitions a matter's status. A terminal status must carry
    /// `final_vote_date` (§4.7) — `last_seen` itself isn't touched here; it
    /// freezes on the next sync through `upsert_matter_and_appearance`'s own
    /// terminal-status check.
    #[instrument(skip(self))]
    pub async fn set_matter_status(
        &self,
        matter_id: &str,
        status: MatterStatus,
        final_vote_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        if !crate::matter_tracker::validate_terminal_transition(status, final_vote_date) {
            return Err(StoreError::Validation(crate::errors::ValidationError::invalid(format!(
                "matter {matter_id}: terminal status '{}' requires a final_vote_date",
                status.as_str()
            ))));
        }

        sqlx::query("UPDATE matters SET status = $2, final_vote_date = $3 WHERE id = $1")
            .bind(matter_id)
            .bind(status.as_str())
            .bind(final_vote_date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn enqueue(&self, job: NewJob<'_>) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = enqueue_within_tx(
            &mut tx,
            job.source_url,
            job.job_type,
            job.payload,
            job.priority,
            job.meeting_id,
            job.banana,
            job.force,
        )
        .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Atomic dequeue: selects the single highest-priority pending row with
    /// `FOR UPDATE SKIP LOCKED` so concurrent workers never race for the
    /// same job.
    #[instrument(skip(self))]
    pub async fn get_next_for_processing(&self, job_type: Option<JobType>) -> Result<Option<QueueJob>, StoreError> {
        let row = sqlx::query_as::<_, QueueJobRow>(
            r#"
            UPDATE queue_jobs
            SET status = 'processing',
                started_at = NOW()
            WHERE id = (
                SELECT id
                FROM queue_jobs
                WHERE status = 'pending'
                  AND ($1::text IS NULL OR job_type = $1)
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, source_url, job_type, payload, meeting_id, banana, status,
                      priority, retry_count, created_at, started_at, completed_at,
                      failed_at, error_message
            "#,
        )
        .bind(job_type.map(|t| t.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    pub async fn mark_complete(&self, job_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'completed',
                completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Failed path implements the retry ladder: retry_count < 3 ⇒ pending
    /// with a priority penalty; retry_count = 3 ⇒ dead_letter.
    /// `retryable = false` (e.g. a parsing error) skips the ladder entirely.
    #[instrument(skip(self, error_message))]
    pub async fn mark_failed(&self, job_id: i64, error_message: &str, retryable: bool) -> Result<JobStatus, StoreError> {
        let row = sqlx::query_as::<_, (i32,)>(
            "SELECT retry_count FROM queue_jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        let retry_count = row.0;

        if retryable && retry_count < RETRY_LIMIT {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'pending',
                    priority = priority - $2,
                    retry_count = retry_count + 1,
                    error_message = $3
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(RETRY_PRIORITY_PENALTY * (retry_count + 1))
            .bind(error_message)
            .execute(&self.pool)
            .await?;
            Ok(JobStatus::Pending)
        } else {
            sqlx::query(
                r#"
                UPDATE queue_jobs
                SET status = 'dead_letter',
                    failed_at = NOW(),
                    error_message = $2
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
            Ok(JobStatus::DeadLetter)
        }
    }

    /// Resets any `processing` row whose `started_at` predates the
    /// threshold back to `pending`. Run periodically and once at startup.
    #[instrument(skip(self))]
    pub async fn recover_stale(&self, threshold: Duration) -> Result<u64, StoreError> {
        let threshold_secs = threshold.as_secs() as i64;
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending', started_at = NULL
            WHERE status = 'processing'
              AND started_at IS NOT NULL
              AND started_at < NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(threshold_secs)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "recovered stale processing jobs");
        }
        Ok(recovered)
    }

    #[instrument(skip(self))]
    pub async fn queue_depth(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_jobs WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn dead_letter_count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_jobs WHERE status = 'dead_letter'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn upsert_city(&self, city: &City) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cities (banana, name, state, vendor, slug, county, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (banana) DO UPDATE SET
                name = excluded.name,
                state = excluded.state,
                vendor = excluded.vendor,
                slug = excluded.slug,
                county = excluded.county
            "#,
        )
        .bind(city.banana.as_ref())
        .bind(&city.name)
        .bind(&city.state)
        .bind(city.vendor.as_str())
        .bind(&city.slug)
        .bind(&city.county)
        .bind(city.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_active_cities(&self) -> Result<Vec<CityRow>, StoreError> {
        let rows = sqlx::query_as::<_, CityRow>(
            "SELECT banana, name, state, vendor, slug, county, status FROM cities WHERE status = 'active'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Writes one item's own summary/topics directly, independent of any
    /// matter fan-out. Used for items whose matter has no canonical
    /// summary yet (the first meeting to surface that bill).
    #[instrument(skip(self, summary, topics))]
    pub async fn update_item_summary(&self, item_id: &str, summary: &str, topics: &[String]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE agenda_items
            SET summary = $2, topics = $3
            WHERE id = $1
            "#,
        )
        .bind(item_id)
        .bind(summary)
        .bind(Json(topics))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, StoreError> {
        let row = sqlx::query_as::<_, MeetingRow>(
            r#"
            SELECT id, banana, title, date, agenda_url, packet_url, summary,
                   participation, status, processing_status, processing_method,
                   processing_time_seconds, topics
            FROM meetings WHERE id = $1
            "#,
        )
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TryInto::try_into).transpose()?)
    }

    #[instrument(skip(self))]
    pub async fn get_items_for_meeting(&self, meeting_id: &str) -> Result<Vec<AgendaItem>, StoreError> {
        let rows = sqlx::query_as::<_, AgendaItemRow>(
            r#"
            SELECT id, meeting_id, title, sequence, attachments, attachment_hash,
                   matter_id, matter_file, sponsors, summary, topics
            FROM agenda_items WHERE meeting_id = $1 ORDER BY sequence ASC
            "#,
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_matter_canonical_summary(&self, matter_id: &str) -> Result<Option<(String, Vec<String>)>, StoreError> {
        let row: Option<(Option<String>, Option<Json<Vec<String>>>)> = sqlx::query_as(
            "SELECT canonical_summary, canonical_topics FROM matters WHERE id = $1",
        )
        .bind(matter_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(summary, topics)| summary.map(|s| (s, topics.map(|t| t.0).unwrap_or_default()))))
    }

    /// `summary` is only ever `Some` for the monolithic packet-fallback
    /// path — item-level processing writes summaries onto items, never
    /// onto the meeting row itself, so a `None` here leaves the existing
    /// (preserved) meeting summary untouched.
    #[instrument(skip(self, summary, topics))]
    pub async fn mark_meeting_processed(
        &self,
        meeting_id: &str,
        processing_method: &str,
        processing_time_seconds: f64,
        topics: &[String],
        summary: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE meetings
            SET processing_status = 'completed',
                processing_method = $2,
                processing_time_seconds = $3,
                topics = $4,
                summary = CASE WHEN $5::text IS NOT NULL THEN $5 ELSE summary END
            WHERE id = $1
            "#,
        )
        .bind(meeting_id)
        .bind(processing_method)
        .bind(processing_time_seconds)
        .bind(Json(topics))
        .bind(summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Caller-provided fields for `Store::enqueue`; `force` resets a
/// completed/failed/dead_letter row back to pending instead of the default
/// no-op.
pub struct NewJob<'a> {
    pub source_url: &'a str,
    pub job_type: JobType,
    pub payload: JsonValue,
    pub priority: i32,
    pub meeting_id: Option<&'a str>,
    pub banana: Option<&'a Banana>,
    pub force: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct MeetingRow {
    id: String,
    banana: String,
    title: String,
    date: DateTime<Utc>,
    agenda_url: Option<String>,
    packet_url: Option<String>,
    summary: Option<String>,
    participation: Option<JsonValue>,
    status: Option<String>,
    processing_status: String,
    processing_method: Option<String>,
    processing_time_seconds: Option<f64>,
    topics: Option<Json<Vec<String>>>,
}

impl TryFrom<MeetingRow> for Meeting {
    type Error = StoreError;

    fn try_from(row: MeetingRow) -> Result<Self, Self::Error> {
        Ok(Meeting {
            id: row.id,
            banana: Banana::new(row.banana)?,
            title: row.title,
            date: row.date,
            agenda_url: row.agenda_url,
            packet_url: row.packet_url,
            summary: row.summary,
            participation: row.participation,
            status: row.status.as_deref().and_then(MeetingStatus::parse),
            processing_status: ProcessingStatus::parse(&row.processing_status).unwrap_or(ProcessingStatus::Pending),
            processing_method: row.processing_method,
            processing_time_seconds: row.processing_time_seconds,
            topics: row.topics.map(|t| t.0),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgendaItemRow {
    id: String,
    meeting_id: String,
    title: String,
    sequence: i32,
    attachments: Json<Vec<crate::domain::Attachment>>,
    attachment_hash: String,
    matter_id: Option<String>,
    matter_file: Option<String>,
    sponsors: Option<Json<Vec<String>>>,
    summary: Option<String>,
    topics: Option<Json<Vec<String>>>,
}

impl From<AgendaItemRow> for AgendaItem {
    fn from(row: AgendaItemRow) -> Self {
        AgendaItem {
            id: row.id,
            meeting_id: row.meeting_id,
            title: row.title,
            sequence: row.sequence as u32,
            attachments: row.attachments.0,
            attachment_hash: row.attachment_hash,
            matter_id: row.matter_id,
            matter_file: row.matter_file,
            sponsors: row.sponsors.map(|s| s.0),
            summary: row.summary,
            topics: row.topics.map(|t| t.0),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CityRow {
    pub banana: String,
    pub name: String,
    pub state: String,
    pub vendor: String,
    pub slug: String,
    pub county: Option<String>,
    pub status: String,
}

#[derive(Debug, sqlx::FromRow)]
struct QueueJobRow {
    id: i64,
    source_url: String,
    job_type: String,
    payload: Json<JsonValue>,
    meeting_id: Option<String>,
    banana: Option<String>,
    status: String,
    priority: i32,
    retry_count: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl From<QueueJobRow> for QueueJob {
    fn from(row: QueueJobRow) -> Self {
        QueueJob {
            id: row.id,
            source_url: row.source_url,
            job_type: JobType::parse(&row.job_type).unwrap_or(JobType::Meeting),
            payload: row.payload.0,
            meeting_id: row.meeting_id,
            banana: row.banana.and_then(|b| Banana::new(b).ok()),
            status: JobStatus::parse(&row.status).unwrap_or(JobStatus::Pending),
            priority: row.priority,
            retry_count: row.retry_count,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            failed_at: row.failed_at,
            error_message: row.error_message,
        }
    }
}

/// Structural fields always overwrite; `summary`/`topics` only overwrite
/// when the new value is non-null, so a re-sync (which always writes
/// summary=null) never clobbers prior LLM output.
async fn upsert_meeting(tx: &mut Transaction<'_, Postgres>, meeting: &Meeting) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO meetings (
            id, banana, title, date, agenda_url, packet_url, summary,
            participation, status, processing_status, processing_method,
            processing_time_seconds, topics
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO UPDATE SET
            title = excluded.title,
            date = excluded.date,
            agenda_url = excluded.agenda_url,
            packet_url = excluded.packet_url,
            summary = CASE WHEN excluded.summary IS NOT NULL THEN excluded.summary ELSE meetings.summary END,
            participation = excluded.participation,
            status = excluded.status,
            topics = CASE WHEN excluded.topics IS NOT NULL THEN excluded.topics ELSE meetings.topics END
        "#,
    )
    .bind(&meeting.id)
    .bind(meeting.banana.as_ref())
    .bind(&meeting.title)
    .bind(meeting.date)
    .bind(&meeting.agenda_url)
    .bind(&meeting.packet_url)
    .bind(&meeting.summary)
    .bind(&meeting.participation)
    .bind(meeting.status.as_ref().map(MeetingStatus::as_str))
    .bind(meeting.processing_status.as_str())
    .bind(&meeting.processing_method)
    .bind(meeting.processing_time_seconds)
    .bind(meeting.topics.as_ref().map(|t| Json(t.clone())))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_agenda_item(
    tx: &mut Transaction<'_, Postgres>,
    item: &AgendaItem,
    matter_id: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO agenda_items (
            id, meeting_id, title, sequence, attachments, attachment_hash,
            matter_id, matter_file, sponsors, summary, topics
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (id) DO UPDATE SET
            title = excluded.title,
            sequence = excluded.sequence,
            attachments = excluded.attachments,
            attachment_hash = excluded.attachment_hash,
            matter_id = excluded.matter_id,
            matter_file = excluded.matter_file,
            sponsors = excluded.sponsors,
            summary = CASE WHEN excluded.summary IS NOT NULL THEN excluded.summary ELSE agenda_items.summary END,
            topics = CASE WHEN excluded.topics IS NOT NULL THEN excluded.topics ELSE agenda_items.topics END
        "#,
    )
    .bind(&item.id)
    .bind(&item.meeting_id)
    .bind(&item.title)
    .bind(item.sequence as i32)
    .bind(Json(&item.attachments))
    .bind(&item.attachment_hash)
    .bind(matter_id)
    .bind(&item.matter_file)
    .bind(item.sponsors.as_ref().map(|s| Json(s.clone())))
    .bind(&item.summary)
    .bind(item.topics.as_ref().map(|t| Json(t.clone())))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Upserts the matter and its appearance for this meeting. Returns `true`
/// if this is the matter's first observation (new row), `false` if it was
/// already tracked.
///
/// `appearance_count` must equal the count of *distinct meetings* in
/// `matter_appearances` (§4.7), so the increment is gated on whether this
/// meeting has already been recorded for this matter — otherwise a re-sync
/// of the same meeting, or a second item in it referencing the same
/// matter, would inflate the count on every idempotent re-run.
async fn upsert_matter_and_appearance(
    tx: &mut Transaction<'_, Postgres>,
    matter_id: &str,
    item: &AgendaItem,
    meeting: &Meeting,
) -> Result<bool, StoreError> {
    let existed: Option<(i32, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
        "SELECT appearance_count, status, first_seen, last_seen FROM matters WHERE id = $1",
    )
    .bind(matter_id)
    .fetch_optional(&mut **tx)
    .await?;
    let is_new = existed.is_none();

    // §4.7: once a matter reaches a terminal status, `last_seen` stops
    // advancing automatically. A brand-new row has no prior state to
    // freeze, so it always takes the meeting date as-is.
    let next_last_seen = match &existed {
        Some((_, status, first_seen, current_last_seen)) => {
            let status = MatterStatus::parse(status).unwrap_or(MatterStatus::Active);
            crate::matter_tracker::next_last_seen(*first_seen, *current_last_seen, status, meeting.date)
                .unwrap_or(*current_last_seen)
        }
        None => meeting.date,
    };

    let (meeting_already_seen,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM matter_appearances WHERE matter_id = $1 AND meeting_id = $2)",
    )
    .bind(matter_id)
    .bind(&meeting.id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO matters (id, banana, matter_file, matter_id_vendor, title, first_seen, last_seen, appearance_count)
        VALUES ($1, $2, $3, $4, $5, $6, $6, 1)
        ON CONFLICT (id) DO UPDATE SET
            title = excluded.title,
            last_seen = $8,
            appearance_count = matters.appearance_count + CASE WHEN $7 THEN 0 ELSE 1 END
        "#,
    )
    .bind(matter_id)
    .bind(meeting.banana.as_ref())
    .bind(&item.matter_file)
    .bind(&item.matter_id)
    .bind(&item.title)
    .bind(meeting.date)
    .bind(meeting_already_seen)
    .bind(next_last_seen)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO matter_appearances (matter_id, meeting_id, item_id, appeared_at, sequence)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (matter_id, meeting_id, item_id) DO NOTHING
        "#,
    )
    .bind(matter_id)
    .bind(&meeting.id)
    .bind(&item.id)
    .bind(meeting.date)
    .bind(item.sequence as i32)
    .execute(&mut **tx)
    .await?;

    Ok(is_new)
}

#[allow(clippy::too_many_arguments)]
async fn enqueue_within_tx(
    tx: &mut Transaction<'_, Postgres>,
    source_url: &str,
    job_type: JobType,
    payload: JsonValue,
    priority: i32,
    meeting_id: Option<&str>,
    banana: Option<&Banana>,
    force: bool,
) -> Result<bool, StoreError> {
    let existing: Option<(String, i32)> = sqlx::query_as(
        "SELECT status, priority FROM queue_jobs WHERE source_url = $1 FOR UPDATE",
    )
    .bind(source_url)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        None => {
            sqlx::query(
                r#"
                INSERT INTO queue_jobs (source_url, job_type, payload, priority, meeting_id, banana, status)
                VALUES ($1, $2, $3, $4, $5, $6, 'pending')
                "#,
            )
            .bind(source_url)
            .bind(job_type.as_str())
            .bind(Json(payload))
            .bind(priority)
            .bind(meeting_id)
            .bind(banana.map(|b| b.as_ref()))
            .execute(&mut **tx)
            .await?;
            Ok(true)
        }
        Some((status, existing_priority)) if matches!(status.as_str(), "completed" | "failed" | "dead_letter") => {
            if force {
                sqlx::query(
                    "UPDATE queue_jobs SET status = 'pending', priority = $2, retry_count = 0 WHERE source_url = $1",
                )
                .bind(source_url)
                .bind(priority)
                .execute(&mut **tx)
                .await?;
                Ok(true)
            } else {
                let _ = existing_priority;
                Ok(false)
            }
        }
        Some((_, existing_priority)) => {
            if priority > existing_priority {
                sqlx::query("UPDATE queue_jobs SET priority = $2 WHERE source_url = $1")
                    .bind(source_url)
                    .bind(priority)
                    .execute(&mut **tx)
                    .await?;
            }
            Ok(false)
        }
    }
}
