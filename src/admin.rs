//! Admin/stats HTTP surface: a handful of read-only operational routes
//! gated by the static admin bearer token, not the public search API.
//!
//! The auth shape mirrors the teacher's internal service-to-service bearer
//! check (a single configured secret compared against the `Authorization`
//! header) rather than its full database-backed multi-tenant API key
//! service — that machinery (per-key quotas, usage recording, rate-limit
//! tiers) has no counterpart here: this surface serves one operator, not
//! many tenants.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::domain::MatterStatus;
use crate::errors::StoreError;
use crate::fetcher::Fetcher;
use crate::store::Store;

#[derive(Clone)]
pub struct AdminState {
    pub store: Store,
    pub fetcher: Arc<Fetcher>,
    pub admin_token: Arc<str>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .route("/matters/:matter_id/status", post(set_matter_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Compares the `Authorization: Bearer <token>` header against the
/// configured admin token. No per-route scoping, no quota bookkeeping —
/// this gate exists only to keep the surface off the open internet.
async fn require_admin_token(
    State(state): State<AdminState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == &*state.admin_token => next.run(request).await,
        _ => {
            warn!("admin surface rejected request with missing or invalid bearer token");
            (StatusCode::UNAUTHORIZED, "missing or invalid admin token").into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AdminState>) -> Result<Json<serde_json::Value>, StatusCode> {
    let queue_depth = state.store.queue_depth().await.map_err(|e| {
        warn!(error = %e, "failed to read queue depth");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let dead_letter_count = state.store.dead_letter_count().await.map_err(|e| {
        warn!(error = %e, "failed to read dead letter count");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let rate_limiters: Vec<_> = state
        .fetcher
        .rate_limiter_snapshot()
        .into_iter()
        .map(|(vendor, rps, in_window)| {
            serde_json::json!({
                "vendor": vendor.as_str(),
                "configured_rps": rps,
                "requests_in_window": in_window,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "queue_depth": queue_depth,
        "dead_letter_count": dead_letter_count,
        "rate_limiters": rate_limiters,
        "process": crate::observability::get_metrics(),
    })))
}

#[derive(Deserialize)]
struct SetMatterStatusRequest {
    status: MatterStatus,
    final_vote_date: Option<DateTime<Utc>>,
}

/// Manual correction surface for matter lifecycle transitions (e.g. a
/// matter mis-listed again after it's already terminal, or recording a
/// vote outcome the ingestion pipeline has no way to observe itself) — the
/// only path by which `matters.status` ever leaves `active`.
async fn set_matter_status(
    State(state): State<AdminState>,
    Path(matter_id): Path<String>,
    Json(body): Json<SetMatterStatusRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .set_matter_status(&matter_id, body.status, body.final_vote_date)
        .await
        .map_err(|e| match e {
            StoreError::Validation(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            StoreError::Database(_) => {
                warn!(matter_id, error = %e, "failed to set matter status");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        })?;
    Ok(StatusCode::NO_CONTENT)
}
