//! Fetcher: the per-city sync loop. Acquires a rate-limit token, invokes
//! the vendor adapter, and stores each meeting in its own transaction.
//!
//! Enqueue policy (fixed-in-source correctness rule): `agenda_url` is never
//! enqueued for extraction — it was already consumed by the adapter to
//! produce item-level agenda data. Only `items://{meeting_id}` (resolved at
//! processing time against the stored items' attachments) or the
//! `packet_url` fallback ever become queue rows, and that enqueue happens
//! inside `Store::store_meeting_from_sync`, not here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use crate::errors::VendorError;
use crate::rate_limit::TokenBucket;
use crate::store::{CityRow, Store};
use crate::types::{Banana, Vendor};
use crate::vendors::VendorAdapter;

const DEFAULT_MAX_MEETINGS_PER_SYNC: usize = 50;

pub struct Fetcher {
    store: Store,
    adapters: HashMap<Vendor, Arc<dyn VendorAdapter + Send + Sync>>,
    buckets: HashMap<Vendor, Arc<TokenBucket>>,
}

impl Fetcher {
    pub fn new(store: Store, adapters: HashMap<Vendor, Arc<dyn VendorAdapter + Send + Sync>>) -> Self {
        let buckets = adapters
            .keys()
            .map(|vendor| (*vendor, Arc::new(TokenBucket::for_vendor(*vendor))))
            .collect();
        Self { store, adapters, buckets }
    }

    /// Syncs a single city: acquires its vendor's rate-limit token, fetches
    /// meetings, and stores each one in its own transaction so a failure
    /// partway through a city's meeting list doesn't lose earlier meetings.
    pub async fn sync_city(&self, city: &CityRow) -> Result<usize, VendorError> {
        let vendor = Vendor::parse(&city.vendor).unwrap_or(Vendor::Custom);
        let adapter = self.adapters.get(&vendor).ok_or_else(|| VendorError::Unsupported {
            vendor: vendor.as_str().to_string(),
            city_slug: city.slug.clone(),
            message: "no adapter registered for this vendor".to_string(),
        })?;

        if let Some(bucket) = self.buckets.get(&vendor) {
            bucket.acquire().await;
        }

        let banana = Banana::new(city.banana.clone()).map_err(|e| VendorError::Parsing {
            vendor: vendor.as_str().to_string(),
            city_slug: city.slug.clone(),
            message: e.to_string(),
        })?;

        let fetched = adapter
            .fetch_meetings(&banana, &city.slug, DEFAULT_MAX_MEETINGS_PER_SYNC)
            .await?;

        let mut stored = 0;
        for meeting in fetched {
            match self.store.store_meeting_from_sync(&meeting.meeting, &meeting.items).await {
                Ok(outcome) => {
                    info!(
                        banana = %banana,
                        meeting_id = %outcome.meeting_id,
                        new_matters = outcome.new_matters,
                        duplicate_matters = outcome.duplicate_matters,
                        enqueued = outcome.enqueued,
                        "meeting synced"
                    );
                    stored += 1;
                }
                Err(e) => {
                    error!(banana = %banana, meeting_id = %meeting.meeting.id, error = %e, "failed to store synced meeting, continuing with remaining meetings");
                }
            }
        }

        Ok(stored)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Per-vendor `(configured_rps, requests_in_current_window)`, surfaced
    /// by the admin/stats endpoint.
    pub fn rate_limiter_snapshot(&self) -> Vec<(Vendor, f64, u32)> {
        self.buckets
            .iter()
            .map(|(vendor, bucket)| {
                let (rps, count) = bucket.stats();
                (*vendor, rps, count)
            })
            .collect()
    }
}
