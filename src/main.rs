// engagic daemon: sync loop + processor worker pool + admin/stats surface.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use engagic_core::config::Config;
use engagic_core::fetcher::Fetcher;
use engagic_core::llm::LlmClient;
use engagic_core::observability::{init_logging_with_level, record_job_completed, record_job_dead_lettered};
use engagic_core::processor::Processor;
use engagic_core::store::Store;
use engagic_core::types::Vendor;
use engagic_core::vendors::civicclerk::CivicClerkAdapter;
use engagic_core::vendors::civicplus::CivicPlusAdapter;
use engagic_core::vendors::custom::CustomAdapter;
use engagic_core::vendors::granicus::GranicusAdapter;
use engagic_core::vendors::legistar::LegistarAdapter;
use engagic_core::vendors::novusagenda::NovusAgendaAdapter;
use engagic_core::vendors::primegov::PrimeGovAdapter;
use engagic_core::vendors::VendorAdapter;
use engagic_core::wrappers::{DocumentByteCache, RetryableVendorAdapter};

const EXTRACTOR_CACHE_CAPACITY: usize = 256;
const STALE_RECOVERY_INTERVAL: Duration = Duration::from_secs(300);
/// How long an idle worker sleeps before re-polling an empty queue. Kept
/// short and independent of the much coarser `ENGAGIC_PROCESSING_INTERVAL_HOURS`
/// config default (2h) — that knob exists to document the processor's
/// overall cadence in the ops config surface, but a continuously-draining
/// worker pool must not actually sleep for hours between polls, or a job
/// enqueued right after the queue empties would stall until the next tick.
const WORKER_IDLE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Ingestion, queueing and LLM summarization pipeline for local-government
/// meeting agendas.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Suppress all log output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// Emit debug-level logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging_with_level(cli.verbose, cli.quiet)?;

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections((config.n_sync + config.n_work + 4) as u32)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let store = Store::new(pool);

    store
        .recover_stale(config.stale_threshold)
        .await
        .context("failed initial stale job recovery")?;

    let adapters = build_adapter_registry();
    let fetcher = Arc::new(Fetcher::new(store.clone(), adapters));

    let llm = Arc::new(LlmClient::new(config.llm_api_key.clone(), config.llm_api_base.clone()));
    let byte_cache = Arc::new(DocumentByteCache::new(EXTRACTOR_CACHE_CAPACITY));
    let extractor = engagic_core::extractor::Extractor::new(byte_cache);
    let processor = Arc::new(Processor::new(store.clone(), extractor, llm));

    let admin_state = engagic_core::admin::AdminState {
        store: store.clone(),
        fetcher: fetcher.clone(),
        admin_token: config.admin_token.clone().into(),
    };
    let admin_router = engagic_core::admin::router(admin_state);
    let admin_addr = config.admin_bind_addr.clone();

    let admin_task = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&admin_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %admin_addr, error = %e, "failed to bind admin surface");
                return;
            }
        };
        info!(addr = %admin_addr, "admin/stats surface listening");
        if let Err(e) = axum::serve(listener, admin_router).await {
            error!(error = %e, "admin surface exited with error");
        }
    });

    let sync_task = tokio::spawn(run_sync_loop(store.clone(), fetcher, config.clone()));
    let worker_task = tokio::spawn(run_worker_pool(processor, config.clone()));
    let recovery_task = tokio::spawn(run_stale_recovery(store, config.stale_threshold));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = sync_task => {
            warn!("sync loop exited unexpectedly");
        }
        _ = worker_task => {
            warn!("worker pool exited unexpectedly");
        }
        _ = recovery_task => {
            warn!("stale recovery loop exited unexpectedly");
        }
    }

    admin_task.abort();
    info!("engagic shutting down");
    Ok(())
}

/// One `VendorAdapter` per supported platform, each wrapped in
/// `RetryableVendorAdapter` so transient HTTP failures retry with backoff
/// before the fetcher ever sees an error.
fn build_adapter_registry() -> HashMap<Vendor, Arc<dyn VendorAdapter + Send + Sync>> {
    let mut adapters: HashMap<Vendor, Arc<dyn VendorAdapter + Send + Sync>> = HashMap::new();
    adapters.insert(Vendor::Legistar, Arc::new(RetryableVendorAdapter::new(LegistarAdapter::new())));
    adapters.insert(Vendor::Primegov, Arc::new(RetryableVendorAdapter::new(PrimeGovAdapter::new())));
    adapters.insert(Vendor::Granicus, Arc::new(RetryableVendorAdapter::new(GranicusAdapter::new())));
    adapters.insert(Vendor::Civicclerk, Arc::new(RetryableVendorAdapter::new(CivicClerkAdapter::new())));
    adapters.insert(Vendor::Civicplus, Arc::new(RetryableVendorAdapter::new(CivicPlusAdapter::new())));
    adapters.insert(Vendor::Novusagenda, Arc::new(RetryableVendorAdapter::new(NovusAgendaAdapter::new())));
    adapters.insert(Vendor::Custom, Arc::new(RetryableVendorAdapter::new(CustomAdapter::new())));
    adapters
}

/// Bounded pool of `N_sync` concurrent per-city syncs, ticking every
/// `sync_interval`. A semaphore bounds concurrency rather than spawning one
/// task per city up front, so a slow vendor can't starve the others' turn.
async fn run_sync_loop(store: Store, fetcher: Arc<Fetcher>, config: Config) {
    let semaphore = Arc::new(Semaphore::new(config.n_sync));
    let mut interval = tokio::time::interval(config.sync_interval);

    loop {
        interval.tick().await;

        let cities = match store.list_active_cities().await {
            Ok(cities) => cities,
            Err(e) => {
                error!(error = %e, "failed to list active cities, skipping this sync tick");
                continue;
            }
        };

        info!(city_count = cities.len(), "starting sync tick");
        let mut handles = Vec::with_capacity(cities.len());
        for city in cities {
            let semaphore = semaphore.clone();
            let fetcher = fetcher.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match fetcher.sync_city(&city).await {
                    Ok(stored) => info!(banana = %city.banana, stored, "city sync complete"),
                    Err(e) => error!(banana = %city.banana, error = %e, "city sync failed"),
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Bounded pool of `N_work` workers draining the queue. Each worker polls
/// for a job, processes it, and sleeps `WORKER_IDLE_POLL_INTERVAL` when the
/// queue is empty rather than busy-looping.
async fn run_worker_pool(processor: Arc<Processor>, config: Config) {
    let semaphore = Arc::new(Semaphore::new(config.n_work));
    let mut handles = Vec::with_capacity(config.n_work);

    for worker_id in 0..config.n_work {
        let processor = processor.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match processor.store().get_next_for_processing(None).await {
                    Ok(Some(job)) => {
                        let Some(meeting_id) = job.meeting_id.clone() else {
                            warn!(job_id = job.id, worker_id, "queue job has no meeting_id, marking failed");
                            let _ = processor.store().mark_failed(job.id, "job has no meeting_id", false).await;
                            record_job_dead_lettered();
                            continue;
                        };
                        match processor.process_meeting(&meeting_id).await {
                            Ok(()) => {
                                let _ = processor.store().mark_complete(job.id).await;
                                record_job_completed();
                            }
                            Err(e) => {
                                let retryable = e.is_retryable();
                                warn!(worker_id, job_id = job.id, meeting_id, error = %e, retryable, "job processing failed");
                                match processor.store().mark_failed(job.id, &e.to_string(), retryable).await {
                                    Ok(engagic_core::domain::JobStatus::DeadLetter) => record_job_dead_lettered(),
                                    _ => {}
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        drop(_permit);
                        tokio::time::sleep(WORKER_IDLE_POLL_INTERVAL).await;
                    }
                    Err(e) => {
                        error!(worker_id, error = %e, "failed to dequeue job");
                        tokio::time::sleep(WORKER_IDLE_POLL_INTERVAL).await;
                    }
                }
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_stale_recovery(store: Store, threshold: Duration) {
    let mut interval = tokio::time::interval(STALE_RECOVERY_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = store.recover_stale(threshold).await {
            error!(error = %e, "stale job recovery failed");
        }
    }
}
