// Centralized observability infrastructure: structured logging, metrics, and
// tracing for the ingestion & analysis pipeline.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static OPERATION_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static JOBS_COMPLETED_COUNTER: AtomicU64 = AtomicU64::new(0);
static JOBS_DEAD_LETTERED_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the default verbosity. Call once at startup.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity. `--quiet` always wins
/// over `RUST_LOG`; otherwise `RUST_LOG` overrides the flag-derived default.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("engagic=debug,info")
    } else {
        EnvFilter::new("engagic=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("engagic observability initialized");
            }
            Ok(())
        }
        // Already initialized — fine in test binaries that call this more than once.
        Err(_) => Ok(()),
    }
}

/// Structured operations logged across the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    VendorFetch {
        vendor: String,
        banana: String,
        meeting_count: usize,
    },
    Extract {
        url: String,
        bytes: usize,
    },
    QueueEnqueue {
        job_type: String,
        source_url: String,
    },
    QueueDequeue {
        job_id: i64,
    },
    LlmBatch {
        meeting_id: String,
        item_count: usize,
    },
    MatterTrack {
        matter_id: String,
        is_new: bool,
    },
    Startup {
        version: String,
    },
    Shutdown {
        reason: String,
    },
}

impl Operation {
    pub fn validate(&self) -> Result<()> {
        if let Operation::LlmBatch { item_count, .. } = self {
            if *item_count == 0 {
                anyhow::bail!("LLM batch operation with zero items");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter { name: &'static str, value: u64 },
    Gauge { name: &'static str, value: f64 },
    Histogram { name: &'static str, value: f64, unit: &'static str },
    Timer { name: &'static str, duration: Duration },
}

/// Tracing context threaded through a unit of work (one city sync, one
/// queue job).
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub operation: String,
    pub start_time: Instant,
    pub attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn child(&self, operation: impl Into<String>) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation: operation.into(),
            start_time: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[instrument(skip(ctx))]
pub fn log_operation(ctx: &OperationContext, op: &Operation, result: &Result<()>) {
    let elapsed = ctx.elapsed();
    let attrs = ctx
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");

    match result {
        Ok(()) => {
            info!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                parent_span_id = ?ctx.parent_span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                "operation completed: {:?}", op
            );
            OPERATION_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            error!(
                trace_id = %ctx.trace_id,
                span_id = %ctx.span_id,
                parent_span_id = ?ctx.parent_span_id,
                operation = %ctx.operation,
                elapsed_ms = elapsed.as_millis(),
                attributes = %attrs,
                error = %e,
                "operation failed: {:?}", op
            );
            ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub fn record_metric(metric: MetricType) {
    match metric {
        MetricType::Counter { name, value } => debug!("metric.counter {} = {}", name, value),
        MetricType::Gauge { name, value } => debug!("metric.gauge {} = {}", name, value),
        MetricType::Histogram { name, value, unit } => {
            debug!("metric.histogram {} = {} {}", name, value, unit)
        }
        MetricType::Timer { name, duration } => debug!("metric.timer {} = {:?}", name, duration),
    }
}

pub fn record_job_completed() {
    JOBS_COMPLETED_COUNTER.fetch_add(1, Ordering::Relaxed);
}

pub fn record_job_dead_lettered() {
    JOBS_DEAD_LETTERED_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Current in-process metrics snapshot, served by the admin/stats surface.
pub fn get_metrics() -> serde_json::Value {
    serde_json::json!({
        "operations": {
            "total": OPERATION_COUNTER.load(Ordering::Relaxed),
            "errors": ERROR_COUNTER.load(Ordering::Relaxed),
        },
        "jobs": {
            "completed": JOBS_COMPLETED_COUNTER.load(Ordering::Relaxed),
            "dead_lettered": JOBS_DEAD_LETTERED_COUNTER.load(Ordering::Relaxed),
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

#[instrument]
pub fn log_error_with_context(error: &anyhow::Error, ctx: &OperationContext) {
    let error_chain = error
        .chain()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" -> ");

    error!(
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        operation = %ctx.operation,
        error_chain = %error_chain,
        "error occurred during operation"
    );
}

/// Scoped timer that logs and records its own duration on drop, regardless
/// of whether the scope exited normally, via `?`, or via panic.
pub struct PerfTimer {
    name: String,
    start: Instant,
    ctx: OperationContext,
}

impl PerfTimer {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let ctx = OperationContext::new(&name);
        info!(trace_id = %ctx.trace_id, span_id = %ctx.span_id, "timer started: {}", name);
        Self {
            name,
            start: Instant::now(),
            ctx,
        }
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        info!(
            trace_id = %self.ctx.trace_id,
            span_id = %self.ctx.span_id,
            elapsed_ms = elapsed.as_millis(),
            "timer completed: {}", self.name
        );
        record_metric(MetricType::Timer {
            name: "perf.timer",
            duration: elapsed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_context_children_share_trace_id() {
        let ctx = OperationContext::new("sync_city");
        let child = ctx.child("fetch_meetings");
        assert_eq!(child.trace_id, ctx.trace_id);
        assert_eq!(child.parent_span_id, Some(ctx.span_id));
    }

    #[test]
    fn llm_batch_operation_rejects_zero_items() {
        let op = Operation::LlmBatch {
            meeting_id: "nashvilleTN_deadbeef".into(),
            item_count: 0,
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn metrics_snapshot_has_expected_shape() {
        record_job_completed();
        let metrics = get_metrics();
        assert!(metrics["jobs"]["completed"].as_u64().unwrap() >= 1);
        assert!(metrics["timestamp"].is_string());
    }

    #[test]
    fn perf_timer_records_on_drop() {
        {
            let _timer = PerfTimer::new("test_timer");
            std::thread::sleep(Duration::from_millis(5));
        }
        let metrics = get_metrics();
        assert!(metrics["operations"]["total"].as_u64().is_some());
    }
}
