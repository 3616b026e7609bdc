//! Concurrent paginated ingestion
//!
//! 1. Page 0 is fetched synchronously to learn `total`. A failure here is fatal.
//! 2. The remaining offsets are planned and fed into a bounded job queue.
//! 3. The worker pool fetches them concurrently into a bounded result queue.
//! 4. The aggregator drains results into one unordered collection.
//!
//! [`ingest`] returns only after the feeder, every worker and the aggregator
//! have finished, so the returned [`Aggregate`] is complete and frozen.

use crate::aggregator::{Aggregate, Aggregator};
use crate::config::PipelineConfig;
use crate::error::ExportError;
use crate::fetcher::PageSource;
use crate::planner;
use crate::pool::{run_pool, PageFailure};
use crate::progress::page_progress;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Page and issue counts for one ingestion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Total reported by the first page
    pub total: u64,
    /// Pages requested, counting page 0 even when `total` is 0
    pub planned_pages: usize,
    pub fetched_pages: usize,
    pub failed_pages: usize,
    /// Pages never attempted, or abandoned mid-request, because the export
    /// was cancelled
    pub skipped_pages: usize,
    pub issues: usize,
    /// Cancellation cut the export short
    pub cancelled: bool,
}

impl IngestStats {
    /// Every planned page made it into the aggregate
    pub fn is_complete(&self) -> bool {
        self.failed_pages == 0 && self.skipped_pages == 0 && !self.cancelled
    }
}

/// Output of [`ingest`]
#[derive(Debug)]
pub struct Ingested {
    pub aggregate: Aggregate,
    pub stats: IngestStats,
    pub failures: Vec<PageFailure>,
}

/// Fetch every page of `source` into one aggregate
pub async fn ingest(
    source: Arc<dyn PageSource>,
    page_size: u64,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<Ingested, ExportError> {
    let first = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ExportError::Cancelled { collected: 0 }),
        first = source.fetch(0) => first.map_err(ExportError::FirstPage)?,
    };

    let total = first.total;
    info!(total, "Total number of issues");

    let expected_first = page_size.min(total);
    if (first.len() as u64) < expected_first {
        warn!(
            requested = page_size,
            received = first.len(),
            total,
            "First page is shorter than requested; the source may cap page size and pages will be skipped"
        );
    }

    let remaining = planner::remaining_offsets(total, page_size);
    let planned_pages = planner::page_count(total, page_size).max(1) as usize;
    info!(pages = planned_pages, workers = config.workers, "Dispatching page fetches");

    let (job_tx, job_rx) = mpsc::channel(config.queue_capacity);
    let (result_tx, result_rx) = mpsc::channel(config.queue_capacity);

    let progress = page_progress(planned_pages as u64, config.show_progress);
    let aggregator = Aggregator::spawn(first, result_rx, progress);
    let feeder = tokio::spawn(feed_jobs(remaining, job_tx, cancel.clone()));

    let pool = match run_pool(source, job_rx, result_tx, config, cancel.clone()).await {
        Ok(pool) => pool,
        Err(e) => {
            feeder.abort();
            aggregator.abort();
            return Err(e);
        },
    };
    let dispatched = feeder
        .await
        .map_err(|e| ExportError::WorkerPanicked(e.to_string()))?;
    let aggregate = aggregator.finish().await?;

    let attempted = pool.fetched + pool.failures.len();
    let skipped_pages = (planned_pages - 1).saturating_sub(attempted);
    let stats = IngestStats {
        total,
        planned_pages,
        fetched_pages: pool.fetched + 1,
        failed_pages: pool.failures.len(),
        skipped_pages,
        issues: aggregate.len(),
        // A cancel that lands after the last page leaves a complete aggregate
        cancelled: cancel.is_cancelled() && skipped_pages > 0,
    };

    if stats.failed_pages > 0 {
        let offsets: Vec<u64> = pool.failures.iter().map(|f| f.offset).collect();
        warn!(
            failed = stats.failed_pages,
            ?offsets,
            "Some pages could not be fetched; the export is missing their issues"
        );
    }

    if !stats.cancelled && aggregate.len() as u64 != total {
        warn!(collected = aggregate.len(), total, "Collected issue count differs from reported total");
    }

    info!(
        dispatched,
        aggregated = aggregate.pages(),
        fetched = stats.fetched_pages,
        failed = stats.failed_pages,
        issues = stats.issues,
        "Ingestion finished"
    );

    Ok(Ingested {
        aggregate,
        stats,
        failures: pool.failures,
    })
}

/// Push planned offsets into the job queue; closing it ends the pool.
async fn feed_jobs(
    offsets: impl Iterator<Item = u64>,
    jobs: mpsc::Sender<u64>,
    cancel: CancellationToken,
) -> usize {
    let mut dispatched = 0;

    for offset in offsets {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = jobs.send(offset) => sent,
        };
        if sent.is_err() {
            break;
        }
        dispatched += 1;
    }

    dispatched
}
