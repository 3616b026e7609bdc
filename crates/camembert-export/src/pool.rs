//! Bounded worker pool for page fetches
//!
//! `workers` executors share one job queue of offsets. Each executor takes an
//! offset, fetches it, and forwards the page to the result queue. A failed
//! page is logged, recorded as a [`PageFailure`] and dropped; the executor
//! moves on to the next offset. The pool returns once the job queue is closed
//! and drained, or the export is cancelled, and every executor has exited.

use crate::config::PipelineConfig;
use crate::error::{ExportError, FetchError};
use crate::fetcher::PageSource;
use crate::model::Page;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Offsets waiting for an executor, shared by all of them
type JobQueue = Arc<Mutex<mpsc::Receiver<u64>>>;

/// A page that was given up on
#[derive(Debug)]
pub struct PageFailure {
    pub offset: u64,
    pub error: FetchError,
}

/// What the pool did, summed over all executors
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// Pages forwarded to the result queue
    pub fetched: usize,
    pub failures: Vec<PageFailure>,
}

impl PoolOutcome {
    fn absorb(&mut self, other: PoolOutcome) {
        self.fetched += other.fetched;
        self.failures.extend(other.failures);
    }
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    retries: u32,
    backoff: Duration,
}

/// Run the pool until the job queue is exhausted or `cancel` fires.
///
/// `results` is moved in so that the result queue closes exactly when the
/// last executor exits.
pub async fn run_pool(
    source: Arc<dyn PageSource>,
    jobs: mpsc::Receiver<u64>,
    results: mpsc::Sender<Page>,
    config: &PipelineConfig,
    cancel: CancellationToken,
) -> Result<PoolOutcome, ExportError> {
    let jobs: JobQueue = Arc::new(Mutex::new(jobs));
    let retry = RetryPolicy {
        retries: config.page_retries,
        backoff: config.retry_backoff(),
    };

    let mut executors = JoinSet::new();
    for id in 0..config.workers {
        let executor = Executor {
            id,
            source: Arc::clone(&source),
            jobs: Arc::clone(&jobs),
            results: results.clone(),
            retry,
            cancel: cancel.clone(),
        };
        executors.spawn(executor.run());
    }
    drop(results);

    let mut outcome = PoolOutcome::default();
    while let Some(joined) = executors.join_next().await {
        let report = joined.map_err(|e| ExportError::WorkerPanicked(e.to_string()))?;
        outcome.absorb(report);
    }

    debug!(
        fetched = outcome.fetched,
        failed = outcome.failures.len(),
        "Worker pool finished"
    );
    Ok(outcome)
}

struct Executor {
    id: usize,
    source: Arc<dyn PageSource>,
    jobs: JobQueue,
    results: mpsc::Sender<Page>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Executor {
    async fn run(self) -> PoolOutcome {
        let mut outcome = PoolOutcome::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                offset = next_job(&self.jobs) => offset,
            };
            let Some(offset) = next else { break };

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.fetch_with_retry(offset) => result,
            };

            match fetched {
                Ok(page) => {
                    if self.results.send(page).await.is_err() {
                        warn!(worker = self.id, offset, "Result queue closed, stopping worker");
                        break;
                    }
                    outcome.fetched += 1;
                },
                Err(error) => {
                    warn!(worker = self.id, offset, error = %error, "Dropping page after fetch failure");
                    outcome.failures.push(PageFailure { offset, error });
                },
            }
        }

        outcome
    }

    async fn fetch_with_retry(&self, offset: u64) -> Result<Page, FetchError> {
        let mut delay = self.retry.backoff;
        let mut attempt = 0;

        loop {
            match self.source.fetch(offset).await {
                Ok(page) => return Ok(page),
                Err(error) if attempt < self.retry.retries && error.is_retryable() => {
                    attempt += 1;
                    debug!(worker = self.id, offset, attempt, error = %error, "Retrying page");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                },
                Err(error) => return Err(error),
            }
        }
    }
}

async fn next_job(jobs: &JobQueue) -> Option<u64> {
    jobs.lock().await.recv().await
}
