//! Result aggregation
//!
//! A single task owns the growing issue list and is its only writer. It
//! drains the result queue until every producer has hung up; awaiting
//! [`Aggregator::finish`] is the point after which the collected issues may
//! be read.

use crate::error::ExportError;
use crate::model::{Issue, Page};
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The frozen, unordered union of every fetched page
#[derive(Debug, Default)]
pub struct Aggregate {
    issues: Vec<Issue>,
    pages: usize,
}

impl Aggregate {
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Pages that contributed, including the first
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn push_page(&mut self, page: Page) {
        self.pages += 1;
        self.issues.extend(page.issues);
    }
}

/// Handle to the running aggregation task
pub struct Aggregator {
    handle: JoinHandle<Aggregate>,
}

impl Aggregator {
    /// Start draining `results`, seeded with the synchronously fetched first page
    pub fn spawn(first: Page, mut results: mpsc::Receiver<Page>, progress: ProgressBar) -> Self {
        let handle = tokio::spawn(async move {
            let mut aggregate = Aggregate::default();
            aggregate.push_page(first);
            progress.inc(1);

            while let Some(page) = results.recv().await {
                debug!(issues = page.len(), "Aggregating page");
                aggregate.push_page(page);
                progress.inc(1);
                progress.set_message(format!("{} issues", aggregate.len()));
            }

            progress.finish_and_clear();
            aggregate
        });

        Self { handle }
    }

    /// Stop aggregating without waiting for the producers
    pub fn abort(self) {
        self.handle.abort();
    }

    /// Wait until every produced page has been drained
    pub async fn finish(self) -> Result<Aggregate, ExportError> {
        self.handle
            .await
            .map_err(|e| ExportError::Aggregator(e.to_string()))
    }
}
