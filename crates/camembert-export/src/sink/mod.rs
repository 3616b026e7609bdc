//! Persistence sinks
//!
//! Each sink writes the whole aggregate to one target. [`persist`] runs every
//! sink on the blocking thread pool at the same time and collects each
//! outcome separately, so a failing sink never prevents another from being
//! written.

mod relational;
mod tabular;

pub use relational::{is_valid_table_name, SqliteSink};
pub use tabular::CsvSink;

use crate::aggregator::Aggregate;
use crate::error::SinkError;
use crate::model::Issue;
use std::sync::Arc;
use tracing::{error, info};

/// A persistence target for exported issues
pub trait Sink: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Write every issue, returning the number of rows written
    fn write(&self, issues: &[Issue]) -> Result<usize, SinkError>;
}

/// Result of one sink
#[derive(Debug)]
pub struct SinkOutcome {
    pub sink: &'static str,
    pub result: Result<usize, SinkError>,
}

/// Results of every sink, in the order the sinks were given
#[derive(Debug, Default)]
pub struct PersistReport {
    pub outcomes: Vec<SinkOutcome>,
}

impl PersistReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &SinkError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.sink, e)))
    }

    pub fn outcome(&self, sink: &str) -> Option<&SinkOutcome> {
        self.outcomes.iter().find(|o| o.sink == sink)
    }
}

/// Write the aggregate to every sink, attempting all of them
pub async fn persist(aggregate: Aggregate, sinks: Vec<Arc<dyn Sink>>) -> PersistReport {
    let issues: Arc<[Issue]> = aggregate.into_issues().into();

    let tasks: Vec<_> = sinks
        .into_iter()
        .map(|sink| {
            let issues = Arc::clone(&issues);
            let name = sink.name();
            let task = tokio::task::spawn_blocking(move || sink.write(&issues));
            (name, task)
        })
        .collect();

    let mut report = PersistReport::default();
    for (sink, task) in tasks {
        let result = task
            .await
            .unwrap_or_else(|e| Err(SinkError::Aborted(e.to_string())));

        match &result {
            Ok(rows) => info!(sink, rows, "Sink written"),
            Err(e) => error!(sink, error = %e, "Sink failed"),
        }
        report.outcomes.push(SinkOutcome { sink, result });
    }

    report
}
