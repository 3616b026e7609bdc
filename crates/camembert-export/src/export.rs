//! One-call project export

use crate::config::ExportConfig;
use crate::error::{ConfigError, ExportError, Result, SinkError};
use crate::fetcher::{JiraClient, PageSource};
use crate::pipeline::{ingest, IngestStats};
use crate::pool::PageFailure;
use crate::sink::{persist, CsvSink, PersistReport, Sink, SqliteSink};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What an export run did
#[derive(Debug)]
pub struct ExportReport {
    pub run_id: Uuid,
    pub project_key: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: IngestStats,
    pub page_failures: Vec<PageFailure>,
    pub persist: PersistReport,
}

impl ExportReport {
    /// Every page fetched and every sink written
    pub fn is_complete(&self) -> bool {
        self.stats.is_complete() && self.persist.is_success()
    }

    pub fn sink_failures(&self) -> impl Iterator<Item = (&'static str, &SinkError)> {
        self.persist.failures()
    }
}

/// Export every issue of the configured project to the CSV file and the
/// SQLite table.
///
/// Returns `Err` when nothing could be exported: invalid configuration, a
/// failed first page, or cancellation. Pages that fail later are dropped and
/// sink failures are reported in the [`ExportReport`]; both sinks are always
/// attempted.
pub async fn export_issues(config: &ExportConfig, cancel: CancellationToken) -> Result<ExportReport> {
    config.validate()?;
    let client = JiraClient::new(&config.source)?;
    export_from_source(Arc::new(client), config, cancel).await
}

/// [`export_issues`] against any page source
pub async fn export_from_source(
    source: Arc<dyn PageSource>,
    config: &ExportConfig,
    cancel: CancellationToken,
) -> Result<ExportReport> {
    let run_id = Uuid::new_v4();
    let span = info_span!("export", %run_id, project = %config.source.project_key);

    run_export(run_id, source, config, cancel)
        .instrument(span)
        .await
}

async fn run_export(
    run_id: Uuid,
    source: Arc<dyn PageSource>,
    config: &ExportConfig,
    cancel: CancellationToken,
) -> Result<ExportReport> {
    let started_at = Utc::now();
    info!("Exporting issues");

    let sqlite = SqliteSink::new(&config.sink.db_path, config.sink.table_name.clone())
        .map_err(|e| ConfigError::invalid("table_name", e.to_string()))?;
    let csv = CsvSink::new(&config.sink.csv_path);
    debug!(
        csv = %csv.path().display(),
        db = %sqlite.path().display(),
        table = sqlite.table(),
        "Sinks configured"
    );
    let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(csv), Arc::new(sqlite)];

    let ingested = ingest(source, config.source.page_size, &config.pipeline, cancel).await?;
    if ingested.stats.cancelled {
        return Err(ExportError::Cancelled {
            collected: ingested.aggregate.len(),
        });
    }

    let persist = persist(ingested.aggregate, sinks).await;

    let report = ExportReport {
        run_id,
        project_key: config.source.project_key.clone(),
        started_at,
        finished_at: Utc::now(),
        stats: ingested.stats,
        page_failures: ingested.failures,
        persist,
    };

    let elapsed_ms = (report.finished_at - report.started_at).num_milliseconds();
    if report.is_complete() {
        info!(issues = report.stats.issues, elapsed_ms, "Issues export completed successfully");
    } else {
        warn!(
            issues = report.stats.issues,
            failed_pages = report.stats.failed_pages,
            failed_sinks = report.sink_failures().count(),
            elapsed_ms,
            "Issues export finished with failures"
        );
    }

    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::{Issue, Page};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use rusqlite::Connection;
    use std::path::Path;

    /// Two pages of five issues; `fail_second` breaks the second one
    struct TwoPages {
        fail_second: bool,
    }

    #[async_trait]
    impl PageSource for TwoPages {
        async fn fetch(&self, offset: u64) -> std::result::Result<Page, FetchError> {
            if offset == 5 && self.fail_second {
                return Err(FetchError::Status {
                    offset,
                    status: StatusCode::BAD_GATEWAY,
                });
            }
            let issues = (offset..offset + 5)
                .map(|n| Issue::new(n.to_string(), format!("CAM-{n}"), Default::default()))
                .collect();
            Ok(Page::new(issues, 10))
        }
    }

    fn config(dir: &Path) -> ExportConfig {
        let mut config = ExportConfig::default();
        config.source.base_url = "http://tracker.invalid/search".to_string();
        config.source.project_key = "CAM".to_string();
        config.source.page_size = 5;
        config.sink.csv_path = dir.join("issues.csv");
        config.sink.db_path = dir.join("issues.db");
        config
    }

    fn table_rows(path: &Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_export_writes_both_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let report = export_from_source(
            Arc::new(TwoPages { fail_second: false }),
            &config,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.project_key, "CAM");
        assert!(report.finished_at >= report.started_at);
        assert_eq!(table_rows(&config.sink.db_path), 10);
        let csv = std::fs::read_to_string(&config.sink.csv_path).unwrap();
        assert_eq!(csv.lines().count(), 11);
    }

    #[tokio::test]
    async fn test_failed_page_still_persists_reduced_set() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let report = export_from_source(
            Arc::new(TwoPages { fail_second: true }),
            &config,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!report.is_complete());
        assert!(report.persist.is_success());
        assert_eq!(report.page_failures.len(), 1);
        assert_eq!(table_rows(&config.sink.db_path), 5);
    }

    #[tokio::test]
    async fn test_csv_failure_does_not_prevent_database_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.sink.csv_path = dir.path().to_path_buf();

        let report = export_from_source(
            Arc::new(TwoPages { fail_second: false }),
            &config,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let failures: Vec<_> = report.sink_failures().map(|(sink, _)| sink).collect();
        assert_eq!(failures, vec!["csv"]);
        assert_eq!(table_rows(&config.sink.db_path), 10);
    }

    #[tokio::test]
    async fn test_cancelled_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = export_from_source(Arc::new(TwoPages { fail_second: false }), &config, cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled { .. }));
        assert!(!config.sink.csv_path.exists());
        assert!(!config.sink.db_path.exists());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_any_request() {
        let mut config = ExportConfig::default();
        config.source.project_key = "CAM".to_string();

        let err = export_issues(&config, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ExportError::Config(ConfigError::Missing("base_url"))
        ));
    }
}
