//! Camembert Export - project issue exporter

use anyhow::{Context, Result};
use camembert_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use camembert_export::config::parse_header;
use camembert_export::{export_issues, ExportConfig, ExportError, ExportReport};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EXIT_FATAL: u8 = 1;
const EXIT_SINK_FAILED: u8 = 2;
const EXIT_PAGES_DROPPED: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "camembert-export")]
#[command(author, version, about = "Export every issue of a tracker project to CSV and SQLite")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "CAMEMBERT_CONFIG")]
    config: Option<PathBuf>,

    /// Search endpoint URL
    #[arg(long)]
    base_url: Option<String>,

    /// Project key to export
    #[arg(short, long)]
    project: Option<String>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Output CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Output SQLite database
    #[arg(long)]
    db: Option<PathBuf>,

    /// Table written in the database
    #[arg(long)]
    table: Option<String>,

    /// Issues per page
    #[arg(long)]
    page_size: Option<u64>,

    /// Concurrent page fetches
    #[arg(short, long)]
    workers: Option<usize>,

    /// Capacity of the job and result queues
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Extra attempts for a failed page
    #[arg(long)]
    retries: Option<u32>,

    /// First retry delay in milliseconds, doubled on each further attempt
    #[arg(long)]
    retry_backoff_ms: Option<u64>,

    /// Show a progress bar
    #[arg(long, overrides_with = "no_progress")]
    progress: bool,

    /// Hide the progress bar even when enabled by config or environment
    #[arg(long, overrides_with = "progress")]
    no_progress: bool,

    /// Exit with status 3 when any page was dropped
    #[arg(long)]
    strict: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File, then environment, then flags
    fn export_config(&self) -> Result<ExportConfig> {
        let config = self.apply(ExportConfig::load(self.config.as_deref())?)?;
        config.validate()?;
        Ok(config)
    }

    /// Override `config` with every flag that was given
    fn apply(&self, mut config: ExportConfig) -> Result<ExportConfig> {
        if let Some(url) = &self.base_url {
            config.source.base_url = url.clone();
        }
        if let Some(project) = &self.project {
            config.source.project_key = project.clone();
        }
        for raw in &self.headers {
            let (name, value) = parse_header(raw)?;
            config.source.headers.insert(name, value);
        }
        if let Some(size) = self.page_size {
            config.source.page_size = size;
        }
        if let Some(secs) = self.timeout_secs {
            config.source.request_timeout_secs = secs;
        }

        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.pipeline.queue_capacity = capacity;
        }
        if let Some(retries) = self.retries {
            config.pipeline.page_retries = retries;
        }
        if let Some(backoff) = self.retry_backoff_ms {
            config.pipeline.retry_backoff_ms = backoff;
        }
        if self.progress {
            config.pipeline.show_progress = true;
        }
        if self.no_progress {
            config.pipeline.show_progress = false;
        }

        if let Some(path) = &self.csv {
            config.sink.csv_path = path.clone();
        }
        if let Some(path) = &self.db {
            config.sink.db_path = path.clone();
        }
        if let Some(table) = &self.table {
            config.sink.table_name = table.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("camembert-export")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // Exporting still works without logging
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        },
    };

    match run(&cli).await {
        Ok(report) => exit_code(&report, cli.strict),
        Err(e) => {
            error!(error = %e, "Export failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        },
    }
}

async fn run(cli: &Cli) -> Result<ExportReport> {
    let config = cli.export_config().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling export");
            on_interrupt.cancel();
        }
    });

    match export_issues(&config, cancel).await {
        Ok(report) => Ok(report),
        Err(e @ ExportError::Cancelled { .. }) => Err(e.into()),
        Err(e) => Err(anyhow::Error::new(e).context(format!(
            "Export of project '{}' failed",
            config.source.project_key
        ))),
    }
}

fn exit_code(report: &ExportReport, strict: bool) -> ExitCode {
    for (sink, e) in report.sink_failures() {
        eprintln!("Error: {sink} sink failed: {e}");
    }

    if report.sink_failures().next().is_some() {
        return ExitCode::from(EXIT_SINK_FAILED);
    }

    if !report.stats.is_complete() {
        let offsets: Vec<u64> = report.page_failures.iter().map(|f| f.offset).collect();
        eprintln!(
            "Warning: {} of {} pages could not be fetched (offsets {:?})",
            report.stats.failed_pages, report.stats.planned_pages, offsets
        );
        if strict {
            return ExitCode::from(EXIT_PAGES_DROPPED);
        }
    }

    info!(
        issues = report.stats.issues,
        run_id = %report.run_id,
        "Export complete"
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn apply(args: &[&str], base: ExportConfig) -> ExportConfig {
        let cli = Cli::try_parse_from(std::iter::once("camembert-export").chain(args.iter().copied()))
            .unwrap();
        cli.apply(base).unwrap()
    }

    #[test]
    fn test_pipeline_flags_override_config() {
        let config = apply(
            &["--retries", "2", "--retry-backoff-ms", "40", "--workers", "3"],
            ExportConfig::default(),
        );

        assert_eq!(config.pipeline.page_retries, 2);
        assert_eq!(config.pipeline.retry_backoff_ms, 40);
        assert_eq!(config.pipeline.workers, 3);
    }

    #[test]
    fn test_no_progress_turns_off_configured_bar() {
        let mut base = ExportConfig::default();
        base.pipeline.show_progress = true;

        assert!(!apply(&["--no-progress"], base.clone()).pipeline.show_progress);
        assert!(apply(&[], base.clone()).pipeline.show_progress);
        assert!(apply(&["--no-progress", "--progress"], base).pipeline.show_progress);
    }

    #[test]
    fn test_repeated_headers_are_all_kept() {
        let config = apply(
            &["-H", "Accept: application/json", "-H", "Authorization: Bearer t"],
            ExportConfig::default(),
        );

        assert_eq!(config.source.headers["Accept"], "application/json");
        assert_eq!(config.source.headers["Authorization"], "Bearer t");
    }
}
