//! Camembert Export Library
//!
//! Exports every issue of one tracker project into a CSV file and a SQLite
//! table. Pages of the search endpoint are fetched concurrently by a bounded
//! worker pool, collected by a single aggregator, and written to both sinks
//! once the last page is in.
//!
//! # Example
//!
//! ```no_run
//! use camembert_export::{export_issues, ExportConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ExportConfig::load(None)?;
//!     let report = export_issues(&config, CancellationToken::new()).await?;
//!     println!("{} issues exported", report.stats.issues);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregator;
pub mod config;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod model;
pub mod pipeline;
pub mod planner;
pub mod pool;
pub mod progress;
pub mod sink;

pub use config::{ExportConfig, PipelineConfig, SinkConfig, SourceConfig};
pub use error::{ConfigError, ExportError, FetchError, Result, SinkError};
pub use export::{export_from_source, export_issues, ExportReport};
pub use fetcher::{JiraClient, PageSource};
pub use model::{Fields, Issue, Page};
