//! Export configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `CAMEMBERT_*` environment variables, then command-line flags. The result
//! is checked with [`ExportConfig::validate`] before any request is made.
//!
//! ```toml
//! [source]
//! base_url = "https://tracker.example.com/rest/api/2/search"
//! project_key = "CAM"
//! page_size = 1000
//!
//! [source.headers]
//! Accept = "application/json"
//!
//! [pipeline]
//! workers = 12
//!
//! [sink]
//! csv_path = "issues.csv"
//! db_path = "issues.db"
//! table_name = "issues"
//! ```

use crate::error::ConfigError;
use crate::fetcher::{basic_auth, bearer_auth};
use crate::sink::is_valid_table_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

// ============================================================================
// Defaults
// ============================================================================

/// Issues requested per page (`maxResults`).
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Concurrent page fetches.
pub const DEFAULT_WORKERS: usize = 12;

/// Capacity of the job and result queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// First retry delay in milliseconds; doubles on each further attempt.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

pub const DEFAULT_TABLE_NAME: &str = "issues";

/// Remote search endpoint settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Full URL of the paginated search endpoint
    pub base_url: String,

    /// Project key used in the `project=<KEY>` filter
    pub project_key: String,

    /// Headers sent with every request, typically authentication
    pub headers: BTreeMap<String, String>,

    pub page_size: u64,

    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            project_key: String::new(),
            headers: BTreeMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Header values usually carry credentials, so only names are printed.
impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("project_key", &self.project_key)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of concurrent page fetchers
    pub workers: usize,

    /// Bound of the job queue and of the result queue
    pub queue_capacity: usize,

    /// Extra attempts for a failed page. 0 drops a page on its first failure.
    pub page_retries: u32,

    pub retry_backoff_ms: u64,

    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            page_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            show_progress: false,
        }
    }
}

impl PipelineConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Persistence targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub csv_path: PathBuf,

    pub db_path: PathBuf,

    pub table_name: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::new(),
            db_path: PathBuf::new(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

/// Everything one export run needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub sink: SinkConfig,
}

impl ExportConfig {
    /// Load settings from a TOML file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, or the given file, with the environment applied on top
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.merge_env()
    }

    /// Apply `CAMEMBERT_*` environment variables on top of this configuration
    ///
    /// - `CAMEMBERT_BASE_URL`, `CAMEMBERT_PROJECT_KEY`
    /// - `CAMEMBERT_PAGE_SIZE`, `CAMEMBERT_REQUEST_TIMEOUT_SECS`
    /// - `CAMEMBERT_WORKERS`, `CAMEMBERT_QUEUE_CAPACITY`, `CAMEMBERT_PAGE_RETRIES`,
    ///   `CAMEMBERT_RETRY_BACKOFF_MS`, `CAMEMBERT_SHOW_PROGRESS` (`true`/`false`)
    /// - `CAMEMBERT_CSV_PATH`, `CAMEMBERT_DB_PATH`, `CAMEMBERT_TABLE_NAME`
    /// - `CAMEMBERT_API_TOKEN`: bearer token, or basic auth password when
    ///   `CAMEMBERT_API_USER` is also set
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(url) = std::env::var("CAMEMBERT_BASE_URL") {
            self.source.base_url = url;
        }

        if let Ok(key) = std::env::var("CAMEMBERT_PROJECT_KEY") {
            self.source.project_key = key;
        }

        if let Some(size) = env_parse("CAMEMBERT_PAGE_SIZE", "page_size")? {
            self.source.page_size = size;
        }

        if let Some(secs) = env_parse("CAMEMBERT_REQUEST_TIMEOUT_SECS", "request_timeout_secs")? {
            self.source.request_timeout_secs = secs;
        }

        if let Some(workers) = env_parse("CAMEMBERT_WORKERS", "workers")? {
            self.pipeline.workers = workers;
        }

        if let Some(capacity) = env_parse("CAMEMBERT_QUEUE_CAPACITY", "queue_capacity")? {
            self.pipeline.queue_capacity = capacity;
        }

        if let Some(retries) = env_parse("CAMEMBERT_PAGE_RETRIES", "page_retries")? {
            self.pipeline.page_retries = retries;
        }

        if let Some(backoff) = env_parse("CAMEMBERT_RETRY_BACKOFF_MS", "retry_backoff_ms")? {
            self.pipeline.retry_backoff_ms = backoff;
        }

        if let Some(show) = env_parse("CAMEMBERT_SHOW_PROGRESS", "show_progress")? {
            self.pipeline.show_progress = show;
        }

        if let Ok(path) = std::env::var("CAMEMBERT_CSV_PATH") {
            self.sink.csv_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("CAMEMBERT_DB_PATH") {
            self.sink.db_path = PathBuf::from(path);
        }

        if let Ok(table) = std::env::var("CAMEMBERT_TABLE_NAME") {
            self.sink.table_name = table;
        }

        if let Ok(token) = std::env::var("CAMEMBERT_API_TOKEN") {
            let value = match std::env::var("CAMEMBERT_API_USER") {
                Ok(user) => basic_auth(&user, &token),
                Err(_) => bearer_auth(&token),
            };
            self.source
                .headers
                .insert("Authorization".to_string(), value);
        }

        Ok(self)
    }

    /// Check that the configuration describes a runnable export
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url"));
        }

        let url = Url::parse(&self.source.base_url)
            .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if self.source.project_key.trim().is_empty() {
            return Err(ConfigError::Missing("project_key"));
        }

        if self.source.page_size == 0 {
            return Err(ConfigError::invalid("page_size", "must be at least 1"));
        }

        if self.source.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("request_timeout_secs", "must be at least 1"));
        }

        if self.pipeline.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be at least 1"));
        }

        if self.sink.csv_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("csv_path"));
        }

        if self.sink.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing("db_path"));
        }

        if !is_valid_table_name(&self.sink.table_name) {
            return Err(ConfigError::invalid(
                "table_name",
                format!("'{}' is not a plain SQL identifier", self.sink.table_name),
            ));
        }

        crate::fetcher::header_map(&self.source.headers)?;

        Ok(())
    }
}

/// Split a `Name: value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::Header(raw.to_string()))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::Header(raw.to_string()));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

fn env_parse<T: FromStr>(var: &str, key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("{var}='{raw}' cannot be parsed"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn runnable() -> ExportConfig {
        let mut config = ExportConfig::default();
        config.source.base_url = "https://tracker.example.com/rest/api/2/search".to_string();
        config.source.project_key = "CAM".to_string();
        config.sink.csv_path = PathBuf::from("out/issues.csv");
        config.sink.db_path = PathBuf::from("out/issues.db");
        config
    }

    #[test]
    fn test_defaults() {
        let config = ExportConfig::default();
        assert_eq!(config.source.page_size, 1000);
        assert_eq!(config.pipeline.workers, 12);
        assert_eq!(config.pipeline.queue_capacity, 10);
        assert_eq!(config.pipeline.page_retries, 0);
        assert_eq!(config.sink.table_name, "issues");
    }

    #[test]
    fn test_from_file_keeps_defaults_for_absent_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[source]
base_url = "https://tracker.example.com/rest/api/2/search"
project_key = "CAM"

[source.headers]
Authorization = "Bearer secret"

[pipeline]
workers = 4

[sink]
csv_path = "issues.csv"
db_path = "issues.db"
table_name = "cam_issues"
"#
        )
        .unwrap();

        let config = ExportConfig::from_file(file.path()).unwrap();
        assert_eq!(config.source.project_key, "CAM");
        assert_eq!(config.source.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.pipeline.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.sink.table_name, "cam_issues");
        assert_eq!(config.source.headers["Authorization"], "Bearer secret");
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nworkers = \"many\"").unwrap();

        assert!(matches!(
            ExportConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_merge_env() {
        std::env::set_var("CAMEMBERT_PROJECT_KEY", "BRIE");
        std::env::set_var("CAMEMBERT_WORKERS", "3");
        std::env::set_var("CAMEMBERT_API_USER", "ops@example.com");
        std::env::set_var("CAMEMBERT_API_TOKEN", "t0ken");

        let config = runnable().merge_env();

        std::env::remove_var("CAMEMBERT_PROJECT_KEY");
        std::env::remove_var("CAMEMBERT_WORKERS");
        std::env::remove_var("CAMEMBERT_API_USER");
        std::env::remove_var("CAMEMBERT_API_TOKEN");

        let config = config.unwrap();
        assert_eq!(config.source.project_key, "BRIE");
        assert_eq!(config.pipeline.workers, 3);
        assert_eq!(
            config.source.headers["Authorization"],
            basic_auth("ops@example.com", "t0ken")
        );
    }

    #[test]
    #[serial]
    fn test_merge_env_pipeline_tuning() {
        std::env::set_var("CAMEMBERT_RETRY_BACKOFF_MS", "25");
        std::env::set_var("CAMEMBERT_SHOW_PROGRESS", "false");

        let mut base = runnable();
        base.pipeline.show_progress = true;
        let config = base.merge_env();

        std::env::remove_var("CAMEMBERT_RETRY_BACKOFF_MS");
        std::env::remove_var("CAMEMBERT_SHOW_PROGRESS");

        let config = config.unwrap();
        assert_eq!(config.pipeline.retry_backoff(), Duration::from_millis(25));
        assert!(!config.pipeline.show_progress);
    }

    #[test]
    #[serial]
    fn test_merge_env_rejects_non_numeric() {
        std::env::set_var("CAMEMBERT_PAGE_SIZE", "lots");
        let result = runnable().merge_env();
        std::env::remove_var("CAMEMBERT_PAGE_SIZE");

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "page_size", .. })
        ));
    }

    #[test]
    fn test_validate_accepts_runnable_config() {
        runnable().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_and_zero_values() {
        let mut config = runnable();
        config.source.project_key = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("project_key"))));

        let mut config = runnable();
        config.source.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "page_size", .. })
        ));

        let mut config = runnable();
        config.pipeline.workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "workers", .. })
        ));

        let mut config = runnable();
        config.source.base_url = "ftp://tracker.example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "base_url", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_injected_table_name() {
        let mut config = runnable();
        config.sink.table_name = "issues; DROP TABLE users".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "table_name", .. })
        ));
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Authorization: Bearer abc:def").unwrap(),
            ("Authorization".to_string(), "Bearer abc:def".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_debug_hides_header_values() {
        let mut config = runnable();
        config
            .source
            .headers
            .insert("Authorization".to_string(), "Bearer hunter2".to_string());

        let printed = format!("{:?}", config);
        assert!(printed.contains("Authorization"));
        assert!(!printed.contains("hunter2"));
    }
}
