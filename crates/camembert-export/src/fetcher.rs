//! Page fetching from the remote search endpoint
//!
//! [`PageSource`] is the only thing the pipeline knows about the remote side:
//! hand it an offset, get back one page or a [`FetchError`]. [`JiraClient`] is
//! the HTTP implementation. It never retries; that is up to the worker pool.

use crate::config::SourceConfig;
use crate::error::{ConfigError, ExportError, FetchError};
use crate::model::Page;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

/// A paginated record source addressed by offset
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the page starting at `offset`
    async fn fetch(&self, offset: u64) -> Result<Page, FetchError>;
}

/// HTTP client for a Jira-style `search` endpoint
pub struct JiraClient {
    client: Client,
    base_url: Url,
    project_key: String,
    page_size: u64,
}

impl JiraClient {
    pub fn new(config: &SourceConfig) -> Result<Self, ExportError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;

        let client = Client::builder()
            .default_headers(header_map(&config.headers)?)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url,
            project_key: config.project_key.clone(),
            page_size: config.page_size,
        })
    }

    /// URL of the page starting at `offset`
    pub fn page_url(&self, offset: u64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("jql", &format!("project={}", self.project_key))
            .append_pair("startAt", &offset.to_string())
            .append_pair("maxResults", &self.page_size.to_string())
            .append_pair("fields", "*all");
        url
    }
}

#[async_trait]
impl PageSource for JiraClient {
    async fn fetch(&self, offset: u64) -> Result<Page, FetchError> {
        info!(offset, "Fetching issues");

        let response = self
            .client
            .get(self.page_url(offset))
            .send()
            .await
            .map_err(|source| FetchError::Transport { offset, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { offset, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport { offset, source })?;

        let page: Page = serde_json::from_slice(&body)
            .map_err(|source| FetchError::Decode { offset, source })?;

        debug!(offset, issues = page.len(), total = page.total, "Page received");
        Ok(page)
    }
}

/// Build the request header set, marking credential headers sensitive
pub fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());

    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::Header(name.clone()))?;
        let mut header_value =
            HeaderValue::from_str(value).map_err(|_| ConfigError::Header(name.clone()))?;

        if header_name == AUTHORIZATION || header_name == COOKIE {
            header_value.set_sensitive(true);
        }

        map.insert(header_name, header_value);
    }

    Ok(map)
}

/// `Authorization` value for HTTP basic auth
pub fn basic_auth(user: &str, token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{token}")))
}

/// `Authorization` value for a bearer token
pub fn bearer_auth(token: &str) -> String {
    format!("Bearer {token}")
}
