use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::page::PageRecord;
use crate::task::ResearchTask;
use crate::ContentSource;

pub const DEFAULT_CRAWLER_URL: &str = "https://api.firecrawll.com/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub api_key: String,
    pub base_url: String,
}

impl CrawlerConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_CRAWLER_URL.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("crawler request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("crawler returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed crawler payload ({status}): {message}")]
    Malformed {
        status: u16,
        body: String,
        message: String,
    },
}

impl AcquisitionError {
    /// Remote status code, when the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            AcquisitionError::Transport(e) => e.status().map(|s| s.as_u16()),
            AcquisitionError::Status { status, .. }
            | AcquisitionError::Malformed { status, .. } => Some(*status),
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            AcquisitionError::Transport(_) => None,
            AcquisitionError::Status { body, .. } | AcquisitionError::Malformed { body, .. } => {
                Some(body)
            }
        }
    }
}

/// Options for the crawler's search endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter_domain: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    filter_content: bool,
    extract_metadata: bool,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(flatten)]
    options: &'a SearchOptions,
}

#[derive(Deserialize)]
struct CrawlResponse {
    results: Vec<PageRecord>,
}

#[derive(Clone)]
pub struct CrawlerClient {
    config: CrawlerConfig,
    client: reqwest::Client,
}

impl CrawlerClient {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Crawl starting from the task's query
    pub async fn crawl(&self, task: &ResearchTask) -> Result<Vec<PageRecord>, AcquisitionError> {
        let request = CrawlRequest {
            url: &task.query,
            depth: task.max_depth,
            filter_domain: task.domains.as_deref(),
            max_pages: task.max_pages,
            language: task.language.as_deref(),
            filter_content: true,
            extract_metadata: true,
        };

        self.post("crawl", &request).await
    }

    /// Search pages matching a free-text query
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<PageRecord>, AcquisitionError> {
        let request = SearchRequest { query, options };
        self.post("search", &request).await
    }

    async fn post<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Vec<PageRecord>, AcquisitionError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let response = self.client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "Crawler request failed");
            return Err(AcquisitionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CrawlResponse = serde_json::from_str(&text).map_err(|e| {
            AcquisitionError::Malformed {
                status: status.as_u16(),
                body: text.clone(),
                message: e.to_string(),
            }
        })?;

        debug!(endpoint, pages = parsed.results.len(), "Crawler returned pages");
        Ok(parsed.results)
    }
}

#[async_trait]
impl ContentSource for CrawlerClient {
    async fn fetch(&self, task: &ResearchTask) -> Result<Vec<PageRecord>, AcquisitionError> {
        self.crawl(task).await
    }
}
