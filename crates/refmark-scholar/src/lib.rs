//! Client for the external academic search service.
//!
//! Two endpoints: a title search returning lightweight candidates
//! (`paperId` + `title`), and a per-paper details lookup. The service is
//! aggressively rate limited upstream; this client only classifies failures
//! (429/403/timeout) so the core's shared gate and bounded retry decide
//! pacing. Request pacing itself lives in the core, never here.

use std::time::Duration;

use refmark_core::{PaperDetails, SearchHit, SearchService, ServiceError};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.semanticscholar.org/v1";
const DEFAULT_SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(240);
const DEFAULT_SEARCH_LIMIT: usize = 5;

#[derive(Error, Debug)]
pub enum ScholarError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    #[serde(default)]
    data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    #[serde(rename = "paperId")]
    paper_id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<DetailsPayload> for PaperDetails {
    fn from(details: DetailsPayload) -> Self {
        PaperDetails {
            title: details.title.filter(|s| !s.is_empty() && s != "null"),
            doi: details.doi.filter(|s| !s.is_empty() && s != "null"),
            url: details.url.filter(|s| !s.is_empty() && s != "null"),
        }
    }
}

fn classify_status(status: reqwest::StatusCode) -> Result<(), ServiceError> {
    match status.as_u16() {
        200..=299 => Ok(()),
        429 => Err(ServiceError::RateLimited),
        403 => Err(ServiceError::Forbidden),
        408 | 504 => Err(ServiceError::Timeout),
        code => Err(ServiceError::Other(format!("unexpected HTTP status {code}"))),
    }
}

fn classify_transport(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Other(err.to_string())
    }
}

/// Client for the academic search API.
pub struct ScholarClient {
    api_url: String,
    search_url: String,
    api_key: Option<String>,
    limit: usize,
    client: reqwest::Client,
}

impl ScholarClient {
    pub fn new(api_key: Option<String>) -> Result<Self, ScholarError> {
        Self::with_urls(DEFAULT_API_URL, DEFAULT_SEARCH_URL, api_key)
    }

    pub fn with_urls(
        api_url: impl Into<String>,
        search_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ScholarError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            search_url: search_url.into().trim_end_matches('/').to_string(),
            api_key,
            limit: DEFAULT_SEARCH_LIMIT,
            client,
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        request
    }
}

impl SearchService for ScholarClient {
    async fn search_by_title(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let url = format!(
            "{}/search?query={}&limit={}&fields=title",
            self.search_url,
            urlencoding::encode(query),
            self.limit
        );
        log::debug!("search {url}");
        let response = self.request(&url).send().await.map_err(classify_transport)?;
        classify_status(response.status())?;
        let payload: SearchPayload = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("invalid search response: {e}")))?;
        Ok(payload
            .data
            .into_iter()
            .filter_map(|entry| {
                let title = entry.title.filter(|t| !t.is_empty())?;
                Some(SearchHit {
                    id: entry.paper_id,
                    title,
                })
            })
            .collect())
    }

    async fn fetch_details(&self, id: &str) -> Result<Option<PaperDetails>, ServiceError> {
        let url = format!("{}/paper/{id}", self.api_url);
        log::debug!("details {url}");
        let response = self.request(&url).send().await.map_err(classify_transport)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        classify_status(response.status())?;
        let payload: DetailsPayload = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("invalid details response: {e}")))?;
        Ok(Some(payload.into()))
    }
}
