//! HTTP clients for the local bibliographic catalog and for the
//! citation-key sidecar.
//!
//! The catalog speaks a Zotero-style web API: `GET /items?q=...` returning
//! item envelopes with the bibliographic fields nested under `data`. The
//! sidecar speaks Better-BibTeX JSON-RPC (`item.citationkey`) on a local
//! port. Both implement the core's service traits; HTTP status classes map
//! onto the transient [`ServiceError`] variants so the core's retry gate
//! can do its job.

use std::time::Duration;

use refmark_core::{CatalogItem, CitationKeyService, LibraryCatalog, ServiceError};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Map an HTTP status onto the core's error taxonomy.
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

/// Item envelope as returned by the catalog API.
#[derive(Debug, Deserialize)]
struct ItemPayload {
    key: String,
    data: ItemData,
}

#[derive(Debug, Deserialize)]
struct ItemData {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<ItemPayload> for CatalogItem {
    fn from(item: ItemPayload) -> Self {
        CatalogItem {
            key: item.key,
            title: item.data.title,
            doi: item.data.doi.filter(|d| !d.is_empty()),
            url: item.data.url.filter(|u| !u.is_empty()),
        }
    }
}

/// Client for the catalog web API.
pub struct CatalogClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, LibraryError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    async fn get_items(&self, query: &[(&str, &str)]) -> Result<Vec<CatalogItem>, ServiceError> {
        let url = format!("{}/items", self.base_url);
        log::debug!("catalog query {url} {query:?}");
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.send().await.map_err(classify_transport)?;
        classify_status(response.status())?;
        let items: Vec<ItemPayload> = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("invalid catalog response: {e}")))?;
        Ok(items.into_iter().map(Into::into).collect())
    }
}

impl LibraryCatalog for CatalogClient {
    async fn find_by_title(&self, title: &str) -> Result<Vec<CatalogItem>, ServiceError> {
        self.get_items(&[("q", title), ("qmode", "titleCreatorYear")])
            .await
    }

    async fn find_by_doi(&self, doi: &str) -> Result<Vec<CatalogItem>, ServiceError> {
        self.get_items(&[("q", doi), ("qmode", "everything")]).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Vec<CatalogItem>, ServiceError> {
        self.get_items(&[("q", url), ("qmode", "everything")]).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<CatalogItem>, ServiceError> {
        let url = format!("{}/items/{key}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        let response = request.send().await.map_err(classify_transport)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        classify_status(response.status())?;
        let item: ItemPayload = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("invalid catalog response: {e}")))?;
        Ok(Some(item.into()))
    }
}

/// Client for the citation-key JSON-RPC sidecar.
pub struct CitationKeyClient {
    endpoint: String,
    client: reqwest::Client,
}

impl CitationKeyClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LibraryError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

/// Pull one item's citation key out of an `item.citationkey` response.
fn citation_key_from_response(body: &Value, item_key: &str) -> Option<String> {
    body.get("result")?
        .get(item_key)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl CitationKeyService for CitationKeyClient {
    async fn citation_key(&self, item_key: &str) -> Result<Option<String>, ServiceError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "item.citationkey",
            "params": [[item_key]],
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(classify_transport)?;
        classify_status(response.status())?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("invalid JSON-RPC response: {e}")))?;
        Ok(citation_key_from_response(&body, item_key))
    }
}
