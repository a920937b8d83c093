//! Service traits and the three source resolvers.
//!
//! Each resolver turns a query (a clean title or a raw citation string) into
//! a [`PartialReference`], consulting the persistent cache first and going
//! through the per-service rate-limit/retry gate on a miss. A lookup that
//! finds nothing is not an error: it yields an empty partial and caches the
//! no-match sentinel so the next run skips the network entirely. Transient
//! service failures degrade to an empty partial and are never cached.

use serde::{Deserialize, Serialize};

use crate::cache::{self, Source};
use crate::matching;
use crate::rate_limit::{ServiceError, call_with_retry};
use crate::{CoreError, Diagnostic, DiagnosticKind, Resolver};

/// One entry in the local bibliographic catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// The catalog's own item key.
    pub key: String,
    pub title: String,
    pub doi: Option<String>,
    pub url: Option<String>,
}

/// A search candidate: enough to decide relevance, details fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
}

/// Detailed record for an accepted search candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperDetails {
    pub title: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
}

/// The local bibliographic library (catalog) lookup service.
#[allow(async_fn_in_trait)]
pub trait LibraryCatalog {
    async fn find_by_title(&self, title: &str) -> Result<Vec<CatalogItem>, ServiceError>;
    async fn find_by_doi(&self, doi: &str) -> Result<Vec<CatalogItem>, ServiceError>;
    async fn find_by_url(&self, url: &str) -> Result<Vec<CatalogItem>, ServiceError>;
    async fn find_by_key(&self, key: &str) -> Result<Option<CatalogItem>, ServiceError>;
}

/// The external academic search service.
#[allow(async_fn_in_trait)]
pub trait SearchService {
    async fn search_by_title(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError>;
    async fn fetch_details(&self, id: &str) -> Result<Option<PaperDetails>, ServiceError>;
}

/// The citation-key lookup sidecar mapping catalog item keys to the short
/// keys used for cross-linking.
#[allow(async_fn_in_trait)]
pub trait CitationKeyService {
    async fn citation_key(&self, item_key: &str) -> Result<Option<String>, ServiceError>;
}

/// One source's possibly-incomplete contribution to a reference record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_key: Option<String>,
}

impl PartialReference {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.doi.is_none()
            && self.url.is_none()
            && self.internal_key.is_none()
    }
}

/// Result of one resolver call: the partial plus what went wrong on the way.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub partial: PartialReference,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    fn empty_with(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            partial: PartialReference::default(),
            diagnostics,
        }
    }
}

/// A DOI is only usable when it is a bare registrant-prefixed identifier.
pub fn is_valid_doi(doi: &str) -> bool {
    doi.starts_with("10.")
}

fn degraded(source: Source, err: &ServiceError) -> Diagnostic {
    Diagnostic {
        kind: DiagnosticKind::ServiceDegraded,
        key: None,
        message: format!("{} unavailable after retries: {err}", source.name()),
    }
}

impl<L, S, K> Resolver<'_, L, S, K>
where
    L: LibraryCatalog,
    S: SearchService,
    K: CitationKeyService,
{
    /// Look the query up in the local library.
    ///
    /// A fuzzy hit returns the catalog's internal citation key alongside
    /// title/DOI/URL and is treated as authoritative by the merge. A matched
    /// item without key or title means the catalog itself is broken, which
    /// is the one fatal condition in the pipeline.
    pub(crate) async fn local_library(&self, query: &str) -> Result<Resolution, CoreError> {
        let mut diagnostics = Vec::new();

        if let Some(cached) = self.cache.get(query, Source::LocalLibrary) {
            if cache::is_no_match(&cached) {
                return Ok(Resolution::empty_with(diagnostics));
            }
            if let Ok(partial) = serde_json::from_value::<PartialReference>(cached) {
                return Ok(Resolution {
                    partial,
                    diagnostics,
                });
            }
        }

        let limiter = self.limiters.get(Source::LocalLibrary.name());
        let items = match call_with_retry(Source::LocalLibrary.name(), limiter, self.config.retry, || {
            self.library.find_by_title(query)
        })
        .await
        {
            Ok(items) => items,
            Err(err) => {
                diagnostics.push(degraded(Source::LocalLibrary, &err));
                return Ok(Resolution::empty_with(diagnostics));
            }
        };

        let accepted = items.into_iter().find(|item| {
            matching::best_similarity(query, &item.title) > self.config.fuzzy_threshold
        });
        let Some(item) = accepted else {
            log::debug!("no local library match for {query:?}");
            self.cache.put(query, Source::LocalLibrary, &cache::no_match());
            return Ok(Resolution::empty_with(diagnostics));
        };

        if item.key.trim().is_empty() || item.title.trim().is_empty() {
            return Err(CoreError::Catalog {
                query: query.to_string(),
                reason: "matched catalog item is missing its key or title".to_string(),
            });
        }

        let internal_key = match call_with_retry("citation_key", None, self.config.retry, || {
            self.citation_keys.citation_key(&item.key)
        })
        .await
        {
            Ok(key) => key,
            Err(err) => {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::ServiceDegraded,
                    key: None,
                    message: format!("citation key lookup failed for {}: {err}", item.key),
                });
                None
            }
        };

        let partial = PartialReference {
            title: Some(item.title.clone()),
            doi: item.doi.clone().filter(|d| is_valid_doi(d)),
            url: item.url.clone(),
            internal_key,
        };
        if let Ok(value) = serde_json::to_value(&partial) {
            self.cache.put(query, Source::LocalLibrary, &value);
        }
        Ok(Resolution {
            partial,
            diagnostics,
        })
    }

    /// Query the external search service by title-like string.
    pub(crate) async fn search_by_title(&self, query: &str) -> Resolution {
        let source = Source::ExternalSearch;
        let mut diagnostics = Vec::new();

        if let Some(cached) = self.cache.get(query, source) {
            if cache::is_no_match(&cached) {
                return Resolution::empty_with(diagnostics);
            }
            if let Ok(partial) = serde_json::from_value::<PartialReference>(cached) {
                return Resolution {
                    partial,
                    diagnostics,
                };
            }
        }

        let accepted = match self
            .search_candidates(source, query, |hit| {
                matching::title_matches(query, &hit.title, self.config.fuzzy_threshold)
            })
            .await
        {
            Ok(hit) => hit,
            Err(err) => {
                diagnostics.push(degraded(source, &err));
                return Resolution::empty_with(diagnostics);
            }
        };

        self.finish_search(source, query, accepted, diagnostics).await
    }

    /// Query the external search service with a raw citation string.
    ///
    /// Citation strings are noisy, so candidates pass extra screens before
    /// scoring: very short titles and titles carrying ambiguous venue tokens
    /// historically produce false positives and are rejected outright.
    pub(crate) async fn search_by_citation(&self, citation: &str) -> Resolution {
        let source = Source::ExternalSearchByCitation;
        let mut diagnostics = Vec::new();

        if let Some(cached) = self.cache.get(citation, source) {
            if cache::is_no_match(&cached) {
                return Resolution::empty_with(diagnostics);
            }
            if let Ok(partial) = serde_json::from_value::<PartialReference>(cached) {
                return Resolution {
                    partial,
                    diagnostics,
                };
            }
        }

        let accepted = match self
            .search_candidates(source, citation, |hit| {
                self.citation_candidate_ok(&hit.title)
                    && matching::citation_matches(citation, &hit.title, self.config.fuzzy_threshold)
            })
            .await
        {
            Ok(hit) => hit,
            Err(err) => {
                diagnostics.push(degraded(source, &err));
                return Resolution::empty_with(diagnostics);
            }
        };

        self.finish_search(source, citation, accepted, diagnostics).await
    }

    fn citation_candidate_ok(&self, title: &str) -> bool {
        if title.chars().count() < self.config.min_title_len {
            log::debug!("rejecting short candidate title {title:?}");
            return false;
        }
        let lower = title.to_lowercase();
        if self
            .config
            .ambiguous_venue_tokens
            .iter()
            .any(|tok| lower.contains(tok.as_str()))
        {
            log::debug!("rejecting venue-ambiguous candidate title {title:?}");
            return false;
        }
        true
    }

    /// Rate-limited search returning the first candidate the filter accepts.
    async fn search_candidates(
        &self,
        source: Source,
        query: &str,
        accept: impl Fn(&SearchHit) -> bool,
    ) -> Result<Option<SearchHit>, ServiceError> {
        let limiter = self.limiters.get(source.name());
        let hits = call_with_retry(source.name(), limiter, self.config.retry, || {
            self.search.search_by_title(query)
        })
        .await?;
        Ok(hits.into_iter().find(accept))
    }

    /// Fetch details for an accepted candidate and cache the outcome.
    async fn finish_search(
        &self,
        source: Source,
        query: &str,
        accepted: Option<SearchHit>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Resolution {
        let Some(hit) = accepted else {
            log::debug!("no {} match for {query:?}", source.name());
            self.cache.put(query, source, &cache::no_match());
            return Resolution::empty_with(diagnostics);
        };

        let limiter = self.limiters.get(source.name());
        let details = match call_with_retry(source.name(), limiter, self.config.retry, || {
            self.search.fetch_details(&hit.id)
        })
        .await
        {
            Ok(details) => details,
            Err(err) => {
                diagnostics.push(degraded(source, &err));
                return Resolution::empty_with(diagnostics);
            }
        };

        let Some(details) = details else {
            self.cache.put(query, source, &cache::no_match());
            return Resolution::empty_with(diagnostics);
        };

        let partial = PartialReference {
            title: details.title.or(Some(hit.title)),
            doi: details.doi.filter(|d| is_valid_doi(d)),
            url: details.url,
            internal_key: None,
        };
        if let Ok(value) = serde_json::to_value(&partial) {
            self.cache.put(query, source, &value);
        }
        Resolution {
            partial,
            diagnostics,
        }
    }
}
