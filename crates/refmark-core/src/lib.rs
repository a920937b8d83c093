//! Citation-marker resolution engine.
//!
//! Takes a free-text annotation (margin notes on a paper), the extracted
//! text of the paper's PDF, and a set of bibliographic services, and
//! rewrites every citation marker in the annotation into a cross-link to an
//! already-catalogued item, an external link, or a visible TODO placeholder.
//!
//! Pipeline: [`markers`] finds and expands citation groups, the
//! reference-list extractor (in `refmark-pdf`) recovers raw citation strings
//! per key, the source resolvers in [`resolve`] query the local catalog and
//! external search with fuzzy matching, [`merge`] combines their partials by
//! precedence, and [`rewrite`] substitutes the results back into the text.
//! The [`cache::ResolutionCache`] memoizes every source response on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use thiserror::Error;

pub mod cache;
pub mod markers;
pub mod matching;
mod merge;
pub mod rate_limit;
pub mod resolve;
pub mod rewrite;

// Re-export for convenience
pub use refmark_pdf::{
    BROKEN_REFERENCE_KEY, RefEntry, ReferenceList, derive_author_year_key,
    extract_reference_list,
};

pub use cache::{ResolutionCache, Source};
pub use markers::MarkerSyntax;
pub use rate_limit::{RetryPolicy, ServiceError, ServiceLimiters};
pub use resolve::{
    CatalogItem, CitationKeyService, LibraryCatalog, PaperDetails, PartialReference, SearchHit,
    SearchService,
};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("PDF extraction error: {0}")]
    Pdf(#[from] refmark_pdf::PdfError),
    #[error("broken catalog entry for {query:?}: {reason}")]
    Catalog { query: String, reason: String },
    #[error("cache error: {0}")]
    Cache(#[from] std::io::Error),
}

/// Canonical identifier for one citation within a resolution run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKey {
    /// Numeric-bracket style, e.g. the 12 in `[12]`.
    Numeric(u32),
    /// Author-year style, e.g. `"Smith et al. 2020"`.
    AuthorYear(String),
}

impl ReferenceKey {
    /// Author-year keys compare by trimmed value.
    pub fn author_year(s: impl AsRef<str>) -> Self {
        ReferenceKey::AuthorYear(s.as_ref().trim().to_string())
    }
}

impl std::fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKey::Numeric(id) => write!(f, "{id}"),
            ReferenceKey::AuthorYear(s) => write!(f, "{s}"),
        }
    }
}

/// The canonical resolved record for one reference key.
///
/// All-empty (apart from `raw_citation`) means unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    pub title: Option<String>,
    pub doi: Option<String>,
    pub url: Option<String>,
    /// Catalog citation key when the item is already known locally.
    pub internal_key: Option<String>,
    /// Original citation-list text, kept for author/year fallback.
    pub raw_citation: Option<String>,
}

impl Reference {
    pub fn is_resolved(&self) -> bool {
        self.title.is_some()
            || self.doi.is_some()
            || self.url.is_some()
            || self.internal_key.is_some()
    }
}

/// What went wrong (or was merely noteworthy) during a run. Collected and
/// returned instead of being logged as a side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub key: Option<ReferenceKey>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed or implausible marker group; group skipped.
    ParseError,
    /// Marker key not in the allowlist.
    UnknownKey,
    /// No reference-list entry for an allowlisted key.
    MissingCitation,
    /// Author-year key derivation failed for a reference-list entry.
    BrokenReference,
    /// Key has metadata but nothing link-worthy.
    PartialOnly,
    /// A service stayed unavailable through all retries.
    ServiceDegraded,
    /// No reference section found in the PDF text.
    EmptyReferenceList,
}

/// Summary counts for a complete run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
    pub unresolved: usize,
}

/// Everything a resolution run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The annotation with every marker rewritten.
    pub rewritten: String,
    /// Canonical record per reference key.
    pub references: BTreeMap<ReferenceKey, Reference>,
    /// Keys that ended the run with an all-empty record.
    pub unresolved: Vec<ReferenceKey>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: RunStats,
}

/// Tunables for one resolution run. The fuzzy/plausibility thresholds are
/// heuristics tuned on real paper sets; override per deployment rather than
/// editing code.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Similarity scores must be strictly greater than this (0..=100).
    pub fuzzy_threshold: f64,
    /// Candidate titles shorter than this never match a citation string.
    pub min_title_len: usize,
    /// Bare numeric keys above this are rejected as implausible.
    pub max_plausible_key: u32,
    /// Numeric ranges spanning more than this are rejected as implausible.
    pub max_range_span: u32,
    /// Candidate titles containing any of these never match a citation
    /// string (historic false-positive producers).
    pub ambiguous_venue_tokens: Vec<String>,
    /// Phrases that end the reference section of a paper.
    pub section_end_phrases: Vec<String>,
    /// Internal cross-link shape: `[[<prefix><citation key><suffix>]]`.
    pub internal_link_prefix: String,
    pub internal_link_suffix: String,
    /// Minimum spacing between calls, per service. Zero disables the gate.
    pub library_interval: Duration,
    pub search_interval: Duration,
    pub citation_search_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 80.0,
            min_title_len: 16,
            max_plausible_key: 500,
            max_range_span: 10,
            ambiguous_venue_tokens: vec!["symposium".to_string(), "usenix".to_string()],
            section_end_phrases: vec!["appendix".to_string(), "additional results".to_string()],
            internal_link_prefix: "Reading notes/".to_string(),
            internal_link_suffix: ".md".to_string(),
            library_interval: Duration::ZERO,
            search_interval: Duration::from_secs(10),
            citation_search_interval: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// The resolution engine, wiring config, cache, rate limits, and the three
/// service implementations together for the duration of a run.
pub struct Resolver<'a, L, S, K> {
    pub(crate) config: &'a ResolveConfig,
    pub(crate) cache: &'a ResolutionCache,
    pub(crate) limiters: ServiceLimiters,
    pub(crate) library: &'a L,
    pub(crate) search: &'a S,
    pub(crate) citation_keys: &'a K,
}

impl<'a, L, S, K> Resolver<'a, L, S, K>
where
    L: LibraryCatalog,
    S: SearchService,
    K: CitationKeyService,
{
    pub fn new(
        config: &'a ResolveConfig,
        cache: &'a ResolutionCache,
        library: &'a L,
        search: &'a S,
        citation_keys: &'a K,
    ) -> Self {
        let limiters = ServiceLimiters::new([
            (Source::LocalLibrary.name(), config.library_interval),
            (Source::ExternalSearch.name(), config.search_interval),
            (
                Source::ExternalSearchByCitation.name(),
                config.citation_search_interval,
            ),
        ]);
        Self {
            config,
            cache,
            limiters,
            library,
            search,
            citation_keys,
        }
    }

    /// Resolve every citation marker in `annotation` and rewrite the text.
    ///
    /// `pdf_text` is the full extracted text of the cited paper. When
    /// `allowlist` is `None`, the keys declared by the paper's reference
    /// list are the allowlist. A single unresolved reference never aborts
    /// the run; only a broken local catalog does.
    pub async fn resolve_annotation(
        &self,
        annotation: &str,
        syntax: MarkerSyntax,
        pdf_text: &str,
        allowlist: Option<&BTreeSet<ReferenceKey>>,
    ) -> Result<RunOutcome, CoreError> {
        let parsed = markers::parse_markers(annotation, syntax, self.config);
        let mut diagnostics = parsed.diagnostics.clone();
        let expanded = markers::expand(annotation, &parsed);

        let reflist = extract_reference_list(pdf_text, &self.config.section_end_phrases);
        if reflist.is_empty() {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::EmptyReferenceList,
                key: None,
                message: "no reference section found in the paper text".to_string(),
            });
        }

        let entries = self.keyed_entries(&reflist, syntax, &mut diagnostics);
        let allowlist: BTreeSet<ReferenceKey> = match allowlist {
            Some(list) => list.clone(),
            None => entries.keys().cloned().collect(),
        };
        diagnostics.extend(markers::check_allowlist(&parsed.keys, &allowlist));

        let mut references = BTreeMap::new();
        for key in &parsed.keys {
            if !allowlist.contains(key) {
                references.insert(key.clone(), Reference::default());
                continue;
            }
            let (record, diags) = self.resolve_reference(key, entries.get(key)).await?;
            diagnostics.extend(diags);
            references.insert(key.clone(), record);
        }

        let (rewritten, rewrite_diags) =
            rewrite::rewrite(&expanded, &parsed.keys, &allowlist, &references, self.config);
        diagnostics.extend(rewrite_diags);

        let unresolved: Vec<ReferenceKey> = parsed
            .keys
            .iter()
            .filter(|k| !references.get(*k).map(Reference::is_resolved).unwrap_or(false))
            .cloned()
            .collect();
        for key in &unresolved {
            log::warn!("unresolved reference: {key}");
        }

        let stats = RunStats {
            total: parsed.keys.len(),
            internal: references
                .values()
                .filter(|r| r.internal_key.is_some())
                .count(),
            external: references
                .values()
                .filter(|r| r.internal_key.is_none() && r.url.is_some())
                .count(),
            unresolved: unresolved.len(),
        };

        Ok(RunOutcome {
            rewritten,
            references,
            unresolved,
            diagnostics,
            stats,
        })
    }

    /// Key the reference list by the annotation's key style.
    fn keyed_entries(
        &self,
        reflist: &ReferenceList,
        syntax: MarkerSyntax,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<ReferenceKey, RefEntry> {
        let mut entries = BTreeMap::new();
        for entry in reflist.entries.values() {
            match syntax {
                MarkerSyntax::NumericBracket => {
                    entries.insert(ReferenceKey::Numeric(entry.id), entry.clone());
                }
                MarkerSyntax::AuthorYear => match derive_author_year_key(&entry.citation) {
                    Some(key) => {
                        entries.insert(ReferenceKey::author_year(key), entry.clone());
                    }
                    None => {
                        diagnostics.push(Diagnostic {
                            kind: DiagnosticKind::BrokenReference,
                            key: None,
                            message: format!(
                                "could not derive author-year key for reference [{}]: {:?}",
                                entry.id, entry.citation
                            ),
                        });
                        entries
                            .insert(ReferenceKey::author_year(BROKEN_REFERENCE_KEY), entry.clone());
                    }
                },
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::contains_tags;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockLibrary {
        items: Vec<CatalogItem>,
        title_calls: AtomicU32,
    }

    impl MockLibrary {
        fn new(items: Vec<CatalogItem>) -> Self {
            Self {
                items,
                title_calls: AtomicU32::new(0),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    impl LibraryCatalog for MockLibrary {
        async fn find_by_title(&self, _title: &str) -> Result<Vec<CatalogItem>, ServiceError> {
            self.title_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }

        async fn find_by_doi(&self, doi: &str) -> Result<Vec<CatalogItem>, ServiceError> {
            Ok(self
                .items
                .iter()
                .filter(|i| i.doi.as_deref() == Some(doi))
                .cloned()
                .collect())
        }

        async fn find_by_url(&self, url: &str) -> Result<Vec<CatalogItem>, ServiceError> {
            Ok(self
                .items
                .iter()
                .filter(|i| i.url.as_deref() == Some(url))
                .cloned()
                .collect())
        }

        async fn find_by_key(&self, key: &str) -> Result<Option<CatalogItem>, ServiceError> {
            Ok(self.items.iter().find(|i| i.key == key).cloned())
        }
    }

    struct MockSearch {
        hits: Vec<SearchHit>,
        details: BTreeMap<String, PaperDetails>,
        search_calls: AtomicU32,
        details_calls: AtomicU32,
    }

    impl MockSearch {
        fn new(hits: Vec<SearchHit>, details: BTreeMap<String, PaperDetails>) -> Self {
            Self {
                hits,
                details,
                search_calls: AtomicU32::new(0),
                details_calls: AtomicU32::new(0),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new(), BTreeMap::new())
        }
    }

    impl SearchService for MockSearch {
        async fn search_by_title(&self, _query: &str) -> Result<Vec<SearchHit>, ServiceError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.clone())
        }

        async fn fetch_details(&self, id: &str) -> Result<Option<PaperDetails>, ServiceError> {
            self.details_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.details.get(id).cloned())
        }
    }

    struct FailingSearch;

    impl SearchService for FailingSearch {
        async fn search_by_title(&self, _query: &str) -> Result<Vec<SearchHit>, ServiceError> {
            Err(ServiceError::Timeout)
        }

        async fn fetch_details(&self, _id: &str) -> Result<Option<PaperDetails>, ServiceError> {
            Err(ServiceError::Timeout)
        }
    }

    struct MockKeys {
        keys: BTreeMap<String, String>,
    }

    impl CitationKeyService for MockKeys {
        async fn citation_key(&self, item_key: &str) -> Result<Option<String>, ServiceError> {
            Ok(self.keys.get(item_key).cloned())
        }
    }

    fn test_config() -> ResolveConfig {
        ResolveConfig {
            search_interval: Duration::ZERO,
            citation_search_interval: Duration::ZERO,
            retry: RetryPolicy {
                max_retries: 1,
                backoff: Duration::from_millis(1),
            },
            ..ResolveConfig::default()
        }
    }

    const PDF: &str = "\
Intro text about widgets.
References
[1] Smith. Distributed Widget Consensus. 2020.
[2] Jones. Tangled Bibliography Graphs. 2019.
Appendix A: extra material.
";

    fn catalogued_smith() -> MockLibrary {
        MockLibrary::new(vec![CatalogItem {
            key: "ZK1".to_string(),
            title: "Distributed Widget Consensus".to_string(),
            doi: Some("10.1/widget".to_string()),
            url: None,
        }])
    }

    fn search_knowing_jones() -> MockSearch {
        let hits = vec![SearchHit {
            id: "P2".to_string(),
            title: "Tangled Bibliography Graphs".to_string(),
        }];
        let mut details = BTreeMap::new();
        details.insert(
            "P2".to_string(),
            PaperDetails {
                title: Some("Tangled Bibliography Graphs".to_string()),
                doi: Some("10.2/graphs".to_string()),
                url: Some("https://example.org/graphs".to_string()),
            },
        );
        MockSearch::new(hits, details)
    }

    fn smith_keys() -> MockKeys {
        let mut keys = BTreeMap::new();
        keys.insert("ZK1".to_string(), "smith2020widget".to_string());
        MockKeys { keys }
    }

    #[tokio::test]
    async fn end_to_end_internal_and_external() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = catalogued_smith();
        let search = search_knowing_jones();
        let keys = smith_keys();
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation("prior work [1,2]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap();

        assert!(
            outcome
                .rewritten
                .contains("[[Reading notes/smith2020widget.md]]"),
            "got: {}",
            outcome.rewritten
        );
        assert!(
            outcome
                .rewritten
                .contains("[REF_2:Tangled Bibliography Graphs](https://example.org/graphs)"),
            "got: {}",
            outcome.rewritten
        );
        assert!(!contains_tags(&outcome.rewritten));
        assert!(outcome.unresolved.is_empty());
        assert_eq!(outcome.stats.total, 2);
        assert_eq!(outcome.stats.internal, 1);
        assert_eq!(outcome.stats.external, 1);
    }

    #[tokio::test]
    async fn local_library_short_circuits_external_search() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = catalogued_smith();
        // The search service would also match, with a different title.
        let search = MockSearch::new(
            vec![SearchHit {
                id: "PX".to_string(),
                title: "Distributed Widget Consensus Revisited".to_string(),
            }],
            BTreeMap::new(),
        );
        let keys = smith_keys();
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation("see [1]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap();

        let record = &outcome.references[&ReferenceKey::Numeric(1)];
        assert_eq!(record.title.as_deref(), Some("Distributed Widget Consensus"));
        assert_eq!(search.search_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_makes_repeat_runs_offline() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        let search = search_knowing_jones();
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        for _ in 0..2 {
            resolver
                .resolve_annotation("see [2]", MarkerSyntax::NumericBracket, PDF, None)
                .await
                .unwrap();
        }

        // One search and one details call total: the second run is served
        // from the cache, including the local library's no-match sentinel.
        assert_eq!(search.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.details_calls.load(Ordering::SeqCst), 1);
        assert_eq!(library.title_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unresolved_reference_gets_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        let search = MockSearch::empty();
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation("see [1]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap();

        assert!(outcome.rewritten.contains("[[TODO:1]]"));
        assert!(!contains_tags(&outcome.rewritten));
        assert_eq!(outcome.unresolved, vec![ReferenceKey::Numeric(1)]);
    }

    #[tokio::test]
    async fn unknown_marker_key_is_reported_and_placeheld() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        let search = MockSearch::empty();
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation("see [7]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap();

        assert!(outcome.rewritten.contains("[[TODO:7]]"));
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::UnknownKey)
        );
    }

    #[tokio::test]
    async fn degraded_service_never_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        let search = FailingSearch;
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation("see [1,2]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap();

        assert_eq!(outcome.unresolved.len(), 2);
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::ServiceDegraded)
        );
    }

    #[tokio::test]
    async fn broken_catalog_entry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        // Matched item with an empty key: the catalog itself is broken.
        let library = MockLibrary::new(vec![CatalogItem {
            key: String::new(),
            title: "Distributed Widget Consensus".to_string(),
            doi: None,
            url: None,
        }]);
        let search = MockSearch::empty();
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let err = resolver
            .resolve_annotation("see [1]", MarkerSyntax::NumericBracket, PDF, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Catalog { .. }));
    }

    #[tokio::test]
    async fn citation_url_seeds_external_link() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        let search = MockSearch::empty();
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let pdf = "\
[1] Cojocar. Commit fixing the memset bug, 2016. https://example.org/fix
Appendix
";
        let outcome = resolver
            .resolve_annotation("see [1]", MarkerSyntax::NumericBracket, pdf, None)
            .await
            .unwrap();

        let record = &outcome.references[&ReferenceKey::Numeric(1)];
        assert_eq!(record.url.as_deref(), Some("https://example.org/fix"));
        assert!(outcome.rewritten.contains("(https://example.org/fix)"));
    }

    #[tokio::test]
    async fn citation_search_screens_reject_false_positives() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        // Both candidates would score 100 on a token-set comparison against
        // their citations; the screens exist precisely to stop that.
        let search = MockSearch::new(
            vec![
                SearchHit {
                    id: "V1".to_string(),
                    title: "USENIX Security Symposium".to_string(),
                },
                SearchHit {
                    id: "V2".to_string(),
                    title: "On Widgets".to_string(),
                },
            ],
            BTreeMap::new(),
        );
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let pdf = "\
[1] Smith. Proceedings of the USENIX Security Symposium. 2020.
[2] Jones. On Widgets. In Proc. of Things. 2021.
Appendix
";
        let outcome = resolver
            .resolve_annotation("see [1,2]", MarkerSyntax::NumericBracket, pdf, None)
            .await
            .unwrap();

        assert_eq!(outcome.unresolved.len(), 2);
        assert_eq!(search.details_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn citation_fallback_imports_only_title_and_doi() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = MockLibrary::empty();
        // Too little overlap for the plain ratio, full overlap for the
        // token-set ratio: only the by-citation fallback accepts this.
        let hits = vec![SearchHit {
            id: "P9".to_string(),
            title: "A Grand Unified Study of Annotated Widgets".to_string(),
        }];
        let mut details = BTreeMap::new();
        details.insert(
            "P9".to_string(),
            PaperDetails {
                title: Some("A Grand Unified Study of Annotated Widgets".to_string()),
                doi: Some("10.9/widgets".to_string()),
                url: Some("https://example.org/widgets".to_string()),
            },
        );
        let search = MockSearch::new(hits, details);
        let keys = MockKeys {
            keys: BTreeMap::new(),
        };
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let pdf = "\
[1] Smith. A Grand Unified Study of Annotated Widgets. In Proceedings of Things. 2020.
Appendix
";
        let outcome = resolver
            .resolve_annotation("see [1]", MarkerSyntax::NumericBracket, pdf, None)
            .await
            .unwrap();

        let record = &outcome.references[&ReferenceKey::Numeric(1)];
        assert_eq!(
            record.title.as_deref(),
            Some("A Grand Unified Study of Annotated Widgets")
        );
        assert_eq!(record.doi.as_deref(), Some("10.9/widgets"));
        assert!(record.url.is_none());
        assert!(
            outcome
                .diagnostics
                .iter()
                .any(|d| d.kind == DiagnosticKind::PartialOnly)
        );
    }

    #[tokio::test]
    async fn author_year_annotation_resolves_against_derived_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResolutionCache::open(dir.path()).unwrap();
        let config = test_config();
        let library = catalogued_smith();
        let search = MockSearch::empty();
        let keys = smith_keys();
        let resolver = Resolver::new(&config, &cache, &library, &search, &keys);

        let outcome = resolver
            .resolve_annotation(
                "as shown in [Smith 2020]",
                MarkerSyntax::AuthorYear,
                PDF,
                None,
            )
            .await
            .unwrap();

        assert!(
            outcome
                .rewritten
                .contains("[[Reading notes/smith2020widget.md]]"),
            "got: {}",
            outcome.rewritten
        );
    }
}
