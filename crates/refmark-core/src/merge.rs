//! Source-precedence merging of partial references.
//!
//! First-writer-wins: a local-library hit with a title is authoritative and
//! short-circuits external search for that key. Lower-precedence sources
//! only ever fill gaps. When nothing yields a title, the raw citation text
//! goes to the by-citation search as a last resort, importing only title
//! and DOI from whatever comes back.

use refmark_pdf::RefEntry;

use crate::resolve::{CitationKeyService, LibraryCatalog, PartialReference, SearchService};
use crate::{CoreError, Diagnostic, DiagnosticKind, Reference, ReferenceKey, Resolver};

impl<L, S, K> Resolver<'_, L, S, K>
where
    L: LibraryCatalog,
    S: SearchService,
    K: CitationKeyService,
{
    /// Resolve one reference key against all sources and merge the partials
    /// into the canonical record.
    pub(crate) async fn resolve_reference(
        &self,
        key: &ReferenceKey,
        entry: Option<&RefEntry>,
    ) -> Result<(Reference, Vec<Diagnostic>), CoreError> {
        let Some(entry) = entry else {
            let diag = Diagnostic {
                kind: DiagnosticKind::MissingCitation,
                key: Some(key.clone()),
                message: format!("no reference-list entry for key {key}"),
            };
            return Ok((Reference::default(), vec![diag]));
        };

        let mut record = Reference {
            raw_citation: Some(entry.citation.clone()),
            // A URL printed inside the citation itself seeds the record.
            url: entry.url.clone(),
            ..Reference::default()
        };
        let mut diagnostics = Vec::new();
        let query = entry.citation.as_str();

        let local = self.local_library(query).await?;
        diagnostics.extend(local.diagnostics);
        if local.partial.title.is_some() {
            // Authoritative: take every populated field, skip external search.
            overwrite(&mut record, &local.partial);
            log::debug!("{key} resolved by local library: {:?}", record.title);
            return Ok((record, diagnostics));
        }
        fill_gaps(&mut record, &local.partial);

        let external = self.search_by_title(query).await;
        diagnostics.extend(external.diagnostics);
        fill_gaps(&mut record, &external.partial);

        if record.title.is_none() {
            let by_citation = self.search_by_citation(&entry.citation).await;
            diagnostics.extend(by_citation.diagnostics);
            // Only title and DOI are trustworthy from a citation-string match.
            if record.title.is_none() {
                record.title = by_citation.partial.title.clone();
            }
            if record.doi.is_none() {
                record.doi = by_citation.partial.doi.clone();
            }
        }

        Ok((record, diagnostics))
    }
}

/// Copy every populated field of `partial` over `record`.
fn overwrite(record: &mut Reference, partial: &PartialReference) {
    if partial.title.is_some() {
        record.title = partial.title.clone();
    }
    if partial.doi.is_some() {
        record.doi = partial.doi.clone();
    }
    if partial.url.is_some() {
        record.url = partial.url.clone();
    }
    if partial.internal_key.is_some() {
        record.internal_key = partial.internal_key.clone();
    }
}

/// Copy fields of `partial` into `record` only where `record` has a gap.
fn fill_gaps(record: &mut Reference, partial: &PartialReference) {
    if record.title.is_none() {
        record.title = partial.title.clone();
    }
    if record.doi.is_none() {
        record.doi = partial.doi.clone();
    }
    if record.url.is_none() {
        record.url = partial.url.clone();
    }
    if record.internal_key.is_none() {
        record.internal_key = partial.internal_key.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_gaps_never_overwrites() {
        let mut record = Reference {
            title: Some("Local Title".into()),
            ..Reference::default()
        };
        let partial = PartialReference {
            title: Some("External Title".into()),
            doi: Some("10.1/x".into()),
            ..PartialReference::default()
        };
        fill_gaps(&mut record, &partial);
        assert_eq!(record.title.as_deref(), Some("Local Title"));
        assert_eq!(record.doi.as_deref(), Some("10.1/x"));
    }

    #[test]
    fn overwrite_keeps_unset_fields() {
        let mut record = Reference {
            url: Some("https://example.org".into()),
            ..Reference::default()
        };
        let partial = PartialReference {
            title: Some("Local Title".into()),
            ..PartialReference::default()
        };
        overwrite(&mut record, &partial);
        assert_eq!(record.title.as_deref(), Some("Local Title"));
        assert_eq!(record.url.as_deref(), Some("https://example.org"));
    }
}
