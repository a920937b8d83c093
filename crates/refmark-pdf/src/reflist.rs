//! Reference-list extraction from raw PDF page text.
//!
//! PDF text extractors emit the reference section as hard-wrapped lines with
//! citations split mid-entry. We locate the section by its first `[1]`
//! marker, stop at a configured section-end phrase, rejoin the wrapped lines
//! into one buffer, and split that buffer back into one citation string per
//! numeric reference identifier.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// `[12]`-style reference identifier markers inside the joined buffer.
static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").expect("valid regex"));

/// First URL inside a raw citation.
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s\]\)]+").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// One declared reference from the cited paper's reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefEntry {
    pub id: u32,
    /// The citation text as printed, rejoined across line wraps.
    pub citation: String,
    /// A URL embedded in the citation text, if any.
    pub url: Option<String>,
}

/// All references declared by the cited paper, keyed by numeric identifier.
#[derive(Debug, Clone, Default)]
pub struct ReferenceList {
    pub entries: BTreeMap<u32, RefEntry>,
}

impl ReferenceList {
    pub fn get(&self, id: u32) -> Option<&RefEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scan full PDF text and split the reference section into per-identifier
/// citation strings.
///
/// Accumulation starts at the first line beginning with `[1]` and stops at
/// the first line containing one of `stop_phrases` (case-insensitive).
/// Returns an empty list when no reference section is found; the caller
/// decides whether that is worth reporting.
pub fn extract_reference_list(text: &str, stop_phrases: &[String]) -> ReferenceList {
    let stops: Vec<String> = stop_phrases.iter().map(|p| p.to_lowercase()).collect();

    let mut started = false;
    let mut accumulated: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if !started {
            if trimmed.starts_with("[1]") {
                started = true;
            } else {
                continue;
            }
        }
        let lower = trimmed.to_lowercase();
        if stops.iter().any(|p| lower.contains(p)) {
            break;
        }
        // Trailing hyphens are line-wrap artifacts ("exam-\nple").
        accumulated.push(trimmed.trim_end_matches('-'));
    }

    if accumulated.is_empty() {
        log::debug!("no reference section found in {} bytes of text", text.len());
        return ReferenceList::default();
    }

    let buffer = accumulated.join(" ");
    split_buffer(&buffer)
}

/// Split the joined reference buffer on `[n]` markers, alternating between
/// marker and citation text.
fn split_buffer(buffer: &str) -> ReferenceList {
    let mut list = ReferenceList::default();

    let markers: Vec<(u32, usize, usize)> = MARKER
        .captures_iter(buffer)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id: u32 = caps.get(1)?.as_str().parse().ok()?;
            Some((id, whole.start(), whole.end()))
        })
        .collect();

    for (i, &(id, _, end)) in markers.iter().enumerate() {
        let text_end = markers
            .get(i + 1)
            .map(|&(_, next_start, _)| next_start)
            .unwrap_or(buffer.len());
        let raw = &buffer[end..text_end];
        let citation = clean_citation(raw, id);
        if citation.is_empty() {
            continue;
        }
        let url = URL
            .find(&citation)
            .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string());
        if let Some(url) = &url {
            log::debug!("reference [{id}] carries a URL: {url}");
        }
        list.entries.insert(id, RefEntry { id, citation, url });
    }

    list
}

/// Remove any echo of the entry's own marker, squeeze whitespace runs, and
/// trim the trailing sentence period.
fn clean_citation(raw: &str, id: u32) -> String {
    let without_echo = raw.replace(&format!("[{id}]"), "");
    let squeezed = WHITESPACE.replace_all(&without_echo, " ");
    squeezed.trim().trim_end_matches('.').to_string()
}
