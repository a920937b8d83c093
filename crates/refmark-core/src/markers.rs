//! Citation-marker parsing and tag expansion.
//!
//! Scans annotation text for citation-marker groups (`[3, 7-9]` or
//! `[Smith 2020; Jones et al. 2019]`), expands each group into reference
//! keys, and builds a substitution map from the original group text to a
//! tagged form. Tags wrap the key in private-use sentinel characters, so
//! they survive later substitutions, never collide with document content,
//! and expansion is idempotent (no marker pattern matches a tagged span).

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Diagnostic, DiagnosticKind, ReferenceKey, ResolveConfig};

/// Left/right tag sentinels. Private-use codepoints: not produced by PDF
/// extraction or keyboards, and never part of a marker pattern.
pub const TAG_OPEN: char = '\u{E000}';
pub const TAG_CLOSE: char = '\u{E001}';

/// Numeric-bracket citation groups: digits, commas, dashes.
static NUMERIC_GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[((?:[1-9][0-9]{0,2}\s?[,-]?\s?)+)\]").expect("valid regex"));

/// Author-year citation groups: author tokens followed by a four-digit
/// year, optionally repeated with `;`.
static AUTHOR_YEAR_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[\s*((?:[A-Za-z][\w.’'\-]*[,.]?\s+)+(?:19|20)\d{2}(?:\s*;\s*(?:[A-Za-z][\w.’'\-]*[,.]?\s+)+(?:19|20)\d{2})*)\s*\]",
    )
    .expect("valid regex")
});

/// The marker syntax variants an annotation can use. New heuristics slot in
/// here without touching merge or rewrite logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSyntax {
    NumericBracket,
    AuthorYear,
}

/// Result of one marker-parsing pass.
#[derive(Debug, Clone, Default)]
pub struct ParsedMarkers {
    /// Distinct keys in first-seen order.
    pub keys: Vec<ReferenceKey>,
    /// Original group text -> expanded tagged replacement.
    pub expansions: Vec<(String, String)>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The unique tag string for a key.
pub fn tag_for(key: &ReferenceKey) -> String {
    format!("{TAG_OPEN}{key}{TAG_CLOSE}")
}

/// True if the text still contains tag sentinels.
pub fn contains_tags(text: &str) -> bool {
    text.contains(TAG_OPEN) || text.contains(TAG_CLOSE)
}

/// Scan `annotation` for citation-marker groups of the given syntax.
pub fn parse_markers(
    annotation: &str,
    syntax: MarkerSyntax,
    config: &ResolveConfig,
) -> ParsedMarkers {
    // Annotations wrap freely; markers never span logical units, so join
    // the lines before scanning. En-dashes in ranges become ASCII dashes.
    let text = annotation
        .lines()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{2013}', "-");

    let mut parsed = ParsedMarkers::default();
    let mut seen: BTreeSet<ReferenceKey> = BTreeSet::new();

    let pattern = match syntax {
        MarkerSyntax::NumericBracket => &*NUMERIC_GROUP,
        MarkerSyntax::AuthorYear => &*AUTHOR_YEAR_GROUP,
    };

    for caps in pattern.captures_iter(&text) {
        let group_text = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let keys = match syntax {
            MarkerSyntax::NumericBracket => match expand_numeric_group(inner, config) {
                Ok(ids) => ids.into_iter().map(ReferenceKey::Numeric).collect(),
                Err(reason) => {
                    log::warn!("skipping citation group {group_text:?}: {reason}");
                    parsed.diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::ParseError,
                        key: None,
                        message: format!("could not parse {group_text:?}: {reason}"),
                    });
                    continue;
                }
            },
            MarkerSyntax::AuthorYear => inner
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ReferenceKey::author_year)
                .collect::<Vec<_>>(),
        };

        if keys.is_empty() {
            continue;
        }

        let replacement = keys
            .iter()
            .map(tag_for)
            .collect::<Vec<_>>()
            .join(", ");
        log::debug!("expanding {group_text:?} -> {replacement:?}");

        for key in keys {
            if seen.insert(key.clone()) {
                parsed.keys.push(key);
            }
        }
        if !parsed.expansions.iter().any(|(g, _)| g == group_text) {
            parsed
                .expansions
                .push((group_text.to_string(), replacement));
        }
    }

    parsed
}

/// Replace every marker group in `annotation` with its tagged expansion.
///
/// The same line-joining applied during parsing is applied here, so the
/// substitution map lines up.
pub fn expand(annotation: &str, parsed: &ParsedMarkers) -> String {
    let mut text = annotation
        .lines()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{2013}', "-");
    for (group, replacement) in &parsed.expansions {
        text = text.replace(group, replacement);
    }
    text
}

/// Report keys that are not in the caller-provided allowlist. Their tags
/// stay in the text (the rewriter turns them into placeholders), so the
/// output remains well-formed.
pub fn check_allowlist(
    keys: &[ReferenceKey],
    allowlist: &BTreeSet<ReferenceKey>,
) -> Vec<Diagnostic> {
    keys.iter()
        .filter(|key| !allowlist.contains(*key))
        .map(|key| Diagnostic {
            kind: DiagnosticKind::UnknownKey,
            key: Some(key.clone()),
            message: format!("reference key {key} is not declared by the paper"),
        })
        .collect()
}

/// Expand one numeric group body (`"3, 7-9"`) into reference ids.
///
/// A bare number above `max_plausible_key` is likely a year or page number
/// that happened to sit in brackets; a range spanning nothing or more than
/// `max_range_span` entries is equally implausible. Either rejects the
/// whole group.
fn expand_numeric_group(inner: &str, config: &ResolveConfig) -> Result<Vec<u32>, String> {
    let compact: String = inner.chars().filter(|c| !c.is_whitespace()).collect();
    let mut ids = Vec::new();
    for part in compact.split(',') {
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            None => {
                let id: u32 = part
                    .parse()
                    .map_err(|_| format!("invalid reference id {part:?}"))?;
                if id > config.max_plausible_key {
                    return Err(format!("implausible reference id {id}"));
                }
                ids.push(id);
            }
            Some((lo, hi)) => {
                let lo: u32 = lo
                    .parse()
                    .map_err(|_| format!("invalid range start {lo:?}"))?;
                let hi: u32 = hi
                    .parse()
                    .map_err(|_| format!("invalid range end {hi:?}"))?;
                let span = hi as i64 - lo as i64;
                if span <= 0 || span > config.max_range_span as i64 {
                    return Err(format!("implausible range {lo}-{hi}"));
                }
                ids.extend(lo..=hi);
            }
        }
    }
    Ok(ids)
}
