//! Author-year key derivation from raw citation strings.
//!
//! Heuristic and paper-format-dependent: ordered regex attempts isolate the
//! author block at the head of the citation, the publication year comes from
//! decade-windowed four-digit patterns. Failures yield the broken-reference
//! sentinel instead of an error so one malformed entry never aborts a run.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentinel key for entries whose author or year could not be derived.
pub const BROKEN_REFERENCE_KEY: &str = "!broken-reference";

/// Author block terminated by a period before the title, e.g.
/// "J. Smith, K. Jones, and L. Brown." or "Smith and Jones.".
static AUTHOR_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*((?:[A-Z]\.\s*)*[A-Z][\w'’\-]+(?:\s*,\s*(?:[A-Z]\.\s*)*[A-Z][\w'’\-]+)*(?:\s*,?\s+and\s+(?:[A-Z]\.\s*)*[A-Z][\w'’\-]+)?(?:\s+et\s+al)?)\.?\s",
    )
    .expect("valid regex")
});

/// Fallback: everything up to the first ". " separator.
static LEADING_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([^.]{2,})\.\s").expect("valid regex"));

/// Decade-windowed year patterns, most recent window first.
static YEAR_20XX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20\d{2})\b").expect("valid regex"));
static YEAR_19XX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2})\b").expect("valid regex"));

/// An initial like "J." or "J.-P.".
static INITIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z](\.-?[A-Z])*\.?$").expect("valid regex"));

/// Derive the author-year reference key for a raw citation string.
///
/// Key formats: `"Last 2020"` for one author, `"LastA and LastB 2020"` for
/// two, `"LastA et al. 2020"` for three or more. Returns `None` when either
/// the author block or the year cannot be isolated; callers substitute
/// [`BROKEN_REFERENCE_KEY`].
pub fn derive_author_year_key(citation: &str) -> Option<String> {
    let year = find_year(citation)?;
    let block = find_author_block(citation)?;
    let et_al = block.contains(" et al");
    let last_names = extract_last_names(&block);
    if last_names.is_empty() {
        return None;
    }
    let key = match (last_names.len(), et_al) {
        (1, false) => format!("{} {}", last_names[0], year),
        (2, false) => format!("{} and {} {}", last_names[0], last_names[1], year),
        _ => format!("{} et al. {}", last_names[0], year),
    };
    Some(key)
}

fn find_year(citation: &str) -> Option<&str> {
    YEAR_20XX
        .find(citation)
        .or_else(|| YEAR_19XX.find(citation))
        .map(|m| m.as_str())
}

fn find_author_block(citation: &str) -> Option<String> {
    for pattern in [&*AUTHOR_BLOCK, &*LEADING_SEGMENT] {
        if let Some(caps) = pattern.captures(citation) {
            let block = caps.get(1).map(|m| m.as_str().trim().to_string())?;
            if block.chars().any(|c| c.is_alphabetic()) {
                return Some(block);
            }
        }
    }
    None
}

/// Reduce the author block to last names: split on author separators, drop
/// initials and connective tokens, keep the final surname of each author.
fn extract_last_names(block: &str) -> Vec<String> {
    let no_et_al = block.replace(" et al", "");
    no_et_al
        .split(|c| c == ',' || c == ';')
        .flat_map(|chunk| chunk.split(" and "))
        .filter_map(|author| {
            let surname = author
                .split_whitespace()
                .filter(|tok| !INITIAL.is_match(tok))
                .filter(|tok| !matches!(*tok, "and" | "et" | "al" | "al." | "eds." | "editors"))
                .next_back()?;
            let surname = surname.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-');
            if surname.is_empty() {
                None
            } else {
                Some(surname.to_string())
            }
        })
        .collect()
}
