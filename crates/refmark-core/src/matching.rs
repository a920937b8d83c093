//! String normalization and fuzzy acceptance for bibliographic matching.
//!
//! Two comparison modes, both thresholded strictly (`score > threshold`):
//! plain ratio for title-vs-title, token-set ratio for comparing a long raw
//! citation string against a shorter candidate title. Scores are 0..=100.

use rapidfuzz::fuzz;

/// Case-fold and strip every non-alphanumeric character. Used both as the
/// cache-key normalization and as the pre-pass for plain ratio matching.
pub fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Remove soft hyphens and hyphenated line-wrap residue ("exam- ple") that
/// PDF extraction leaves behind and that depresses token similarity.
pub fn strip_soft_hyphens(s: &str) -> String {
    s.replace('\u{00AD}', "").replace("- ", "")
}

/// Plain similarity ratio over normalized strings.
pub fn title_ratio(a: &str, b: &str) -> f64 {
    fuzz::ratio(normalize(a).chars(), normalize(b).chars())
}

/// Token-set similarity over case-folded, whitespace-tokenized strings.
///
/// Tokens shared by both sides are factored out, so a short title embedded
/// in a long citation still scores high.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = token_set(a);
    let tokens_b = token_set(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let mut common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let mut only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let mut only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();
    common.sort_unstable();
    only_a.sort_unstable();
    only_b.sort_unstable();

    if !common.is_empty() && (only_a.is_empty() || only_b.is_empty()) {
        return 100.0;
    }

    let base = common.join(" ");
    let combined_a = join_nonempty(&base, &only_a.join(" "));
    let combined_b = join_nonempty(&base, &only_b.join(" "));

    let r1 = fuzz::ratio(base.chars(), combined_a.chars());
    let r2 = fuzz::ratio(base.chars(), combined_b.chars());
    let r3 = fuzz::ratio(combined_a.chars(), combined_b.chars());
    r1.max(r2).max(r3)
}

fn token_set(s: &str) -> std::collections::BTreeSet<&str> {
    // Callers pass case-folded input; tokens borrow from it.
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn join_nonempty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

/// Accept a title-vs-title pair at the given threshold (strict `>`).
pub fn title_matches(query: &str, candidate: &str, threshold: f64) -> bool {
    let r = title_ratio(query, candidate);
    log::debug!("title ratio {r:.1} for {query:?} vs {candidate:?}");
    r > threshold
}

/// Accept a citation-vs-title pair at the given threshold (strict `>`),
/// after hyphen normalization on both sides.
pub fn citation_matches(citation: &str, title: &str, threshold: f64) -> bool {
    let cite = strip_soft_hyphens(&citation.to_lowercase());
    let title = strip_soft_hyphens(&title.to_lowercase());
    let r = token_set_ratio(&cite, &title);
    log::debug!("citation token-set ratio {r:.1} for {title:?}");
    r > threshold
}

/// Best of both modes; used where the query may be either a clean title or
/// a raw citation string.
pub fn best_similarity(query: &str, candidate: &str) -> f64 {
    title_ratio(query, candidate).max(token_set_ratio(
        &strip_soft_hyphens(&query.to_lowercase()),
        &strip_soft_hyphens(&candidate.to_lowercase()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("A Study: of Things!"), "astudyofthings");
        assert_eq!(normalize("  "), "");
    }

    #[test]
    fn identical_titles_score_100() {
        assert_eq!(title_ratio("A Study of Things", "a study, of things"), 100.0);
    }

    #[test]
    fn threshold_is_strict() {
        // Normalized similarity of "aaaaa" vs "aaaab" is exactly 80.0:
        // indel distance 2 over combined length 10.
        let r = title_ratio("aaaaa", "aaaab");
        assert_eq!(r, 80.0);
        assert!(!title_matches("aaaaa", "aaaab", 80.0));
        // Just above the threshold is accepted.
        assert!(title_matches("aaaaaaaaa", "aaaaaaaab", 80.0));
    }

    #[test]
    fn token_set_finds_title_inside_citation() {
        let cite = "a. smith and b. jones. a study of things. in proc. of conf. 2020";
        assert!(token_set_ratio(cite, "a study of things") > 80.0);
    }

    #[test]
    fn token_set_rejects_unrelated() {
        assert!(token_set_ratio("completely different words here", "a study of things") < 50.0);
    }

    #[test]
    fn token_set_empty_inputs() {
        assert_eq!(token_set_ratio("", "a study"), 0.0);
        assert_eq!(token_set_ratio("...", "a study"), 0.0);
    }

    #[test]
    fn soft_hyphen_stripping_recovers_wrapped_words() {
        let wrapped = "under- standing hyphen\u{00AD}ation";
        assert_eq!(strip_soft_hyphens(wrapped), "understanding hyphenation");
    }

    #[test]
    fn citation_match_survives_hyphen_wrap() {
        let cite = "a. smith. under- standing things. 2020";
        assert!(citation_matches(cite, "understanding things", 80.0));
    }
}
