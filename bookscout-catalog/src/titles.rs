//! Fuzzy title matching for cross-source reconciliation.
//!
//! Scraped search results carry noisy free-text titles ("Dune / Frank
//! Herbert", trailing edition notes, etc.). Matching is binary: two titles
//! either refer to the same book or they don't, decided by bounded edit
//! distance after case folding. There is no relevance ranking.

use strsim::levenshtein;

/// Maximum edit distance when comparing two free-text page titles.
pub const FREE_TEXT_DISTANCE: usize = 10;

/// Tighter bound used when one side is a known-clean catalog title.
pub const CATALOG_DISTANCE: usize = 5;

/// Below this folded length the distance test is unreliable: "It" is within
/// distance 10 of nearly everything.
const SHORT_TITLE_LEN: usize = 4;

/// Decide whether two titles refer to the same book.
///
/// Both are trimmed and case-folded, then compared by Levenshtein distance
/// against `max_distance` (`FREE_TEXT_DISTANCE` or `CATALOG_DISTANCE`).
/// Very short titles fall back to an exact or prefix match.
pub fn equivalent_titles(a: &str, b: &str, max_distance: usize) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    if a.chars().count() < SHORT_TITLE_LEN || b.chars().count() < SHORT_TITLE_LEN {
        return a == b || a.starts_with(&b) || b.starts_with(&a);
    }

    levenshtein(&a, &b) < max_distance
}

/// Normalize a catalog title into the search term probes send upstream.
///
/// Lowercased and trimmed, with a leading "the " stripped — library search
/// engines tend to ignore the article, and including it skews results.
pub fn search_term(title: &str) -> String {
    let term = title.trim().to_lowercase();
    match term.strip_prefix("the ") {
        Some(rest) => rest.to_string(),
        None => term,
    }
}
