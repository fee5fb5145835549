//! Import a paginated reading challenge into the catalog.
//!
//! Fetching and parsing a challenge page is a pluggable capability (the
//! upstream site is HTML); this module owns pagination, title matching
//! through the identity resolver, and membership writes.

use bookscout_catalog::types::Challenge;
use bookscout_db::{BookQuery, StoreError, operations};
use rusqlite::Connection;

use crate::ImportError;

/// One fetched page of a challenge listing.
#[derive(Debug, Clone, Default)]
pub struct ChallengePage {
    /// Book titles listed on the page. Empty is a normal outcome.
    pub titles: Vec<String>,
}

/// Paginated access to a challenge listing.
#[allow(async_fn_in_trait)]
pub trait ChallengePages {
    /// Fetch one page, 1-based.
    async fn fetch_page(&self, page: u32) -> Result<ChallengePage, ImportError>;
}

/// Options for a challenge import.
#[derive(Debug, Clone)]
pub struct ChallengeOptions {
    /// Hard bound on pagination. The zero-new-matches termination
    /// heuristic can misfire on a page of unmatchable titles, so a run
    /// never fetches more than this many pages regardless.
    pub max_pages: u32,
}

impl Default for ChallengeOptions {
    fn default() -> Self {
        Self { max_pages: 20 }
    }
}

/// Statistics from a challenge import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChallengeStats {
    pub pages_fetched: u32,
    pub titles_seen: usize,
    pub matched: usize,
    /// Newly-added (book, challenge) pairs; re-imports add nothing.
    pub added: usize,
    pub unmatched: usize,
}

/// Import a challenge, page by page, until a page contributes no newly-
/// matched books or the page bound is hit.
///
/// Titles with no catalog match are skipped (`NotFound` is a per-title
/// outcome, not a failure); an ambiguous match aborts the import.
pub async fn import_challenge<F: ChallengePages>(
    conn: &Connection,
    name: &str,
    pages: &F,
    options: &ChallengeOptions,
) -> Result<ChallengeStats, ImportError> {
    let challenge = operations::ensure_challenge(conn, &Challenge::named(name))?;
    let mut stats = ChallengeStats::default();

    for page in 1..=options.max_pages {
        let fetched = pages.fetch_page(page).await?;
        stats.pages_fetched += 1;

        let mut new_matches = 0;
        for title in &fetched.titles {
            stats.titles_seen += 1;
            match operations::resolve_book(conn, &BookQuery::by_title(title.clone())) {
                Ok(book) => {
                    stats.matched += 1;
                    if operations::add_book_to_challenge(conn, &book, &challenge)? {
                        stats.added += 1;
                        new_matches += 1;
                    }
                }
                Err(StoreError::NotFound { .. }) => {
                    log::debug!("no catalog match for challenge title '{title}'");
                    stats.unmatched += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Upstream has no explicit "last page" signal; a page that adds
        // nothing new marks the end of the listing.
        if new_matches == 0 {
            break;
        }
    }

    Ok(stats)
}
