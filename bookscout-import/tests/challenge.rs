use std::sync::atomic::{AtomicU32, Ordering};

use bookscout_catalog::types::{Book, Challenge};
use bookscout_db::{books_in_challenge, ensure_challenge, insert_book, open_memory};
use bookscout_import::{
    ChallengeOptions, ChallengePage, ChallengePages, ImportError, import_challenge,
};

/// Serves a fixed list of pages, recording how many were requested.
struct StubPages {
    pages: Vec<Vec<&'static str>>,
    fetched: AtomicU32,
}

impl StubPages {
    fn new(pages: Vec<Vec<&'static str>>) -> Self {
        Self {
            pages,
            fetched: AtomicU32::new(0),
        }
    }
}

impl ChallengePages for StubPages {
    async fn fetch_page(&self, page: u32) -> Result<ChallengePage, ImportError> {
        self.fetched.fetch_add(1, Ordering::Relaxed);
        let titles = self
            .pages
            .get((page - 1) as usize)
            .map(|titles| titles.iter().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        Ok(ChallengePage { titles })
    }
}

fn seed(conn: &rusqlite::Connection, titles: &[&str]) {
    for title in titles {
        insert_book(conn, &Book::with_title(*title)).unwrap();
    }
}

#[tokio::test]
async fn pagination_stops_when_a_page_adds_nothing_new() {
    let conn = open_memory().unwrap();
    seed(&conn, &["Dune", "1984", "Emma"]);

    // Page 3 would match Emma, but page 2 repeats page 1 and ends the run.
    let pages = StubPages::new(vec![vec!["Dune", "1984"], vec!["Dune"], vec!["Emma"]]);
    let stats = import_challenge(&conn, "Classics", &pages, &ChallengeOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.added, 2);
    assert_eq!(pages.fetched.load(Ordering::Relaxed), 2);

    let challenge = ensure_challenge(&conn, &Challenge::named("Classics")).unwrap();
    let members = books_in_challenge(&conn, &challenge).unwrap();
    let titles: Vec<_> = members.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, ["1984", "Dune"]);
}

#[tokio::test]
async fn max_pages_bounds_the_run() {
    let conn = open_memory().unwrap();
    seed(&conn, &["Book 1", "Book 2", "Book 3", "Book 4"]);

    // Every page matches something new, so only the bound stops it.
    let pages = StubPages::new(vec![
        vec!["Book 1"],
        vec!["Book 2"],
        vec!["Book 3"],
        vec!["Book 4"],
    ]);
    let options = ChallengeOptions { max_pages: 2 };
    let stats = import_challenge(&conn, "Long Challenge", &pages, &options)
        .await
        .unwrap();

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.added, 2);
}

#[tokio::test]
async fn unmatched_titles_are_skipped_not_fatal() {
    let conn = open_memory().unwrap();
    seed(&conn, &["Dune"]);

    let pages = StubPages::new(vec![vec!["Dune", "Some Unknown Book"]]);
    let stats = import_challenge(&conn, "Mixed", &pages, &ChallengeOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.matched, 1);
    assert_eq!(stats.unmatched, 1);
    assert_eq!(stats.added, 1);
}

#[tokio::test]
async fn reimport_adds_no_duplicate_memberships() {
    let conn = open_memory().unwrap();
    seed(&conn, &["Dune"]);

    let pages = StubPages::new(vec![vec!["Dune"]]);
    let first = import_challenge(&conn, "Classics", &pages, &ChallengeOptions::default())
        .await
        .unwrap();
    assert_eq!(first.added, 1);

    let again = import_challenge(&conn, "Classics", &pages, &ChallengeOptions::default())
        .await
        .unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(again.matched, 1);
}
