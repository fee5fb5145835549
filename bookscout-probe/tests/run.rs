use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use bookscout_catalog::types::{Book, Source};
use bookscout_db::{BookQuery, ensure_source, get_availability, insert_book, resolve_book};
use bookscout_probe::{
    BookOutcome, ProbeError, ProbeEvent, ProbeResult, RunOptions, SourceProbe, probe_source,
};
use tokio::sync::mpsc;

/// Scripted behavior for one title.
enum Script {
    Found { price: Option<f64> },
    NotFound,
    /// Fail transiently this many times, then succeed.
    Flaky { failures: u32 },
    Fatal,
}

/// A probe that follows a per-title script instead of talking to a source.
struct StubProbe {
    scripts: HashMap<String, Script>,
    attempts: Mutex<HashMap<String, u32>>,
    sessions_opened: AtomicUsize,
}

impl StubProbe {
    fn new(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(title, script)| (title.to_string(), script))
                .collect(),
            attempts: Mutex::new(HashMap::new()),
            sessions_opened: AtomicUsize::new(0),
        }
    }
}

impl SourceProbe for StubProbe {
    type Session = ();

    fn source(&self) -> Source {
        Source::shop("Stub Shop")
    }

    async fn open_session(&self) -> Result<(), ProbeError> {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn probe(&self, _session: &mut (), book: &Book) -> Result<ProbeResult, ProbeError> {
        match self.scripts.get(&book.title) {
            Some(Script::Found { price }) => {
                let mut result = ProbeResult::found_at(format!("http://shop.test/{}", book.title));
                result.price = *price;
                Ok(result)
            }
            Some(Script::NotFound) | None => Ok(ProbeResult::not_found()),
            Some(Script::Flaky { failures }) => {
                let mut attempts = self.attempts.lock().unwrap();
                let seen = attempts.entry(book.title.clone()).or_insert(0);
                *seen += 1;
                if *seen <= *failures {
                    Err(ProbeError::Timeout)
                } else {
                    Ok(ProbeResult::found_at("http://shop.test/eventually"))
                }
            }
            Some(Script::Fatal) => Err(ProbeError::Markup(
                "result list div missing from page".to_string(),
            )),
        }
    }
}

fn seed_books(conn: &rusqlite::Connection, titles: &[&str]) -> Vec<Book> {
    titles
        .iter()
        .map(|title| {
            let mut book = Book::with_title(*title);
            book.id = Some(insert_book(conn, &book).unwrap());
            book
        })
        .collect()
}

fn options(concurrency: usize) -> RunOptions {
    RunOptions {
        concurrency,
        max_retries: 2,
        ..RunOptions::default()
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<ProbeEvent>) -> Vec<ProbeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn scenario_records_verdicts_and_clear_resets() {
    let conn = bookscout_db::open_memory().unwrap();
    let books = seed_books(&conn, &["Dune", "1984"]);
    let probe = StubProbe::new(vec![
        ("Dune", Script::Found { price: Some(9.99) }),
        ("1984", Script::NotFound),
    ]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(4), tx).await.unwrap();

    assert_eq!(report.recorded(), 2);
    assert_eq!(report.found(), 1);
    assert_eq!(report.failed(), 0);

    let source = ensure_source(&conn, &probe.source()).unwrap();
    let dune = &books[0];
    let orwell = &books[1];

    let verdict = get_availability(&conn, dune, &source).unwrap().unwrap();
    assert!(verdict.present);
    assert_eq!(verdict.price, Some(9.99));

    let verdict = get_availability(&conn, orwell, &source).unwrap().unwrap();
    assert!(!verdict.present);
    assert_eq!(verdict.price, None);

    // Clearing makes both unknown again.
    bookscout_db::clear_availability(&conn, &source).unwrap();
    assert_eq!(get_availability(&conn, dune, &source).unwrap(), None);
    assert_eq!(get_availability(&conn, orwell, &source).unwrap(), None);

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(ProbeEvent::WorklistReady { total: 2 })));
    assert!(matches!(events.last(), Some(ProbeEvent::Done)));
}

#[tokio::test]
async fn rerun_skips_already_probed_unless_forced() {
    let conn = bookscout_db::open_memory().unwrap();
    seed_books(&conn, &["Dune"]);
    let probe = StubProbe::new(vec![("Dune", Script::Found { price: Some(5.00) })]);

    let (tx, _rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(2), tx).await.unwrap();
    assert_eq!(report.recorded(), 1);

    // Resumable: the verdict exists, so the worklist is empty.
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(2), tx).await.unwrap();
    assert!(report.outcomes.is_empty());

    // Forced: re-probed, still exactly one row.
    let probe = StubProbe::new(vec![("Dune", Script::Found { price: Some(7.50) })]);
    let forced = RunOptions {
        force: true,
        ..options(2)
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &forced, tx).await.unwrap();
    assert_eq!(report.recorded(), 1);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM availability", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let source = ensure_source(&conn, &probe.source()).unwrap();
    let dune = resolve_book(&conn, &BookQuery::by_title("Dune")).unwrap();
    let verdict = get_availability(&conn, &dune, &source).unwrap().unwrap();
    assert_eq!(verdict.price, Some(7.50));
}

#[tokio::test]
async fn transient_failures_retry_within_budget() {
    let conn = bookscout_db::open_memory().unwrap();
    seed_books(&conn, &["Dune"]);

    // Two failures, budget of two retries: the third attempt succeeds.
    let probe = StubProbe::new(vec![("Dune", Script::Flaky { failures: 2 })]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(1), tx).await.unwrap();
    assert_eq!(report.recorded(), 1);
    assert_eq!(report.found(), 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_task_without_aborting() {
    let conn = bookscout_db::open_memory().unwrap();
    let books = seed_books(&conn, &["Dune", "1984"]);

    let probe = StubProbe::new(vec![
        ("Dune", Script::Flaky { failures: 10 }),
        ("1984", Script::NotFound),
    ]);
    let (tx, _rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(2), tx).await.unwrap();

    assert_eq!(report.recorded(), 1);
    assert_eq!(report.failed(), 1);
    // Exhausted retries are a transient failure, not a contract break.
    assert_eq!(report.fatal_failures(), 0);

    // The failed book stays unknown; it will be on the next worklist.
    let source = ensure_source(&conn, &probe.source()).unwrap();
    assert_eq!(get_availability(&conn, &books[0], &source).unwrap(), None);
}

#[tokio::test]
async fn fatal_failure_is_reported_and_siblings_complete() {
    let conn = bookscout_db::open_memory().unwrap();
    let books = seed_books(&conn, &["Dune", "1984", "Emma"]);

    let probe = StubProbe::new(vec![
        ("Dune", Script::Found { price: None }),
        ("1984", Script::Fatal),
        ("Emma", Script::NotFound),
    ]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &options(3), tx).await.unwrap();

    assert_eq!(report.recorded(), 2);
    assert_eq!(report.fatal_failures(), 1);

    let source = ensure_source(&conn, &probe.source()).unwrap();
    assert!(get_availability(&conn, &books[0], &source).unwrap().is_some());
    assert_eq!(get_availability(&conn, &books[1], &source).unwrap(), None);
    assert!(get_availability(&conn, &books[2], &source).unwrap().is_some());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ProbeEvent::BookFailed { fatal: true, .. }
    )));
}

#[tokio::test]
async fn failure_threshold_cancels_pending_tasks() {
    let conn = bookscout_db::open_memory().unwrap();
    // Worklist is ordered by title, so "A..." settles first.
    seed_books(&conn, &["A Fatal Book", "B Quiet Book", "C Quiet Book"]);

    let probe = StubProbe::new(vec![
        ("A Fatal Book", Script::Fatal),
        ("B Quiet Book", Script::NotFound),
        ("C Quiet Book", Script::NotFound),
    ]);
    let run_options = RunOptions {
        concurrency: 1,
        fatal_error_limit: 1,
        ..RunOptions::default()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = probe_source(&conn, &probe, &run_options, tx).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.recorded(), 0);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, ProbeEvent::Cancelling { .. })));

    // Skipped books were never probed: still unknown.
    let source = ensure_source(&conn, &probe.source()).unwrap();
    for outcome in &report.outcomes {
        if let BookOutcome::Skipped { title } = outcome {
            let book = resolve_book(&conn, &BookQuery::by_title(title.clone())).unwrap();
            assert_eq!(get_availability(&conn, &book, &source).unwrap(), None);
        }
    }
}

#[tokio::test]
async fn session_pool_never_exceeds_concurrency_cap() {
    let conn = bookscout_db::open_memory().unwrap();
    seed_books(&conn, &["A", "B", "C", "D", "E"]);

    let probe = StubProbe::new(vec![]);
    let (tx, _rx) = mpsc::unbounded_channel();
    probe_source(&conn, &probe, &options(2), tx).await.unwrap();

    let opened = probe.sessions_opened.load(Ordering::Relaxed);
    assert!(opened >= 1);
    assert!(opened <= 2, "opened {opened} sessions for a cap of 2");
}
