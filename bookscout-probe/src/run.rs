//! The probe orchestrator.
//!
//! Drives concurrent (book × source) probing: pulls the worklist from the
//! store, dispatches each book to the source's probe under a concurrency
//! cap, and commits each verdict through the idempotent availability upsert
//! as it settles. Task state machine per book:
//! Pending → Probing → Recorded | Failed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bookscout_catalog::types::Book;
use bookscout_db::{StoreError, operations};
use futures::stream::{self, StreamExt};
use rusqlite::Connection;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Duration;

use crate::error::ProbeError;
use crate::probe::SourceProbe;
use crate::types::ProbeResult;

/// Backoff between retry attempts after a transient failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Options for a probing run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Probe every book, even those with an existing verdict for this
    /// source.
    pub force: bool,
    /// Drop the source's existing verdicts before starting.
    pub clear: bool,
    /// Maximum simultaneous in-flight probes. A hard ceiling — the run
    /// never exceeds it, even transiently — sized to stay under upstream
    /// rate limits.
    pub concurrency: usize,
    /// Retry attempts after a transient probe failure before the task
    /// fails.
    pub max_retries: u32,
    /// Stop starting pending tasks once this many tasks have failed.
    /// In-flight tasks complete normally.
    pub fatal_error_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            clear: false,
            concurrency: 10,
            max_retries: 2,
            fatal_error_limit: 5,
        }
    }
}

/// Progress events emitted during a run, consumed by the CLI.
#[derive(Debug, Clone)]
pub enum ProbeEvent {
    /// Worklist loaded, total task count known.
    WorklistReady { total: usize },
    /// A book has started probing (assigned to a worker).
    BookStarted { index: usize, title: String },
    /// A verdict was recorded.
    BookRecorded {
        index: usize,
        title: String,
        present: bool,
        price: Option<f64>,
    },
    /// Probing failed for this book. The run continues; `fatal` marks a
    /// source-contract failure rather than exhausted retries.
    BookFailed {
        index: usize,
        title: String,
        reason: String,
        fatal: bool,
    },
    /// The book was not probed because the run was cancelled.
    BookSkipped { index: usize, title: String },
    /// Failure threshold reached; pending tasks will not start.
    Cancelling { failed: usize },
    /// All tasks settled.
    Done,
}

/// Errors that abort an entire run.
///
/// Only store corruption gets here; per-book probe and store errors are
/// reported as outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-book outcome of a run.
#[derive(Debug, Clone)]
pub enum BookOutcome {
    Recorded { title: String, result: ProbeResult },
    Failed {
        title: String,
        reason: String,
        fatal: bool,
    },
    Skipped { title: String },
}

/// Result of a probing run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<BookOutcome>,
}

impl RunReport {
    pub fn recorded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BookOutcome::Recorded { .. }))
            .count()
    }

    pub fn found(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BookOutcome::Recorded { result, .. } if result.found))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BookOutcome::Failed { .. }))
            .count()
    }

    /// Failures caused by a broken source contract. A non-zero count makes
    /// the CLI exit non-zero.
    pub fn fatal_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BookOutcome::Failed { fatal: true, .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BookOutcome::Skipped { .. }))
            .count()
    }
}

/// Internal result of a single settled task.
enum TaskResult {
    Recorded { book: Book, result: ProbeResult },
    Failed {
        book: Book,
        reason: String,
        fatal: bool,
    },
    Skipped { book: Book },
}

/// Probe one source for every book on its worklist.
///
/// Registers the source idempotently, then probes under the concurrency
/// cap. Each verdict is committed through `upsert_availability` as it
/// settles, so a cancelled or crashed run keeps everything recorded so
/// far. Ordering across tasks is unspecified; only one task targets a
/// given (book, source) key per run, so commit order cannot matter.
pub async fn probe_source<P: SourceProbe>(
    conn: &Connection,
    probe: &P,
    options: &RunOptions,
    events: mpsc::UnboundedSender<ProbeEvent>,
) -> Result<RunReport, RunError> {
    let source = operations::ensure_source(conn, &probe.source())?;

    if options.clear {
        operations::clear_availability(conn, &source)?;
    }

    let worklist = operations::get_worklist(conn, &source, options.force)?;
    let _ = events.send(ProbeEvent::WorklistReady {
        total: worklist.len(),
    });

    // Sessions live in a pool bounded by the concurrency cap: a task takes
    // one at start (opening it if the pool is empty) and returns it on
    // completion or failure, so at most `concurrency` sessions ever exist.
    let sessions: Arc<Mutex<Vec<P::Session>>> = Arc::new(Mutex::new(Vec::new()));
    let cancel_flag = Arc::new(AtomicBool::new(false));

    let mut tasks = stream::iter(worklist.into_iter().enumerate())
        .map(|(index, book)| {
            let events = events.clone();
            let sessions = sessions.clone();
            let cancel_flag = cancel_flag.clone();
            async move {
                if cancel_flag.load(Ordering::Relaxed) {
                    let _ = events.send(ProbeEvent::BookSkipped {
                        index,
                        title: book.title.clone(),
                    });
                    return (index, TaskResult::Skipped { book });
                }

                let _ = events.send(ProbeEvent::BookStarted {
                    index,
                    title: book.title.clone(),
                });

                let pooled = sessions.lock().await.pop();
                let mut session = match pooled {
                    Some(session) => session,
                    None => match probe.open_session().await {
                        Ok(session) => session,
                        Err(e) => {
                            let fatal = !e.is_transient();
                            return (
                                index,
                                TaskResult::Failed {
                                    book,
                                    reason: e.to_string(),
                                    fatal,
                                },
                            );
                        }
                    },
                };

                let result =
                    probe_with_retries(probe, &mut session, &book, options.max_retries).await;
                sessions.lock().await.push(session);

                match result {
                    Ok(result) => (index, TaskResult::Recorded { book, result }),
                    Err(e) => {
                        let fatal = !e.is_transient();
                        (
                            index,
                            TaskResult::Failed {
                                book,
                                reason: e.to_string(),
                                fatal,
                            },
                        )
                    }
                }
            }
        })
        .buffer_unordered(options.concurrency.max(1));

    let mut report = RunReport::default();
    let mut failed = 0usize;

    // Single writer: verdicts are committed here, between stream polls, so
    // each upsert is its own transaction and partial progress survives.
    while let Some((index, task)) = tasks.next().await {
        match task {
            TaskResult::Recorded { book, result } => {
                match operations::upsert_availability(
                    conn,
                    &source,
                    &book,
                    result.found,
                    result.price,
                ) {
                    Ok(()) => {
                        let _ = events.send(ProbeEvent::BookRecorded {
                            index,
                            title: book.title.clone(),
                            present: result.found,
                            price: result.price,
                        });
                        report.outcomes.push(BookOutcome::Recorded {
                            title: book.title,
                            result,
                        });
                    }
                    // Store corruption aborts the run; in-flight tasks are
                    // dropped with the stream, already-committed verdicts
                    // stay.
                    Err(e) if e.is_corruption() => return Err(e.into()),
                    Err(e) => {
                        failed += 1;
                        let reason = e.to_string();
                        let _ = events.send(ProbeEvent::BookFailed {
                            index,
                            title: book.title.clone(),
                            reason: reason.clone(),
                            fatal: false,
                        });
                        report.outcomes.push(BookOutcome::Failed {
                            title: book.title,
                            reason,
                            fatal: false,
                        });
                    }
                }
            }
            TaskResult::Failed {
                book,
                reason,
                fatal,
            } => {
                failed += 1;
                let _ = events.send(ProbeEvent::BookFailed {
                    index,
                    title: book.title.clone(),
                    reason: reason.clone(),
                    fatal,
                });
                report.outcomes.push(BookOutcome::Failed {
                    title: book.title,
                    reason,
                    fatal,
                });
            }
            TaskResult::Skipped { book } => {
                report.outcomes.push(BookOutcome::Skipped { title: book.title });
            }
        }

        if failed >= options.fatal_error_limit && !cancel_flag.load(Ordering::Relaxed) {
            cancel_flag.store(true, Ordering::Relaxed);
            let _ = events.send(ProbeEvent::Cancelling { failed });
        }
    }

    let _ = events.send(ProbeEvent::Done);
    Ok(report)
}

/// Probe with a bounded in-run retry budget for transient failures.
async fn probe_with_retries<P: SourceProbe>(
    probe: &P,
    session: &mut P::Session,
    book: &Book,
    max_retries: u32,
) -> Result<ProbeResult, ProbeError> {
    let mut attempt = 0;
    loop {
        match probe.probe(session, book).await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                log::debug!(
                    "transient failure for '{}' (attempt {attempt}): {e}",
                    book.title
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}
