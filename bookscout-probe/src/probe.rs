use bookscout_catalog::types::{Book, Source};

use crate::error::ProbeError;
use crate::types::ProbeResult;

/// A probing capability for one external source.
///
/// Implementations own the request/parse cycle against their source's
/// markup or API; the orchestrator owns scheduling, sessions, retries, and
/// persistence.
///
/// Contract:
/// - zero search results, or no candidate title passing the fuzzy matcher,
///   is `found = false`, not an error;
/// - failures are transient (retryable) or fatal per
///   [`ProbeError::is_transient`];
/// - a session is owned by exactly one in-flight task at a time, so probes
///   must keep all mutable parsing state inside the session, never in
///   `self`.
#[allow(async_fn_in_trait)]
pub trait SourceProbe: Send + Sync {
    /// Per-worker state: an HTTP client, a browser session, or `()` for a
    /// stateless probe.
    type Session: Send;

    /// The source this probe targets. Registered idempotently at the start
    /// of every run.
    fn source(&self) -> Source;

    /// Acquire a session for one worker.
    ///
    /// Called when a task starts and no pooled session is free. The
    /// orchestrator returns the session to its pool on completion or
    /// failure, and drops the pool when the run ends.
    async fn open_session(&self) -> Result<Self::Session, ProbeError>;

    /// Probe the source for one book.
    async fn probe(
        &self,
        session: &mut Self::Session,
        book: &Book,
    ) -> Result<ProbeResult, ProbeError>;
}
