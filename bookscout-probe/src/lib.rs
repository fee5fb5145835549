//! Source probing for book availability.
//!
//! Defines the `SourceProbe` capability each external catalog or shop
//! implements, a rate-limited HTTP client for probe implementations, and the
//! orchestrator that drives concurrent (book × source) runs with bounded
//! parallelism, retries, and idempotent persistence.

pub mod client;
pub mod error;
pub mod openlibrary;
pub mod probe;
pub mod run;
pub mod types;

pub use client::ProbeClient;
pub use error::ProbeError;
pub use openlibrary::OpenLibraryProbe;
pub use probe::SourceProbe;
pub use run::{BookOutcome, ProbeEvent, RunError, RunOptions, RunReport, probe_source};
pub use types::ProbeResult;
