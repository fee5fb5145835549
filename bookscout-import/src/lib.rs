//! Importers for the book catalog.
//!
//! Bulk ingestion from a tabular reading-tracker export, and paginated
//! reading-challenge import behind a pluggable page fetcher.

pub mod challenge;
pub mod storygraph;

use bookscout_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Fetch error: {0}")]
    Fetch(String),
}

pub use challenge::{ChallengeOptions, ChallengePage, ChallengePages, ChallengeStats, import_challenge};
pub use storygraph::{ImportStats, import_books_csv};
