//! Core domain types for the book catalog.
//!
//! Shared by the persistence layer, the probes, and the importers.
//! Contains no I/O; the store owns entity identity and lifetime.

pub mod titles;
pub mod types;

pub use titles::{CATALOG_DISTANCE, FREE_TEXT_DISTANCE, equivalent_titles, search_term};
pub use types::{Availability, Book, Challenge, Source, SourceKind, Tag};
