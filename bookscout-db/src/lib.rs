//! SQLite persistence layer for the book catalog.
//!
//! Provides schema creation, identity resolution, idempotent write
//! operations, and read-only query APIs backed by SQLite (via rusqlite with
//! bundled feature).

pub mod operations;
pub mod queries;
pub mod schema;

pub use operations::{
    BookQuery, StoreError, add_book_tags, add_book_to_challenge, book_exists, clear_availability,
    ensure_challenge, ensure_source, get_availability, get_worklist, insert_book, resolve_book,
    resolve_source, set_tags_searched, update_book, upsert_availability,
};
pub use queries::{
    CatalogStats, availability_for_book, books_in_challenge, catalog_stats, challenges_for_book,
    list_books, list_sources, tags_for_book,
};
pub use schema::{open_database, open_memory};
