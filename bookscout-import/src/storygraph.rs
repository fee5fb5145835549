//! Import a StoryGraph-style CSV export into the catalog.
//!
//! Columns: identifier, title, read count, tag list. Books are upserted
//! through the identity resolver — a row matching an existing book updates
//! it in place, so re-importing the same export never duplicates.

use std::io::Read;

use bookscout_catalog::types::Book;
use bookscout_db::{BookQuery, StoreError, operations};
use rusqlite::Connection;
use serde::Deserialize;

use crate::ImportError;

/// One row of the export. Field names follow the StoryGraph CSV header.
#[derive(Debug, Deserialize)]
struct ExportRow {
    #[serde(rename = "ISBN/UID")]
    isbn: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Read Count")]
    read_count: String,
    #[serde(rename = "Tags", default)]
    tags: String,
}

/// Statistics from a CSV import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    pub tags_added: usize,
}

/// Find the stored record a row refers to, if any.
///
/// Keys on isbn when the row has one, title otherwise. An isbn lookup that
/// misses falls back to the title: the book may have entered the catalog
/// from an earlier export that did not carry its isbn yet, and inserting
/// would leave two rows with the same title.
fn resolve_existing(conn: &Connection, book: &Book) -> Result<Option<Book>, ImportError> {
    let query = match &book.isbn {
        Some(isbn) => BookQuery::by_isbn(isbn.clone()),
        None => BookQuery::by_title(book.title.clone()),
    };
    match operations::resolve_book(conn, &query) {
        Ok(existing) => return Ok(Some(existing)),
        Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    if book.isbn.is_some() {
        match operations::resolve_book(conn, &BookQuery::by_title(book.title.clone())) {
            Ok(existing) => return Ok(Some(existing)),
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(None)
}

/// Import books and tags from a CSV export.
pub fn import_books_csv(conn: &Connection, reader: impl Read) -> Result<ImportStats, ImportError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut stats = ImportStats::default();

    for row in csv_reader.deserialize::<ExportRow>() {
        let row = row?;
        let title = row.title.trim();
        if title.is_empty() {
            continue;
        }

        let isbn = Some(row.isbn.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let read = row
            .read_count
            .trim()
            .parse::<u32>()
            .map(|n| n > 0)
            .unwrap_or(false);

        let book = Book {
            id: None,
            isbn,
            title: title.to_string(),
            read,
            tags_searched: false,
        };

        let resolved = match resolve_existing(conn, &book)? {
            Some(mut existing) => {
                existing.read = book.read;
                if book.isbn.is_some() {
                    existing.isbn = book.isbn.clone();
                }
                operations::update_book(conn, &existing)?;
                stats.updated += 1;
                existing
            }
            None => {
                let id = operations::insert_book(conn, &book)?;
                stats.created += 1;
                Book {
                    id: Some(id),
                    ..book
                }
            }
        };

        let tags: Vec<String> = row
            .tags
            .split(',')
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        stats.tags_added += operations::add_book_tags(conn, &resolved, &tags)?;
    }

    Ok(stats)
}
