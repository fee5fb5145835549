//! Read-only queries for the book catalog.
//!
//! The viewer interface: everything here is a plain read, no mutation.

use bookscout_catalog::types::*;
use rusqlite::{Connection, params};

use crate::operations::StoreError;

fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: Some(row.get(0)?),
        isbn: row.get(1)?,
        title: row.get(2)?,
        read: row.get(3)?,
        tags_searched: row.get(4)?,
    })
}

/// List the whole catalog, ordered by title.
pub fn list_books(conn: &Connection) -> Result<Vec<Book>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, isbn, title, read, tags_searched FROM books ORDER BY title")?;
    let rows = stmt.query_map([], row_to_book)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// List all registered sources, ordered by name.
pub fn list_sources(conn: &Connection) -> Result<Vec<Source>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, kind FROM sources ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        let kind: String = row.get(2)?;
        Ok(Source {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            kind: SourceKind::from_str_loose(&kind),
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// All stored verdicts for one book, keyed by source.
pub fn availability_for_book(
    conn: &Connection,
    book: &Book,
) -> Result<Vec<(Source, Availability)>, StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name, s.kind, a.present, a.price, a.checked_at
         FROM availability a
         JOIN sources s ON s.id = a.source_id
         WHERE a.book_id = ?1
         ORDER BY s.name",
    )?;
    let rows = stmt.query_map(params![book_id], |row| {
        let kind: String = row.get(2)?;
        Ok((
            Source {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                kind: SourceKind::from_str_loose(&kind),
            },
            Availability {
                present: row.get(3)?,
                price: row.get(4)?,
                checked_at: row.get(5)?,
            },
        ))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Tags attached to a book, ordered by name.
pub fn tags_for_book(conn: &Connection, book: &Book) -> Result<Vec<Tag>, StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name FROM tags t
         JOIN book_tags bt ON bt.tag_id = t.id
         WHERE bt.book_id = ?1
         ORDER BY t.name",
    )?;
    let rows = stmt.query_map(params![book_id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Challenges a book belongs to, ordered by name.
pub fn challenges_for_book(conn: &Connection, book: &Book) -> Result<Vec<Challenge>, StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name FROM challenges c
         JOIN challenge_books cb ON cb.challenge_id = c.id
         WHERE cb.book_id = ?1
         ORDER BY c.name",
    )?;
    let rows = stmt.query_map(params![book_id], |row| {
        Ok(Challenge {
            id: Some(row.get(0)?),
            name: row.get(1)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Books grouped under a challenge, ordered by title.
pub fn books_in_challenge(
    conn: &Connection,
    challenge: &Challenge,
) -> Result<Vec<Book>, StoreError> {
    let Some(challenge_id) = challenge.id else {
        return Err(StoreError::MissingKey { entity: "challenge" });
    };
    let mut stmt = conn.prepare(
        "SELECT b.id, b.isbn, b.title, b.read, b.tags_searched FROM books b
         JOIN challenge_books cb ON cb.book_id = b.id
         WHERE cb.challenge_id = ?1
         ORDER BY b.title",
    )?;
    let rows = stmt.query_map(params![challenge_id], row_to_book)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Get overall catalog statistics.
pub fn catalog_stats(conn: &Connection) -> Result<CatalogStats, StoreError> {
    let books: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))?;
    let read: i64 = conn.query_row("SELECT COUNT(*) FROM books WHERE read = 1", [], |r| {
        r.get(0)
    })?;
    let sources: i64 = conn.query_row("SELECT COUNT(*) FROM sources", [], |r| r.get(0))?;
    let verdicts: i64 = conn.query_row("SELECT COUNT(*) FROM availability", [], |r| r.get(0))?;
    let found: i64 = conn.query_row(
        "SELECT COUNT(*) FROM availability WHERE present = 1",
        [],
        |r| r.get(0),
    )?;
    let tags: i64 = conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))?;
    let challenges: i64 = conn.query_row("SELECT COUNT(*) FROM challenges", [], |r| r.get(0))?;

    Ok(CatalogStats {
        books,
        books_read: read,
        sources,
        verdicts,
        verdicts_found: found,
        tags,
        challenges,
    })
}

/// Summary statistics for the catalog.
#[derive(Debug)]
pub struct CatalogStats {
    pub books: i64,
    pub books_read: i64,
    pub sources: i64,
    pub verdicts: i64,
    pub verdicts_found: i64,
    pub tags: i64,
    pub challenges: i64,
}
