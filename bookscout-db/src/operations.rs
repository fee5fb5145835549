//! Identity resolution and write operations for all catalog entity types.
//!
//! The resolver turns a partial entity reference into the fully-populated
//! stored record using an explicit per-entity key list (no runtime field
//! reflection). All availability writes go through a single idempotent
//! upsert path.

use bookscout_catalog::types::*;
use rusqlite::{Connection, params, params_from_iter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{entity} not found for {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("{entity} lookup by {key} matched {matches} rows; store invariant broken")]
    AmbiguousMatch {
        entity: &'static str,
        key: String,
        matches: usize,
    },
    #[error("no lookup key populated for {entity}")]
    MissingKey { entity: &'static str },
}

impl StoreError {
    /// Whether this error indicates store corruption rather than a normal
    /// runtime condition. Corruption aborts a batch run; everything else is
    /// handled per entity.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::AmbiguousMatch { .. })
    }
}

// ── Book Resolution ─────────────────────────────────────────────────────────

/// Partial reference to a book, used for identity resolution.
///
/// Populate any subset of fields. Lookup keys are tried in priority order
/// id → isbn → title; an id, once known, is authoritative and skips the
/// rest. Remaining populated fields are ANDed into the match.
#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    pub id: Option<i64>,
    pub isbn: Option<String>,
    pub title: Option<String>,
}

impl BookQuery {
    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_isbn(isbn: impl Into<String>) -> Self {
        Self {
            isbn: Some(isbn.into()),
            ..Self::default()
        }
    }

    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Short description of the populated key, for error messages.
    fn describe(&self) -> String {
        if let Some(id) = self.id {
            format!("id {id}")
        } else if let Some(ref isbn) = self.isbn {
            format!("isbn '{isbn}'")
        } else if let Some(ref title) = self.title {
            format!("title '{title}'")
        } else {
            "empty query".to_string()
        }
    }
}

impl From<&Book> for BookQuery {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            isbn: book.isbn.clone(),
            title: Some(book.title.clone()),
        }
    }
}

/// Build the WHERE clause and parameter list for a book query.
///
/// The chosen key decides the shape: an id stands alone, an isbn is
/// optionally constrained by title, a bare title matches on title only.
fn book_where(query: &BookQuery) -> Result<(String, Vec<Box<dyn rusqlite::ToSql>>), StoreError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(id) = query.id {
        clauses.push("id = ?");
        values.push(Box::new(id));
    } else if let Some(ref isbn) = query.isbn {
        clauses.push("isbn = ?");
        values.push(Box::new(isbn.clone()));
        if let Some(ref title) = query.title {
            clauses.push("title = ?");
            values.push(Box::new(title.clone()));
        }
    } else if let Some(ref title) = query.title {
        clauses.push("title = ?");
        values.push(Box::new(title.clone()));
    } else {
        return Err(StoreError::MissingKey { entity: "book" });
    }

    Ok((clauses.join(" AND "), values))
}

fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: Some(row.get(0)?),
        isbn: row.get(1)?,
        title: row.get(2)?,
        read: row.get(3)?,
        tags_searched: row.get(4)?,
    })
}

/// Resolve a partial book reference to its canonical stored record.
///
/// Exactly one row must match: zero rows is `NotFound`, more than one is
/// `AmbiguousMatch` (a store invariant violation — never silently picks
/// one). On success every field of the returned book is populated from the
/// stored row, id included.
pub fn resolve_book(conn: &Connection, query: &BookQuery) -> Result<Book, StoreError> {
    let (clause, values) = book_where(query)?;
    let sql = format!("SELECT id, isbn, title, read, tags_searched FROM books WHERE {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), row_to_book)?;
    let mut books = rows.collect::<Result<Vec<_>, _>>()?;

    match books.len() {
        0 => Err(StoreError::NotFound {
            entity: "book",
            key: query.describe(),
        }),
        1 => Ok(books.remove(0)),
        n => Err(StoreError::AmbiguousMatch {
            entity: "book",
            key: query.describe(),
            matches: n,
        }),
    }
}

/// Check whether a book matching the query exists, without resolving it.
///
/// Same matching logic as [`resolve_book`], used for idempotent-insert
/// checks. An ambiguous match still reports the invariant violation.
pub fn book_exists(conn: &Connection, query: &BookQuery) -> Result<bool, StoreError> {
    match resolve_book(conn, query) {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Book Writes ─────────────────────────────────────────────────────────────

/// Insert a new book. Returns the generated id.
///
/// Callers are expected to have checked [`book_exists`] first; inserting a
/// duplicate isbn fails on the unique constraint.
pub fn insert_book(conn: &Connection, book: &Book) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO books (isbn, title, read, tags_searched) VALUES (?1, ?2, ?3, ?4)",
        params![book.isbn, book.title, book.read, book.tags_searched],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Update a resolved book's mutable fields in place.
pub fn update_book(conn: &Connection, book: &Book) -> Result<(), StoreError> {
    let Some(id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let changed = conn.execute(
        "UPDATE books SET isbn = ?2, title = ?3, read = ?4, tags_searched = ?5,
             updated_at = datetime('now')
         WHERE id = ?1",
        params![id, book.isbn, book.title, book.read, book.tags_searched],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "book",
            key: format!("id {id}"),
        });
    }
    Ok(())
}

/// Mark a book's tags as fetched.
pub fn set_tags_searched(conn: &Connection, book: &Book) -> Result<(), StoreError> {
    let Some(id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    conn.execute(
        "UPDATE books SET tags_searched = 1, updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// ── Source Operations ───────────────────────────────────────────────────────

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<Source> {
    let kind: String = row.get(2)?;
    Ok(Source {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        kind: SourceKind::from_str_loose(&kind),
    })
}

/// Resolve a source by its unique name.
pub fn resolve_source(conn: &Connection, name: &str) -> Result<Source, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, kind FROM sources WHERE name = ?1")?;
    let rows = stmt.query_map(params![name], row_to_source)?;
    let mut sources = rows.collect::<Result<Vec<_>, _>>()?;
    match sources.len() {
        0 => Err(StoreError::NotFound {
            entity: "source",
            key: format!("name '{name}'"),
        }),
        1 => Ok(sources.remove(0)),
        n => Err(StoreError::AmbiguousMatch {
            entity: "source",
            key: format!("name '{name}'"),
            matches: n,
        }),
    }
}

/// Create a source if it doesn't exist and return the resolved record.
///
/// Idempotent: re-registering an existing name is a no-op and keeps the
/// stored kind.
pub fn ensure_source(conn: &Connection, source: &Source) -> Result<Source, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO sources (name, kind) VALUES (?1, ?2)",
        params![source.name, source.kind.as_str()],
    )?;
    resolve_source(conn, &source.name)
}

// ── Availability Operations ─────────────────────────────────────────────────

fn require_ids(book: &Book, source: &Source) -> Result<(i64, i64), StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let Some(source_id) = source.id else {
        return Err(StoreError::MissingKey { entity: "source" });
    };
    Ok((book_id, source_id))
}

/// Record a probe verdict for a (book, source) pair.
///
/// This is the single write path for availability: insert if no record
/// exists, else update in place. Probing a pair any number of times
/// converges to the latest verdict — history never accumulates.
pub fn upsert_availability(
    conn: &Connection,
    source: &Source,
    book: &Book,
    present: bool,
    price: Option<f64>,
) -> Result<(), StoreError> {
    let (book_id, source_id) = require_ids(book, source)?;
    conn.execute(
        "INSERT INTO availability (book_id, source_id, present, price)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(book_id, source_id) DO UPDATE SET
             present = excluded.present,
             price = excluded.price,
             checked_at = datetime('now')",
        params![book_id, source_id, present, price],
    )?;
    Ok(())
}

/// Delete all availability records for a source, forcing a full re-probe.
///
/// Book and source rows are untouched. Returns the number of rows removed.
pub fn clear_availability(conn: &Connection, source: &Source) -> Result<usize, StoreError> {
    let Some(source_id) = source.id else {
        return Err(StoreError::MissingKey { entity: "source" });
    };
    let deleted = conn.execute(
        "DELETE FROM availability WHERE source_id = ?1",
        params![source_id],
    )?;
    Ok(deleted)
}

/// Fetch the stored verdict for a (book, source) pair.
///
/// `None` means the pair has never been probed — distinct from a stored
/// `present = false`.
pub fn get_availability(
    conn: &Connection,
    book: &Book,
    source: &Source,
) -> Result<Option<Availability>, StoreError> {
    let (book_id, source_id) = require_ids(book, source)?;
    let mut stmt = conn.prepare(
        "SELECT present, price, checked_at FROM availability
         WHERE book_id = ?1 AND source_id = ?2",
    )?;
    let result = stmt.query_row(params![book_id, source_id], |row| {
        Ok(Availability {
            present: row.get(0)?,
            price: row.get(1)?,
            checked_at: row.get(2)?,
        })
    });
    match result {
        Ok(a) => Ok(Some(a)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Books still needing a probe against a source.
///
/// With `include_already_probed` set, returns the whole catalog (the
/// `--force` path); otherwise books with an existing availability record
/// for this source are filtered out, making runs resumable.
pub fn get_worklist(
    conn: &Connection,
    source: &Source,
    include_already_probed: bool,
) -> Result<Vec<Book>, StoreError> {
    let Some(source_id) = source.id else {
        return Err(StoreError::MissingKey { entity: "source" });
    };

    if include_already_probed {
        let mut stmt = conn
            .prepare("SELECT id, isbn, title, read, tags_searched FROM books ORDER BY title")?;
        let rows = stmt.query_map([], row_to_book)?;
        return rows.collect::<Result<Vec<_>, _>>().map_err(Into::into);
    }

    let mut stmt = conn.prepare(
        "SELECT id, isbn, title, read, tags_searched FROM books
         WHERE NOT EXISTS (
             SELECT 1 FROM availability a
             WHERE a.book_id = books.id AND a.source_id = ?1
         )
         ORDER BY title",
    )?;
    let rows = stmt.query_map(params![source_id], row_to_book)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Tag Operations ──────────────────────────────────────────────────────────

/// Attach tags to a book, creating tag rows as needed.
///
/// Both the tag names and the (book, tag) pairs are deduplicated; re-adding
/// an existing pair is a no-op. Blank tags are skipped. Returns the number
/// of newly-attached pairs.
pub fn add_book_tags(conn: &Connection, book: &Book, tags: &[String]) -> Result<usize, StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };

    let mut added = 0;
    for tag in tags {
        let name = tag.trim();
        if name.is_empty() {
            continue;
        }
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        let tag_id: i64 =
            conn.query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                row.get(0)
            })?;
        added += conn.execute(
            "INSERT OR IGNORE INTO book_tags (book_id, tag_id) VALUES (?1, ?2)",
            params![book_id, tag_id],
        )?;
    }
    Ok(added)
}

// ── Challenge Operations ────────────────────────────────────────────────────

/// Create a challenge if it doesn't exist and return the resolved record.
pub fn ensure_challenge(conn: &Connection, challenge: &Challenge) -> Result<Challenge, StoreError> {
    conn.execute(
        "INSERT OR IGNORE INTO challenges (name) VALUES (?1)",
        params![challenge.name],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM challenges WHERE name = ?1",
        params![challenge.name],
        |row| row.get(0),
    )?;
    Ok(Challenge {
        id: Some(id),
        name: challenge.name.clone(),
    })
}

/// Add a book to a challenge. Returns false if the pair already existed.
pub fn add_book_to_challenge(
    conn: &Connection,
    book: &Book,
    challenge: &Challenge,
) -> Result<bool, StoreError> {
    let Some(book_id) = book.id else {
        return Err(StoreError::MissingKey { entity: "book" });
    };
    let Some(challenge_id) = challenge.id else {
        return Err(StoreError::MissingKey { entity: "challenge" });
    };
    let changed = conn.execute(
        "INSERT OR IGNORE INTO challenge_books (challenge_id, book_id) VALUES (?1, ?2)",
        params![challenge_id, book_id],
    )?;
    Ok(changed > 0)
}
