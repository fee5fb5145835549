use bookscout_db::{open_database, open_memory};

#[test]
fn memory_schema_creates_all_tables() {
    let conn = open_memory().unwrap();
    for table in [
        "books",
        "sources",
        "availability",
        "tags",
        "book_tags",
        "challenges",
        "challenge_books",
    ] {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        assert!(exists, "missing table {table}");
    }
}

#[test]
fn open_database_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("books.db");

    let conn = open_database(&path).unwrap();
    conn.execute(
        "INSERT INTO books (title) VALUES ('Dune')",
        [],
    )
    .unwrap();
    drop(conn);

    // Reopening must not recreate the schema or lose data.
    let conn = open_database(&path).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn duplicate_isbn_is_rejected() {
    let conn = open_memory().unwrap();
    conn.execute("INSERT INTO books (isbn, title) VALUES ('123', 'Dune')", [])
        .unwrap();
    let result = conn.execute(
        "INSERT INTO books (isbn, title) VALUES ('123', 'Other')",
        [],
    );
    assert!(result.is_err());
}
