//! Entity types for books, sources, tags, and challenges.

/// A book in the personal catalog.
///
/// `id` is the synthetic store identity. A handle with `id: None` is an
/// unresolved cache and must go through the identity resolver before it can
/// be used in any keyed write.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: Option<i64>,
    /// ISBN when known. Unique within the store when present.
    pub isbn: Option<String>,
    /// Canonical title. Unique within the store.
    pub title: String,
    /// Whether the book has been read.
    pub read: bool,
    /// Whether tags have already been fetched for this book.
    pub tags_searched: bool,
}

impl Book {
    /// Create an unresolved handle carrying only a title.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            id: None,
            isbn: None,
            title: title.into(),
            read: false,
            tags_searched: false,
        }
    }
}

/// What kind of probing target a source is.
///
/// Libraries and shops are the same structural shape; the kind only matters
/// for display and for whether a price is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Library,
    Shop,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Library => "library",
            SourceKind::Shop => "shop",
        }
    }

    /// Parse a stored kind string, defaulting to `Library` for unknown values.
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "shop" => SourceKind::Shop,
            _ => SourceKind::Library,
        }
    }
}

/// A named external catalog or bookshop that can be probed for availability.
///
/// Identity is by name, unique within the store. Sources are created
/// idempotently on first reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: Option<i64>,
    pub name: String,
    pub kind: SourceKind,
}

impl Source {
    pub fn library(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: SourceKind::Library,
        }
    }

    pub fn shop(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind: SourceKind::Shop,
        }
    }
}

/// Stored availability verdict for one (book, source) pair.
///
/// A missing record means "never probed", which is distinct from
/// `present = false` ("probed and absent"). Callers must not conflate the
/// two.
#[derive(Debug, Clone, PartialEq)]
pub struct Availability {
    pub present: bool,
    pub price: Option<f64>,
    pub checked_at: String,
}

/// A free-text label attached to books, deduplicated by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// A named reading-challenge grouping of books.
#[derive(Debug, Clone, PartialEq)]
pub struct Challenge {
    pub id: Option<i64>,
    pub name: String,
}

impl Challenge {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}
