/// Verdict returned by a single probe of one source for one book.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// Whether the source carries the book. A non-match is a normal
    /// outcome, never an error.
    pub found: bool,
    /// Link to the search results or the book's page, when found.
    pub reference_url: Option<String>,
    /// Price at the source, for shops. Libraries leave this unset.
    pub price: Option<f64>,
}

impl ProbeResult {
    /// The book is not carried by this source.
    pub fn not_found() -> Self {
        Self::default()
    }

    /// The book was found at the given URL.
    pub fn found_at(url: impl Into<String>) -> Self {
        Self {
            found: true,
            reference_url: Some(url.into()),
            price: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}
