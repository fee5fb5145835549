//! Probe for the Open Library public search API.
//!
//! Open Library is a catalog, not a shop: a hit yields a reference URL and
//! no price. The API returns JSON, so this probe needs no HTML parsing.

use bookscout_catalog::types::{Book, Source};
use bookscout_catalog::{CATALOG_DISTANCE, equivalent_titles, search_term};
use serde::Deserialize;

use crate::client::ProbeClient;
use crate::error::ProbeError;
use crate::probe::SourceProbe;
use crate::types::ProbeResult;

const SEARCH_URL: &str = "https://openlibrary.org/search.json";
const RESULT_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(default)]
    title: String,
    key: Option<String>,
}

pub struct OpenLibraryProbe {
    client: ProbeClient,
}

impl OpenLibraryProbe {
    pub fn new() -> Result<Self, ProbeError> {
        Ok(Self {
            client: ProbeClient::new()?,
        })
    }
}

impl SourceProbe for OpenLibraryProbe {
    type Session = ProbeClient;

    fn source(&self) -> Source {
        Source::library("Open Library")
    }

    async fn open_session(&self) -> Result<ProbeClient, ProbeError> {
        // Clones share the rate limiter, so concurrent workers still
        // throttle as a group.
        Ok(self.client.clone())
    }

    async fn probe(
        &self,
        session: &mut ProbeClient,
        book: &Book,
    ) -> Result<ProbeResult, ProbeError> {
        let params = [
            ("q", search_term(&book.title)),
            ("limit", RESULT_LIMIT.to_string()),
        ];
        let response: SearchResponse = session.get_json(SEARCH_URL, &params).await?;

        for doc in &response.docs {
            if equivalent_titles(&doc.title, &book.title, CATALOG_DISTANCE) {
                let url = doc
                    .key
                    .as_deref()
                    .map(|key| format!("https://openlibrary.org{key}"));
                return Ok(ProbeResult {
                    found: true,
                    reference_url: url,
                    price: None,
                });
            }
        }

        Ok(ProbeResult::not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_parses_docs() {
        let json = r#"{"numFound": 2, "docs": [
            {"title": "Dune", "key": "/works/OL893415W"},
            {"title": "Dune Messiah"}
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.docs.len(), 2);
        assert_eq!(parsed.docs[0].key.as_deref(), Some("/works/OL893415W"));
        assert_eq!(parsed.docs[1].key, None);
    }

    #[test]
    fn empty_response_yields_no_docs() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.docs.is_empty());
    }
}
