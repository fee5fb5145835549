use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::error::ProbeError;

/// Minimum spacing between requests to one source. Sources ban aggressive
/// clients; this is a hard floor shared by every session of the source, not
/// a target rate.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1200);

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for probe implementations.
///
/// Clones share one rate limiter, so handing a clone to each worker session
/// still throttles the source as a group.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    last_request: Arc<Mutex<Instant>>,
}

impl ProbeClient {
    pub fn new() -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            last_request: Arc::new(Mutex::new(Instant::now() - MIN_REQUEST_INTERVAL)),
        })
    }

    /// GET a URL with query parameters, honoring the rate limit.
    pub async fn get_text(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<String, ProbeError> {
        self.rate_limit().await;

        let resp = self
            .http
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(classify)?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProbeError::RateLimited);
        }
        let resp = resp.error_for_status().map_err(classify)?;
        resp.text().await.map_err(classify)
    }

    /// GET a URL and deserialize the JSON response.
    ///
    /// A parse failure is a fatal markup error: the source's response shape
    /// changed, and retrying the same request cannot fix it.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProbeError> {
        let text = self.get_text(url, params).await?;
        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(200).collect();
            ProbeError::Markup(format!("failed to parse response: {e}. Response: {snippet}"))
        })
    }

    /// Enforce rate limiting: wait until at least `MIN_REQUEST_INTERVAL`
    /// has passed since the last request through this limiter.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < MIN_REQUEST_INTERVAL {
            tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
        }
        *last = Instant::now();
    }
}

/// Map reqwest failures onto the probe taxonomy.
fn classify(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Http(e)
    }
}
