/// Errors that can occur during probe operations.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by source")]
    RateLimited,

    #[error("Unexpected response structure: {0}")]
    Markup(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl ProbeError {
    /// Transient failures (network, timeout, throttling, server-side 5xx)
    /// may be retried.
    ///
    /// A client-side HTTP status (404, 403, ...) is fatal: the request
    /// itself is wrong for this source, and retrying the same request
    /// cannot fix it. Likewise [`ProbeError::Markup`] means the source's
    /// response no longer matches what the probe expects; it is surfaced as
    /// a per-book diagnostic instead.
    pub fn is_transient(&self) -> bool {
        match self {
            ProbeError::Http(e) => match e.status() {
                Some(status) => status.is_server_error(),
                None => true,
            },
            ProbeError::Timeout | ProbeError::RateLimited => true,
            ProbeError::Markup(_) | ProbeError::Session(_) => false,
        }
    }
}
