//! Fetch error taxonomy.
//!
//! Retry logic branches on data, not on exception types: permanent
//! content conditions short-circuit the retry loop, everything else is
//! retryable and consumes one attempt.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("no transcript found for video {0}")]
    NoTranscriptFound(String),

    #[error("video {0} is unavailable")]
    VideoUnavailable(String),

    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned malformed data: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Permanent content conditions: retrying cannot change the outcome,
    /// the definitive answer is "no transcript".
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FetchError::TranscriptsDisabled(_)
                | FetchError::NoTranscriptFound(_)
                | FetchError::VideoUnavailable(_)
        )
    }

    /// Whether this error looks like upstream throttling. Besides the
    /// explicit variant, transport errors are sniffed for the usual
    /// rate-limit signatures.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            FetchError::RateLimited(_) => true,
            FetchError::Network(msg) | FetchError::Malformed(msg) => looks_rate_limited(msg),
            _ => false,
        }
    }
}

/// Message-pattern sniffing for rate-limit signals from upstreams that
/// do not report a clean 429.
pub fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429") || lower.contains("too many requests") || lower.contains("rate")
}
