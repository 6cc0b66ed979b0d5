//! Primary transcript method: the public timedtext caption endpoint.
//!
//! Each session builds its own HTTP client so that connection pools,
//! cookies and TLS state never survive from one attempt to the next.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use super::error::{looks_rate_limited, FetchError};
use super::subtitles;
use super::{SessionFactory, TranscriptSession};
use crate::video::TranscriptSegment;

const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Factory for disposable timedtext sessions.
pub struct TimedTextSessionFactory {
    base_url: String,
    proxy_url: Option<String>,
}

impl TimedTextSessionFactory {
    pub fn new(proxy_url: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy_url,
        }
    }

    /// Overrides the endpoint base URL, used by tests against a local
    /// server.
    pub fn with_base_url(base_url: impl Into<String>, proxy_url: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            proxy_url,
        }
    }
}

impl SessionFactory for TimedTextSessionFactory {
    fn create_session(&self) -> Box<dyn TranscriptSession> {
        Box::new(TimedTextSession {
            base_url: self.base_url.clone(),
            proxy_url: self.proxy_url.clone(),
        })
    }
}

struct TimedTextSession {
    base_url: String,
    proxy_url: Option<String>,
}

impl TimedTextSession {
    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = &self.proxy_url {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| FetchError::Network(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

#[async_trait]
impl TranscriptSession for TimedTextSession {
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, FetchError> {
        let client = self.build_client()?;

        for lang in languages {
            let url = format!(
                "{}/api/timedtext?v={}&lang={}&fmt=json3",
                self.base_url, video_id, lang
            );
            let response = client.get(&url).send().await.map_err(|e| {
                let msg = e.to_string();
                if looks_rate_limited(&msg) {
                    FetchError::RateLimited(msg)
                } else {
                    FetchError::Network(msg)
                }
            })?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::RateLimited(format!(
                    "timedtext returned 429 for {}",
                    video_id
                )));
            }
            if !status.is_success() {
                debug!(
                    "timedtext {} for {} lang {}, trying next language",
                    status, video_id, lang
                );
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            // An empty body means the track does not exist for this language.
            if body.trim().is_empty() {
                continue;
            }

            match subtitles::parse_json3(&body) {
                Some(segments) => return Ok(segments),
                None => {
                    debug!("Unparseable timedtext body for {} lang {}", video_id, lang);
                    continue;
                }
            }
        }

        Err(FetchError::NoTranscriptFound(video_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_produces_independent_sessions() {
        let factory = TimedTextSessionFactory::new(None);
        let a = factory.create_session();
        let b = factory.create_session();
        // Two distinct boxed sessions; state is never shared between them.
        assert_ne!(
            &*a as *const dyn TranscriptSession as *const () as usize,
            &*b as *const dyn TranscriptSession as *const () as usize
        );
    }

    #[tokio::test]
    async fn test_invalid_proxy_is_a_network_error() {
        let factory =
            TimedTextSessionFactory::with_base_url("http://127.0.0.1:1", Some(":".to_string()));
        let session = factory.create_session();
        let result = session.fetch("vid", &["en".to_string()]).await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
