//! Resilient acquisition of video metadata and transcripts.
//!
//! The primary transcript path talks to the caption endpoint through a
//! fresh, disposable session per attempt so that no request fingerprint
//! accumulates across retries. When the attempt budget is exhausted a
//! secondary subprocess-based method runs exactly once. A missing
//! transcript is a normal outcome here, not an error.

pub mod backoff;
pub mod error;
pub mod subtitles;
pub mod timedtext;
pub mod ytdlp;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

pub use backoff::BackoffPolicy;
pub use error::FetchError;
pub use timedtext::TimedTextSessionFactory;
pub use ytdlp::YtDlp;

use crate::video::{self, TranscriptResult, TranscriptSegment, VideoMetadata};

/// A single-use transcript session. One session serves exactly one
/// attempt and is discarded afterwards.
#[async_trait]
pub trait TranscriptSession: Send + Sync {
    async fn fetch(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, FetchError>;
}

/// Produces a fresh session for every attempt.
pub trait SessionFactory: Send + Sync {
    fn create_session(&self) -> Box<dyn TranscriptSession>;
}

/// Source of video metadata. Failure is reported as `None` after
/// logging, since the pipeline turns it into its own fatal error.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn get_metadata(&self, video_id: &str) -> Option<VideoMetadata>;
}

/// Secondary transcript method, tried once after the primary method has
/// given its final answer.
#[async_trait]
pub trait CaptionFallback: Send + Sync {
    async fn fetch_any(&self, video_id: &str, languages: &[String]) -> Option<TranscriptResult>;
}

/// Downloads the media file for deep analysis.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download(&self, video_id: &str) -> Result<DownloadedMedia, FetchError>;
}

/// A downloaded media file that deletes itself when dropped, so the
/// scratch file disappears on every exit path of the pipeline.
#[derive(Debug)]
pub struct DownloadedMedia {
    path: PathBuf,
}

impl DownloadedMedia {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for DownloadedMedia {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove media file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Facade over the acquisition layer. Owns the retry policy and the
/// language preference and orchestrates primary plus fallback methods.
pub struct Fetcher {
    metadata: Arc<dyn MetadataSource>,
    sessions: Arc<dyn SessionFactory>,
    fallback: Arc<dyn CaptionFallback>,
    downloader: Arc<dyn MediaDownloader>,
    policy: BackoffPolicy,
    languages: Vec<String>,
    max_retries: u32,
}

impl Fetcher {
    pub fn new(
        metadata: Arc<dyn MetadataSource>,
        sessions: Arc<dyn SessionFactory>,
        fallback: Arc<dyn CaptionFallback>,
        downloader: Arc<dyn MediaDownloader>,
        policy: BackoffPolicy,
        languages: Vec<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            metadata,
            sessions,
            fallback,
            downloader,
            policy,
            languages,
            max_retries,
        }
    }

    /// Fetches metadata in a single attempt. The retry machinery is
    /// reserved for transcripts; metadata failures fail fast.
    pub async fn get_metadata(&self, video_id: &str) -> Option<VideoMetadata> {
        self.metadata.get_metadata(video_id).await
    }

    /// Fetches a transcript: primary method with retries, then the
    /// fallback once. `None` is the definitive "no transcript" answer.
    pub async fn get_transcript(&self, video_id: &str) -> Option<TranscriptResult> {
        if let Some(result) = self.fetch_with_retry(video_id).await {
            return Some(result);
        }

        debug!("Trying fallback transcript method for {}", video_id);
        match self.fallback.fetch_any(video_id, &self.languages).await {
            Some(mut result) => {
                result.text = video::normalize_transcript(&result.text);
                if result.text.is_empty() {
                    return None;
                }
                info!(
                    "Fallback transcript for {} ({}, auto_generated={})",
                    video_id, result.language, result.auto_generated
                );
                Some(result)
            }
            None => {
                info!("No transcript available for {}", video_id);
                None
            }
        }
    }

    /// Downloads the media file for deep analysis.
    pub async fn download_media(&self, video_id: &str) -> Result<DownloadedMedia, FetchError> {
        self.downloader.download(video_id).await
    }

    async fn fetch_with_retry(&self, video_id: &str) -> Option<TranscriptResult> {
        for attempt in 0..self.max_retries {
            let delay = if attempt == 0 {
                self.policy.pre_request_delay()
            } else {
                self.policy.delay_for(attempt)
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // Fresh session per attempt, dropped at the end of the loop body.
            let session = self.sessions.create_session();
            match session.fetch(video_id, &self.languages).await {
                Ok(segments) => {
                    let text = video::format_segments(&segments);
                    if text.is_empty() {
                        return None;
                    }
                    let language = self
                        .languages
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "en".to_string());
                    return Some(TranscriptResult {
                        text,
                        language,
                        auto_generated: false,
                    });
                }
                Err(e) if e.is_permanent() => {
                    info!("No transcript via primary method for {}: {}", video_id, e);
                    return None;
                }
                Err(e) => {
                    if e.is_rate_limited() {
                        warn!(
                            "Rate limited fetching transcript for {} (attempt {}/{}): {}",
                            video_id,
                            attempt + 1,
                            self.max_retries,
                            e
                        );
                    } else {
                        warn!(
                            "Transcript fetch failed for {} (attempt {}/{}): {}",
                            video_id,
                            attempt + 1,
                            self.max_retries,
                            e
                        );
                    }
                }
            }
        }
        None
    }
}
