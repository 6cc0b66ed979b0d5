//! Secondary acquisition method backed by the yt-dlp binary.
//!
//! Serves three roles: metadata source, one-shot caption fallback and
//! media downloader for deep analysis. Every invocation is a fresh
//! subprocess, so nothing persists between jobs.

use async_trait::async_trait;
use log::{debug, error, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

use super::error::FetchError;
use super::subtitles;
use super::{CaptionFallback, DownloadedMedia, MediaDownloader, MetadataSource};
use crate::video::{self, TranscriptResult, VideoMetadata};

const TRACK_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct YtDlp {
    binary: PathBuf,
    scratch_dir: PathBuf,
}

impl YtDlp {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            scratch_dir,
        }
    }

    pub fn with_binary(binary: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            binary,
            scratch_dir,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, FetchError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| FetchError::Network(format!("failed to spawn yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Network(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn dump_json(&self, video_id: &str) -> Result<serde_json::Value, FetchError> {
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let stdout = self
            .run(&["--dump-json", "--skip-download", "--no-warnings", &url])
            .await?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| FetchError::Malformed(format!("yt-dlp metadata: {}", e)))
    }
}

#[async_trait]
impl MetadataSource for YtDlp {
    async fn get_metadata(&self, video_id: &str) -> Option<VideoMetadata> {
        let info = match self.dump_json(video_id).await {
            Ok(info) => info,
            Err(e) => {
                error!("Metadata fetch failed for {}: {}", video_id, e);
                return None;
            }
        };

        let title = info.get("title").and_then(|v| v.as_str())?.to_string();
        let thumbnail = info
            .get("thumbnail")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let duration_seconds = info
            .get("duration")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
            .max(0.0) as u64;
        let channel = info
            .get("channel")
            .or_else(|| info.get("uploader"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let upload_date = info
            .get("upload_date")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(VideoMetadata {
            video_id: video_id.to_string(),
            title,
            thumbnail,
            duration_seconds,
            channel,
            upload_date,
        })
    }
}

#[async_trait]
impl CaptionFallback for YtDlp {
    async fn fetch_any(&self, video_id: &str, languages: &[String]) -> Option<TranscriptResult> {
        let info = match self.dump_json(video_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!("Fallback caption listing failed for {}: {}", video_id, e);
                return None;
            }
        };

        let (url, language, auto_generated) = pick_caption_track(&info, languages)?;
        debug!(
            "Fallback caption track for {}: lang={} auto={}",
            video_id, language, auto_generated
        );

        let client = reqwest::Client::builder()
            .timeout(TRACK_FETCH_TIMEOUT)
            .build()
            .ok()?;
        let body = match client.get(&url).send().await {
            Ok(r) => r.text().await.ok()?,
            Err(e) => {
                warn!("Fallback caption download failed for {}: {}", video_id, e);
                return None;
            }
        };

        let segments = subtitles::parse_json3(&body).or_else(|| subtitles::parse_vtt(&body))?;
        let text = video::format_segments(&segments);
        if text.is_empty() {
            return None;
        }
        Some(TranscriptResult {
            text,
            language,
            auto_generated,
        })
    }
}

#[async_trait]
impl MediaDownloader for YtDlp {
    async fn download(&self, video_id: &str) -> Result<DownloadedMedia, FetchError> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| FetchError::Network(format!("scratch dir: {}", e)))?;

        let template = self
            .scratch_dir
            .join(format!("{}.%(ext)s", video_id))
            .to_string_lossy()
            .into_owned();
        let url = format!("https://www.youtube.com/watch?v={}", video_id);
        let stdout = self
            .run(&[
                "-f",
                "best[height<=720]",
                "-o",
                &template,
                "--no-simulate",
                "--no-warnings",
                "--print",
                "after_move:filepath",
                &url,
            ])
            .await?;

        let path = stdout.trim().lines().last().unwrap_or_default().trim();
        if path.is_empty() {
            return Err(FetchError::Malformed(
                "yt-dlp reported no output file".to_string(),
            ));
        }
        Ok(DownloadedMedia::new(PathBuf::from(path)))
    }
}

/// Picks the caption track to fetch from a yt-dlp info document:
/// manually-created tracks in preferred language order first, then
/// auto-generated tracks in preferred order, then any manual track, then
/// any auto track. Returns the track URL, its language and whether it
/// was machine-generated.
fn pick_caption_track(
    info: &serde_json::Value,
    languages: &[String],
) -> Option<(String, String, bool)> {
    let manual = info.get("subtitles").and_then(|v| v.as_object());
    let auto = info.get("automatic_captions").and_then(|v| v.as_object());

    for lang in languages {
        if let Some(url) = manual.and_then(|m| track_url(m, lang)) {
            return Some((url, lang.clone(), false));
        }
    }
    for lang in languages {
        if let Some(url) = auto.and_then(|m| track_url(m, lang)) {
            return Some((url, lang.clone(), true));
        }
    }
    if let Some(map) = manual {
        for (lang, _) in map.iter() {
            if let Some(url) = track_url(map, lang) {
                return Some((url, lang.clone(), false));
            }
        }
    }
    if let Some(map) = auto {
        for (lang, _) in map.iter() {
            if let Some(url) = track_url(map, lang) {
                return Some((url, lang.clone(), true));
            }
        }
    }
    None
}

/// Finds a parseable format for `lang` in a caption map, preferring
/// json3 over vtt.
fn track_url(map: &serde_json::Map<String, serde_json::Value>, lang: &str) -> Option<String> {
    let formats = map.get(lang)?.as_array()?;
    for wanted in ["json3", "vtt"] {
        for format in formats {
            let ext = format.get("ext").and_then(|v| v.as_str());
            if ext == Some(wanted) {
                if let Some(url) = format.get("url").and_then(|v| v.as_str()) {
                    return Some(url.to_string());
                }
            }
        }
    }
    None
}
