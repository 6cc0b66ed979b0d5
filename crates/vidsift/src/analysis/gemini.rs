//! Gemini-backed analyzer implementation.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

use super::prompt;
use super::{AnalysisReport, Analyzer};
use crate::video::{TranscriptResult, VideoMetadata};

const FLASH_MODEL: &str = "gemini-2.0-flash-exp";
const PRO_MODEL: &str = "gemini-2.0-flash-thinking-exp-01-21";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const UPLOAD_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct GeminiAnalyzer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    flash_model: String,
    pro_model: String,
}

impl GeminiAnalyzer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            flash_model: FLASH_MODEL.to_string(),
            pro_model: PRO_MODEL.to_string(),
        }
    }

    async fn generate(&self, model: &str, parts: serde_json::Value) -> Option<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "temperature": 0.3,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192
            }
        });

        let response = match self.client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                error!("Analyzer request failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("Analyzer returned HTTP {}", response.status());
            return None;
        }

        let doc: serde_json::Value = match response.json().await {
            Ok(d) => d,
            Err(e) => {
                error!("Analyzer response was not JSON: {}", e);
                return None;
            }
        };
        let text = doc
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()?;
        if text.is_empty() {
            error!("Empty response from analyzer model {}", model);
            return None;
        }
        Some(text.to_string())
    }

    /// Uploads a media file for video-understanding analysis and waits
    /// until the backend reports it as ready. Returns the file URI.
    async fn upload_media(&self, path: &Path) -> Option<String> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                error!("Failed to read media file {}: {}", path.display(), e);
                return None;
            }
        };
        info!(
            "Uploading media for deep analysis: {} ({} bytes)",
            path.display(),
            bytes.len()
        );

        let url = format!(
            "{}/upload/v1beta/files?key={}",
            self.base_url, self.api_key
        );
        let response = match self
            .client
            .post(&url)
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("Media upload failed: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            error!("Media upload returned HTTP {}", response.status());
            return None;
        }

        let doc: serde_json::Value = response.json().await.ok()?;
        let file = doc.get("file")?;
        let name = file.get("name")?.as_str()?.to_string();
        let uri = file.get("uri")?.as_str()?.to_string();

        // Processing is asynchronous on the backend side.
        loop {
            let state = self.file_state(&name).await?;
            match state.as_str() {
                "PROCESSING" => tokio::time::sleep(UPLOAD_POLL_INTERVAL).await,
                "FAILED" => {
                    error!("Backend failed to process uploaded media {}", name);
                    return None;
                }
                _ => return Some(uri),
            }
        }
    }

    async fn file_state(&self, name: &str) -> Option<String> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let doc: serde_json::Value = self.client.get(&url).send().await.ok()?.json().await.ok()?;
        doc.get("state").and_then(|v| v.as_str()).map(String::from)
    }

    async fn delete_file(&self, uri: &str) {
        // Best effort, orphaned uploads expire on their own.
        let Some(id) = uri.rsplit_once("/files/").map(|(_, id)| id) else {
            return;
        };
        let url = format!(
            "{}/v1beta/files/{}?key={}",
            self.base_url, id, self.api_key
        );
        if let Err(e) = self.client.delete(&url).send().await {
            debug!("Failed to delete uploaded media: {}", e);
        }
    }
}

/// Parses a model response into a report: strips markdown code fences,
/// then deserializes. The visual audit is kept only for deep analyses.
fn parse_report(text: &str, include_visual: bool) -> Option<AnalysisReport> {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    match serde_json::from_str::<AnalysisReport>(cleaned) {
        Ok(mut report) => {
            if !include_visual {
                report.visual_audit = None;
            }
            Some(report)
        }
        Err(e) => {
            error!("Failed to parse analyzer response: {}", e);
            debug!("Raw response head: {:.1000}", text);
            None
        }
    }
}

#[async_trait]
impl Analyzer for GeminiAnalyzer {
    async fn analyze_standard(
        &self,
        metadata: &VideoMetadata,
        transcript: &TranscriptResult,
    ) -> Option<AnalysisReport> {
        let text = prompt::standard_prompt(metadata, &transcript.text);
        let response = self
            .generate(&self.flash_model, json!([{ "text": text }]))
            .await?;
        parse_report(&response, false)
    }

    async fn analyze_metadata_only(&self, metadata: &VideoMetadata) -> Option<AnalysisReport> {
        let text = prompt::metadata_only_prompt(metadata);
        let response = self
            .generate(&self.flash_model, json!([{ "text": text }]))
            .await?;
        parse_report(&response, false)
    }

    async fn analyze_deep(
        &self,
        metadata: &VideoMetadata,
        media_path: &Path,
    ) -> Option<AnalysisReport> {
        let uri = self.upload_media(media_path).await?;
        let text = prompt::deep_prompt(metadata);
        let parts = json!([
            { "file_data": { "mime_type": "video/mp4", "file_uri": uri } },
            { "text": text }
        ]);
        let response = self.generate(&self.pro_model, parts).await;
        self.delete_file(&uri).await;

        match response {
            Some(response) => parse_report(&response, true),
            None => {
                warn!("Deep analysis produced no response for {}", metadata.video_id);
                None
            }
        }
    }
}
