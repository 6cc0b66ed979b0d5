//! Video content analysis: report model, analyzer seam and the
//! mode-dispatch step used by the job pipeline.

pub mod gemini;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiAnalyzer;

use crate::db::job_store::AnalysisMode;
use crate::fetch::DownloadedMedia;
use crate::video::{TranscriptResult, VideoMetadata};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub timestamp: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisualAuditEntry {
    pub timestamp: String,
    pub detail: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// The analysis report persisted as the job's result payload. Field
/// names follow the client-facing JSON contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisReport {
    pub title: String,
    pub summary: String,
    pub key_takeaways: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_audit: Option<Vec<VisualAuditEntry>>,
    /// Set when the report was produced without a transcript.
    pub metadata_only: bool,
}

/// Backend seam for the three analysis flavors. Failures are logged by
/// the implementation and surface as `None`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze_standard(
        &self,
        metadata: &VideoMetadata,
        transcript: &TranscriptResult,
    ) -> Option<AnalysisReport>;

    async fn analyze_metadata_only(&self, metadata: &VideoMetadata) -> Option<AnalysisReport>;

    async fn analyze_deep(
        &self,
        metadata: &VideoMetadata,
        media_path: &std::path::Path,
    ) -> Option<AnalysisReport>;
}

/// Dispatches a job to the right analysis flavor for its mode.
pub struct AnalysisStep {
    analyzer: Arc<dyn Analyzer>,
}

impl AnalysisStep {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self { analyzer }
    }

    /// Runs the analysis for `mode`. A standard job without a transcript
    /// degrades to metadata-only analysis and flags the report as such.
    /// The media file, when present, is deleted when this call returns
    /// regardless of outcome.
    pub async fn run(
        &self,
        mode: AnalysisMode,
        metadata: &VideoMetadata,
        transcript: Option<&TranscriptResult>,
        media: Option<DownloadedMedia>,
    ) -> Option<AnalysisReport> {
        match mode {
            AnalysisMode::Standard => match transcript {
                Some(transcript) => self.analyzer.analyze_standard(metadata, transcript).await,
                None => {
                    info!(
                        "No transcript for {}, degrading to metadata-only analysis",
                        metadata.video_id
                    );
                    let mut report = self.analyzer.analyze_metadata_only(metadata).await?;
                    report.metadata_only = true;
                    Some(report)
                }
            },
            AnalysisMode::Deep => {
                // Holding the guard across the call keeps the file alive
                // exactly as long as the analyzer needs it.
                let media = media?;
                self.analyzer.analyze_deep(metadata, media.path()).await
            }
        }
    }
}
