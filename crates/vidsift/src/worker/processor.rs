//! Per-job processing pipeline.
//!
//! A claimed job moves through fixed milestones: metadata, acquisition,
//! analysis, persistence. Any fatal error marks the job FAILED with a
//! stable error code and triggers exactly one compensating refund when
//! credits were reserved.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tracing::{info_span, Instrument};

use crate::analysis::AnalysisStep;
use crate::db::job_store::{AnalysisMode, Job, JobStore};
use crate::db::result_store::{NewResult, ResultStore};
use crate::error::ProcessError;
use crate::fetch::{DownloadedMedia, Fetcher};
use crate::video;

/// Processes one claimed job to a terminal state.
#[async_trait]
pub trait ProcessJob: Send + Sync {
    /// Returns true when the job completed, false when it failed.
    async fn process(&self, job: Job) -> bool;
}

pub struct JobProcessor {
    jobs: Arc<dyn JobStore>,
    results: Arc<dyn ResultStore>,
    fetcher: Arc<Fetcher>,
    analysis: AnalysisStep,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        results: Arc<dyn ResultStore>,
        fetcher: Arc<Fetcher>,
        analysis: AnalysisStep,
    ) -> Self {
        Self {
            jobs,
            results,
            fetcher,
            analysis,
        }
    }

    /// The id the job row carries, or one derived from its URL when the
    /// producer only supplied `video_url`.
    fn resolve_video_id(job: &Job) -> Result<String, ProcessError> {
        if !job.video_id.is_empty() {
            return Ok(job.video_id.clone());
        }
        video::extract_video_id(&job.video_url).ok_or_else(|| ProcessError::InvalidVideoUrl {
            url: job.video_url.clone(),
        })
    }

    async fn run_pipeline(&self, job: &Job) -> Result<(), ProcessError> {
        let video_id = Self::resolve_video_id(job)?;
        self.progress(job, 10);

        let metadata = self
            .fetcher
            .get_metadata(&video_id)
            .await
            .ok_or_else(|| ProcessError::MetadataUnavailable {
                video_id: video_id.clone(),
            })?;
        self.progress(job, 20);

        let mut transcript = None;
        let mut media: Option<DownloadedMedia> = None;
        match job.mode {
            AnalysisMode::Standard => {
                // Absence is a legal outcome, the analysis degrades instead.
                transcript = self.fetcher.get_transcript(&video_id).await;
                self.progress(job, 40);
            }
            AnalysisMode::Deep => {
                let downloaded = self.fetcher.download_media(&video_id).await.map_err(
                    |e| ProcessError::DownloadFailed {
                        video_id: video_id.clone(),
                        reason: e.to_string(),
                    },
                )?;
                media = Some(downloaded);
                self.progress(job, 60);
            }
        }

        let report = self
            .analysis
            .run(job.mode, &metadata, transcript.as_ref(), media)
            .await
            .ok_or_else(|| ProcessError::AnalysisEmpty {
                video_id: video_id.clone(),
            })?;
        self.progress(job, 80);

        let report_json =
            serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string());
        let result_id = self
            .results
            .upsert(&NewResult {
                video_id,
                mode: job.mode,
                report: report_json,
                video_title: metadata.title.clone(),
                video_thumbnail: metadata.thumbnail.clone(),
                video_duration_seconds: metadata.duration_seconds,
                transcript: transcript.as_ref().map(|t| t.text.clone()),
                transcript_language: transcript.as_ref().map(|t| t.language.clone()),
            })
            .map_err(ProcessError::Persist)?;

        self.jobs
            .complete(&job.id, &result_id)
            .map_err(ProcessError::Persist)?;
        info!("Job {} completed with result {}", job.id, result_id);
        Ok(())
    }

    fn progress(&self, job: &Job, value: u8) {
        // Progress is best effort, a store hiccup must not kill the job.
        if let Err(e) = self.jobs.update_progress(&job.id, value) {
            warn!("Failed to update progress for job {}: {}", job.id, e);
        }
    }

    fn handle_failure(&self, job: &Job, e: &ProcessError) {
        error!("Job {} failed [{}]: {}", job.id, e.code(), e);
        if let Err(store_err) = self.jobs.fail(&job.id, &e.to_string(), e.code()) {
            error!("Failed to mark job {} as failed: {}", job.id, store_err);
        }

        if job.credits_reserved > 0 {
            match self.jobs.refund(job) {
                Ok(()) => info!(
                    "Refunded {} credits to {} for job {}",
                    job.credits_reserved, job.user_id, job.id
                ),
                // The failure status stands even when the refund does not.
                Err(refund_err) => {
                    error!("Refund failed for job {}: {}", job.id, refund_err)
                }
            }
        }
    }
}

#[async_trait]
impl ProcessJob for JobProcessor {
    async fn process(&self, job: Job) -> bool {
        let span = info_span!("job",
            job_id = %job.id,
            video_id = %job.video_id,
            mode = job.mode.as_str(),
        );
        async {
            match self.run_pipeline(&job).await {
                Ok(()) => true,
                Err(e) => {
                    self.handle_failure(&job, &e);
                    false
                }
            }
        }
        .instrument(span)
        .await
    }
}
