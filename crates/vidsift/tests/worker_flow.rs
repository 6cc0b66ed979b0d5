//! End-to-end worker flow against a real in-memory SQLite store, with
//! the network-facing providers mocked out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::params;

use vidsift::analysis::{AnalysisReport, AnalysisStep, Analyzer};
use vidsift::db::job_store::{AnalysisMode, Job, JobStatus, JobStore, SqliteJobStore};
use vidsift::db::result_store::{ResultStore, SqliteResultStore};
use vidsift::db::Database;
use vidsift::fetch::{
    BackoffPolicy, CaptionFallback, DownloadedMedia, FetchError, Fetcher, MediaDownloader,
    MetadataSource, SessionFactory, TranscriptSession,
};
use vidsift::video::{TranscriptResult, TranscriptSegment, VideoMetadata};
use vidsift::worker::{JobProcessor, JobRunner};

struct StubMetadata;

#[async_trait]
impl MetadataSource for StubMetadata {
    async fn get_metadata(&self, video_id: &str) -> Option<VideoMetadata> {
        Some(VideoMetadata {
            video_id: video_id.to_string(),
            title: format!("Video {}", video_id),
            thumbnail: "https://example.com/thumb.jpg".to_string(),
            duration_seconds: 300,
            channel: "Channel".to_string(),
            upload_date: Some("20260115".to_string()),
        })
    }
}

struct StubSession {
    has_transcript: bool,
}

#[async_trait]
impl TranscriptSession for StubSession {
    async fn fetch(
        &self,
        video_id: &str,
        _languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, FetchError> {
        if !self.has_transcript {
            return Err(FetchError::TranscriptsDisabled(video_id.to_string()));
        }
        Ok(vec![
            TranscriptSegment {
                start_seconds: 0.0,
                text: "welcome".to_string(),
            },
            TranscriptSegment {
                start_seconds: 12.0,
                text: "main point".to_string(),
            },
        ])
    }
}

struct StubFactory {
    has_transcript: bool,
}

impl SessionFactory for StubFactory {
    fn create_session(&self) -> Box<dyn TranscriptSession> {
        Box::new(StubSession {
            has_transcript: self.has_transcript,
        })
    }
}

struct StubFallback;

#[async_trait]
impl CaptionFallback for StubFallback {
    async fn fetch_any(&self, _video_id: &str, _languages: &[String]) -> Option<TranscriptResult> {
        None
    }
}

struct StubDownloader {
    fail: bool,
}

#[async_trait]
impl MediaDownloader for StubDownloader {
    async fn download(&self, video_id: &str) -> Result<DownloadedMedia, FetchError> {
        if self.fail {
            return Err(FetchError::Network("connection refused".to_string()));
        }
        let path = std::env::temp_dir().join(format!("vidsift-test-{}.mp4", video_id));
        tokio::fs::write(&path, b"media").await.unwrap();
        Ok(DownloadedMedia::new(path))
    }
}

struct StubAnalyzer {
    deep_calls: AtomicU32,
}

#[async_trait]
impl Analyzer for StubAnalyzer {
    async fn analyze_standard(
        &self,
        metadata: &VideoMetadata,
        transcript: &TranscriptResult,
    ) -> Option<AnalysisReport> {
        assert!(transcript.text.contains("[00:00] welcome"));
        Some(AnalysisReport {
            title: metadata.title.clone(),
            summary: "full analysis".to_string(),
            ..AnalysisReport::default()
        })
    }

    async fn analyze_metadata_only(&self, metadata: &VideoMetadata) -> Option<AnalysisReport> {
        Some(AnalysisReport {
            title: metadata.title.clone(),
            summary: "inferred from metadata".to_string(),
            ..AnalysisReport::default()
        })
    }

    async fn analyze_deep(
        &self,
        metadata: &VideoMetadata,
        media_path: &std::path::Path,
    ) -> Option<AnalysisReport> {
        assert!(media_path.exists());
        self.deep_calls.fetch_add(1, Ordering::SeqCst);
        Some(AnalysisReport {
            title: metadata.title.clone(),
            summary: "deep analysis".to_string(),
            ..AnalysisReport::default()
        })
    }
}

struct World {
    db: Database,
    jobs: Arc<SqliteJobStore>,
    results: Arc<SqliteResultStore>,
    runner: JobRunner,
}

fn world(has_transcript: bool, download_fails: bool, max_concurrent: usize) -> World {
    let db = Database::open_in_memory().unwrap();
    let jobs = Arc::new(SqliteJobStore::new(db.clone()));
    let results = Arc::new(SqliteResultStore::new(db.clone()));

    let fetcher = Arc::new(Fetcher::new(
        Arc::new(StubMetadata),
        Arc::new(StubFactory { has_transcript }),
        Arc::new(StubFallback),
        Arc::new(StubDownloader {
            fail: download_fails,
        }),
        BackoffPolicy::none(),
        vec!["en".to_string()],
        3,
    ));
    let processor = Arc::new(JobProcessor::new(
        jobs.clone(),
        results.clone(),
        fetcher,
        AnalysisStep::new(Arc::new(StubAnalyzer {
            deep_calls: AtomicU32::new(0),
        })),
    ));
    let runner = JobRunner::new(
        jobs.clone(),
        processor,
        max_concurrent,
        Duration::from_millis(10),
    );
    World {
        db,
        jobs,
        results,
        runner,
    }
}

fn enqueue(w: &World, video_id: &str, mode: AnalysisMode, credits: u32) -> String {
    let job = Job::new("user-1", "url", video_id, mode, credits);
    w.jobs.insert(&job).unwrap();
    job.id
}

async fn drain(w: &World) {
    for _ in 0..200 {
        w.runner.poll_once().await.unwrap();
        if w.runner.active_count() == 0 && w.jobs.list_pending(1).unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("worker did not drain the queue");
}

fn refund_rows(w: &World, job_id: &str) -> Vec<i64> {
    w.db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT amount FROM credit_transactions WHERE reference_id = ?1",
        )?;
        let rows = stmt.query_map(params![job_id], |r| r.get(0))?;
        let mut amounts = Vec::new();
        for row in rows {
            amounts.push(row?);
        }
        Ok(amounts)
    })
    .unwrap()
}

#[tokio::test]
async fn test_standard_job_completes_and_stores_result() {
    let w = world(true, false, 3);
    let id = enqueue(&w, "vid00000001", AnalysisMode::Standard, 10);

    drain(&w).await;

    let job = w.jobs.find(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);

    let result = w
        .results
        .find("vid00000001", AnalysisMode::Standard)
        .unwrap()
        .unwrap();
    assert_eq!(job.result_id.as_deref(), Some(result.id.as_str()));
    let report: AnalysisReport = serde_json::from_str(&result.report).unwrap();
    assert_eq!(report.summary, "full analysis");
    assert!(!report.metadata_only);
    assert!(refund_rows(&w, &id).is_empty());
}

#[tokio::test]
async fn test_transcriptless_job_completes_as_metadata_only() {
    let w = world(false, false, 3);
    let id = enqueue(&w, "vid00000002", AnalysisMode::Standard, 10);

    drain(&w).await;

    let job = w.jobs.find(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let result = w
        .results
        .find("vid00000002", AnalysisMode::Standard)
        .unwrap()
        .unwrap();
    let report: AnalysisReport = serde_json::from_str(&result.report).unwrap();
    assert!(report.metadata_only);
    assert_eq!(report.summary, "inferred from metadata");
    // No transcript means no refund either; the job succeeded.
    assert!(refund_rows(&w, &id).is_empty());
}

#[tokio::test]
async fn test_deep_job_runs_against_downloaded_media() {
    let w = world(true, false, 3);
    let id = enqueue(&w, "vid00000003", AnalysisMode::Deep, 50);

    drain(&w).await;

    let job = w.jobs.find(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let media = std::env::temp_dir().join("vidsift-test-vid00000003.mp4");
    assert!(!media.exists());
}

#[tokio::test]
async fn test_failed_deep_download_refunds_exactly_once() {
    let w = world(true, true, 3);
    let id = enqueue(&w, "vid00000004", AnalysisMode::Deep, 50);

    drain(&w).await;

    let job = w.jobs.find(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code.as_deref(), Some("DOWNLOAD_002"));
    assert_eq!(refund_rows(&w, &id), vec![50]);
    assert!(w
        .results
        .find("vid00000004", AnalysisMode::Deep)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_queue_drains_in_fifo_order_within_capacity() {
    let w = world(true, false, 2);
    let mut ids = Vec::new();
    for i in 0..5 {
        let job_id = enqueue(&w, &format!("vidfifo{:04}", i), AnalysisMode::Standard, 0);
        ids.push(job_id);
    }

    drain(&w).await;

    for id in ids {
        assert_eq!(w.jobs.find(&id).unwrap().unwrap().status, JobStatus::Completed);
    }
}

#[tokio::test]
async fn test_reanalysis_overwrites_result_row() {
    let w = world(true, false, 1);
    let first = enqueue(&w, "vid00000005", AnalysisMode::Standard, 0);
    drain(&w).await;
    let first_result = w.jobs.find(&first).unwrap().unwrap().result_id.unwrap();

    let second = enqueue(&w, "vid00000005", AnalysisMode::Standard, 0);
    drain(&w).await;
    let second_result = w.jobs.find(&second).unwrap().unwrap().result_id.unwrap();

    // Same (video, mode) row, refreshed in place.
    assert_eq!(first_result, second_result);
}

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() {
    let w = world(true, false, 3);
    let id = enqueue(&w, "vid00000006", AnalysisMode::Standard, 0);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let jobs = w.jobs.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { jobs.claim(&id).unwrap().is_some() }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
