//! Job queue persistence for the `analysis_jobs` table.
//!
//! The queue has exactly one concurrency primitive: [`JobStore::claim`],
//! a single conditional UPDATE whose row count decides the winner. No
//! caller may decide ownership by reading status first.

use rusqlite::{params, Row};
use uuid::Uuid;

use super::{Database, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Standard,
    Deep,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Standard => "STANDARD",
            AnalysisMode::Deep => "DEEP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STANDARD" => Some(AnalysisMode::Standard),
            "DEEP" => Some(AnalysisMode::Deep),
            _ => None,
        }
    }
}

/// An analysis job row. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub video_url: String,
    pub video_id: String,
    pub mode: AnalysisMode,
    pub status: JobStatus,
    pub progress: u8,
    pub credits_reserved: u32,
    pub result_id: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Job {
    /// Creates a new pending job, the shape the external producer
    /// inserts. Used directly by tests.
    pub fn new(
        user_id: impl Into<String>,
        video_url: impl Into<String>,
        video_id: impl Into<String>,
        mode: AnalysisMode,
        credits_reserved: u32,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            video_url: video_url.into(),
            video_id: video_id.into(),
            mode,
            status: JobStatus::Pending,
            progress: 0,
            credits_reserved,
            result_id: None,
            error_message: None,
            error_code: None,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let mode_raw: String = row.get("mode")?;
        let status_raw: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            video_url: row.get("video_url")?,
            video_id: row.get("video_id")?,
            mode: AnalysisMode::parse(&mode_raw).ok_or_else(|| bad_enum("mode", &mode_raw))?,
            status: JobStatus::parse(&status_raw)
                .ok_or_else(|| bad_enum("status", &status_raw))?,
            progress: row.get::<_, i64>("progress")?.clamp(0, 100) as u8,
            credits_reserved: row.get::<_, i64>("credits_reserved")?.max(0) as u32,
            result_id: row.get("result_id")?,
            error_message: row.get("error_message")?,
            error_code: row.get("error_code")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

fn bad_enum(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unknown {} value '{}'", column, value),
        )),
    )
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Job queue operations used by the runner and processor.
pub trait JobStore: Send + Sync {
    /// Inserts a new job row (producer side, used by tests and tooling).
    fn insert(&self, job: &Job) -> Result<(), StoreError>;

    /// Finds a job by id.
    fn find(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Lists pending jobs, oldest first.
    fn list_pending(&self, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Atomically claims a pending job. Returns the claimed job when
    /// this caller won, `None` when another worker got there first.
    fn claim(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Raises the job's progress. Monotonic: a lower value than the
    /// stored one never wins. Only applies while the job is processing.
    fn update_progress(&self, id: &str, progress: u8) -> Result<(), StoreError>;

    /// Transitions a processing job to COMPLETED with its result id.
    fn complete(&self, id: &str, result_id: &str) -> Result<(), StoreError>;

    /// Transitions a processing job to FAILED with message and code.
    fn fail(&self, id: &str, message: &str, code: &str) -> Result<(), StoreError>;

    /// Records the compensating refund for a failed job in the credit
    /// ledger, tagged with the job id.
    fn refund(&self, job: &Job) -> Result<(), StoreError>;
}

pub struct SqliteJobStore {
    db: Database,
}

impl SqliteJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl JobStore for SqliteJobStore {
    fn insert(&self, job: &Job) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO analysis_jobs (id, user_id, video_url, video_id, mode, status,
                 progress, credits_reserved, result_id, error_message, error_code,
                 created_at, updated_at, started_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    job.id,
                    job.user_id,
                    job.video_url,
                    job.video_id,
                    job.mode.as_str(),
                    job.status.as_str(),
                    job.progress,
                    job.credits_reserved,
                    job.result_id,
                    job.error_message,
                    job.error_code,
                    job.created_at,
                    job.updated_at,
                    job.started_at,
                    job.completed_at,
                ],
            )?;
            Ok(())
        })
    }

    fn find(&self, id: &str) -> Result<Option<Job>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM analysis_jobs WHERE id = ?1")?;
            let mut rows = stmt.query_map(params![id], Job::from_row)?;
            match rows.next() {
                Some(Ok(row)) => Ok(Some(row)),
                Some(Err(e)) => Err(StoreError::Sqlite(e)),
                None => Ok(None),
            }
        })
    }

    fn list_pending(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM analysis_jobs WHERE status = 'PENDING'
                 ORDER BY created_at ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], Job::from_row)?;
            let mut jobs = Vec::new();
            for row in rows {
                jobs.push(row?);
            }
            Ok(jobs)
        })
    }

    fn claim(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let claimed = self.db.with_conn(|conn| {
            let now = now_rfc3339();
            let changed = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'PROCESSING', started_at = ?2, updated_at = ?2
                 WHERE id = ?1 AND status = 'PENDING'",
                params![id, now],
            )?;
            Ok(changed == 1)
        })?;

        if !claimed {
            return Ok(None);
        }
        self.find(id)
    }

    fn update_progress(&self, id: &str, progress: u8) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE analysis_jobs
                 SET progress = MAX(progress, ?2), updated_at = ?3
                 WHERE id = ?1 AND status = 'PROCESSING'",
                params![id, progress.min(100), now_rfc3339()],
            )?;
            Ok(())
        })
    }

    fn complete(&self, id: &str, result_id: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = now_rfc3339();
            let changed = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'COMPLETED', progress = 100, result_id = ?2,
                     completed_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status = 'PROCESSING'",
                params![id, result_id, now],
            )?;
            if changed == 0 {
                return Err(StoreError::InvalidTransition { id: id.to_string() });
            }
            Ok(())
        })
    }

    fn fail(&self, id: &str, message: &str, code: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let now = now_rfc3339();
            let changed = conn.execute(
                "UPDATE analysis_jobs
                 SET status = 'FAILED', error_message = ?2, error_code = ?3,
                     completed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status = 'PROCESSING'",
                params![id, message, code, now],
            )?;
            if changed == 0 {
                return Err(StoreError::InvalidTransition { id: id.to_string() });
            }
            Ok(())
        })
    }

    fn refund(&self, job: &Job) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credit_transactions
                 (id, user_id, amount, kind, description, reference_id, created_at)
                 VALUES (?1, ?2, ?3, 'REFUND', ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    job.user_id,
                    job.credits_reserved,
                    format!("Refund for failed analysis job {}", job.id),
                    job.id,
                    now_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteJobStore {
        SqliteJobStore::new(Database::open_in_memory().unwrap())
    }

    fn pending_job(video_id: &str) -> Job {
        Job::new(
            "user-1",
            format!("https://www.youtube.com/watch?v={}", video_id),
            video_id,
            AnalysisMode::Standard,
            10,
        )
    }

    #[test]
    fn test_insert_and_find_round_trip() {
        let store = store();
        let job = pending_job("dQw4w9WgXcQ");
        store.insert(&job).unwrap();

        let found = store.find(&job.id).unwrap().unwrap();
        assert_eq!(found.video_id, "dQw4w9WgXcQ");
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.mode, AnalysisMode::Standard);
        assert_eq!(found.progress, 0);
        assert_eq!(found.credits_reserved, 10);
    }

    #[test]
    fn test_find_missing_is_none() {
        assert!(store().find("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_pending_is_oldest_first() {
        let store = store();
        let mut first = pending_job("aaaaaaaaaaa");
        first.created_at = "2026-01-01T00:00:00Z".to_string();
        let mut second = pending_job("bbbbbbbbbbb");
        second.created_at = "2026-01-02T00:00:00Z".to_string();
        // Insert newest first to prove ordering comes from created_at.
        store.insert(&second).unwrap();
        store.insert(&first).unwrap();

        let pending = store.list_pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].video_id, "aaaaaaaaaaa");
        assert_eq!(pending[1].video_id, "bbbbbbbbbbb");
    }

    #[test]
    fn test_list_pending_excludes_other_statuses() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();
        store.claim(&job.id).unwrap();

        assert!(store.list_pending(10).unwrap().is_empty());
    }

    #[test]
    fn test_claim_succeeds_once() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();

        let claimed = store.claim(&job.id).unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());

        // Second claim loses.
        assert!(store.claim(&job.id).unwrap().is_none());
    }

    #[test]
    fn test_claim_missing_job_is_none() {
        assert!(store().claim("nope").unwrap().is_none());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();
        store.claim(&job.id).unwrap();

        store.update_progress(&job.id, 40).unwrap();
        store.update_progress(&job.id, 20).unwrap();

        let found = store.find(&job.id).unwrap().unwrap();
        assert_eq!(found.progress, 40);
    }

    #[test]
    fn test_progress_ignored_unless_processing() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();

        store.update_progress(&job.id, 50).unwrap();
        assert_eq!(store.find(&job.id).unwrap().unwrap().progress, 0);
    }

    #[test]
    fn test_complete_requires_processing() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();

        let result = store.complete(&job.id, "result-1");
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));

        store.claim(&job.id).unwrap();
        store.complete(&job.id, "result-1").unwrap();

        let found = store.find(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert_eq!(found.progress, 100);
        assert_eq!(found.result_id.as_deref(), Some("result-1"));
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_fail_records_message_and_code() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();
        store.claim(&job.id).unwrap();

        store.fail(&job.id, "metadata unavailable", "FETCH_001").unwrap();

        let found = store.find(&job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Failed);
        assert_eq!(found.error_message.as_deref(), Some("metadata unavailable"));
        assert_eq!(found.error_code.as_deref(), Some("FETCH_001"));
    }

    #[test]
    fn test_terminal_states_stay_terminal() {
        let store = store();
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();
        store.claim(&job.id).unwrap();
        store.complete(&job.id, "result-1").unwrap();

        assert!(matches!(
            store.fail(&job.id, "late", "ANALYSIS_003"),
            Err(StoreError::InvalidTransition { .. })
        ));
        assert!(store.claim(&job.id).unwrap().is_none());
    }

    #[test]
    fn test_refund_writes_ledger_row_tagged_with_job_id() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteJobStore::new(db.clone());
        let job = pending_job("aaaaaaaaaaa");
        store.insert(&job).unwrap();
        store.refund(&job).unwrap();

        db.with_conn(|conn| {
            let (amount, kind, reference): (i64, String, String) = conn.query_row(
                "SELECT amount, kind, reference_id FROM credit_transactions
                 WHERE reference_id = ?1",
                params![job.id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            assert_eq!(amount, 10);
            assert_eq!(kind, "REFUND");
            assert_eq!(reference, job.id);
            Ok(())
        })
        .unwrap();
    }
}
