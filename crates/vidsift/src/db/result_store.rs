//! Analysis result persistence for the `analysis_results` table.
//!
//! Results are keyed by (video_id, mode): re-analyzing the same video in
//! the same mode replaces the stored row rather than duplicating it.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::job_store::AnalysisMode;
use super::{Database, StoreError};

/// The payload written when a job finishes analysis. The video snapshot
/// fields are denormalized so results render without a second fetch.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub video_id: String,
    pub mode: AnalysisMode,
    /// Serialized analysis report JSON.
    pub report: String,
    pub video_title: String,
    pub video_thumbnail: String,
    pub video_duration_seconds: u64,
    pub transcript: Option<String>,
    pub transcript_language: Option<String>,
}

/// A stored analysis result row.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub id: String,
    pub video_id: String,
    pub mode: AnalysisMode,
    pub report: String,
    pub video_title: String,
    pub created_at: String,
    pub updated_at: String,
}

pub trait ResultStore: Send + Sync {
    /// Finds the stored result for a video and mode.
    fn find(&self, video_id: &str, mode: AnalysisMode) -> Result<Option<StoredResult>, StoreError>;

    /// Inserts or replaces the result for (video_id, mode) and returns
    /// the id of the stored row.
    fn upsert(&self, result: &NewResult) -> Result<String, StoreError>;
}

pub struct SqliteResultStore {
    db: Database,
}

impl SqliteResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ResultStore for SqliteResultStore {
    fn find(&self, video_id: &str, mode: AnalysisMode) -> Result<Option<StoredResult>, StoreError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, video_id, mode, report, video_title, created_at, updated_at
                     FROM analysis_results WHERE video_id = ?1 AND mode = ?2",
                    params![video_id, mode.as_str()],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                            r.get::<_, String>(4)?,
                            r.get::<_, String>(5)?,
                            r.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, video_id, mode_raw, report, video_title, created_at, updated_at)) = row
            else {
                return Ok(None);
            };
            let mode = AnalysisMode::parse(&mode_raw).ok_or_else(|| StoreError::InvalidRow {
                id: id.clone(),
                reason: format!("unknown mode '{}'", mode_raw),
            })?;
            Ok(Some(StoredResult {
                id,
                video_id,
                mode,
                report,
                video_title,
                created_at,
                updated_at,
            }))
        })
    }

    fn upsert(&self, result: &NewResult) -> Result<String, StoreError> {
        self.db.with_conn(|conn| {
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO analysis_results
                 (id, video_id, mode, report, video_title, video_thumbnail,
                  video_duration_seconds, transcript, transcript_language,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(video_id, mode) DO UPDATE SET
                     report = excluded.report,
                     video_title = excluded.video_title,
                     video_thumbnail = excluded.video_thumbnail,
                     video_duration_seconds = excluded.video_duration_seconds,
                     transcript = excluded.transcript,
                     transcript_language = excluded.transcript_language,
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    result.video_id,
                    result.mode.as_str(),
                    result.report,
                    result.video_title,
                    result.video_thumbnail,
                    result.video_duration_seconds,
                    result.transcript,
                    result.transcript_language,
                    now,
                ],
            )?;

            let id: String = conn.query_row(
                "SELECT id FROM analysis_results WHERE video_id = ?1 AND mode = ?2",
                params![result.video_id, result.mode.as_str()],
                |r| r.get(0),
            )?;
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteResultStore {
        SqliteResultStore::new(Database::open_in_memory().unwrap())
    }

    fn new_result(video_id: &str, mode: AnalysisMode, report: &str) -> NewResult {
        NewResult {
            video_id: video_id.to_string(),
            mode,
            report: report.to_string(),
            video_title: "Title".to_string(),
            video_thumbnail: "https://example.com/t.jpg".to_string(),
            video_duration_seconds: 120,
            transcript: Some("[00:00] hi".to_string()),
            transcript_language: Some("en".to_string()),
        }
    }

    #[test]
    fn test_upsert_then_find() {
        let store = store();
        let id = store
            .upsert(&new_result("vid", AnalysisMode::Standard, r#"{"title":"a"}"#))
            .unwrap();

        let found = store.find("vid", AnalysisMode::Standard).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.report, r#"{"title":"a"}"#);
        assert_eq!(found.video_title, "Title");
    }

    #[test]
    fn test_upsert_replaces_existing_row_and_keeps_id() {
        let store = store();
        let first = store
            .upsert(&new_result("vid", AnalysisMode::Standard, r#"{"title":"a"}"#))
            .unwrap();
        let second = store
            .upsert(&new_result("vid", AnalysisMode::Standard, r#"{"title":"b"}"#))
            .unwrap();

        assert_eq!(first, second);
        let found = store.find("vid", AnalysisMode::Standard).unwrap().unwrap();
        assert_eq!(found.report, r#"{"title":"b"}"#);
    }

    #[test]
    fn test_modes_are_distinct_rows() {
        let store = store();
        let standard = store
            .upsert(&new_result("vid", AnalysisMode::Standard, "{}"))
            .unwrap();
        let deep = store
            .upsert(&new_result("vid", AnalysisMode::Deep, "{}"))
            .unwrap();

        assert_ne!(standard, deep);
        assert!(store.find("vid", AnalysisMode::Standard).unwrap().is_some());
        assert!(store.find("vid", AnalysisMode::Deep).unwrap().is_some());
    }

    #[test]
    fn test_find_missing_is_none() {
        assert!(store().find("vid", AnalysisMode::Deep).unwrap().is_none());
    }
}
