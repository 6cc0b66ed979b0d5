pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod video;
pub mod worker;

pub use analysis::{AnalysisReport, AnalysisStep, Analyzer, GeminiAnalyzer};
pub use config::Settings;
pub use db::{AnalysisMode, Database, Job, JobStatus, JobStore, ResultStore, StoreError};
pub use error::{ConfigError, ProcessError, Result, VidsiftError};
pub use fetch::{BackoffPolicy, FetchError, Fetcher, TimedTextSessionFactory, YtDlp};
pub use worker::{JobProcessor, JobRunner, ProcessJob};
