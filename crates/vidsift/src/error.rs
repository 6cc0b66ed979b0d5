use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsiftError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] crate::db::StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting '{key}'")]
    Missing { key: &'static str },

    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A fatal pipeline error. Each variant maps to a stable error code that
/// is written to the job row so clients can branch on failures without
/// parsing the human-readable message.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Could not determine video id from url '{url}'")]
    InvalidVideoUrl { url: String },

    #[error("Failed to fetch video metadata for {video_id}")]
    MetadataUnavailable { video_id: String },

    #[error("Failed to download video {video_id}: {reason}")]
    DownloadFailed { video_id: String, reason: String },

    #[error("Analysis returned no result for {video_id}")]
    AnalysisEmpty { video_id: String },

    #[error("Failed to persist analysis result: {0}")]
    Persist(#[from] crate::db::StoreError),
}

impl ProcessError {
    /// Stable error code recorded alongside the failure message.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessError::InvalidVideoUrl { .. } => "FETCH_001",
            ProcessError::MetadataUnavailable { .. } => "FETCH_001",
            ProcessError::DownloadFailed { .. } => "DOWNLOAD_002",
            ProcessError::AnalysisEmpty { .. } => "ANALYSIS_003",
            ProcessError::Persist(_) => "STORE_004",
        }
    }
}

pub type Result<T> = std::result::Result<T, VidsiftError>;
