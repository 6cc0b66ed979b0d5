//! Worker configuration loaded from environment variables.
//!
//! All settings carry defaults suitable for local development except the
//! analyzer API key, which must be provided. Construction goes through
//! [`Settings::from_env`] in the daemon; tests use [`Settings::from_lookup`]
//! with a plain map to avoid mutating process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;
const DEFAULT_TRANSCRIPT_RETRIES: u32 = 3;
const DEFAULT_LANGUAGES: &str = "ko,en,ja";
const DEFAULT_ANALYZER_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Concurrency ceiling for job tasks.
    pub max_concurrent_jobs: usize,
    /// Attempt budget for the primary transcript method.
    pub transcript_retries: u32,
    /// Caption language preference, most preferred first.
    pub preferred_languages: Vec<String>,
    /// Scratch directory for downloaded media and temp artifacts.
    pub scratch_dir: PathBuf,
    /// API key for the analysis backend.
    pub analyzer_api_key: String,
    /// Base URL for the analysis backend.
    pub analyzer_base_url: String,
    /// Optional HTTP proxy for transcript sessions.
    pub proxy_url: Option<String>,
    /// Optional key protecting the worker status endpoints. Empty = open.
    pub worker_api_key: Option<String>,
    /// Bind address for the HTTP façade.
    pub bind_addr: String,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_path = match lookup("VIDSIFT_DATABASE_PATH") {
            Some(p) => PathBuf::from(p),
            None => default_database_path().ok_or(ConfigError::Missing {
                key: "VIDSIFT_DATABASE_PATH",
            })?,
        };

        let poll_interval = Duration::from_secs(parse_or(
            &lookup,
            "VIDSIFT_POLL_INTERVAL_SECONDS",
            DEFAULT_POLL_INTERVAL_SECONDS,
        )?);

        let max_concurrent_jobs = parse_or(
            &lookup,
            "VIDSIFT_MAX_CONCURRENT_JOBS",
            DEFAULT_MAX_CONCURRENT_JOBS,
        )?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                key: "VIDSIFT_MAX_CONCURRENT_JOBS",
                reason: "must be at least 1".to_string(),
            });
        }

        let transcript_retries = parse_or(
            &lookup,
            "VIDSIFT_TRANSCRIPT_RETRIES",
            DEFAULT_TRANSCRIPT_RETRIES,
        )?;
        if transcript_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "VIDSIFT_TRANSCRIPT_RETRIES",
                reason: "must be at least 1".to_string(),
            });
        }

        let languages_raw =
            lookup("VIDSIFT_LANGUAGES").unwrap_or_else(|| DEFAULT_LANGUAGES.to_string());
        let preferred_languages = parse_languages(&languages_raw)?;

        let scratch_dir = lookup("VIDSIFT_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("vidsift"));

        let analyzer_api_key = lookup("VIDSIFT_ANALYZER_API_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing {
                key: "VIDSIFT_ANALYZER_API_KEY",
            })?;

        let analyzer_base_url = lookup("VIDSIFT_ANALYZER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_ANALYZER_BASE_URL.to_string());

        let proxy_url = lookup("VIDSIFT_PROXY_URL").filter(|v| !v.is_empty());
        let worker_api_key = lookup("VIDSIFT_WORKER_API_KEY").filter(|v| !v.is_empty());

        let bind_addr =
            lookup("VIDSIFT_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            database_path,
            poll_interval,
            max_concurrent_jobs,
            transcript_retries,
            preferred_languages,
            scratch_dir,
            analyzer_api_key,
            analyzer_base_url,
            proxy_url,
            worker_api_key,
            bind_addr,
        })
    }
}

/// Returns the canonical database path: `~/.vidsift/data/vidsift.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".vidsift").join("data").join("vidsift.db"))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}

fn parse_languages(raw: &str) -> Result<Vec<String>, ConfigError> {
    let languages: Vec<String> = raw
        .split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    if languages.is_empty() {
        return Err(ConfigError::Invalid {
            key: "VIDSIFT_LANGUAGES",
            reason: "must list at least one language code".to_string(),
        });
    }
    Ok(languages)
}
