//! Video domain types and transcript text normalization.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Video metadata snapshot, derived fresh for each job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration_seconds: u64,
    pub channel: String,
    pub upload_date: Option<String>,
}

/// One timestamped caption record, in original sequence order.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub start_seconds: f64,
    pub text: String,
}

/// An assembled transcript. Absence of a transcript is represented by
/// `Option<TranscriptResult>` at the call sites, never by an error.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptResult {
    /// Newline-joined lines, each prefixed with a `[MM:SS]` or
    /// `[HH:MM:SS]` marker.
    pub text: String,
    pub language: String,
    /// Whether the captions were machine-generated. The primary method
    /// cannot determine this, so it reports an explicit `false` default.
    pub auto_generated: bool,
}

/// Extracts the 11-character video id from the common URL shapes:
/// `watch?v=`, `youtu.be/`, `embed/` and `shorts/`.
pub fn extract_video_id(url: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            Regex::new(
                r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([a-zA-Z0-9_-]{11})",
            )
            .expect("static pattern"),
            Regex::new(r"youtube\.com/watch\?.*?v=([a-zA-Z0-9_-]{11})").expect("static pattern"),
        ]
    });

    patterns
        .iter()
        .find_map(|p| p.captures(url))
        .map(|c| c[1].to_string())
}

/// Formats a start offset as `[MM:SS]`, or `[HH:MM:SS]` at one hour and
/// beyond.
pub fn format_timestamp(start_seconds: f64) -> String {
    let total = start_seconds.max(0.0) as u64;
    if total >= 3600 {
        format!(
            "[{:02}:{:02}:{:02}]",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        )
    } else {
        format!("[{:02}:{:02}]", total / 60, total % 60)
    }
}

/// Joins segments into the canonical transcript text: one line per
/// non-empty segment, each prefixed with its timestamp marker, in the
/// order the segments arrived.
pub fn format_segments(segments: &[TranscriptSegment]) -> String {
    let mut lines = Vec::with_capacity(segments.len());
    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        lines.push(format!("{} {}", format_timestamp(segment.start_seconds), text));
    }
    lines.join("\n")
}

/// Normalizes an arbitrary transcript blob into the canonical format:
/// empty lines are dropped and every remaining line carries a leading
/// timestamp marker. Lines that already have one pass through unchanged,
/// which makes this idempotent on normalized input. Lines without timing
/// information get a `[00:00]` marker.
pub fn normalize_transcript(text: &str) -> String {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker =
        MARKER.get_or_init(|| Regex::new(r"^\[\d{2}:\d{2}(:\d{2})?\] ").expect("static pattern"));

    let mut lines = Vec::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if marker.is_match(line) {
            lines.push(line.to_string());
        } else {
            lines.push(format!("[00:00] {}", line));
        }
    }
    lines.join("\n")
}
