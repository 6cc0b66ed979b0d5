//! Caption track parsers for the two formats upstreams serve: the
//! `json3` event stream and WebVTT.

use regex::Regex;
use std::sync::OnceLock;

use crate::video::TranscriptSegment;

/// Parses a `json3` caption document into segments. Returns `None` when
/// the document is not valid JSON or carries no usable events.
pub fn parse_json3(body: &str) -> Option<Vec<TranscriptSegment>> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    let events = doc.get("events")?.as_array()?;

    let mut segments = Vec::new();
    for event in events {
        let start_ms = event.get("tStartMs").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let Some(segs) = event.get("segs").and_then(|v| v.as_array()) else {
            continue;
        };

        let text: String = segs
            .iter()
            .filter_map(|s| s.get("utf8").and_then(|v| v.as_str()))
            .collect();
        let text = text.trim();
        if text.is_empty() || text == "\n" {
            continue;
        }

        segments.push(TranscriptSegment {
            start_seconds: start_ms / 1000.0,
            text: text.to_string(),
        });
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Parses a WebVTT caption document into segments. Cue text lines are
/// attributed to the start time of the most recent `-->` timing line.
pub fn parse_vtt(body: &str) -> Option<Vec<TranscriptSegment>> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("static pattern"));

    let mut segments = Vec::new();
    let mut current_time: Option<f64> = None;

    for raw in body.lines() {
        let line = raw.trim();
        if line.is_empty() || line == "WEBVTT" || line.starts_with("NOTE") {
            current_time = None;
            continue;
        }

        if let Some(ts) = line.split("-->").next().filter(|_| line.contains("-->")) {
            current_time = parse_vtt_timestamp(ts.trim());
            continue;
        }

        let Some(start) = current_time else { continue };
        let text = tag.replace_all(line, "");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        segments.push(TranscriptSegment {
            start_seconds: start,
            text: text.to_string(),
        });
        // One text line per cue keeps rollup captions from duplicating.
        current_time = None;
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Parses `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds.
fn parse_vtt_timestamp(ts: &str) -> Option<f64> {
    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
