//! Annotation model and CSV_BI parser.
//!
//! A CSV_BI file is line-oriented: `#`-prefixed comment lines carry
//! `key = value` metadata, one header line names the columns, and each
//! data row is `channel,start_time,stop_time,label,confidence`.
//! Malformed rows are skipped with a warning; parsing never aborts.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Magic version token expected in the file metadata.
pub const CSV_BI_VERSION: &str = "csv_v1.0.0";

/// A single annotated event on a timeline.
///
/// Times are seconds from the start of the recording with
/// `stop_time > start_time`; confidence is in `[0, 1]`. The scorers are
/// channel-agnostic, so `channel` is carried but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub channel: String,
    pub start_time: f64,
    pub stop_time: f64,
    pub label: String,
    pub confidence: f64,
}

impl EventAnnotation {
    pub fn new(start_time: f64, stop_time: f64, label: impl Into<String>) -> Self {
        Self {
            channel: "TERM".to_string(),
            start_time,
            stop_time,
            label: label.into(),
            confidence: 1.0,
        }
    }

    /// Event duration in seconds.
    pub fn duration(&self) -> f64 {
        self.stop_time - self.start_time
    }

    /// Parse a single data row. Exactly five comma-separated fields.
    pub fn from_csv_bi_line(line: &str) -> Result<Self, AnnotationError> {
        let parts: Vec<&str> = line.trim().split(',').collect();
        if parts.len() != 5 {
            return Err(AnnotationError::BadRow(format!(
                "expected 5 fields, got {}",
                parts.len()
            )));
        }

        let start_time: f64 = parts[1]
            .trim()
            .parse()
            .map_err(|_| AnnotationError::BadRow(format!("bad start_time: {}", parts[1])))?;
        let stop_time: f64 = parts[2]
            .trim()
            .parse()
            .map_err(|_| AnnotationError::BadRow(format!("bad stop_time: {}", parts[2])))?;
        let confidence: f64 = parts[4]
            .trim()
            .parse()
            .map_err(|_| AnnotationError::BadRow(format!("bad confidence: {}", parts[4])))?;

        if start_time < 0.0 {
            return Err(AnnotationError::BadRow(format!(
                "negative start_time: {start_time}"
            )));
        }
        if stop_time <= start_time {
            return Err(AnnotationError::BadRow(format!(
                "stop_time {stop_time} must be > start_time {start_time}"
            )));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(AnnotationError::BadRow(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }

        Ok(Self {
            channel: parts[0].trim().to_string(),
            start_time,
            stop_time,
            label: parts[3].trim().to_string(),
            confidence,
        })
    }
}

/// A parsed annotation file: events plus file-level metadata.
///
/// Events need not cover the full duration; gaps are implicit
/// background. `duration >= max(stop_time)` when events are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationFile {
    pub version: String,
    pub patient: String,
    pub session: String,
    pub events: Vec<EventAnnotation>,
    pub duration: f64,
}

impl AnnotationFile {
    /// Parse CSV_BI content from an in-memory string.
    pub fn from_csv_bi_str(content: &str) -> Self {
        let mut metadata: HashMap<String, String> = HashMap::new();
        let mut events = Vec::new();

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                // Metadata comments: "# key = value"
                if let Some((key, value)) = comment.split_once('=') {
                    metadata.insert(key.trim().to_string(), value.trim().to_string());
                }
                continue;
            }

            // Column header line
            if line.starts_with("channel,") {
                continue;
            }

            match EventAnnotation::from_csv_bi_line(line) {
                Ok(event) => events.push(event),
                Err(err) => warn!(%err, line, "skipping malformed annotation row"),
            }
        }

        // Duration metadata is written as "<float> secs"
        let duration = metadata
            .get("duration")
            .map(|s| s.trim_end_matches("secs").trim())
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        // "bname" is an accepted alias for "patient"
        let patient = metadata
            .get("patient")
            .or_else(|| metadata.get("bname"))
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            version: metadata
                .get("version")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            patient,
            session: metadata
                .get("session")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string()),
            events,
            duration,
        }
    }

    /// Parse a CSV_BI file from disk.
    pub fn from_csv_bi(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading annotation file {}", path.display()))?;
        Ok(Self::from_csv_bi_str(&content))
    }
}

#[derive(Debug, Clone)]
pub enum AnnotationError {
    BadRow(String),
}

impl std::fmt::Display for AnnotationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRow(detail) => write!(f, "malformed annotation row: {detail}"),
        }
    }
}

impl std::error::Error for AnnotationError {}
