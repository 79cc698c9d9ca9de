//! Shared service types and environment configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which implementations an evaluation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    /// Legacy oracle only; results are never cached because the oracle
    /// may have external side effects.
    ReferenceOnly,
    /// Native scorers only.
    NewOnly,
    /// Both, with parity validation.
    Dual,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineKind::ReferenceOnly => "reference-only",
            PipelineKind::NewOnly => "new-only",
            PipelineKind::Dual => "dual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reference-only" => Some(PipelineKind::ReferenceOnly),
            "new-only" => Some(PipelineKind::NewOnly),
            "dual" => Some(PipelineKind::Dual),
            _ => None,
        }
    }

    /// Cache is consulted only for pipelines that run the candidate.
    pub fn includes_candidate(&self) -> bool {
        matches!(self, PipelineKind::NewOnly | PipelineKind::Dual)
    }
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events streamed to per-job WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsEvent {
    /// Sent once on connect with the job's current state.
    Initial { job: JobSnapshot },
    /// Job lifecycle transition.
    Status {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
    },
    /// Per-algorithm progress, with the result on completion.
    Algorithm {
        algorithm: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
    },
    /// Emitted on the 30 s read timeout so idle sockets stay warm.
    Heartbeat,
    Error { message: String },
}

/// Minimal job view embedded in the initial WebSocket event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Application configuration from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Worker pool size for the job queue and the blocking scorers.
    pub max_workers: usize,
    /// Batch parallelism for list-file evaluation.
    pub parallel_workers: usize,
    pub cache_ttl_seconds: u64,
    pub redis_url: String,
    pub rate_limit_rpm: u32,
    /// Where uploaded annotation blobs are persisted.
    pub scratch_dir: String,
    /// External reference command; unset selects the in-process oracle.
    pub oracle_cmd: Option<String>,
    /// Path to the scoring parameter TOML; unset selects defaults.
    pub scoring_params: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .unwrap_or(8000);

        let max_workers = std::env::var("MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(4);

        let parallel_workers = std::env::var("PARALLEL_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(4);

        let cache_ttl_seconds = std::env::var("CACHE_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(86_400);

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let rate_limit_rpm = std::env::var("RATE_LIMIT_RPM")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(100);

        let scratch_dir =
            std::env::var("SCRATCH_DIR").unwrap_or_else(|_| "/tmp".to_string());

        Ok(Self {
            port,
            max_workers,
            parallel_workers,
            cache_ttl_seconds,
            redis_url,
            rate_limit_rpm,
            scratch_dir,
            oracle_cmd: std::env::var("ORACLE_CMD").ok(),
            scoring_params: std::env::var("SCORING_PARAMS").ok(),
        })
    }
}
