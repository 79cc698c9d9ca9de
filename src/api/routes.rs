//! Evaluation endpoints.

use axum::{
    extract::{Multipart, Path as AxumPath, Query, State as AxumState},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::algorithms::AlgorithmKind;
use crate::jobs::{JobRecord, JobStatus};
use crate::models::{PipelineKind, WsEvent};

use super::error::ApiError;
use super::upload;
use super::AppState;

#[derive(Debug, Serialize)]
pub struct EvaluationResponse {
    pub job_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
}

/// Job record as returned by the results endpoints. Single-algorithm
/// jobs have their result fields lifted to the top level.
#[derive(Debug, Serialize)]
pub struct EvaluationResult {
    pub job_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub pipeline: PipelineKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity_report: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Present while the job is processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<crate::jobs::ProgressSnapshot>,
}

impl EvaluationResult {
    fn from_record(job: &JobRecord) -> Self {
        let mut out = Self {
            job_id: job.id.clone(),
            status: job.status.as_str().to_string(),
            created_at: job.created_at,
            completed_at: job.completed_at,
            pipeline: job.pipeline,
            reference_result: None,
            candidate_result: None,
            parity_passed: None,
            parity_report: None,
            reference_time: None,
            candidate_time: None,
            speedup: None,
            results: None,
            error: job.error.clone(),
            progress: None,
        };

        match &job.results {
            Some(results) if results.len() == 1 => {
                // Single-algorithm convenience: lift the payload fields
                let payload = results.values().next().cloned().unwrap_or_default();
                out.reference_result = payload.get("reference_result").cloned();
                out.candidate_result = payload.get("candidate_result").cloned();
                out.parity_passed =
                    payload.get("parity_passed").and_then(|v| v.as_bool());
                out.parity_report = payload.get("parity_report").cloned();
                out.reference_time =
                    payload.get("reference_time").and_then(|v| v.as_f64());
                out.candidate_time =
                    payload.get("candidate_time").and_then(|v| v.as_f64());
                out.speedup = payload.get("speedup").and_then(|v| v.as_f64());
            }
            Some(results) => {
                out.results = serde_json::to_value(results).ok();
            }
            None => {}
        }

        out
    }
}

/// Submit an evaluation: multipart `reference` and `hypothesis` files,
/// repeated `algorithms` fields, and a `pipeline` selector. Returns
/// immediately with the queued job.
pub async fn submit_evaluation(
    AxumState(state): AxumState<AppState>,
    mut multipart: Multipart,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let mut reference: Option<(String, Vec<u8>)> = None;
    let mut hypothesis: Option<(String, Vec<u8>)> = None;
    let mut algorithms: Vec<AlgorithmKind> = Vec::new();
    let mut pipeline = PipelineKind::Dual;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "reference" | "hypothesis" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("reading {name}: {e}")))?
                    .to_vec();
                if name == "reference" {
                    reference = Some((filename, bytes));
                } else {
                    hypothesis = Some((filename, bytes));
                }
            }
            "algorithms" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("reading algorithms: {e}")))?;
                let algorithm = AlgorithmKind::parse(&text)
                    .ok_or_else(|| ApiError::validation(format!("unknown algorithm: {text}")))?;
                algorithms.push(algorithm);
            }
            "pipeline" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("reading pipeline: {e}")))?;
                pipeline = PipelineKind::parse(&text)
                    .ok_or_else(|| ApiError::validation(format!("unknown pipeline: {text}")))?;
            }
            // Unknown fields are ignored so clients can evolve
            _ => {}
        }
    }

    let (ref_name, ref_bytes) =
        reference.ok_or_else(|| ApiError::validation("missing 'reference' file"))?;
    let (hyp_name, hyp_bytes) =
        hypothesis.ok_or_else(|| ApiError::validation("missing 'hypothesis' file"))?;

    upload::validate_csv_bi(&ref_bytes, &ref_name)
        .map_err(|e| ApiError::validation(format!("reference: {e}")))?;
    upload::validate_csv_bi(&hyp_bytes, &hyp_name)
        .map_err(|e| ApiError::validation(format!("hypothesis: {e}")))?;

    if algorithms.is_empty() {
        algorithms.push(AlgorithmKind::All);
    }

    let job_id = Uuid::new_v4().to_string();
    let ref_path = state.scratch_dir.join(format!("{job_id}_ref.csv_bi"));
    let hyp_path = state.scratch_dir.join(format!("{job_id}_hyp.csv_bi"));

    tokio::fs::write(&ref_path, &ref_bytes)
        .await
        .map_err(|e| ApiError::internal(e.into()))?;
    tokio::fs::write(&hyp_path, &hyp_bytes)
        .await
        .map_err(|e| ApiError::internal(e.into()))?;

    let job = JobRecord::new(job_id.clone(), ref_path, hyp_path, algorithms, pipeline);
    let created_at = job.created_at;
    state.jobs.add_job(job);

    // Broadcast the queued state immediately so late WebSocket
    // subscribers can catch up via last-event replay
    state.broadcaster.broadcast(
        &job_id,
        &WsEvent::Status {
            status: JobStatus::Queued.as_str().to_string(),
            message: Some("Job queued".to_string()),
            error: None,
            job_id: Some(job_id.clone()),
        },
    );

    info!(%job_id, pipeline = %pipeline, "evaluation submitted");

    Ok(Json(EvaluationResponse {
        job_id,
        status: JobStatus::Queued.as_str().to_string(),
        created_at,
        message: "Evaluation job submitted successfully".to_string(),
    }))
}

pub async fn get_evaluation(
    AxumState(state): AxumState<AppState>,
    AxumPath(job_id): AxumPath<String>,
) -> Result<Json<EvaluationResult>, ApiError> {
    let job = state
        .jobs
        .get_job(&job_id)
        .ok_or_else(|| ApiError::not_found(format!("Job {job_id} not found")))?;

    let mut view = EvaluationResult::from_record(&job);
    if job.status == JobStatus::Processing {
        view.progress = state.progress.snapshot(&job_id);
    }
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<String>,
}

pub async fn list_evaluations(
    AxumState(state): AxumState<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<EvaluationResult>>, ApiError> {
    let status = match &params.status {
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };

    let jobs = state
        .jobs
        .list_jobs(params.limit.unwrap_or(10), params.offset.unwrap_or(0), status);
    Ok(Json(jobs.iter().map(EvaluationResult::from_record).collect()))
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Ready iff the worker loop is running and the cache is reachable.
pub async fn readiness_check(
    AxumState(state): AxumState<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.jobs.is_running() {
        return Err(ApiError::service_unavailable("Worker not running"));
    }
    if !state.cache.ping().await {
        return Err(ApiError::service_unavailable("Cache not reachable"));
    }
    Ok(Json(serde_json::json!({ "status": "ready" })))
}

/// Prometheus text exposition.
pub async fn metrics_endpoint(AxumState(state): AxumState<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(sink) => sink.render(),
        None => String::new(),
    }
}
