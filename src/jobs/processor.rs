//! Job processing and the worker loop.
//!
//! Each job runs its algorithms in order and emits strictly ordered
//! progress events: processing, then per-algorithm running/completed
//! pairs, then a terminal completed or failed. The first algorithm
//! error fails the job; remaining algorithms are not attempted.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::algorithms::AlgorithmKind;
use crate::models::WsEvent;
use crate::orchestration::AsyncOrchestrator;

use super::broadcast::ConnectionManager;
use super::manager::{JobManager, JobStatus};
use super::progress::ProgressTracker;

/// Collaborators a worker needs, constructed once at startup and
/// shared by every worker in the pool.
pub struct ProcessorContext {
    pub jobs: Arc<JobManager>,
    pub orchestrator: Arc<AsyncOrchestrator>,
    pub progress: Arc<ProgressTracker>,
    pub broadcaster: Arc<ConnectionManager>,
}

/// Process one evaluation job end to end.
pub async fn process_evaluation(ctx: &ProcessorContext, job_id: &str) {
    let Some(job) = ctx.jobs.get_job(job_id) else {
        error!(job_id, "job not found in store");
        return;
    };

    ctx.jobs.update_job(job_id, |j| {
        j.status = JobStatus::Processing;
        j.started_at = Some(Utc::now());
    });
    ctx.broadcaster.broadcast(
        job_id,
        &WsEvent::Status {
            status: JobStatus::Processing.as_str().to_string(),
            message: Some("Starting evaluation".to_string()),
            error: None,
            job_id: Some(job_id.to_string()),
        },
    );

    let algorithms = AlgorithmKind::expand(&job.algorithms);
    ctx.progress.init_job(job_id, algorithms.len());

    let mut results: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for algorithm in algorithms {
        ctx.progress
            .algorithm_started(job_id, algorithm.as_str(), job.pipeline.as_str());
        ctx.broadcaster.broadcast(
            job_id,
            &WsEvent::Algorithm {
                algorithm: algorithm.as_str().to_string(),
                status: "running".to_string(),
                result: None,
            },
        );

        let outcome = ctx
            .orchestrator
            .evaluate(&job.ref_path, &job.hyp_path, algorithm, job.pipeline)
            .await;
        ctx.progress.algorithm_completed(job_id, algorithm.as_str());

        match outcome {
            Ok(result) => {
                ctx.broadcaster.broadcast(
                    job_id,
                    &WsEvent::Algorithm {
                        algorithm: algorithm.as_str().to_string(),
                        status: "completed".to_string(),
                        result: Some(result.clone()),
                    },
                );
                results.insert(algorithm.as_str().to_string(), result);
            }
            Err(err) => {
                // First failure is terminal; remaining algorithms are
                // not attempted
                error!(job_id, algorithm = %algorithm, %err, "algorithm failed");
                let message = err.to_string();
                ctx.jobs.update_job(job_id, |j| {
                    j.status = JobStatus::Failed;
                    j.completed_at = Some(Utc::now());
                    j.error = Some(message.clone());
                });
                ctx.broadcaster.broadcast(
                    job_id,
                    &WsEvent::Status {
                        status: JobStatus::Failed.as_str().to_string(),
                        message: None,
                        error: Some(err.to_string()),
                        job_id: Some(job_id.to_string()),
                    },
                );
                return;
            }
        }
    }

    ctx.jobs.update_job(job_id, |j| {
        j.status = JobStatus::Completed;
        j.completed_at = Some(Utc::now());
        j.results = Some(results.clone());
    });
    ctx.broadcaster.broadcast(
        job_id,
        &WsEvent::Status {
            status: JobStatus::Completed.as_str().to_string(),
            message: Some("Evaluation completed successfully".to_string()),
            error: None,
            job_id: Some(job_id.to_string()),
        },
    );
    info!(job_id, "job completed");
}

/// Long-lived worker: dequeue with a short timeout, process one job at
/// a time, exit at the next dequeue once shutdown is signalled.
/// In-flight jobs complete before the worker drains.
pub async fn run_worker(
    ctx: Arc<ProcessorContext>,
    worker_id: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(worker_id, "job worker started");
    ctx.jobs.set_running(true);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            job_id = ctx.jobs.next_job() => {
                if let Some(job_id) = job_id {
                    info!(worker_id, %job_id, "processing job");
                    process_evaluation(&ctx, &job_id).await;
                }
            }
        }
    }

    warn!(worker_id, "job worker draining");
    ctx.jobs.set_running(false);
}
