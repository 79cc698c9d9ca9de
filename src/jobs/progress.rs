//! Per-job progress tracking.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug)]
struct JobProgress {
    total_algorithms: usize,
    completed_algorithms: usize,
    current_algorithm: Option<String>,
    current_pipeline: Option<String>,
    started: Instant,
    algorithm_started: HashMap<String, Instant>,
    algorithm_durations: HashMap<String, f64>,
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub percent_complete: f64,
    pub current_algorithm: Option<String>,
    pub current_pipeline: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub elapsed_seconds: f64,
}

/// Tracks how far each job has progressed through its algorithms.
#[derive(Default)]
pub struct ProgressTracker {
    inner: Mutex<HashMap<String, JobProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_job(&self, job_id: &str, total_algorithms: usize) {
        self.inner.lock().insert(
            job_id.to_string(),
            JobProgress {
                total_algorithms,
                completed_algorithms: 0,
                current_algorithm: None,
                current_pipeline: None,
                started: Instant::now(),
                algorithm_started: HashMap::new(),
                algorithm_durations: HashMap::new(),
            },
        );
    }

    pub fn algorithm_started(&self, job_id: &str, algorithm: &str, pipeline: &str) {
        let mut inner = self.inner.lock();
        if let Some(progress) = inner.get_mut(job_id) {
            progress.current_algorithm = Some(algorithm.to_string());
            progress.current_pipeline = Some(pipeline.to_string());
            progress
                .algorithm_started
                .insert(algorithm.to_string(), Instant::now());
        }
    }

    pub fn algorithm_completed(&self, job_id: &str, algorithm: &str) {
        let mut inner = self.inner.lock();
        if let Some(progress) = inner.get_mut(job_id) {
            if let Some(started) = progress.algorithm_started.get(algorithm) {
                progress
                    .algorithm_durations
                    .insert(algorithm.to_string(), started.elapsed().as_secs_f64());
            }
            progress.completed_algorithms += 1;
            progress.current_algorithm = None;
            progress.current_pipeline = None;
        }
    }

    pub fn snapshot(&self, job_id: &str) -> Option<ProgressSnapshot> {
        let inner = self.inner.lock();
        inner.get(job_id).map(|progress| ProgressSnapshot {
            percent_complete: if progress.total_algorithms > 0 {
                progress.completed_algorithms as f64 / progress.total_algorithms as f64 * 100.0
            } else {
                0.0
            },
            current_algorithm: progress.current_algorithm.clone(),
            current_pipeline: progress.current_pipeline.clone(),
            completed: progress.completed_algorithms,
            total: progress.total_algorithms,
            elapsed_seconds: progress.started.elapsed().as_secs_f64(),
        })
    }

    pub fn algorithm_duration(&self, job_id: &str, algorithm: &str) -> Option<f64> {
        self.inner
            .lock()
            .get(job_id)
            .and_then(|p| p.algorithm_durations.get(algorithm).copied())
    }
}
