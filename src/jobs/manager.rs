//! In-memory job store and work queue.
//!
//! The job map is mutated under a single lock with critical sections
//! limited to map updates. Terminal states are immutable: once a job
//! is completed or failed, no update touches it again.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::algorithms::AlgorithmKind;
use crate::models::PipelineKind;

/// Job lifecycle: queued -> processing -> (completed | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub ref_path: PathBuf,
    pub hyp_path: PathBuf,
    pub algorithms: Vec<AlgorithmKind>,
    pub pipeline: PipelineKind,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload per algorithm, present once completed.
    pub results: Option<BTreeMap<String, serde_json::Value>>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(
        id: String,
        ref_path: PathBuf,
        hyp_path: PathBuf,
        algorithms: Vec<AlgorithmKind>,
        pipeline: PipelineKind,
    ) -> Self {
        Self {
            id,
            ref_path,
            hyp_path,
            algorithms,
            pipeline,
            status: JobStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: None,
            error: None,
        }
    }
}

/// Job store plus work queue. Workers dequeue with a short timeout so
/// a shutdown signal is observed promptly.
pub struct JobManager {
    jobs: Mutex<HashMap<String, JobRecord>>,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    running: AtomicBool,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

impl JobManager {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            jobs: Mutex::new(HashMap::new()),
            queue_tx,
            queue_rx: tokio::sync::Mutex::new(queue_rx),
            running: AtomicBool::new(false),
        }
    }

    /// Store a job and enqueue it for processing.
    pub fn add_job(&self, job: JobRecord) {
        let id = job.id.clone();
        self.jobs.lock().insert(id.clone(), job);
        // The receiver lives as long as the manager, so the send can
        // only fail during teardown
        if self.queue_tx.send(id.clone()).is_err() {
            warn!(job_id = %id, "work queue closed, job will not be processed");
        } else {
            info!(job_id = %id, "job queued");
        }
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.lock().get(job_id).cloned()
    }

    /// Apply an update to a job. Refused for terminal jobs; returns
    /// whether the update was applied.
    pub fn update_job(&self, job_id: &str, update: impl FnOnce(&mut JobRecord)) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.get_mut(job_id) {
            Some(job) if job.status.is_terminal() => {
                warn!(job_id, status = %job.status, "ignoring update to terminal job");
                false
            }
            Some(job) => {
                update(job);
                true
            }
            None => false,
        }
    }

    /// List jobs sorted by creation time, newest first.
    pub fn list_jobs(
        &self,
        limit: usize,
        offset: usize,
        status: Option<JobStatus>,
    ) -> Vec<JobRecord> {
        let jobs = self.jobs.lock();
        let mut selected: Vec<JobRecord> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        drop(jobs);

        selected.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        selected.into_iter().skip(offset).take(limit).collect()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Dequeue the next job id, waiting at most one second.
    pub async fn next_job(&self) -> Option<String> {
        let mut rx = self.queue_rx.lock().await;
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(job_id)) => Some(job_id),
            _ => None,
        }
    }

    /// Readiness: at least one worker is in its loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobRecord {
        JobRecord::new(
            id.to_string(),
            PathBuf::from("/tmp/ref.csv_bi"),
            PathBuf::from("/tmp/hyp.csv_bi"),
            vec![AlgorithmKind::Taes],
            PipelineKind::Dual,
        )
    }

    #[tokio::test]
    async fn add_then_dequeue_round_trips() {
        let manager = JobManager::new();
        manager.add_job(job("a"));
        manager.add_job(job("b"));

        assert_eq!(manager.next_job().await.as_deref(), Some("a"));
        assert_eq!(manager.next_job().await.as_deref(), Some("b"));
        assert_eq!(manager.job_count(), 2);
    }

    #[tokio::test]
    async fn dequeue_times_out_on_empty_queue() {
        let manager = JobManager::new();
        let start = std::time::Instant::now();
        assert!(manager.next_job().await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[test]
    fn terminal_jobs_are_immutable() {
        let manager = JobManager::new();
        manager.add_job(job("a"));

        assert!(manager.update_job("a", |j| j.status = JobStatus::Processing));
        assert!(manager.update_job("a", |j| j.status = JobStatus::Completed));

        // No update may touch a completed job
        assert!(!manager.update_job("a", |j| j.status = JobStatus::Failed));
        assert_eq!(manager.get_job("a").unwrap().status, JobStatus::Completed);

        assert!(!manager.update_job("missing", |_| {}));
    }

    #[test]
    fn listing_filters_and_paginates_newest_first() {
        let manager = JobManager::new();
        for id in ["a", "b", "c"] {
            let mut j = job(id);
            // Distinct creation times so ordering is deterministic
            j.created_at = Utc::now()
                + chrono::Duration::milliseconds(match id {
                    "a" => 0,
                    "b" => 10,
                    _ => 20,
                });
            manager.add_job(j);
        }
        manager.update_job("b", |j| j.status = JobStatus::Processing);

        let all = manager.list_jobs(10, 0, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "c");

        let queued = manager.list_jobs(10, 0, Some(JobStatus::Queued));
        assert_eq!(queued.len(), 2);

        let page = manager.list_jobs(1, 1, None);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "b");
    }
}
