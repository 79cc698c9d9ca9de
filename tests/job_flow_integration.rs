//! End-to-end job flow without the network layer: submission through
//! the worker loop to terminal events, plus the cache consultation
//! rules.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use seizeval_backend::algorithms::AlgorithmKind;
use seizeval_backend::cache::ResultCache;
use seizeval_backend::jobs::{
    run_worker, ConnectionManager, JobManager, JobRecord, JobStatus, ProcessorContext,
    ProgressTracker,
};
use seizeval_backend::models::PipelineKind;
use seizeval_backend::monitoring::NoopSink;
use seizeval_backend::orchestration::{
    AsyncOrchestrator, DualOrchestrator, InProcessOracle, ReferenceScorer,
};
use seizeval_backend::params::ScoringParams;
use seizeval_backend::validation::MetricMap;

const REF_CSV: &str = "\
# version = csv_v1.0.0
# bname = patient_a
# duration = 60.0 secs
channel,start_time,stop_time,label,confidence
TERM,10.0,20.0,seiz,1.0
TERM,30.0,40.0,seiz,1.0
";

const HYP_CSV: &str = "\
# version = csv_v1.0.0
# bname = patient_a
# duration = 60.0 secs
channel,start_time,stop_time,label,confidence
TERM,11.0,19.0,seiz,1.0
";

fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

/// Oracle wrapper that counts invocations, for cache assertions.
struct CountingOracle {
    inner: InProcessOracle,
    calls: AtomicUsize,
}

impl CountingOracle {
    fn new(params: ScoringParams) -> Self {
        Self {
            inner: InProcessOracle::new(params),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReferenceScorer for CountingOracle {
    async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<MetricMap> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.evaluate(ref_path, hyp_path, algorithm).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

fn build_context(cache: ResultCache, oracle: Arc<dyn ReferenceScorer>) -> Arc<ProcessorContext> {
    let params = ScoringParams::default();
    let dual = Arc::new(DualOrchestrator::new(oracle, params, 1e-10));
    Arc::new(ProcessorContext {
        jobs: Arc::new(JobManager::new()),
        orchestrator: Arc::new(AsyncOrchestrator::new(
            dual,
            Arc::new(cache),
            Arc::new(NoopSink),
        )),
        progress: Arc::new(ProgressTracker::new()),
        broadcaster: Arc::new(ConnectionManager::new()),
    })
}

async fn wait_for_terminal(jobs: &JobManager, job_id: &str) -> JobRecord {
    for _ in 0..200 {
        if let Some(job) = jobs.get_job(job_id) {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

#[tokio::test]
async fn submission_runs_through_worker_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
    let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

    let params = ScoringParams::default();
    let ctx = build_context(
        ResultCache::disabled(),
        Arc::new(InProcessOracle::new(params)),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(run_worker(Arc::clone(&ctx), 0, shutdown_rx));

    // Subscribe before submission so the full event sequence is seen
    let (_sub, mut rx) = ctx.broadcaster.subscribe("job-e2e");

    ctx.jobs.add_job(JobRecord::new(
        "job-e2e".to_string(),
        ref_path,
        hyp_path,
        vec![AlgorithmKind::Taes, AlgorithmKind::Overlap, AlgorithmKind::Ira],
        PipelineKind::Dual,
    ));

    let job = wait_for_terminal(&ctx.jobs, "job-e2e").await;
    assert_eq!(job.status, JobStatus::Completed);
    let results = job.results.expect("completed job carries results");
    assert_eq!(results.len(), 3);
    for algorithm in ["taes", "overlap", "ira"] {
        let payload = &results[algorithm];
        assert_eq!(payload["parity_passed"], true, "{algorithm}");
        assert!(payload["speedup"].is_number());
    }

    // Event ordering: processing first, strictly alternating
    // running/completed per algorithm, terminal completed last
    let mut events: Vec<serde_json::Value> = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        events.push(serde_json::from_str(&payload).unwrap());
    }
    assert_eq!(events.first().unwrap()["status"], "processing");
    assert_eq!(events.last().unwrap()["status"], "completed");
    let algorithm_statuses: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] == "algorithm")
        .map(|e| e["status"].as_str().unwrap())
        .collect();
    assert_eq!(algorithm_statuses.len(), 6);
    for pair in algorithm_statuses.chunks(2) {
        assert_eq!(pair, ["running", "completed"]);
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), worker)
        .await
        .expect("worker drains")
        .unwrap();
}

#[tokio::test]
async fn second_evaluation_hits_cache_and_skips_the_oracle() {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
    let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

    let oracle = Arc::new(CountingOracle::new(ScoringParams::default()));
    let ctx = build_context(ResultCache::in_memory(), oracle.clone());

    let first = ctx
        .orchestrator
        .evaluate(&ref_path, &hyp_path, AlgorithmKind::Taes, PipelineKind::Dual)
        .await
        .unwrap();
    let second = ctx
        .orchestrator
        .evaluate(&ref_path, &hyp_path, AlgorithmKind::Taes, PipelineKind::Dual)
        .await
        .unwrap();

    // Identical payloads, single oracle invocation
    assert_eq!(first, second);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reference_only_pipeline_is_never_cached() {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
    let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

    let oracle = Arc::new(CountingOracle::new(ScoringParams::default()));
    let ctx = build_context(ResultCache::in_memory(), oracle.clone());

    for _ in 0..2 {
        ctx.orchestrator
            .evaluate(
                &ref_path,
                &hyp_path,
                AlgorithmKind::Taes,
                PipelineKind::ReferenceOnly,
            )
            .await
            .unwrap();
    }

    // The oracle may have side effects, so both runs invoke it
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn late_subscriber_sees_the_terminal_event() {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
    let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

    let ctx = build_context(
        ResultCache::disabled(),
        Arc::new(InProcessOracle::new(ScoringParams::default())),
    );

    ctx.jobs.add_job(JobRecord::new(
        "job-late".to_string(),
        ref_path,
        hyp_path,
        vec![AlgorithmKind::Dp],
        PipelineKind::NewOnly,
    ));
    seizeval_backend::jobs::process_evaluation(&ctx, "job-late").await;
    assert_eq!(
        ctx.jobs.get_job("job-late").unwrap().status,
        JobStatus::Completed
    );

    // Subscribing after the terminal event replays it immediately
    let (_sub, mut rx) = ctx.broadcaster.subscribe("job-late");
    let replayed: serde_json::Value =
        serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(replayed["status"], "completed");
}

#[tokio::test]
async fn failed_job_reports_error_and_skips_remaining_algorithms() {
    let ctx = build_context(
        ResultCache::disabled(),
        Arc::new(InProcessOracle::new(ScoringParams::default())),
    );

    ctx.jobs.add_job(JobRecord::new(
        "job-fail".to_string(),
        PathBuf::from("/nonexistent/ref.csv_bi"),
        PathBuf::from("/nonexistent/hyp.csv_bi"),
        vec![AlgorithmKind::All],
        PipelineKind::Dual,
    ));
    seizeval_backend::jobs::process_evaluation(&ctx, "job-fail").await;

    let job = ctx.jobs.get_job("job-fail").unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
    assert!(job.results.is_none());

    // Terminal state is immutable afterwards
    assert!(!ctx.jobs.update_job("job-fail", |j| j.status = JobStatus::Queued));
}
