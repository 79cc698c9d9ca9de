//! Async service wrapper around the dual orchestrator.
//!
//! Adds the three service concerns the scorers must not know about:
//! content-addressed result caching (candidate-inclusive pipelines
//! only), metrics tracking on every exit path, and blocking-pool
//! offload for the CPU-bound work.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use crate::algorithms::AlgorithmKind;
use crate::cache::ResultCache;
use crate::models::PipelineKind;
use crate::monitoring::{self, MetricsSink};

use super::dual::DualOrchestrator;

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct AsyncOrchestrator {
    dual: Arc<DualOrchestrator>,
    cache: Arc<ResultCache>,
    metrics: Arc<dyn MetricsSink>,
}

impl AsyncOrchestrator {
    pub fn new(
        dual: Arc<DualOrchestrator>,
        cache: Arc<ResultCache>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            dual,
            cache,
            metrics,
        }
    }

    /// Run one evaluation with caching and metrics. The returned value
    /// is the JSON result payload stored on the job record.
    pub async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
        pipeline: PipelineKind,
    ) -> Result<serde_json::Value> {
        // Best-effort cache key; unreadable files fall through to the
        // evaluation itself, which reports the real error
        let key = match (
            tokio::fs::read(ref_path).await,
            tokio::fs::read(hyp_path).await,
        ) {
            (Ok(ref_bytes), Ok(hyp_bytes)) => Some(ResultCache::make_key(
                &ref_bytes,
                &hyp_bytes,
                algorithm.as_str(),
                pipeline.as_str(),
                PACKAGE_VERSION,
            )),
            _ => None,
        };

        if pipeline.includes_candidate() {
            if let Some(key) = &key {
                if let Some(cached) = self.cache.get_json(key).await {
                    debug!(algorithm = %algorithm, pipeline = %pipeline, "cache hit");
                    monitoring::record_cache_hit(
                        self.metrics.as_ref(),
                        algorithm.as_str(),
                        pipeline.as_str(),
                    );
                    return Ok(cached);
                }
            }
        }

        let result = monitoring::track_evaluation(
            self.metrics.as_ref(),
            algorithm.as_str(),
            pipeline.as_str(),
            self.run(ref_path, hyp_path, algorithm, pipeline),
        )
        .await?;

        if pipeline.includes_candidate() {
            if let Some(key) = &key {
                self.cache.set_json(key, &result).await;
            }
        }

        Ok(result)
    }

    async fn run(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
        pipeline: PipelineKind,
    ) -> Result<serde_json::Value> {
        match pipeline {
            PipelineKind::Dual => {
                let result = self.dual.evaluate(ref_path, hyp_path, algorithm).await?;
                if !result.parity_passed {
                    monitoring::record_parity_failure(
                        self.metrics.as_ref(),
                        algorithm.as_str(),
                    );
                }
                Ok(serde_json::json!({
                    "reference_result": result.reference_result,
                    "candidate_result": result.candidate_result,
                    "parity_passed": result.parity_passed,
                    "parity_report": result.parity_report,
                    "reference_time": result.reference_time,
                    "candidate_time": result.candidate_time,
                    "speedup": result.speedup(),
                }))
            }
            PipelineKind::ReferenceOnly => {
                let reference = self
                    .dual
                    .oracle()
                    .evaluate(ref_path, hyp_path, algorithm)
                    .await?;
                Ok(serde_json::json!({ "reference_result": reference }))
            }
            PipelineKind::NewOnly => {
                let candidate = self.dual.candidate().clone();
                let ref_owned = ref_path.to_path_buf();
                let hyp_owned = hyp_path.to_path_buf();
                let result = tokio::task::spawn_blocking(move || {
                    candidate.evaluate(&ref_owned, &hyp_owned, algorithm)
                })
                .await
                .context("candidate pipeline task panicked")??;
                Ok(serde_json::json!({ "candidate_result": result }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::NoopSink;
    use crate::orchestration::oracle::InProcessOracle;
    use crate::params::ScoringParams;
    use std::io::Write;
    use std::path::PathBuf;

    const CSV: &str = "\
# version = csv_v1.0.0
# duration = 30.0 secs
channel,start_time,stop_time,label,confidence
TERM,5.0,15.0,seiz,1.0
";

    fn write_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        path
    }

    fn wrapper() -> AsyncOrchestrator {
        let params = ScoringParams::default();
        let dual = Arc::new(DualOrchestrator::new(
            Arc::new(InProcessOracle::new(params.clone())),
            params,
            1e-10,
        ));
        AsyncOrchestrator::new(dual, Arc::new(ResultCache::disabled()), Arc::new(NoopSink))
    }

    #[tokio::test]
    async fn dual_payload_carries_both_sides_and_parity() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = write_file(&dir, "ref.csv_bi");
        let hyp_path = write_file(&dir, "hyp.csv_bi");

        let payload = wrapper()
            .evaluate(
                &ref_path,
                &hyp_path,
                AlgorithmKind::Taes,
                PipelineKind::Dual,
            )
            .await
            .unwrap();

        assert_eq!(payload["parity_passed"], true);
        assert!(payload["reference_result"].is_object());
        assert!(payload["candidate_result"].is_object());
        assert!(payload["speedup"].is_number());
    }

    #[tokio::test]
    async fn reference_only_payload_has_no_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = write_file(&dir, "ref.csv_bi");
        let hyp_path = write_file(&dir, "hyp.csv_bi");

        let payload = wrapper()
            .evaluate(
                &ref_path,
                &hyp_path,
                AlgorithmKind::Overlap,
                PipelineKind::ReferenceOnly,
            )
            .await
            .unwrap();

        assert!(payload.get("candidate_result").is_none());
        assert!(payload["reference_result"].is_object());
    }

    #[tokio::test]
    async fn new_only_payload_has_typed_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = write_file(&dir, "ref.csv_bi");
        let hyp_path = write_file(&dir, "hyp.csv_bi");

        let payload = wrapper()
            .evaluate(
                &ref_path,
                &hyp_path,
                AlgorithmKind::Dp,
                PipelineKind::NewOnly,
            )
            .await
            .unwrap();

        assert_eq!(payload["candidate_result"]["algorithm"], "dp");
        assert!(payload.get("reference_result").is_none());
    }

    #[tokio::test]
    async fn missing_files_surface_the_evaluation_error() {
        let err = wrapper()
            .evaluate(
                Path::new("/nonexistent/ref.csv_bi"),
                Path::new("/nonexistent/hyp.csv_bi"),
                AlgorithmKind::Taes,
                PipelineKind::NewOnly,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("annotation file"));
    }
}
