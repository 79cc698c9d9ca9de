//! Dual-pipeline execution.
//!
//! Runs the reference oracle and the candidate scorers on the same
//! file pair, times both with monotonic clocks, and validates parity.
//! A parity failure is recorded, never raised.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::algorithms::{
    AlgorithmKind, AlgorithmResult, DpAligner, EpochScorer, IraScorer, OverlapScorer, TaesScorer,
};
use crate::annotations::AnnotationFile;
use crate::params::ScoringParams;
use crate::validation::{MetricMap, ParityValidator, ValidationReport};

use super::oracle::ReferenceScorer;

/// The native pipeline: parse, map labels, score.
#[derive(Debug, Clone)]
pub struct CandidatePipeline {
    params: ScoringParams,
}

impl CandidatePipeline {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    /// Evaluate one file pair with one concrete algorithm.
    pub fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<AlgorithmResult> {
        let ref_file = AnnotationFile::from_csv_bi(ref_path)?;
        let hyp_file = AnnotationFile::from_csv_bi(hyp_path)?;
        self.evaluate_files(&ref_file, &hyp_file, algorithm)
    }

    /// Evaluate already-parsed annotation files.
    pub fn evaluate_files(
        &self,
        ref_file: &AnnotationFile,
        hyp_file: &AnnotationFile,
        algorithm: AlgorithmKind,
    ) -> Result<AlgorithmResult> {
        let ref_events = self.mapped_events(ref_file);
        let hyp_events = self.mapped_events(hyp_file);
        // Scoring spans the longer of the two declared durations
        let duration = ref_file.duration.max(hyp_file.duration);

        let result = match algorithm {
            AlgorithmKind::Dp => {
                let ref_seq: Vec<String> =
                    ref_events.iter().map(|e| e.label.clone()).collect();
                let hyp_seq: Vec<String> =
                    hyp_events.iter().map(|e| e.label.clone()).collect();
                AlgorithmResult::Dp(DpAligner::default().align(&ref_seq, &hyp_seq))
            }
            AlgorithmKind::Epoch => AlgorithmResult::Epoch(
                EpochScorer::new(self.params.epoch_duration, self.params.null_class.clone())
                    .score(&ref_events, &hyp_events, duration),
            ),
            AlgorithmKind::Overlap => {
                AlgorithmResult::Overlap(OverlapScorer::new().score(&ref_events, &hyp_events))
            }
            AlgorithmKind::Ira => AlgorithmResult::Ira(IraScorer::new().score(
                &ref_events,
                &hyp_events,
                self.params.epoch_duration,
                duration,
                &self.params.null_class,
            )),
            AlgorithmKind::Taes => {
                AlgorithmResult::Taes(TaesScorer::default().score(&ref_events, &hyp_events))
            }
            AlgorithmKind::All => bail!("'all' must be expanded before evaluation"),
        };

        Ok(result)
    }

    fn mapped_events(&self, file: &AnnotationFile) -> Vec<crate::annotations::EventAnnotation> {
        let mut events = file.events.clone();
        for event in &mut events {
            event.label = self.params.map_label(&event.label);
        }
        events.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        events
    }
}

/// Outcome of one dual evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualResult {
    pub reference_result: MetricMap,
    pub candidate_result: AlgorithmResult,
    pub parity_report: ValidationReport,
    pub parity_passed: bool,
    /// Wall seconds for each side, measured monotonically.
    pub reference_time: f64,
    pub candidate_time: f64,
}

impl DualResult {
    /// Reference time over candidate time; 0 when the candidate time
    /// is 0.
    pub fn speedup(&self) -> f64 {
        if self.candidate_time > 0.0 {
            self.reference_time / self.candidate_time
        } else {
            0.0
        }
    }
}

/// One row of a list-file batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub reference: String,
    pub hypothesis: String,
    pub parity_passed: bool,
    pub speedup: f64,
}

/// Aggregate outcome of a list-file batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEvaluation {
    pub file_results: Vec<FileResult>,
    pub all_passed: bool,
    pub total_files: usize,
}

/// Runs both pipelines and validates the results against each other.
pub struct DualOrchestrator {
    oracle: Arc<dyn ReferenceScorer>,
    candidate: CandidatePipeline,
    validator: ParityValidator,
}

impl DualOrchestrator {
    pub fn new(
        oracle: Arc<dyn ReferenceScorer>,
        params: ScoringParams,
        tolerance: f64,
    ) -> Self {
        Self {
            oracle,
            candidate: CandidatePipeline::new(params),
            validator: ParityValidator::new(tolerance),
        }
    }

    pub fn candidate(&self) -> &CandidatePipeline {
        &self.candidate
    }

    pub fn oracle(&self) -> &Arc<dyn ReferenceScorer> {
        &self.oracle
    }

    /// Run both pipelines on a single file pair. Never aborts on
    /// parity failure; the mismatch is recorded on the result.
    pub async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<DualResult> {
        let reference_start = Instant::now();
        let reference_result = self
            .oracle
            .evaluate(ref_path, hyp_path, algorithm)
            .await
            .with_context(|| format!("reference pipeline failed for {algorithm}"))?;
        let reference_time = reference_start.elapsed().as_secs_f64();

        let candidate_start = Instant::now();
        let candidate = self.candidate.clone();
        let ref_owned = ref_path.to_path_buf();
        let hyp_owned = hyp_path.to_path_buf();
        let candidate_result = tokio::task::spawn_blocking(move || {
            candidate.evaluate(&ref_owned, &hyp_owned, algorithm)
        })
        .await
        .context("candidate pipeline task panicked")??;
        let candidate_time = candidate_start.elapsed().as_secs_f64();

        let parity_report = self.validator.compare(&reference_result, &candidate_result);
        if !parity_report.passed {
            warn!(algorithm = %algorithm, report = %parity_report, "parity mismatch");
        }

        Ok(DualResult {
            parity_passed: parity_report.passed,
            reference_result,
            candidate_result,
            parity_report,
            reference_time,
            candidate_time,
        })
    }

    /// List-file mode: two parallel filename lists, positionally
    /// paired, evaluated with bounded concurrency.
    pub async fn evaluate_lists(
        self: &Arc<Self>,
        ref_list: &Path,
        hyp_list: &Path,
        algorithm: AlgorithmKind,
        parallel: usize,
    ) -> Result<ListEvaluation> {
        let ref_files = read_list_file(ref_list)?;
        let hyp_files = read_list_file(hyp_list)?;
        if ref_files.len() != hyp_files.len() {
            bail!(
                "list files must have the same length: {} vs {}",
                ref_files.len(),
                hyp_files.len()
            );
        }

        let total_files = ref_files.len();
        let pairs: Vec<(PathBuf, PathBuf)> = ref_files.into_iter().zip(hyp_files).collect();

        let file_results: Vec<FileResult> = stream::iter(pairs)
            .map(|(ref_file, hyp_file)| {
                let orchestrator = Arc::clone(self);
                async move {
                    let outcome = orchestrator
                        .evaluate(&ref_file, &hyp_file, algorithm)
                        .await;
                    (ref_file, hyp_file, outcome)
                }
            })
            .buffered(parallel.max(1))
            .map(|(ref_file, hyp_file, outcome)| match outcome {
                Ok(result) => FileResult {
                    reference: ref_file.display().to_string(),
                    hypothesis: hyp_file.display().to_string(),
                    parity_passed: result.parity_passed,
                    speedup: result.speedup(),
                },
                Err(err) => {
                    warn!(%err, reference = %ref_file.display(), "pair evaluation failed");
                    FileResult {
                        reference: ref_file.display().to_string(),
                        hypothesis: hyp_file.display().to_string(),
                        parity_passed: false,
                        speedup: 0.0,
                    }
                }
            })
            .collect()
            .await;

        let all_passed = file_results.iter().all(|r| r.parity_passed);
        info!(
            total_files,
            all_passed,
            algorithm = %algorithm,
            "list evaluation finished"
        );

        Ok(ListEvaluation {
            file_results,
            all_passed,
            total_files,
        })
    }
}

fn read_list_file(path: &Path) -> Result<Vec<PathBuf>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading list file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::oracle::InProcessOracle;
    use std::io::Write;

    const REF_CSV: &str = "\
# version = csv_v1.0.0
# bname = test_ref
# duration = 60.0 secs
channel,start_time,stop_time,label,confidence
TERM,10.0,20.0,seiz,1.0
TERM,30.0,40.0,seiz,1.0
";

    const HYP_CSV: &str = "\
# version = csv_v1.0.0
# bname = test_hyp
# duration = 60.0 secs
channel,start_time,stop_time,label,confidence
TERM,12.0,20.0,seiz,1.0
";

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn orchestrator() -> Arc<DualOrchestrator> {
        let params = ScoringParams::default();
        Arc::new(DualOrchestrator::new(
            Arc::new(InProcessOracle::new(params.clone())),
            params,
            1e-10,
        ))
    }

    #[tokio::test]
    async fn dual_run_against_mirror_oracle_passes_parity() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
        let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

        let result = orchestrator()
            .evaluate(&ref_path, &hyp_path, AlgorithmKind::Taes)
            .await
            .unwrap();

        assert!(result.parity_passed);
        assert!(result.reference_time >= 0.0);
        assert!(result.candidate_time >= 0.0);
        match &result.candidate_result {
            AlgorithmResult::Taes(taes) => {
                // Hyp misses the second ref entirely
                assert!(taes.false_negatives >= 1.0);
            }
            other => panic!("unexpected result tag: {other:?}"),
        }
    }

    #[tokio::test]
    async fn all_must_be_expanded_before_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = write_file(&dir, "ref.csv_bi", REF_CSV);
        let hyp_path = write_file(&dir, "hyp.csv_bi", HYP_CSV);

        let err = CandidatePipeline::new(ScoringParams::default())
            .evaluate(&ref_path, &hyp_path, AlgorithmKind::All)
            .unwrap_err();
        assert!(err.to_string().contains("expanded"));
    }

    #[tokio::test]
    async fn list_mode_pairs_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let ref_a = write_file(&dir, "ref_a.csv_bi", REF_CSV);
        let hyp_a = write_file(&dir, "hyp_a.csv_bi", HYP_CSV);
        let ref_b = write_file(&dir, "ref_b.csv_bi", REF_CSV);
        let hyp_b = write_file(&dir, "hyp_b.csv_bi", REF_CSV);

        let ref_list = write_file(
            &dir,
            "refs.list",
            &format!("{}\n{}\n", ref_a.display(), ref_b.display()),
        );
        let hyp_list = write_file(
            &dir,
            "hyps.list",
            &format!("{}\n{}\n", hyp_a.display(), hyp_b.display()),
        );

        let outcome = orchestrator()
            .evaluate_lists(&ref_list, &hyp_list, AlgorithmKind::Overlap, 2)
            .await
            .unwrap();

        assert_eq!(outcome.total_files, 2);
        assert!(outcome.all_passed);
        assert_eq!(outcome.file_results.len(), 2);
    }

    #[tokio::test]
    async fn mismatched_list_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ref_a = write_file(&dir, "ref_a.csv_bi", REF_CSV);
        let ref_list = write_file(&dir, "refs.list", &format!("{}\n", ref_a.display()));
        let hyp_list = write_file(&dir, "hyps.list", "");

        let err = orchestrator()
            .evaluate_lists(&ref_list, &hyp_list, AlgorithmKind::Taes, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("same length"));
    }

    #[test]
    fn label_mapping_applies_before_scoring() {
        let mut params = ScoringParams::default();
        params
            .label_map
            .insert("spsw".to_string(), "seiz".to_string());
        let pipeline = CandidatePipeline::new(params);

        let ref_file = AnnotationFile::from_csv_bi_str(
            "# duration = 10.0 secs\nchannel,start_time,stop_time,label,confidence\nTERM,0.0,5.0,SPSW,1.0\n",
        );
        let hyp_file = AnnotationFile::from_csv_bi_str(
            "# duration = 10.0 secs\nchannel,start_time,stop_time,label,confidence\nTERM,0.0,5.0,seiz,1.0\n",
        );

        let result = pipeline
            .evaluate_files(&ref_file, &hyp_file, AlgorithmKind::Overlap)
            .unwrap();
        match result {
            AlgorithmResult::Overlap(overlap) => {
                assert_eq!(overlap.hits["seiz"], 1);
                assert_eq!(overlap.total_misses, 0);
            }
            other => panic!("unexpected result tag: {other:?}"),
        }
    }

    #[test]
    fn speedup_handles_zero_candidate_time() {
        let result = DualResult {
            reference_result: MetricMap::new(),
            candidate_result: AlgorithmResult::Taes(crate::algorithms::TaesResult {
                true_positives: 0.0,
                false_positives: 0.0,
                false_negatives: 0.0,
            }),
            parity_report: ParityValidator::default()
                .compare_taes(&MetricMap::new(), &crate::algorithms::TaesResult {
                    true_positives: 0.0,
                    false_positives: 0.0,
                    false_negatives: 0.0,
                }),
            parity_passed: true,
            reference_time: 1.0,
            candidate_time: 0.0,
        };
        assert_eq!(result.speedup(), 0.0);
    }
}
