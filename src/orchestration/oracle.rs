//! The reference oracle seam.
//!
//! The legacy pipeline is opaque: it evaluates a file pair for one
//! algorithm and reports a flat metric map. Two implementations:
//! a subprocess wrapper around the real installation, and an
//! in-process mirror used for development and tests.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::algorithms::{AlgorithmKind, AlgorithmResult, POSITIVE_CLASS};
use crate::params::ScoringParams;
use crate::validation::MetricMap;

/// One side of the dual pipeline: evaluate a file pair with a single
/// algorithm and report a flat metric map.
#[async_trait]
pub trait ReferenceScorer: Send + Sync {
    async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<MetricMap>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Runs the legacy scorer as an external command:
///
/// ```text
/// <cmd> <ref_file> <hyp_file> <algorithm>
/// ```
///
/// stdout must be a JSON object; numeric fields become metrics and
/// nested objects are flattened with dotted keys. Everything else is
/// ignored, so the oracle's report shape can evolve without breaking
/// the validator.
pub struct SubprocessOracle {
    command: String,
}

impl SubprocessOracle {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ReferenceScorer for SubprocessOracle {
    async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<MetricMap> {
        let output = tokio::process::Command::new(&self.command)
            .arg(ref_path)
            .arg(hyp_path)
            .arg(algorithm.as_str())
            .output()
            .await
            .with_context(|| format!("spawning reference oracle {}", self.command))?;

        if !output.status.success() {
            bail!(
                "reference oracle exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .context("parsing reference oracle output as JSON")?;
        let mut metrics = MetricMap::new();
        flatten_into(&mut metrics, "", &value);
        debug!(
            oracle = self.name(),
            algorithm = %algorithm,
            metric_count = metrics.len(),
            "reference oracle reported"
        );
        Ok(metrics)
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

/// Mirrors the candidate scorers and reports the totals the legacy
/// summaries carry. Lets the dual pipeline run without the legacy
/// installation; parity against it is trivially exact.
pub struct InProcessOracle {
    params: ScoringParams,
}

impl InProcessOracle {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl ReferenceScorer for InProcessOracle {
    async fn evaluate(
        &self,
        ref_path: &Path,
        hyp_path: &Path,
        algorithm: AlgorithmKind,
    ) -> Result<MetricMap> {
        let pipeline = super::dual::CandidatePipeline::new(self.params.clone());
        let ref_path = ref_path.to_path_buf();
        let hyp_path = hyp_path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            pipeline.evaluate(&ref_path, &hyp_path, algorithm)
        })
        .await
        .context("in-process oracle task panicked")??;
        Ok(oracle_metric_map(&result))
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

/// Flatten an algorithm result to the legacy summary shape: the totals
/// a text-report scraper would recover, with per-label values under
/// dotted keys.
pub fn oracle_metric_map(result: &AlgorithmResult) -> MetricMap {
    let mut metrics = MetricMap::new();
    match result {
        AlgorithmResult::Dp(dp) => {
            metrics.insert("hits".into(), dp.hits as f64);
            metrics.insert("insertions".into(), dp.total_insertions as f64);
            metrics.insert("deletions".into(), dp.total_deletions as f64);
            metrics.insert("substitutions".into(), dp.total_substitutions as f64);
            metrics.insert("true_positives".into(), dp.sum_true_positives() as f64);
            metrics.insert("false_positives".into(), dp.sum_false_positives() as f64);
            metrics.insert("false_negatives".into(), dp.sum_false_negatives() as f64);
        }
        AlgorithmResult::Epoch(epoch) => {
            metrics.insert(
                "true_positives".into(),
                epoch.true_positives(POSITIVE_CLASS) as f64,
            );
            metrics.insert(
                "false_positives".into(),
                epoch.false_positives(POSITIVE_CLASS) as f64,
            );
            metrics.insert(
                "false_negatives".into(),
                epoch.false_negatives(POSITIVE_CLASS) as f64,
            );
            for (label, count) in &epoch.hits {
                metrics.insert(format!("hits.{label}"), *count as f64);
            }
            for (label, count) in &epoch.misses {
                metrics.insert(format!("misses.{label}"), *count as f64);
            }
            for (label, count) in &epoch.false_alarms {
                metrics.insert(format!("false_alarms.{label}"), *count as f64);
            }
        }
        AlgorithmResult::Overlap(overlap) => {
            metrics.insert(
                "true_positives".into(),
                overlap.hits.get(POSITIVE_CLASS).copied().unwrap_or(0) as f64,
            );
            metrics.insert(
                "false_positives".into(),
                overlap
                    .false_alarms
                    .get(POSITIVE_CLASS)
                    .copied()
                    .unwrap_or(0) as f64,
            );
            metrics.insert(
                "false_negatives".into(),
                overlap.misses.get(POSITIVE_CLASS).copied().unwrap_or(0) as f64,
            );
            metrics.insert("total_hits".into(), overlap.total_hits as f64);
            metrics.insert("total_misses".into(), overlap.total_misses as f64);
            metrics.insert(
                "total_false_alarms".into(),
                overlap.total_false_alarms as f64,
            );
        }
        AlgorithmResult::Ira(ira) => {
            metrics.insert("kappa".into(), ira.multi_class_kappa);
            metrics.insert("multi_class_kappa".into(), ira.multi_class_kappa);
            for (label, kappa) in &ira.per_label_kappa {
                metrics.insert(format!("per_label_kappa.{label}"), *kappa);
            }
        }
        AlgorithmResult::Taes(taes) => {
            metrics.insert("true_positives".into(), taes.true_positives);
            metrics.insert("false_positives".into(), taes.false_positives);
            metrics.insert("false_negatives".into(), taes.false_negatives);
        }
    }
    metrics
}

/// Recursively flatten a JSON object into dotted numeric keys.
fn flatten_into(metrics: &mut BTreeMap<String, f64>, prefix: &str, value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(metrics, &path, child);
            }
        }
        serde_json::Value::Number(num) => {
            if let Some(v) = num.as_f64() {
                metrics.insert(prefix.to_string(), v);
            }
        }
        serde_json::Value::Bool(b) => {
            metrics.insert(prefix.to_string(), if *b { 1.0 } else { 0.0 });
        }
        // Strings, arrays, and nulls carry no comparable metrics
        _ => {}
    }
}
