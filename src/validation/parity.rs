//! Metric-by-metric parity comparison.
//!
//! The reference pipeline is an opaque oracle producing a flat metric
//! map; the candidate produces typed results. The validator flattens
//! the candidate to the same key space, compares every key the oracle
//! reports, and flags absolute differences above tolerance. Relative
//! differences are informational only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithms::{
    AlgorithmResult, DpAlignmentResult, EpochResult, IraResult, OverlapResult, TaesResult,
    POSITIVE_CLASS,
};

/// Flat metric map, the shape the reference oracle reports in.
/// Per-label values use dotted keys (`per_label_kappa.seiz`).
pub type MetricMap = BTreeMap<String, f64>;

/// Default absolute tolerance for metric comparison.
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// A single metric that differed beyond tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub metric: String,
    pub reference_value: f64,
    pub candidate_value: f64,
    pub absolute_difference: f64,
    pub relative_difference: f64,
    pub tolerance: f64,
}

impl DiscrepancyReport {
    pub fn within_tolerance(&self) -> bool {
        self.absolute_difference <= self.tolerance
    }
}

/// Complete comparison outcome for one algorithm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub algorithm: String,
    pub passed: bool,
    pub discrepancies: Vec<DiscrepancyReport>,
    pub reference_metrics: MetricMap,
    pub candidate_metrics: MetricMap,
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed {
            return write!(f, "{} parity PASSED", self.algorithm);
        }
        writeln!(f, "{} parity FAILED", self.algorithm)?;
        writeln!(f, "found {} discrepancies:", self.discrepancies.len())?;
        for disc in &self.discrepancies {
            writeln!(
                f,
                "  - {}: reference={:.6}, candidate={:.6}, diff={:.2e}",
                disc.metric, disc.reference_value, disc.candidate_value, disc.absolute_difference
            )?;
        }
        Ok(())
    }
}

/// Validator with a configurable absolute tolerance.
#[derive(Debug, Clone)]
pub struct ParityValidator {
    tolerance: f64,
}

impl Default for ParityValidator {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl ParityValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Dispatch on the candidate result tag.
    pub fn compare(&self, reference: &MetricMap, candidate: &AlgorithmResult) -> ValidationReport {
        match candidate {
            AlgorithmResult::Taes(result) => self.compare_taes(reference, result),
            AlgorithmResult::Dp(result) => self.compare_dp(reference, result),
            AlgorithmResult::Epoch(result) => self.compare_epoch(reference, result),
            AlgorithmResult::Overlap(result) => self.compare_overlap(reference, result),
            AlgorithmResult::Ira(result) => self.compare_ira(reference, result),
        }
    }

    /// TAES: round counts to the legacy aggregation precision (two
    /// decimals), recompute the derived rates centrally from the
    /// rounded counts on BOTH sides, then compare counts and derived
    /// metrics separately.
    pub fn compare_taes(&self, reference: &MetricMap, candidate: &TaesResult) -> ValidationReport {
        let ref_tp = round2(reference.get("true_positives").copied().unwrap_or(0.0));
        let ref_fp = round2(reference.get("false_positives").copied().unwrap_or(0.0));
        let ref_fn = round2(reference.get("false_negatives").copied().unwrap_or(0.0));

        let cand_tp = round2(candidate.true_positives);
        let cand_fp = round2(candidate.false_positives);
        let cand_fn = round2(candidate.false_negatives);

        let (ref_sen, ref_pre, ref_f1) = rates_from_counts(ref_tp, ref_fp, ref_fn);
        let (cand_sen, cand_pre, cand_f1) = rates_from_counts(cand_tp, cand_fp, cand_fn);

        let reference_metrics: MetricMap = [
            ("true_positives", ref_tp),
            ("false_positives", ref_fp),
            ("false_negatives", ref_fn),
            ("sensitivity", ref_sen),
            ("precision", ref_pre),
            ("f1_score", ref_f1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let candidate_metrics: MetricMap = [
            ("true_positives", cand_tp),
            ("false_positives", cand_fp),
            ("false_negatives", cand_fn),
            ("sensitivity", cand_sen),
            ("precision", cand_pre),
            ("f1_score", cand_f1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        self.build_report("taes", reference_metrics, candidate_metrics)
    }

    /// DP: totals only. The summed-across-labels counts are used, not
    /// the positive-class values, because the oracle reports totals.
    pub fn compare_dp(
        &self,
        reference: &MetricMap,
        candidate: &DpAlignmentResult,
    ) -> ValidationReport {
        let candidate_metrics: MetricMap = [
            ("hits", candidate.hits as f64),
            ("insertions", candidate.total_insertions as f64),
            ("deletions", candidate.total_deletions as f64),
            ("substitutions", candidate.total_substitutions as f64),
            ("true_positives", candidate.sum_true_positives() as f64),
            ("false_positives", candidate.sum_false_positives() as f64),
            ("false_negatives", candidate.sum_false_negatives() as f64),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        self.compare_intersection("dp", reference, candidate_metrics)
    }

    /// Epoch: positive-class counts from the confusion matrix plus the
    /// rates derived from them.
    pub fn compare_epoch(
        &self,
        reference: &MetricMap,
        candidate: &EpochResult,
    ) -> ValidationReport {
        let tp = candidate.true_positives(POSITIVE_CLASS) as f64;
        let fp = candidate.false_positives(POSITIVE_CLASS) as f64;
        let fneg = candidate.false_negatives(POSITIVE_CLASS) as f64;
        let (sensitivity, precision, f1) = rates_from_counts(tp, fp, fneg);

        let mut candidate_metrics: MetricMap = [
            ("true_positives", tp),
            ("false_positives", fp),
            ("false_negatives", fneg),
            ("sensitivity", sensitivity),
            ("precision", precision),
            ("f1_score", f1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        for (label, count) in &candidate.hits {
            candidate_metrics.insert(format!("hits.{label}"), *count as f64);
        }
        for (label, count) in &candidate.misses {
            candidate_metrics.insert(format!("misses.{label}"), *count as f64);
        }
        for (label, count) in &candidate.false_alarms {
            candidate_metrics.insert(format!("false_alarms.{label}"), *count as f64);
        }

        self.compare_intersection("epoch", reference, candidate_metrics)
    }

    /// Overlap: the oracle's TP/FP/FN are the positive-class hits,
    /// false alarms, and misses.
    pub fn compare_overlap(
        &self,
        reference: &MetricMap,
        candidate: &OverlapResult,
    ) -> ValidationReport {
        let tp = candidate.hits.get(POSITIVE_CLASS).copied().unwrap_or(0) as f64;
        let fp = candidate
            .false_alarms
            .get(POSITIVE_CLASS)
            .copied()
            .unwrap_or(0) as f64;
        let fneg = candidate.misses.get(POSITIVE_CLASS).copied().unwrap_or(0) as f64;
        let (sensitivity, precision, f1) = rates_from_counts(tp, fp, fneg);

        let mut candidate_metrics: MetricMap = [
            ("true_positives", tp),
            ("false_positives", fp),
            ("false_negatives", fneg),
            ("total_hits", candidate.total_hits as f64),
            ("total_misses", candidate.total_misses as f64),
            ("total_false_alarms", candidate.total_false_alarms as f64),
            ("sensitivity", sensitivity),
            ("precision", precision),
            ("f1_score", f1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        for (label, count) in &candidate.hits {
            candidate_metrics.insert(format!("hits.{label}"), *count as f64);
        }
        for (label, count) in &candidate.misses {
            candidate_metrics.insert(format!("misses.{label}"), *count as f64);
        }
        for (label, count) in &candidate.false_alarms {
            candidate_metrics.insert(format!("false_alarms.{label}"), *count as f64);
        }

        self.compare_intersection("overlap", reference, candidate_metrics)
    }

    /// IRA: multi-class kappa plus per-label kappas under dotted keys.
    pub fn compare_ira(&self, reference: &MetricMap, candidate: &IraResult) -> ValidationReport {
        let mut candidate_metrics: MetricMap = MetricMap::new();
        candidate_metrics.insert("kappa".to_string(), candidate.multi_class_kappa);
        candidate_metrics.insert(
            "multi_class_kappa".to_string(),
            candidate.multi_class_kappa,
        );
        for (label, kappa) in &candidate.per_label_kappa {
            candidate_metrics.insert(format!("per_label_kappa.{label}"), *kappa);
        }

        self.compare_intersection("ira", reference, candidate_metrics)
    }

    /// Compare every key the oracle reports that the candidate also
    /// produces. Oracle keys the candidate cannot compute (e.g. TN for
    /// methods that do not define it) are skipped.
    fn compare_intersection(
        &self,
        algorithm: &str,
        reference: &MetricMap,
        candidate_metrics: MetricMap,
    ) -> ValidationReport {
        self.build_report(algorithm, reference.clone(), candidate_metrics)
    }

    fn build_report(
        &self,
        algorithm: &str,
        reference_metrics: MetricMap,
        candidate_metrics: MetricMap,
    ) -> ValidationReport {
        let mut discrepancies = Vec::new();
        for (key, reference_value) in &reference_metrics {
            if let Some(candidate_value) = candidate_metrics.get(key) {
                if let Some(disc) =
                    self.discrepancy_for(key, *reference_value, *candidate_value)
                {
                    discrepancies.push(disc);
                }
            }
        }

        ValidationReport {
            algorithm: algorithm.to_string(),
            passed: discrepancies.is_empty(),
            discrepancies,
            reference_metrics,
            candidate_metrics,
        }
    }

    fn discrepancy_for(
        &self,
        metric: &str,
        reference_value: f64,
        candidate_value: f64,
    ) -> Option<DiscrepancyReport> {
        let absolute_difference = (reference_value - candidate_value).abs();
        if absolute_difference <= self.tolerance {
            return None;
        }
        Some(DiscrepancyReport {
            metric: metric.to_string(),
            reference_value,
            candidate_value,
            absolute_difference,
            relative_difference: absolute_difference / reference_value.abs().max(1e-16),
            tolerance: self.tolerance,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn rates_from_counts(tp: f64, fp: f64, fneg: f64) -> (f64, f64, f64) {
    let sensitivity = if tp + fneg > 0.0 { tp / (tp + fneg) } else { 0.0 };
    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let f1 = if precision + sensitivity == 0.0 {
        0.0
    } else {
        2.0 * precision * sensitivity / (precision + sensitivity)
    };
    (sensitivity, precision, f1)
}
