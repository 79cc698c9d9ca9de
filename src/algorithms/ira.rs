//! Inter-rater agreement.
//!
//! Builds a square confusion matrix at sample resolution (midpoint
//! sampling identical to the epoch scorer, including background
//! augmentation) and computes Cohen's kappa per label and across all
//! classes. Confusion counts are integers; kappas are floats in
//! [-1, 1].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{augment_events, label_at, midpoint_samples};
use crate::annotations::EventAnnotation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IraResult {
    /// Confusion matrix indexed ref label -> hyp label.
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, u64>>,
    pub per_label_kappa: BTreeMap<String, f64>,
    pub multi_class_kappa: f64,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IraScorer;

impl IraScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score two event tracks by sampling epoch midpoints.
    pub fn score(
        &self,
        ref_events: &[EventAnnotation],
        hyp_events: &[EventAnnotation],
        epoch_duration: f64,
        file_duration: f64,
        null_class: &str,
    ) -> IraResult {
        // Same augmentation as the epoch scorer so both samplers agree
        // on boundary midpoints
        let ref_events = augment_events(ref_events, file_duration, null_class);
        let hyp_events = augment_events(hyp_events, file_duration, null_class);

        let mut ref_labels = Vec::new();
        let mut hyp_labels = Vec::new();
        for t in midpoint_samples(epoch_duration, file_duration) {
            ref_labels.push(label_at(t, &ref_events, null_class));
            hyp_labels.push(label_at(t, &hyp_events, null_class));
        }

        self.score_labels(&ref_labels, &hyp_labels, null_class)
    }

    /// Score two equal-length label sequences directly.
    pub fn score_labels(
        &self,
        ref_labels: &[String],
        hyp_labels: &[String],
        null_class: &str,
    ) -> IraResult {
        let mut labels: BTreeSet<String> = BTreeSet::new();
        labels.insert(null_class.to_string());
        labels.extend(ref_labels.iter().cloned());
        labels.extend(hyp_labels.iter().cloned());

        let mut confusion: BTreeMap<String, BTreeMap<String, u64>> = labels
            .iter()
            .map(|r| (r.clone(), labels.iter().map(|c| (c.clone(), 0)).collect()))
            .collect();

        for (ref_label, hyp_label) in ref_labels.iter().zip(hyp_labels.iter()) {
            *confusion
                .entry(ref_label.clone())
                .or_default()
                .entry(hyp_label.clone())
                .or_default() += 1;
        }

        let label_list: Vec<String> = labels.into_iter().collect();
        let per_label_kappa: BTreeMap<String, f64> = label_list
            .iter()
            .map(|label| (label.clone(), label_kappa(&confusion, label, &label_list)))
            .collect();
        let multi_class_kappa = multi_class_kappa(&confusion, &label_list);

        IraResult {
            confusion_matrix: confusion,
            per_label_kappa,
            multi_class_kappa,
            labels: label_list,
        }
    }
}

fn cell(confusion: &BTreeMap<String, BTreeMap<String, u64>>, row: &str, col: &str) -> u64 {
    confusion
        .get(row)
        .and_then(|r| r.get(col))
        .copied()
        .unwrap_or(0)
}

/// Per-label kappa: collapse the NxN matrix to a 2x2 contingency for
/// the label vs everything else.
fn label_kappa(
    confusion: &BTreeMap<String, BTreeMap<String, u64>>,
    label: &str,
    labels: &[String],
) -> f64 {
    let a = cell(confusion, label, label) as f64;
    let b: f64 = labels
        .iter()
        .filter(|l| l.as_str() != label)
        .map(|l| cell(confusion, label, l) as f64)
        .sum();
    let c: f64 = labels
        .iter()
        .filter(|l| l.as_str() != label)
        .map(|l| cell(confusion, l, label) as f64)
        .sum();
    let d: f64 = labels
        .iter()
        .filter(|row| row.as_str() != label)
        .flat_map(|row| {
            labels
                .iter()
                .filter(|col| col.as_str() != label)
                .map(move |col| cell(confusion, row, col) as f64)
        })
        .sum();

    let n = a + b + c + d;
    if n == 0.0 {
        return 0.0;
    }

    let p_o = (a + d) / n;
    let p_yes = ((a + b) / n) * ((a + c) / n);
    let p_no = ((c + d) / n) * ((b + d) / n);
    let p_e = p_yes + p_no;

    if (1.0 - p_e) == 0.0 {
        // Degenerate marginals: perfect agreement with chance
        return if p_o == p_e { 1.0 } else { 0.0 };
    }

    (p_o - p_e) / (1.0 - p_e)
}

/// Multi-class kappa over the full matrix.
fn multi_class_kappa(
    confusion: &BTreeMap<String, BTreeMap<String, u64>>,
    labels: &[String],
) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }

    let row_sums: BTreeMap<&str, u64> = labels
        .iter()
        .map(|row| {
            (
                row.as_str(),
                labels.iter().map(|col| cell(confusion, row, col)).sum(),
            )
        })
        .collect();
    let col_sums: BTreeMap<&str, u64> = labels
        .iter()
        .map(|col| {
            (
                col.as_str(),
                labels.iter().map(|row| cell(confusion, row, col)).sum(),
            )
        })
        .collect();

    let diag: u64 = labels.iter().map(|l| cell(confusion, l, l)).sum();
    let total: u64 = row_sums.values().sum();
    if total == 0 {
        return 0.0;
    }

    let chance: f64 = labels
        .iter()
        .map(|l| row_sums[l.as_str()] as f64 * col_sums[l.as_str()] as f64)
        .sum();

    let n = total as f64;
    let numerator = n * diag as f64 - chance;
    let denominator = n * n - chance;

    if denominator == 0.0 {
        return if numerator == 0.0 { 1.0 } else { 0.0 };
    }

    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    const NULL: &str = "bckg";

    fn ev(start: f64, stop: f64, label: &str) -> EventAnnotation {
        EventAnnotation::new(start, stop, label)
    }

    fn seq(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn perfect_agreement_has_kappa_one() {
        let events = vec![ev(0.0, 5.0, "seiz"), ev(5.0, 10.0, "bckg")];
        let result = IraScorer::new().score(&events, &events, 1.0, 10.0, NULL);

        assert!((result.multi_class_kappa - 1.0).abs() < 1e-12);
        assert!((result.per_label_kappa["seiz"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn complete_disagreement_has_non_positive_kappa() {
        let reference = seq(&["seiz", "seiz", "seiz", "seiz"]);
        let hypothesis = seq(&["bckg", "bckg", "bckg", "bckg"]);
        let result = IraScorer::new().score_labels(&reference, &hypothesis, NULL);

        assert!(result.multi_class_kappa <= 0.0);
        assert_eq!(result.confusion_matrix["seiz"]["bckg"], 4);
    }

    #[test]
    fn empty_input_has_zero_kappa() {
        let result = IraScorer::new().score_labels(&[], &[], NULL);
        assert_eq!(result.multi_class_kappa, 0.0);
        assert_eq!(result.per_label_kappa[NULL], 0.0);
    }

    #[test]
    fn kappa_is_chance_corrected() {
        // 50% observed agreement on a balanced two-class problem with
        // independent raters: kappa should be near 0, not 0.5
        let reference = seq(&["seiz", "seiz", "bckg", "bckg"]);
        let hypothesis = seq(&["seiz", "bckg", "seiz", "bckg"]);
        let result = IraScorer::new().score_labels(&reference, &hypothesis, NULL);

        assert!(result.multi_class_kappa.abs() < 1e-12);
    }

    #[test]
    fn confusion_counts_are_sample_resolution() {
        let reference = vec![ev(0.0, 6.0, "seiz")];
        let hypothesis = vec![ev(0.0, 3.0, "seiz")];
        let result = IraScorer::new().score(&reference, &hypothesis, 1.0, 6.0, NULL);

        // Midpoints 0.5..5.5; hyp covers the first three
        assert_eq!(result.confusion_matrix["seiz"]["seiz"], 3);
        assert_eq!(result.confusion_matrix["seiz"]["bckg"], 3);
    }

    #[test]
    fn label_universe_includes_null_class() {
        let result = IraScorer::new().score_labels(&seq(&["seiz"]), &seq(&["seiz"]), NULL);
        assert!(result.labels.contains(&"bckg".to_string()));
        assert!(result.labels.contains(&"seiz".to_string()));
    }

    #[test]
    fn degenerate_marginals_return_one_when_observed_matches_chance() {
        // Single class only: 1 - p_e == 0 and p_o == p_e
        let result = IraScorer::new().score_labels(&seq(&["bckg"]), &seq(&["bckg"]), NULL);
        assert_eq!(result.per_label_kappa["bckg"], 1.0);
    }
}
