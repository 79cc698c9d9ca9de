//! Fixed-window epoch scoring.
//!
//! The timeline is background-augmented, sampled at epoch midpoints,
//! and the two label streams are jointly compressed before the
//! per-label tallies. The confusion matrix is accumulated at sample
//! resolution, before compression.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{augment_events, label_at, midpoint_samples};
use crate::annotations::EventAnnotation;

/// Epoch scoring counts. Confusion entries are integers at sample
/// resolution; the per-label tallies come from the compressed streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochResult {
    /// Confusion matrix indexed ref label -> hyp label.
    pub confusion_matrix: BTreeMap<String, BTreeMap<String, u64>>,

    pub hits: BTreeMap<String, u64>,
    pub misses: BTreeMap<String, u64>,
    pub false_alarms: BTreeMap<String, u64>,
    /// Background -> label transitions in the compressed streams.
    pub insertions: BTreeMap<String, u64>,
    /// Label -> background transitions in the compressed streams.
    pub deletions: BTreeMap<String, u64>,

    /// Jointly compressed streams, sentinels included, for debugging.
    pub compressed_ref: Vec<String>,
    pub compressed_hyp: Vec<String>,
}

impl EpochResult {
    /// TP(label) = confusion[label][label].
    pub fn true_positives(&self, label: &str) -> u64 {
        self.confusion_matrix
            .get(label)
            .and_then(|row| row.get(label))
            .copied()
            .unwrap_or(0)
    }

    /// FP(label) = column sum over other rows.
    pub fn false_positives(&self, label: &str) -> u64 {
        self.confusion_matrix
            .iter()
            .filter(|(ref_label, _)| ref_label.as_str() != label)
            .filter_map(|(_, row)| row.get(label))
            .sum()
    }

    /// FN(label) = row sum over other columns.
    pub fn false_negatives(&self, label: &str) -> u64 {
        self.confusion_matrix
            .get(label)
            .map(|row| {
                row.iter()
                    .filter(|(hyp_label, _)| hyp_label.as_str() != label)
                    .map(|(_, count)| count)
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Midpoint-sampling epoch scorer.
#[derive(Debug, Clone)]
pub struct EpochScorer {
    epoch_duration: f64,
    null_class: String,
}

impl EpochScorer {
    pub fn new(epoch_duration: f64, null_class: impl Into<String>) -> Self {
        Self {
            epoch_duration,
            null_class: null_class.into(),
        }
    }

    /// Score a hypothesis track against a reference track.
    pub fn score(
        &self,
        ref_events: &[EventAnnotation],
        hyp_events: &[EventAnnotation],
        file_duration: f64,
    ) -> EpochResult {
        let null = self.null_class.as_str();

        // Both tracks must cover [0, duration] continuously
        let ref_events = augment_events(ref_events, file_duration, null);
        let hyp_events = augment_events(hyp_events, file_duration, null);

        let mut labels: BTreeSet<String> = BTreeSet::new();
        labels.insert(null.to_string());
        for event in ref_events.iter().chain(hyp_events.iter()) {
            labels.insert(event.label.clone());
        }

        let mut confusion: BTreeMap<String, BTreeMap<String, u64>> = labels
            .iter()
            .map(|r| (r.clone(), labels.iter().map(|c| (c.clone(), 0)).collect()))
            .collect();

        // Raw streams with a sentinel at each end
        let mut reft: Vec<String> = vec![null.to_string()];
        let mut hypt: Vec<String> = vec![null.to_string()];

        for t in midpoint_samples(self.epoch_duration, file_duration) {
            let ref_label = label_at(t, &ref_events, null);
            let hyp_label = label_at(t, &hyp_events, null);
            *confusion
                .entry(ref_label.clone())
                .or_default()
                .entry(hyp_label.clone())
                .or_default() += 1;
            reft.push(ref_label);
            hypt.push(hyp_label);
        }

        reft.push(null.to_string());
        hypt.push(null.to_string());

        let (compressed_ref, compressed_hyp) = compress_joint(&reft, &hypt);

        let mut hits: BTreeMap<String, u64> =
            labels.iter().map(|l| (l.clone(), 0)).collect();
        let mut misses: BTreeMap<String, u64> =
            labels.iter().map(|l| (l.clone(), 0)).collect();
        let mut false_alarms: BTreeMap<String, u64> =
            labels.iter().map(|l| (l.clone(), 0)).collect();
        let mut insertions: BTreeMap<String, u64> = BTreeMap::new();
        let mut deletions: BTreeMap<String, u64> = BTreeMap::new();

        // Skip the sentinel positions at both ends
        for i in 1..compressed_ref.len().saturating_sub(1) {
            let ref_label = compressed_ref[i].as_str();
            let hyp_label = compressed_hyp[i].as_str();

            if ref_label == null {
                *false_alarms.entry(hyp_label.to_string()).or_default() += 1;
                *insertions.entry(hyp_label.to_string()).or_default() += 1;
            } else if hyp_label == null {
                *misses.entry(ref_label.to_string()).or_default() += 1;
                *deletions.entry(ref_label.to_string()).or_default() += 1;
            } else if ref_label == hyp_label {
                *hits.entry(ref_label.to_string()).or_default() += 1;
            } else {
                *misses.entry(ref_label.to_string()).or_default() += 1;
                *false_alarms.entry(hyp_label.to_string()).or_default() += 1;
            }
        }

        EpochResult {
            confusion_matrix: confusion,
            hits,
            misses,
            false_alarms,
            insertions,
            deletions,
            compressed_ref,
            compressed_hyp,
        }
    }
}

/// Joint duplicate elimination: keep position i iff either stream
/// changed relative to i-1. This is NOT per-stream compression.
fn compress_joint(reft: &[String], hypt: &[String]) -> (Vec<String>, Vec<String>) {
    if reft.is_empty() || hypt.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut refo = vec![reft[0].clone()];
    let mut hypo = vec![hypt[0].clone()];
    for i in 1..reft.len() {
        if reft[i] != reft[i - 1] || hypt[i] != hypt[i - 1] {
            refo.push(reft[i].clone());
            hypo.push(hypt[i].clone());
        }
    }
    (refo, hypo)
}
