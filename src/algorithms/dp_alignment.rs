//! DP sequence alignment over label sequences.
//!
//! Classical O(mn) dynamic programming with insertion, deletion, and
//! substitution penalties. Both sequences are padded with a single
//! `NULL_CLASS` sentinel at each end before scoring; aligned outputs
//! include the sentinels and the error counting skips them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{NULL_CLASS, POSITIVE_CLASS};

/// Back-pointer codes. Tie-breaking is encoded in the fill order:
/// SUB-or-MATCH is taken first, replaced only by a strictly smaller
/// INS, then a strictly smaller DEL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditOp {
    Del,
    Ins,
    SubOrMatch,
}

/// Alignment counts. All counts are integers; fractional scoring is
/// TAES territory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpAlignmentResult {
    /// Total matched positions across all labels.
    pub hits: u64,
    /// Matched positions per label.
    pub hits_per_label: BTreeMap<String, u64>,
    /// Substitution matrix indexed ref label -> hyp label.
    pub substitutions: BTreeMap<String, BTreeMap<String, u64>>,
    /// Insertions indexed by the inserted hypothesis label.
    pub insertions: BTreeMap<String, u64>,
    /// Deletions indexed by the deleted reference label.
    pub deletions: BTreeMap<String, u64>,

    pub total_insertions: u64,
    pub total_deletions: u64,
    pub total_substitutions: u64,

    /// Positive-class counts (label = "seiz").
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,

    /// Aligned sequences, sentinels included, for debugging.
    pub aligned_ref: Vec<String>,
    pub aligned_hyp: Vec<String>,
}

impl DpAlignmentResult {
    /// TP summed across all labels: every matched position.
    pub fn sum_true_positives(&self) -> u64 {
        self.hits
    }

    /// FP summed across all labels: every inserted position.
    pub fn sum_false_positives(&self) -> u64 {
        self.total_insertions
    }

    /// FN summed across all labels: deletions plus substitutions.
    pub fn sum_false_negatives(&self) -> u64 {
        self.total_deletions + self.total_substitutions
    }
}

/// Needleman-Wunsch style aligner with unit default penalties.
#[derive(Debug, Clone)]
pub struct DpAligner {
    penalty_del: f64,
    penalty_ins: f64,
    penalty_sub: f64,
}

impl Default for DpAligner {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

impl DpAligner {
    pub fn new(penalty_del: f64, penalty_ins: f64, penalty_sub: f64) -> Self {
        Self {
            penalty_del,
            penalty_ins,
            penalty_sub,
        }
    }

    /// Align a reference sequence against a hypothesis sequence and
    /// count errors. Empty inputs are legal and score as pure
    /// insertions or deletions.
    pub fn align(&self, reference: &[String], hypothesis: &[String]) -> DpAlignmentResult {
        let (aligned_ref, aligned_hyp) = self.dp_align(reference, hypothesis);
        count_errors(aligned_ref, aligned_hyp)
    }

    /// Core DP with backtracking. Returns aligned sequences in
    /// chronological order with `NULL_CLASS` in the opposite stream at
    /// insertion/deletion positions.
    fn dp_align(&self, reference: &[String], hypothesis: &[String]) -> (Vec<String>, Vec<String>) {
        // Pad with one sentinel at each end
        let refi: Vec<&str> = std::iter::once(NULL_CLASS)
            .chain(reference.iter().map(|s| s.as_str()))
            .chain(std::iter::once(NULL_CLASS))
            .collect();
        let hypi: Vec<&str> = std::iter::once(NULL_CLASS)
            .chain(hypothesis.iter().map(|s| s.as_str()))
            .chain(std::iter::once(NULL_CLASS))
            .collect();

        let m = refi.len();
        let n = hypi.len();

        // Flat row-major cost + back-pointer matrices
        let mut cost = vec![0.0f64; m * n];
        let mut ops = vec![EditOp::SubOrMatch; m * n];
        let at = |i: usize, j: usize| i * n + j;

        for j in 1..n {
            cost[at(0, j)] = cost[at(0, j - 1)] + self.penalty_ins;
            ops[at(0, j)] = EditOp::Ins;
        }
        for i in 1..m {
            cost[at(i, 0)] = cost[at(i - 1, 0)] + self.penalty_del;
            ops[at(i, 0)] = EditOp::Del;
        }

        for j in 1..n {
            for i in 1..m {
                let d_del = cost[at(i - 1, j)] + self.penalty_del;
                let d_ins = cost[at(i, j - 1)] + self.penalty_ins;
                let mut d_sub = cost[at(i - 1, j - 1)];
                if refi[i] != hypi[j] {
                    d_sub += self.penalty_sub;
                }

                // Tie order: SUB-or-MATCH, then strictly smaller INS,
                // then strictly smaller DEL
                let mut min_dist = d_sub;
                let mut op = EditOp::SubOrMatch;
                if d_ins < min_dist {
                    min_dist = d_ins;
                    op = EditOp::Ins;
                }
                if d_del < min_dist {
                    min_dist = d_del;
                    op = EditOp::Del;
                }
                cost[at(i, j)] = min_dist;
                ops[at(i, j)] = op;
            }
        }

        // Backtrack from the far corner to (0, 0)
        let mut i = (m - 1) as isize;
        let mut j = (n - 1) as isize;
        let mut reft: Vec<String> = Vec::with_capacity(m + n);
        let mut hypt: Vec<String> = Vec::with_capacity(m + n);

        loop {
            match ops[at(i.max(0) as usize, j.max(0) as usize)] {
                EditOp::Del => {
                    reft.push(refi[i as usize].to_string());
                    hypt.push(NULL_CLASS.to_string());
                    i -= 1;
                }
                EditOp::Ins => {
                    reft.push(NULL_CLASS.to_string());
                    hypt.push(hypi[j as usize].to_string());
                    j -= 1;
                }
                EditOp::SubOrMatch => {
                    reft.push(refi[i as usize].to_string());
                    hypt.push(hypi[j as usize].to_string());
                    i -= 1;
                    j -= 1;
                }
            }

            if i < 0 && j < 0 {
                break;
            }
        }

        reft.reverse();
        hypt.reverse();
        (reft, hypt)
    }
}

/// Count alignment errors, skipping the sentinel positions at index 0
/// and the final index.
fn count_errors(aligned_ref: Vec<String>, aligned_hyp: Vec<String>) -> DpAlignmentResult {
    let mut hits = 0u64;
    let mut hits_per_label: BTreeMap<String, u64> = BTreeMap::new();
    let mut substitutions: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut insertions: BTreeMap<String, u64> = BTreeMap::new();
    let mut deletions: BTreeMap<String, u64> = BTreeMap::new();

    let len = aligned_ref.len();
    for idx in 1..len.saturating_sub(1) {
        let ref_label = aligned_ref[idx].as_str();
        let hyp_label = aligned_hyp[idx].as_str();

        if ref_label == NULL_CLASS && hyp_label != NULL_CLASS {
            *insertions.entry(hyp_label.to_string()).or_default() += 1;
        } else if hyp_label == NULL_CLASS && ref_label != NULL_CLASS {
            *deletions.entry(ref_label.to_string()).or_default() += 1;
        } else if ref_label != hyp_label {
            *substitutions
                .entry(ref_label.to_string())
                .or_default()
                .entry(hyp_label.to_string())
                .or_default() += 1;
        } else if ref_label != NULL_CLASS {
            hits += 1;
            *hits_per_label.entry(ref_label.to_string()).or_default() += 1;
        }
    }

    let total_insertions: u64 = insertions.values().sum();
    let total_deletions: u64 = deletions.values().sum();
    let total_substitutions: u64 = substitutions
        .values()
        .flat_map(|row| row.values())
        .sum();

    // Positive-class mapping: TP = hits for "seiz"; FP = insertions of
    // "seiz"; FN = deletions of "seiz" + substitutions FROM "seiz"
    let true_positives = hits_per_label.get(POSITIVE_CLASS).copied().unwrap_or(0);
    let false_positives = insertions.get(POSITIVE_CLASS).copied().unwrap_or(0);
    let pos_deletions = deletions.get(POSITIVE_CLASS).copied().unwrap_or(0);
    let pos_substitutions: u64 = substitutions
        .get(POSITIVE_CLASS)
        .map(|row| row.values().sum())
        .unwrap_or(0);
    let false_negatives = pos_deletions + pos_substitutions;

    DpAlignmentResult {
        hits,
        hits_per_label,
        substitutions,
        insertions,
        deletions,
        total_insertions,
        total_deletions,
        total_substitutions,
        true_positives,
        false_positives,
        false_negatives,
        aligned_ref,
        aligned_hyp,
    }
}
