//! Time-Aligned Event Scoring.
//!
//! Fractional per-event scoring over the target label. Each
//! overlapping ref/hyp pair contributes a fractional hit and false
//! alarm normalized to the reference duration; the multi-overlap
//! sequencing rules decide how spanning events consume their partners:
//!
//! - a hypothesis that extends past a reference is credited for that
//!   reference and charged one whole miss for every additional
//!   reference it covers;
//! - a reference that extends past a hypothesis can accumulate
//!   fractional credit from later hypotheses, reducing its miss.

use serde::{Deserialize, Serialize};

use super::POSITIVE_CLASS;
use crate::annotations::EventAnnotation;

/// Fractional TAES counts. TP/FP/FN are floats; derived rates come
/// from the methods below. Specificity and accuracy are not defined by
/// this method and report as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaesResult {
    pub true_positives: f64,
    pub false_positives: f64,
    pub false_negatives: f64,
}

impl TaesResult {
    /// TPR = TP / (TP + FN), 0 on a zero denominator.
    pub fn sensitivity(&self) -> f64 {
        let denom = self.true_positives + self.false_negatives;
        if denom > 0.0 {
            self.true_positives / denom
        } else {
            0.0
        }
    }

    /// PPV = TP / (TP + FP), 0 on a zero denominator.
    pub fn precision(&self) -> f64 {
        let denom = self.true_positives + self.false_positives;
        if denom > 0.0 {
            self.true_positives / denom
        } else {
            0.0
        }
    }

    /// Harmonic mean of precision and sensitivity.
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let sensitivity = self.sensitivity();
        if precision + sensitivity == 0.0 {
            0.0
        } else {
            2.0 * precision * sensitivity / (precision + sensitivity)
        }
    }

    pub fn specificity(&self) -> f64 {
        0.0
    }

    pub fn accuracy(&self) -> f64 {
        0.0
    }
}

fn overlaps(a: &EventAnnotation, b: &EventAnnotation) -> bool {
    a.start_time < b.stop_time && b.start_time < a.stop_time
}

/// TAES scorer for a single target label.
#[derive(Debug, Clone)]
pub struct TaesScorer {
    target_label: String,
}

impl Default for TaesScorer {
    fn default() -> Self {
        Self::new(POSITIVE_CLASS)
    }
}

impl TaesScorer {
    pub fn new(target_label: impl Into<String>) -> Self {
        Self {
            target_label: target_label.into(),
        }
    }

    pub fn score(
        &self,
        reference: &[EventAnnotation],
        hypothesis: &[EventAnnotation],
    ) -> TaesResult {
        let refs: Vec<&EventAnnotation> = reference
            .iter()
            .filter(|e| e.label == self.target_label)
            .collect();
        let hyps: Vec<&EventAnnotation> = hypothesis
            .iter()
            .filter(|e| e.label == self.target_label)
            .collect();

        if refs.is_empty() && hyps.is_empty() {
            return TaesResult {
                true_positives: 0.0,
                false_positives: 0.0,
                false_negatives: 0.0,
            };
        }

        let mut ref_active = vec![true; refs.len()];
        let mut hyp_active = vec![true; hyps.len()];

        let mut hit = 0.0f64;
        let mut miss = 0.0f64;
        let mut fa = 0.0f64;

        for r_idx in 0..refs.len() {
            if !ref_active[r_idx] {
                continue;
            }

            // The hypothesis loop is deliberately not re-gated on the
            // reference flag: a reference already consumed by one
            // spanning hypothesis still sequences later overlapping
            // hypotheses exactly as the legacy scorer does.
            for h_idx in 0..hyps.len() {
                if !hyp_active[h_idx] {
                    continue;
                }
                if !overlaps(refs[r_idx], hyps[h_idx]) {
                    continue;
                }

                if hyps[h_idx].stop_time >= refs[r_idx].stop_time {
                    // Hypothesis extends past (or to) the reference end:
                    // it may span further references
                    let (pair_hit, pair_fa) = calc_hf(refs[r_idx], hyps[h_idx]);
                    hit += pair_hit;
                    fa += pair_fa;
                    miss += 1.0 - pair_hit;
                    ref_active[r_idx] = false;
                    hyp_active[h_idx] = false;

                    // One whole miss per additional spanned reference
                    for k in (r_idx + 1)..refs.len() {
                        if ref_active[k] && overlaps(refs[k], hyps[h_idx]) {
                            miss += 1.0;
                            ref_active[k] = false;
                        }
                    }
                } else {
                    // Reference extends past the hypothesis: later
                    // hypotheses add credit and reduce the miss
                    let (pair_hit, pair_fa) = calc_hf(refs[r_idx], hyps[h_idx]);
                    hit += pair_hit;
                    fa += pair_fa;
                    miss += 1.0 - pair_hit;
                    ref_active[r_idx] = false;
                    hyp_active[h_idx] = false;

                    for l in (h_idx + 1)..hyps.len() {
                        if hyp_active[l] && overlaps(refs[r_idx], hyps[l]) {
                            let (ovlp_hit, ovlp_fa) = calc_hf(refs[r_idx], hyps[l]);
                            hit += ovlp_hit;
                            miss -= ovlp_hit;
                            fa += ovlp_fa;
                            hyp_active[l] = false;
                        }
                    }
                }
            }
        }

        // Leftovers: unmatched references are whole misses, unmatched
        // hypotheses whole false alarms
        miss += ref_active.iter().filter(|&&active| active).count() as f64;
        fa += hyp_active.iter().filter(|&&active| active).count() as f64;

        TaesResult {
            true_positives: hit,
            false_positives: fa,
            false_negatives: miss,
        }
    }
}

/// Fractional hit/false-alarm for one overlapping pair, normalized to
/// the reference duration. The false-alarm fraction is capped at 1 per
/// pair. Non-positive reference duration scores (0, 0).
fn calc_hf(reference: &EventAnnotation, hypothesis: &EventAnnotation) -> (f64, f64) {
    let start_r = reference.start_time;
    let stop_r = reference.stop_time;
    let start_h = hypothesis.start_time;
    let stop_h = hypothesis.stop_time;

    let ref_dur = stop_r - start_r;
    if ref_dur <= 0.0 {
        return (0.0, 0.0);
    }

    if start_h <= start_r && stop_h <= stop_r {
        // Pre-prediction: hypothesis starts early, ends inside
        let hit = (stop_h - start_r) / ref_dur;
        let fa = ((start_r - start_h) / ref_dur).min(1.0);
        (hit, fa)
    } else if start_h >= start_r && stop_h >= stop_r {
        // Post-prediction: hypothesis starts inside, runs long
        let hit = (stop_r - start_h) / ref_dur;
        let fa = ((stop_h - stop_r) / ref_dur).min(1.0);
        (hit, fa)
    } else if start_h < start_r && stop_h > stop_r {
        // Over-prediction: hypothesis covers the whole reference
        let fa = (((stop_h - stop_r) + (start_r - start_h)) / ref_dur).min(1.0);
        (1.0, fa)
    } else {
        // Under-prediction: hypothesis fully inside
        ((stop_h - start_h) / ref_dur, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(start: f64, stop: f64) -> EventAnnotation {
        EventAnnotation::new(start, stop, "seiz")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn both_empty_is_all_zero() {
        let result = TaesScorer::default().score(&[], &[]);
        assert_eq!(result.true_positives, 0.0);
        assert_eq!(result.false_positives, 0.0);
        assert_eq!(result.false_negatives, 0.0);
        assert_eq!(result.sensitivity(), 0.0);
        assert_eq!(result.f1_score(), 0.0);
    }

    #[test]
    fn exact_match_is_full_credit() {
        let events = vec![ev(0.0, 10.0), ev(20.0, 30.0)];
        let result = TaesScorer::default().score(&events, &events);

        assert!(close(result.true_positives, 2.0));
        assert!(close(result.false_positives, 0.0));
        assert!(close(result.false_negatives, 0.0));
        assert!(close(result.sensitivity(), 1.0));
    }

    #[test]
    fn one_hypothesis_spanning_two_references() {
        // Hyp [5, 25] overlaps ref [0, 10] and ref [20, 30]. First
        // pair: post-prediction, hit = (10-5)/10 = 0.5, fa capped at
        // 1.0 ((25-10)/10 = 1.5). Second ref is a whole extra miss.
        let reference = vec![ev(0.0, 10.0), ev(20.0, 30.0)];
        let hypothesis = vec![ev(5.0, 25.0)];
        let result = TaesScorer::default().score(&reference, &hypothesis);

        assert!(close(result.true_positives, 0.5));
        assert!(close(result.false_positives, 1.0));
        assert!(close(result.false_negatives, 1.5));
    }

    #[test]
    fn spanning_hypothesis_charges_one_miss_per_extra_reference() {
        // One hyp strictly spanning three refs: beyond the first
        // pair's fractional miss, exactly 2 whole misses
        let reference = vec![ev(10.0, 20.0), ev(30.0, 40.0), ev(50.0, 60.0)];
        let hypothesis = vec![ev(5.0, 65.0)];
        let result = TaesScorer::default().score(&reference, &hypothesis);

        // Over-prediction on the first ref: hit 1.0, fractional miss 0
        assert!(close(result.true_positives, 1.0));
        assert!(close(result.false_negatives, 2.0));
    }

    #[test]
    fn multiple_hypotheses_reduce_the_miss() {
        // Ref [0, 10] hit by hyp [0, 4] then hyp [6, 9]: credit
        // accumulates and the miss shrinks
        let reference = vec![ev(0.0, 10.0)];
        let hypothesis = vec![ev(0.0, 4.0), ev(6.0, 9.0)];
        let result = TaesScorer::default().score(&reference, &hypothesis);

        // First pair: pre-prediction hit 0.4, miss 0.6; second adds
        // under-prediction hit 0.3
        assert!(close(result.true_positives, 0.7));
        assert!(close(result.false_negatives, 0.3));
        assert!(close(result.false_positives, 0.0));
    }

    #[test]
    fn empty_reference_counts_whole_false_alarms() {
        let hypothesis = vec![ev(0.0, 5.0), ev(10.0, 15.0)];
        let result = TaesScorer::default().score(&[], &hypothesis);

        assert!(close(result.false_positives, 2.0));
        assert!(close(result.false_negatives, 0.0));
        assert!(close(result.true_positives, 0.0));
    }

    #[test]
    fn non_target_labels_are_ignored() {
        let reference = vec![EventAnnotation::new(0.0, 10.0, "bckg"), ev(20.0, 30.0)];
        let hypothesis = vec![EventAnnotation::new(0.0, 10.0, "bckg"), ev(20.0, 30.0)];
        let result = TaesScorer::default().score(&reference, &hypothesis);

        assert!(close(result.true_positives, 1.0));
        assert!(close(result.false_positives, 0.0));
    }

    #[test]
    fn calc_hf_cases() {
        let reference = ev(10.0, 20.0);

        // Pre-prediction
        let (hit, fa) = calc_hf(&reference, &ev(5.0, 15.0));
        assert!(close(hit, 0.5));
        assert!(close(fa, 0.5));

        // Post-prediction
        let (hit, fa) = calc_hf(&reference, &ev(15.0, 25.0));
        assert!(close(hit, 0.5));
        assert!(close(fa, 0.5));

        // Over-prediction: fa sums both overhangs, capped at 1
        let (hit, fa) = calc_hf(&reference, &ev(0.0, 40.0));
        assert!(close(hit, 1.0));
        assert!(close(fa, 1.0));

        // Under-prediction: no false alarm
        let (hit, fa) = calc_hf(&reference, &ev(12.0, 18.0));
        assert!(close(hit, 0.6));
        assert!(close(fa, 0.0));
    }

    #[test]
    fn degenerate_reference_duration_scores_zero() {
        let reference = EventAnnotation {
            channel: "TERM".to_string(),
            start_time: 5.0,
            stop_time: 5.0,
            label: "seiz".to_string(),
            confidence: 1.0,
        };
        assert_eq!(calc_hf(&reference, &ev(0.0, 10.0)), (0.0, 0.0));
    }
}
