//! Any-overlap scoring.
//!
//! Binary hit detection: a reference event is a hit iff any hypothesis
//! event with the same label strictly overlaps it. Tangency at an
//! endpoint is not overlap. No confusion matrix is produced; this
//! method has no notion of cross-label confusion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotations::EventAnnotation;

/// Overlap counts. Insertions alias false alarms and deletions alias
/// misses; they are kept as separate maps to match the reporting shape
/// of the other scorers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapResult {
    pub hits: BTreeMap<String, u64>,
    pub misses: BTreeMap<String, u64>,
    pub false_alarms: BTreeMap<String, u64>,

    /// = false_alarms
    pub insertions: BTreeMap<String, u64>,
    /// = misses
    pub deletions: BTreeMap<String, u64>,

    pub total_hits: u64,
    pub total_misses: u64,
    pub total_false_alarms: u64,
}

/// Strict temporal overlap: shared interior, not just a shared endpoint.
fn overlaps(a: &EventAnnotation, b: &EventAnnotation) -> bool {
    b.stop_time > a.start_time && b.start_time < a.stop_time
}

/// Any-overlap scorer. Each reference event contributes exactly one
/// hit or one miss; each hypothesis event at most one false alarm.
#[derive(Debug, Clone, Default)]
pub struct OverlapScorer;

impl OverlapScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        ref_events: &[EventAnnotation],
        hyp_events: &[EventAnnotation],
    ) -> OverlapResult {
        let mut hits: BTreeMap<String, u64> = BTreeMap::new();
        let mut misses: BTreeMap<String, u64> = BTreeMap::new();
        let mut false_alarms: BTreeMap<String, u64> = BTreeMap::new();

        for ref_event in ref_events {
            let hit = hyp_events
                .iter()
                .any(|hyp| hyp.label == ref_event.label && overlaps(ref_event, hyp));

            // Both counters exist for every ref label, hit or not
            if hit {
                *hits.entry(ref_event.label.clone()).or_default() += 1;
                misses.entry(ref_event.label.clone()).or_default();
            } else {
                hits.entry(ref_event.label.clone()).or_default();
                *misses.entry(ref_event.label.clone()).or_default() += 1;
            }
        }

        for hyp_event in hyp_events {
            let matched = ref_events
                .iter()
                .any(|re| re.label == hyp_event.label && overlaps(hyp_event, re));

            if !matched {
                *false_alarms.entry(hyp_event.label.clone()).or_default() += 1;
            }
        }

        OverlapResult {
            total_hits: hits.values().sum(),
            total_misses: misses.values().sum(),
            total_false_alarms: false_alarms.values().sum(),
            insertions: false_alarms.clone(),
            deletions: misses.clone(),
            hits,
            misses,
            false_alarms,
        }
    }
}
