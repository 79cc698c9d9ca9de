//! Scoring algorithms.
//!
//! Five stateless scorers quantify agreement between a reference and a
//! hypothesis annotation track:
//!
//! - `dp_alignment`: Needleman-Wunsch style label-sequence alignment
//! - `epoch`: midpoint sampling with joint duplicate compression
//! - `overlap`: any-overlap, same-label binary hit detection
//! - `taes`: fractional per-event scoring with multi-overlap sequencing
//! - `ira`: sample-resolution confusion matrix and Cohen's kappa
//!
//! The scorers never mutate their inputs and are safe to invoke
//! concurrently. Every integer count is a `u64`; TAES counts are `f64`.

pub mod dp_alignment;
pub mod epoch;
pub mod ira;
pub mod overlap;
pub mod taes;


use serde::{Deserialize, Serialize};

use crate::annotations::EventAnnotation;

pub use dp_alignment::{DpAligner, DpAlignmentResult};
pub use epoch::{EpochResult, EpochScorer};
pub use ira::{IraResult, IraScorer};
pub use overlap::{OverlapResult, OverlapScorer};
pub use taes::{TaesResult, TaesScorer};

/// Sentinel label used by the DP aligner for padding and gap positions.
/// Shared by all scorers that need a NULL token; the configurable
/// background class lives in `ScoringParams::null_class`.
pub const NULL_CLASS: &str = "null";

/// Positive class against which TP/FP/FN are reported by default.
pub const POSITIVE_CLASS: &str = "seiz";

/// Algorithm selector as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Dp,
    Epoch,
    Overlap,
    Ira,
    Taes,
    All,
}

impl AlgorithmKind {
    pub const CONCRETE: [AlgorithmKind; 5] = [
        AlgorithmKind::Dp,
        AlgorithmKind::Epoch,
        AlgorithmKind::Overlap,
        AlgorithmKind::Ira,
        AlgorithmKind::Taes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Dp => "dp",
            AlgorithmKind::Epoch => "epoch",
            AlgorithmKind::Overlap => "overlap",
            AlgorithmKind::Ira => "ira",
            AlgorithmKind::Taes => "taes",
            AlgorithmKind::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dp" => Some(AlgorithmKind::Dp),
            "epoch" => Some(AlgorithmKind::Epoch),
            "overlap" => Some(AlgorithmKind::Overlap),
            "ira" => Some(AlgorithmKind::Ira),
            "taes" => Some(AlgorithmKind::Taes),
            "all" => Some(AlgorithmKind::All),
            _ => None,
        }
    }

    /// Expand a selection into concrete algorithms (`all` -> the five).
    pub fn expand(selection: &[AlgorithmKind]) -> Vec<AlgorithmKind> {
        if selection.iter().any(|a| matches!(a, AlgorithmKind::All)) {
            Self::CONCRETE.to_vec()
        } else {
            let mut out = Vec::new();
            for a in selection {
                if !out.contains(a) {
                    out.push(*a);
                }
            }
            out
        }
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed result of one scorer run. Consumers dispatch on the tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum AlgorithmResult {
    Dp(DpAlignmentResult),
    Epoch(EpochResult),
    Overlap(OverlapResult),
    Ira(IraResult),
    Taes(TaesResult),
}

impl AlgorithmResult {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            AlgorithmResult::Dp(_) => AlgorithmKind::Dp,
            AlgorithmResult::Epoch(_) => AlgorithmKind::Epoch,
            AlgorithmResult::Overlap(_) => AlgorithmKind::Overlap,
            AlgorithmResult::Ira(_) => AlgorithmKind::Ira,
            AlgorithmResult::Taes(_) => AlgorithmKind::Taes,
        }
    }
}

/// Fill gaps between events (and at the head/tail) with background so
/// the track covers `[0, duration]` continuously. An empty track
/// becomes a single background event spanning the whole duration.
///
/// The sampler scans the augmented list in order and takes the first
/// covering event, so filler boundaries matter: a midpoint landing
/// exactly on an event start is claimed by the filler that ends there.
pub(crate) fn augment_events(
    events: &[EventAnnotation],
    file_duration: f64,
    null_class: &str,
) -> Vec<EventAnnotation> {
    if events.is_empty() {
        if file_duration <= 0.0 {
            return Vec::new();
        }
        return vec![EventAnnotation::new(0.0, file_duration, null_class)];
    }

    let mut sorted: Vec<EventAnnotation> = events.to_vec();
    sorted.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut augmented = Vec::with_capacity(sorted.len() * 2 + 1);
    let mut curr_time = 0.0;

    for event in sorted {
        if curr_time < event.start_time {
            augmented.push(EventAnnotation::new(curr_time, event.start_time, null_class));
        }
        curr_time = event.stop_time;
        augmented.push(event);
    }

    if curr_time < file_duration {
        augmented.push(EventAnnotation::new(curr_time, file_duration, null_class));
    }

    augmented
}

/// Midpoint sample times: `(k + 0.5) * epoch_duration` while the time
/// is `<= file_duration`. The boundary is inclusive with no epsilon;
/// both samplers (epoch and IRA) must agree on the count exactly.
pub(crate) fn midpoint_samples(epoch_duration: f64, file_duration: f64) -> Vec<f64> {
    let mut samples = Vec::new();
    let half = epoch_duration / 2.0;
    let mut i = 0u64;
    loop {
        let t = half + i as f64 * epoch_duration;
        if t > file_duration {
            break;
        }
        samples.push(t);
        i += 1;
    }
    samples
}

/// Label at time `t` in an augmented track: first event whose interval
/// covers `t` inclusively on both ends, else the background class.
pub(crate) fn label_at(t: f64, events: &[EventAnnotation], null_class: &str) -> String {
    for event in events {
        if t >= event.start_time && t <= event.stop_time {
            return event.label.clone();
        }
    }
    null_class.to_string()
}
