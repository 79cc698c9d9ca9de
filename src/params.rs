//! Scoring parameter block.
//!
//! One struct owns the tunables shared by the scorers: the raw-label →
//! canonical-class map, the epoch width, the background class token,
//! and the overlap guard width. It is loaded once and passed by value.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Parameters shared by the scoring algorithms.
#[derive(Debug, Clone)]
pub struct ScoringParams {
    /// Raw label (lowercase) -> canonical class (lowercase).
    pub label_map: HashMap<String, String>,
    /// Fixed epoch width in seconds for midpoint sampling.
    pub epoch_duration: f64,
    /// Background class token used by the samplers.
    pub null_class: String,
    /// Guard width in seconds for overlap scoring.
    pub guard_width: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            label_map: HashMap::new(),
            epoch_duration: 0.25,
            null_class: "bckg".to_string(),
            guard_width: 0.001,
        }
    }
}

/// On-disk TOML shape:
///
/// ```toml
/// [map]
/// seiz = "spsw, gped, pled, seiz"
/// bckg = "bckg, artf, eyebl"
///
/// [epoch]
/// epoch_duration = 0.25
/// null_class = "bckg"
///
/// [overlap]
/// guard_width = 0.001
/// ```
#[derive(Debug, Deserialize, Default)]
struct ParamsFile {
    #[serde(default)]
    map: HashMap<String, String>,
    #[serde(default)]
    epoch: EpochSection,
    #[serde(default)]
    overlap: OverlapSection,
}

#[derive(Debug, Deserialize)]
struct EpochSection {
    epoch_duration: f64,
    null_class: String,
}

impl Default for EpochSection {
    fn default() -> Self {
        Self {
            epoch_duration: 0.25,
            null_class: "bckg".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OverlapSection {
    guard_width: f64,
}

impl Default for OverlapSection {
    fn default() -> Self {
        Self {
            guard_width: 0.001,
        }
    }
}

impl ScoringParams {
    /// Load parameters from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading params file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ParamsFile = toml::from_str(content).context("parsing scoring params")?;

        // Invert the class -> "raw, raw, ..." table into raw -> class.
        let mut label_map = HashMap::new();
        for (class, raw_labels) in &file.map {
            for raw in raw_labels.split(',') {
                let raw = raw.trim().to_lowercase();
                if !raw.is_empty() {
                    label_map.insert(raw, class.to_lowercase());
                }
            }
        }

        Ok(Self {
            label_map,
            epoch_duration: file.epoch.epoch_duration,
            null_class: file.epoch.null_class.to_lowercase(),
            guard_width: file.overlap.guard_width,
        })
    }

    /// Map a raw event label to its canonical class. Unmapped labels
    /// fall back to their lowercased form.
    pub fn map_label(&self, label: &str) -> String {
        let low = label.to_lowercase();
        self.label_map.get(&low).cloned().unwrap_or(low)
    }
}
