//! Pipeline configuration.
//!
//! Every tunable constant of the page pipeline lives here: row clustering,
//! ledger-row merging, column detection, field scoring and the auto-commit
//! thresholds. All structs deserialize with `#[serde(default)]`, so a config
//! file only needs to name the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Y-axis clustering of tokens into text lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowClusterOptions {
    /// Fixed merge distance. When unset, `median_height * height_factor` is used.
    pub merge_threshold: Option<f64>,
    pub height_factor: f64,
    /// Median height assumed when no token has a positive height.
    pub fallback_height: f64,
}

impl Default for RowClusterOptions {
    fn default() -> Self {
        Self {
            merge_threshold: None,
            height_factor: 1.2,
            fallback_height: 0.02,
        }
    }
}

/// Merging of text lines into logical ledger rows.
///
/// The retry constants are heuristics carried over from field use, not derived
/// values. Tune them per collection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowMergeOptions {
    /// Lower bound for any gap threshold.
    pub fixed_gap_floor: f64,
    /// Percentile of line gaps used as the base threshold (generic layout).
    pub percentile: f64,
    pub percentile_factor: f64,
    /// Over-collapse retry fires when at least this many text lines...
    pub retry_min_text_rows: usize,
    /// ...were merged into at most this many ledger rows.
    pub retry_max_ledger_rows: usize,
    pub retry_median_factor: f64,
    /// Marker strategy: a two-largest-gap average below this falls back to the floor.
    pub marker_min_threshold: f64,
}

impl Default for RowMergeOptions {
    fn default() -> Self {
        Self {
            fixed_gap_floor: 0.025,
            percentile: 0.75,
            percentile_factor: 1.3,
            retry_min_text_rows: 4,
            retry_max_ledger_rows: 2,
            retry_median_factor: 0.8,
            marker_min_threshold: 0.01,
        }
    }
}

/// Occupancy-histogram column detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnDetectOptions {
    pub bins: usize,
    /// A bin is occupied when at least this fraction of text lines touch it.
    pub occupancy_ratio: f64,
    /// Narrowest empty run (fraction of page width) accepted as a separator.
    pub min_gap_width: f64,
    /// Generated columns narrower than this are discarded.
    pub min_column_width: f64,
}

impl Default for ColumnDetectOptions {
    fn default() -> Self {
        Self {
            bins: 200,
            occupancy_ratio: 0.10,
            min_gap_width: 0.02,
            min_column_width: 0.01,
        }
    }
}

/// Field and row scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    /// Cell confidence below this flags `LOW_OCR_CONF`.
    pub low_ocr_conf: f64,
    /// Non-empty values shorter than this flag `SHORT_VALUE`.
    pub min_value_length: usize,
    pub field_review_threshold: f64,
    pub row_review_threshold: f64,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            low_ocr_conf: 0.70,
            min_value_length: 2,
            field_review_threshold: 0.65,
            row_review_threshold: 0.60,
        }
    }
}

/// Auto-commit gate thresholds. Snapshotted into every plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutocommitThresholds {
    pub auto_commit_row_threshold: f64,
    pub required_provenance_coverage: f64,
    pub min_structure_score: f64,
}

impl Default for AutocommitThresholds {
    fn default() -> Self {
        Self {
            auto_commit_row_threshold: 0.92,
            required_provenance_coverage: 0.90,
            min_structure_score: 0.75,
        }
    }
}

/// Partial threshold override; unset values keep their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdOverrides {
    pub auto_commit_row_threshold: Option<f64>,
    pub required_provenance_coverage: Option<f64>,
    pub min_structure_score: Option<f64>,
}

impl AutocommitThresholds {
    pub fn with_overrides(overrides: ThresholdOverrides) -> Self {
        let base = Self::default();
        Self {
            auto_commit_row_threshold: overrides
                .auto_commit_row_threshold
                .unwrap_or(base.auto_commit_row_threshold),
            required_provenance_coverage: overrides
                .required_provenance_coverage
                .unwrap_or(base.required_provenance_coverage),
            min_structure_score: overrides
                .min_structure_score
                .unwrap_or(base.min_structure_score),
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generic layout: tokens with `y_center` at or above this are header.
    pub header_y_threshold: f64,
    pub row_cluster: RowClusterOptions,
    pub row_merge: RowMergeOptions,
    pub column_detect: ColumnDetectOptions,
    pub scoring: ScoringOptions,
    pub autocommit: AutocommitThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            header_y_threshold: 0.15,
            row_cluster: RowClusterOptions::default(),
            row_merge: RowMergeOptions::default(),
            column_detect: ColumnDetectOptions::default(),
            scoring: ScoringOptions::default(),
            autocommit: AutocommitThresholds::default(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    /// Parse and validate a JSON config. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), "Pipeline config loaded");
        Ok(config)
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fractions: [(&'static str, f64); 12] = [
            ("header_y_threshold", self.header_y_threshold),
            ("row_merge.fixed_gap_floor", self.row_merge.fixed_gap_floor),
            ("row_merge.percentile", self.row_merge.percentile),
            ("column_detect.occupancy_ratio", self.column_detect.occupancy_ratio),
            ("column_detect.min_gap_width", self.column_detect.min_gap_width),
            ("column_detect.min_column_width", self.column_detect.min_column_width),
            ("scoring.low_ocr_conf", self.scoring.low_ocr_conf),
            ("scoring.field_review_threshold", self.scoring.field_review_threshold),
            ("scoring.row_review_threshold", self.scoring.row_review_threshold),
            ("autocommit.autoCommitRowThreshold", self.autocommit.auto_commit_row_threshold),
            (
                "autocommit.requiredProvenanceCoverage",
                self.autocommit.required_provenance_coverage,
            ),
            ("autocommit.minStructureScore", self.autocommit.min_structure_score),
        ];

        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.row_cluster.height_factor <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "row_cluster.height_factor",
                value: self.row_cluster.height_factor,
            });
        }
        if self.column_detect.bins == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "column_detect.bins",
                value: 0.0,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
