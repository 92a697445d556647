// Column band resolution for ledger tables.
// Auto-detection looks for vertical whitespace gutters shared by many text
// lines; calibrated layouts supply fixed bands that only need validation.

use std::collections::HashSet;

use serde::Deserialize;

use super::types::{ColumnBand, TextRow};
use super::LayoutError;
use crate::pipeline_config::ColumnDetectOptions;

/// Key of the n-th generated column (1-based).
pub fn column_key(n: usize) -> String {
    format!("col_{n}")
}

/// Detect column bands from the horizontal coverage of text lines.
///
/// Each line marks every histogram bin touched by one of its tokens. Bins
/// touched by fewer than `occupancy_ratio` of the lines are empty; a run of
/// empty bins at least `min_gap_width` wide, closed by an occupied bin, is a
/// gutter. Columns run from gutter centre to gutter centre. Without any
/// gutter the page is one full-width column.
pub fn detect_columns(text_rows: &[TextRow], options: &ColumnDetectOptions) -> Vec<ColumnBand> {
    let bins = options.bins.max(1);
    let mut coverage = vec![0usize; bins];

    for row in text_rows {
        let mut row_bins: HashSet<usize> = HashSet::new();
        for t in row {
            let start = ((t.x_min * bins as f64).floor() as i64).max(0);
            let end = ((t.x_max * bins as f64).floor() as i64).min(bins as i64 - 1);
            for b in start..=end {
                row_bins.insert(b as usize);
            }
        }
        for b in row_bins {
            coverage[b] += 1;
        }
    }

    let occupied_threshold = text_rows.len() as f64 * options.occupancy_ratio;
    let min_gap_bins = ((options.min_gap_width * bins as f64).floor() as usize).max(1);

    let mut gap_centers: Vec<f64> = Vec::new();
    let mut gap_start: Option<usize> = None;
    for (b, count) in coverage.iter().enumerate() {
        let empty = (*count as f64) < occupied_threshold;
        match (empty, gap_start) {
            (true, None) => gap_start = Some(b),
            (false, Some(start)) => {
                if b - start >= min_gap_bins {
                    gap_centers.push((start + b) as f64 / 2.0 / bins as f64);
                }
                gap_start = None;
            }
            _ => {}
        }
    }

    if gap_centers.is_empty() {
        return vec![ColumnBand::new(column_key(1), 0.0, 1.0)];
    }

    let mut columns: Vec<ColumnBand> = Vec::new();
    let mut prev_end = 0.0;
    for center in gap_centers {
        if center - prev_end > options.min_column_width {
            columns.push(ColumnBand::new(column_key(columns.len() + 1), prev_end, center));
        }
        prev_end = center;
    }
    if 1.0 - prev_end > options.min_column_width {
        columns.push(ColumnBand::new(column_key(columns.len() + 1), prev_end, 1.0));
    }

    tracing::debug!(
        text_rows = text_rows.len(),
        columns = columns.len(),
        "Column bands detected"
    );
    columns
}

/// Check a caller-supplied band set: non-empty, every band inside [0, 1] with
/// `start < end`, sorted, non-overlapping and uniquely keyed.
pub fn validate_bands(bands: &[ColumnBand]) -> Result<(), LayoutError> {
    if bands.is_empty() {
        return Err(LayoutError::EmptyColumnBands);
    }

    let mut keys: HashSet<&str> = HashSet::new();
    for band in bands {
        let in_range = band.start.is_finite()
            && band.end.is_finite()
            && band.start >= 0.0
            && band.end <= 1.0
            && band.start < band.end;
        if !in_range {
            return Err(LayoutError::InvalidColumnBand {
                key: band.key.clone(),
                start: band.start,
                end: band.end,
            });
        }
        if !keys.insert(band.key.as_str()) {
            return Err(LayoutError::DuplicateColumnKey(band.key.clone()));
        }
    }

    for pair in bands.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(LayoutError::OverlappingColumnBands {
                left: pair[0].key.clone(),
                right: pair[1].key.clone(),
            });
        }
    }
    Ok(())
}

/// Build validated bands from ordered `[start, end]` pairs, keyed `col_1..`.
pub fn calibrated_bands(pairs: &[[f64; 2]]) -> Result<Vec<ColumnBand>, LayoutError> {
    let bands: Vec<ColumnBand> = pairs
        .iter()
        .enumerate()
        .map(|(i, [start, end])| ColumnBand::new(column_key(i + 1), *start, *end))
        .collect();
    validate_bands(&bands)?;
    Ok(bands)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BandSpec {
    Pair([f64; 2]),
    Range {
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        end: Option<f64>,
    },
}

/// Parse calibrated bands from JSON.
///
/// Accepts `[[0.0, 0.3], ...]` or `[{"key": "name", "start": 0.0, "end": 0.3}, ...]`.
/// A range without bounds spans the whole page on that side.
pub fn calibrated_bands_from_json(json: &str) -> Result<Vec<ColumnBand>, LayoutError> {
    let specs: Vec<BandSpec> = serde_json::from_str(json)?;
    let bands: Vec<ColumnBand> = specs
        .into_iter()
        .enumerate()
        .map(|(i, spec)| match spec {
            BandSpec::Pair([start, end]) => ColumnBand::new(column_key(i + 1), start, end),
            BandSpec::Range { key, start, end } => ColumnBand::new(
                key.unwrap_or_else(|| column_key(i + 1)),
                start.unwrap_or(0.0),
                end.unwrap_or(1.0),
            ),
        })
        .collect();
    validate_bands(&bands)?;
    Ok(bands)
}
