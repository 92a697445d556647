// Row reconstruction: tokens → text lines → logical ledger rows.
// Handwritten entries often span several text lines, so line clustering and
// entry merging are separate passes with separate thresholds.

use std::sync::LazyLock;

use regex::Regex;

use super::types::{ColumnBand, LedgerRow, TextRow, Token};
use crate::pipeline_config::{RowClusterOptions, RowMergeOptions};

/// Full numeric date such as `3/14/1921` or `14-3-21`.
static DATE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[-/]\d{1,2}[-/]\d{2,4}$").unwrap());

/// How adjacent text lines are merged into ledger rows.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeStrategy {
    /// Gap threshold from the gap distribution, with an over-collapse retry.
    Percentile,
    /// Gap threshold from the two largest gaps, plus a date token inside
    /// `date_band` forcing a new row.
    DateMarker { date_band: ColumnBand },
}

/// Mean `y_center` of a line.
pub fn row_y_center(row: &[Token]) -> f64 {
    if row.is_empty() {
        return 0.0;
    }
    row.iter().map(|t| t.y_center).sum::<f64>() / row.len() as f64
}

/// Group tokens into text lines by vertical proximity.
///
/// Tokens are visited top to bottom. A token joins the current line when its
/// `y_center` is within the merge threshold of the line's running mean.
pub fn cluster_into_rows(tokens: &[Token], options: &RowClusterOptions) -> Vec<TextRow> {
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<Token> = tokens.to_vec();
    sorted.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));

    let mut heights: Vec<f64> = sorted.iter().map(|t| t.height).filter(|h| *h > 0.0).collect();
    heights.sort_by(f64::total_cmp);
    let median_height = if heights.is_empty() {
        options.fallback_height
    } else {
        heights[heights.len() / 2]
    };
    let threshold = options
        .merge_threshold
        .unwrap_or(median_height * options.height_factor);

    let mut rows: Vec<TextRow> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return rows;
    };
    let mut current_y = first.y_center;
    let mut current: TextRow = vec![first];

    for token in iter {
        if (token.y_center - current_y).abs() <= threshold {
            current.push(token);
            current_y = row_y_center(&current);
        } else {
            current_y = token.y_center;
            rows.push(std::mem::replace(&mut current, vec![token]));
        }
    }
    rows.push(current);

    tracing::debug!(
        tokens = tokens.len(),
        rows = rows.len(),
        threshold = threshold,
        "Tokens clustered into text rows"
    );
    rows
}

/// Merge text lines that belong to one logical entry.
pub fn merge_ledger_rows(
    text_rows: Vec<TextRow>,
    strategy: &MergeStrategy,
    options: &RowMergeOptions,
) -> Vec<LedgerRow> {
    if text_rows.len() <= 1 {
        return text_rows;
    }

    let centers: Vec<f64> = text_rows.iter().map(|r| row_y_center(r)).collect();
    let gaps: Vec<f64> = centers.windows(2).map(|w| w[1] - w[0]).collect();

    match strategy {
        MergeStrategy::Percentile => merge_percentile(text_rows, &gaps, options),
        MergeStrategy::DateMarker { date_band } => {
            merge_with_marker(text_rows, &gaps, date_band, options)
        }
    }
}

fn merge_percentile(
    text_rows: Vec<TextRow>,
    gaps: &[f64],
    options: &RowMergeOptions,
) -> Vec<LedgerRow> {
    let mut sorted_gaps = gaps.to_vec();
    sorted_gaps.sort_by(f64::total_cmp);

    let p_index = ((sorted_gaps.len() as f64 * options.percentile).floor() as usize)
        .min(sorted_gaps.len() - 1);
    let threshold = options
        .fixed_gap_floor
        .max(sorted_gaps[p_index] * options.percentile_factor);

    let merged = merge_below_threshold(&text_rows, gaps, threshold);

    if text_rows.len() >= options.retry_min_text_rows && merged.len() <= options.retry_max_ledger_rows
    {
        let median = sorted_gaps[sorted_gaps.len() / 2];
        let tighter = options
            .fixed_gap_floor
            .max(median * options.retry_median_factor);
        if tighter < threshold {
            let retried = merge_below_threshold(&text_rows, gaps, tighter);
            if retried.len() > merged.len() {
                tracing::debug!(
                    text_rows = text_rows.len(),
                    collapsed = merged.len(),
                    retried = retried.len(),
                    "Over-collapsed merge retried with tighter threshold"
                );
                return retried;
            }
        }
        tracing::warn!(
            text_rows = text_rows.len(),
            ledger_rows = merged.len(),
            "Text rows collapsed into very few ledger rows"
        );
    }

    merged
}

fn merge_below_threshold(text_rows: &[TextRow], gaps: &[f64], threshold: f64) -> Vec<LedgerRow> {
    let mut merged: Vec<LedgerRow> = vec![text_rows[0].clone()];
    for (row, gap) in text_rows[1..].iter().zip(gaps) {
        match merged.last_mut() {
            Some(last) if *gap < threshold => last.extend(row.iter().cloned()),
            _ => merged.push(row.clone()),
        }
    }
    merged
}

fn merge_with_marker(
    text_rows: Vec<TextRow>,
    gaps: &[f64],
    date_band: &ColumnBand,
    options: &RowMergeOptions,
) -> Vec<LedgerRow> {
    let threshold = if gaps.len() >= 2 {
        let mut desc = gaps.to_vec();
        desc.sort_by(|a, b| b.total_cmp(a));
        let avg = (desc[0] + desc[1]) / 2.0;
        if avg < options.marker_min_threshold {
            options.fixed_gap_floor
        } else {
            avg
        }
    } else {
        options.fixed_gap_floor
    };

    let mut rows = text_rows.into_iter();
    let mut merged: Vec<LedgerRow> = rows.next().into_iter().collect();

    for (row, gap) in rows.zip(gaps) {
        let starts_entry = *gap >= threshold || has_date_marker(&row, date_band);
        match merged.last_mut() {
            Some(last) if !starts_entry => last.extend(row),
            _ => merged.push(row),
        }
    }
    merged
}

/// Whether a line carries a full date inside the date column.
pub fn has_date_marker(row: &[Token], date_band: &ColumnBand) -> bool {
    row.iter()
        .any(|t| date_band.contains(t.x_center) && DATE_MARKER_RE.is_match(&t.text))
}
