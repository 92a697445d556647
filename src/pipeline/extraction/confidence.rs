use super::types::Token;

/// Confidence thresholds used by cell validation and candidate mapping
pub mod thresholds {
    /// Below this minimum token confidence a cell is flagged `low_confidence`.
    pub const LOW_CELL_CONFIDENCE: f64 = 0.50;

    /// Classifier confidence above which the detected type overrides the job type.
    pub const TYPE_OVERRIDE: f64 = 0.30;

    /// Row confidence assumed when no cell carries a confidence.
    pub const NEUTRAL_ROW: f64 = 0.50;

    /// Minimum keyword/header length ratio for a header to claim a field.
    pub const MIN_HEADER_MATCH: f64 = 0.10;
}

/// Round to `places` decimal places, half away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

pub fn round4(value: f64) -> f64 {
    round_to(value, 4)
}

/// Arithmetic mean, `None` for an empty input.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Average and minimum token confidence, ignoring tokens without one.
pub fn token_confidence_stats(tokens: &[&Token]) -> Option<(f64, f64)> {
    let confidences: Vec<f64> = tokens.iter().filter_map(|t| t.confidence).collect();
    let avg = mean(&confidences)?;
    let min = confidences.iter().copied().fold(f64::INFINITY, f64::min);
    Some((avg, min))
}
