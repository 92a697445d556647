use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::confidence::{round2, thresholds, token_confidence_stats};
use super::types::{BBox, Cell, CellFlag, ColumnBand, Token};

static INTEGER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}$").unwrap());

static FULL_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}|\d{4}[-/.]\d{1,2}[-/.]\d{1,2})$").unwrap()
});

static LICENSE_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}").unwrap());

/// Assembled text and statistics of one row × band intersection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellText {
    pub text: String,
    pub confidence: Option<f64>,
    pub confidence_min: Option<f64>,
    pub token_count: usize,
    pub bbox: Option<BBox>,
}

/// Select the tokens of `row` whose centre lies in `band` and join them in
/// reading order.
///
/// Tokens are grouped into lines: a token within one anchor-token height
/// (0.01 when the anchor has none) of the line's first token shares its line.
/// Lines read top to bottom, words within a line left to right.
pub fn extract_cell(row: &[Token], band: &ColumnBand) -> CellText {
    let mut in_band: Vec<&Token> = row.iter().filter(|t| band.contains(t.x_center)).collect();
    if in_band.is_empty() {
        return CellText::default();
    }

    in_band.sort_by(|a, b| a.y_center.total_cmp(&b.y_center));

    let mut lines: Vec<Vec<&Token>> = Vec::new();
    for token in in_band.iter().copied() {
        match lines.last_mut() {
            Some(line) if within_line(line[0], token) => line.push(token),
            _ => lines.push(vec![token]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.x_center.total_cmp(&b.x_center));
    }
    let ordered: Vec<&Token> = lines.into_iter().flatten().collect();

    let text = ordered
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let stats = token_confidence_stats(&ordered);

    let bbox = [
        ordered.iter().map(|t| t.x_min).fold(f64::INFINITY, f64::min),
        ordered.iter().map(|t| t.y_min).fold(f64::INFINITY, f64::min),
        ordered.iter().map(|t| t.x_max).fold(f64::NEG_INFINITY, f64::max),
        ordered.iter().map(|t| t.y_max).fold(f64::NEG_INFINITY, f64::max),
    ];

    CellText {
        text,
        confidence: stats.map(|(avg, _)| round2(avg)),
        confidence_min: stats.map(|(_, min)| round2(min)),
        token_count: ordered.len(),
        bbox: Some(bbox),
    }
}

fn within_line(anchor: &Token, token: &Token) -> bool {
    let tolerance = if anchor.height != 0.0 { anchor.height } else { 0.01 };
    (token.y_center - anchor.y_center).abs() <= tolerance
}

// ═══════════════════════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════════════════════

/// Per-column format expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValidator {
    /// Any content accepted; only emptiness and confidence are checked.
    Text,
    /// Digits only.
    Integer,
    /// Full numeric date (`D/M/YY`, `YYYY-MM-DD`, ...).
    Date,
    /// Month and day only (`3/14`).
    DateMonthDay,
    /// A full date or a `#` number somewhere in the text.
    License,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CellValidation {
    pub needs_review: bool,
    pub reasons: Vec<CellFlag>,
}

/// Flag a cell for review. Never alters the content.
pub fn validate_cell(cell: &CellText, validator: CellValidator) -> CellValidation {
    let text = cell.text.trim();
    if text.is_empty() {
        return CellValidation {
            needs_review: true,
            reasons: vec![CellFlag::Empty],
        };
    }

    let mut reasons = Vec::new();
    if cell
        .confidence_min
        .is_some_and(|min| min < thresholds::LOW_CELL_CONFIDENCE)
    {
        reasons.push(CellFlag::LowConfidence);
    }

    match validator {
        CellValidator::Text => {}
        CellValidator::Integer => {
            if !INTEGER_RE.is_match(text) {
                reasons.push(CellFlag::ExpectedInteger);
            }
        }
        CellValidator::Date => {
            if !FULL_DATE_RE.is_match(text) {
                reasons.push(CellFlag::ExpectedDate);
            }
        }
        CellValidator::DateMonthDay => {
            if !MONTH_DAY_RE.is_match(text) {
                reasons.push(CellFlag::ExpectedDateMd);
            }
        }
        CellValidator::License => {
            if !LICENSE_DATE_RE.is_match(text) && !text.contains('#') {
                reasons.push(CellFlag::ExpectedLicenseFormat);
            }
        }
    }

    CellValidation {
        needs_review: !reasons.is_empty(),
        reasons,
    }
}

/// Data cell for one ledger row and band. Validation runs only when the
/// column has a validator; it flags the cell and keeps its content.
pub fn build_data_cell(
    row: &[Token],
    row_index: usize,
    column_index: usize,
    band: &ColumnBand,
    validator: Option<CellValidator>,
) -> Cell {
    let text = extract_cell(row, band);
    let validation = validator
        .map(|v| validate_cell(&text, v))
        .unwrap_or_default();

    Cell {
        row_index,
        column_index,
        column_key: band.key.clone(),
        content: text.text,
        confidence: text.confidence,
        confidence_min: text.confidence_min,
        token_count: text.token_count,
        bbox: text.bbox,
        needs_review: validation.needs_review,
        reasons: validation.reasons,
    }
}
