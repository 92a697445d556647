use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized bounding box `[x_min, y_min, x_max, y_max]`, fractions of the page.
pub type BBox = [f64; 4];

/// One OCR word with a fractional bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Position in normalizer output. Stable for a given provider document.
    pub id: usize,
    pub text: String,
    pub confidence: Option<f64>,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub x_center: f64,
    pub y_center: f64,
    pub height: f64,
    pub width: f64,
    pub page: usize,
}

impl Token {
    /// Build a token from its fractional extent; centres and size are derived.
    #[allow(clippy::too_many_arguments)]
    pub fn from_bounds(
        id: usize,
        text: impl Into<String>,
        confidence: Option<f64>,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
        page: usize,
    ) -> Self {
        Self {
            id,
            text: text.into(),
            confidence,
            x_min,
            y_min,
            x_max,
            y_max,
            x_center: (x_min + x_max) / 2.0,
            y_center: (y_min + y_max) / 2.0,
            height: y_max - y_min,
            width: x_max - x_min,
            page,
        }
    }

    pub fn bbox(&self) -> BBox {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

/// Tokens sharing one vertical band (one OCR text line).
pub type TextRow = Vec<Token>;

/// Tokens of one logical register entry, possibly spanning several text lines.
pub type LedgerRow = Vec<Token>;

/// A named horizontal interval `[start, end)` defining one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnBand {
    pub key: String,
    pub start: f64,
    pub end: f64,
}

impl ColumnBand {
    pub fn new(key: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            key: key.into(),
            start,
            end,
        }
    }

    /// Half-open membership test used for cell assignment.
    pub fn contains(&self, x: f64) -> bool {
        x >= self.start && x < self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Review reasons attached to a cell by the validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFlag {
    Empty,
    LowConfidence,
    ExpectedInteger,
    ExpectedDate,
    ExpectedDateMd,
    ExpectedLicenseFormat,
}

impl CellFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::LowConfidence => "low_confidence",
            Self::ExpectedInteger => "expected_integer",
            Self::ExpectedDate => "expected_date",
            Self::ExpectedDateMd => "expected_date_md",
            Self::ExpectedLicenseFormat => "expected_license_format",
        }
    }
}

impl std::fmt::Display for CellFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub row_index: usize,
    pub column_index: usize,
    #[serde(default)]
    pub column_key: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_min: Option<f64>,
    #[serde(default)]
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<CellFlag>,
}

impl Cell {
    /// A cell whose content is fixed text rather than OCR output.
    pub fn header(row_index: usize, column_index: usize, column_key: &str, content: &str) -> Self {
        Self {
            row_index,
            column_index,
            column_key: column_key.to_string(),
            content: content.to_string(),
            confidence: None,
            confidence_min: None,
            token_count: 0,
            bbox: None,
            needs_review: false,
            reasons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Header,
    Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_index: usize,
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn is_header(&self) -> bool {
        self.kind == RowKind::Header
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub row_count: usize,
    pub column_count: usize,
    pub table_number: usize,
    pub has_header_row: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_content: Option<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(
        table_number: usize,
        column_count: usize,
        has_header_row: bool,
        header_content: Option<String>,
        rows: Vec<Row>,
    ) -> Self {
        Self {
            row_count: rows.len(),
            column_count,
            table_number,
            has_header_row,
            header_content,
            rows,
        }
    }

    /// Rows that carry OCR data.
    pub fn data_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| !r.is_header())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageDimensions {
    pub width: f64,
    pub height: f64,
}

/// Per-page table artifact consumed by mapping, provenance and rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExtractionResult {
    pub layout_id: String,
    pub page_number: usize,
    #[serde(default)]
    pub page_dimensions: Option<PageDimensions>,
    pub tables: Vec<Table>,
    #[serde(default)]
    pub column_bands: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub columns_detected: usize,
    pub header_y_threshold: f64,
    pub total_tokens: usize,
    pub data_tokens: usize,
    pub data_rows: usize,
    pub extracted_at: DateTime<Utc>,
}

impl TableExtractionResult {
    /// Result for a page with no usable tokens.
    pub fn empty(
        layout_id: &str,
        page_number: usize,
        header_y_threshold: f64,
        extracted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            layout_id: layout_id.to_string(),
            page_number,
            page_dimensions: None,
            tables: Vec::new(),
            column_bands: BTreeMap::new(),
            columns_detected: 0,
            header_y_threshold,
            total_tokens: 0,
            data_tokens: 0,
            data_rows: 0,
            extracted_at,
        }
    }
}

/// Collect ordered bands into the artifact's key → `[start, end]` map.
pub fn band_map(bands: &[ColumnBand]) -> BTreeMap<String, [f64; 2]> {
    bands
        .iter()
        .map(|b| (b.key.clone(), [b.start, b.end]))
        .collect()
}
