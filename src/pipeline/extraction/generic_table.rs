//! Layout-agnostic single-table extraction.
//!
//! Tokens above the header line form an optional header row; everything
//! below is clustered into ledger rows. Columns come from gutter detection
//! unless the caller calibrated them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::cells::{build_data_cell, extract_cell, CellValidator};
use super::column_detect::{detect_columns, validate_bands};
use super::layout::{PageTokens, TableLayout};
use super::rows::{cluster_into_rows, merge_ledger_rows, MergeStrategy};
use super::types::{band_map, Cell, ColumnBand, Row, RowKind, Table, TableExtractionResult, Token};
use super::LayoutError;
use crate::pipeline_config::{
    ColumnDetectOptions, PipelineConfig, RowClusterOptions, RowMergeOptions,
};

pub const GENERIC_LAYOUT_ID: &str = "generic_table_v1";

#[derive(Debug, Clone, PartialEq)]
pub struct GenericTableLayout {
    header_y_threshold: f64,
    column_bands: Option<Vec<ColumnBand>>,
    validators: BTreeMap<String, CellValidator>,
    row_cluster: RowClusterOptions,
    row_merge: RowMergeOptions,
    column_detect: ColumnDetectOptions,
}

impl Default for GenericTableLayout {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl GenericTableLayout {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            header_y_threshold: config.header_y_threshold,
            column_bands: None,
            validators: BTreeMap::new(),
            row_cluster: config.row_cluster,
            row_merge: config.row_merge,
            column_detect: config.column_detect,
        }
    }

    pub fn with_header_y(mut self, header_y_threshold: f64) -> Result<Self, LayoutError> {
        if !(0.0..1.0).contains(&header_y_threshold) {
            return Err(LayoutError::InvalidHeaderThreshold(header_y_threshold));
        }
        self.header_y_threshold = header_y_threshold;
        Ok(self)
    }

    /// Use calibrated bands instead of gutter detection.
    pub fn with_column_bands(mut self, bands: Vec<ColumnBand>) -> Result<Self, LayoutError> {
        validate_bands(&bands)?;
        self.column_bands = Some(bands);
        Ok(self)
    }

    pub fn with_validator(mut self, column_key: impl Into<String>, validator: CellValidator) -> Self {
        self.validators.insert(column_key.into(), validator);
        self
    }

    pub fn header_y_threshold(&self) -> f64 {
        self.header_y_threshold
    }
}

impl TableLayout for GenericTableLayout {
    fn layout_id(&self) -> &'static str {
        GENERIC_LAYOUT_ID
    }

    fn extract_at(&self, page: &PageTokens<'_>, extracted_at: DateTime<Utc>) -> TableExtractionResult {
        let page_number = page.page_index + 1;
        if page.tokens.is_empty() {
            let mut empty = TableExtractionResult::empty(
                GENERIC_LAYOUT_ID,
                page_number,
                self.header_y_threshold,
                extracted_at,
            );
            empty.page_dimensions = page.dimensions;
            return empty;
        }

        let (header_tokens, data_tokens): (Vec<Token>, Vec<Token>) = page
            .tokens
            .iter()
            .cloned()
            .partition(|t| t.y_center <= self.header_y_threshold);

        let text_rows = cluster_into_rows(&data_tokens, &self.row_cluster);
        let columns = match &self.column_bands {
            Some(bands) => bands.clone(),
            None => detect_columns(&text_rows, &self.column_detect),
        };
        let ledger_rows = merge_ledger_rows(text_rows, &MergeStrategy::Percentile, &self.row_merge);

        let mut rows: Vec<Row> = Vec::with_capacity(ledger_rows.len() + 1);
        let has_header = !header_tokens.is_empty();
        if has_header {
            let cells = columns
                .iter()
                .enumerate()
                .map(|(i, band)| {
                    Cell::header(0, i, &band.key, &extract_cell(&header_tokens, band).text)
                })
                .collect();
            rows.push(Row {
                row_index: 0,
                kind: RowKind::Header,
                cells,
            });
        }

        let offset = usize::from(has_header);
        for (i, ledger_row) in ledger_rows.iter().enumerate() {
            let row_index = i + offset;
            let cells = columns
                .iter()
                .enumerate()
                .map(|(c, band)| {
                    let validator = self.validators.get(&band.key).copied();
                    build_data_cell(ledger_row, row_index, c, band, validator)
                })
                .collect();
            rows.push(Row {
                row_index,
                kind: RowKind::Row,
                cells,
            });
        }

        TableExtractionResult {
            layout_id: GENERIC_LAYOUT_ID.to_string(),
            page_number,
            page_dimensions: page.dimensions,
            tables: vec![Table::new(1, columns.len(), has_header, None, rows)],
            column_bands: band_map(&columns),
            columns_detected: columns.len(),
            header_y_threshold: self.header_y_threshold,
            total_tokens: page.tokens.len(),
            data_tokens: data_tokens.len(),
            data_rows: ledger_rows.len(),
            extracted_at,
        }
    }
}
