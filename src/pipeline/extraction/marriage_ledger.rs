//! Calibrated two-table marriage register layout.
//!
//! The printed register spreads one entry over nine ruled columns in two
//! column groups: the couple (table 1) and the ceremony (table 2). Bands and
//! header text are fixed for the profiled form; only data rows come from OCR.

use chrono::{DateTime, Utc};

use super::cells::{build_data_cell, CellValidator};
use super::layout::{PageTokens, TableLayout};
use super::rows::{cluster_into_rows, merge_ledger_rows, MergeStrategy};
use super::types::{
    band_map, Cell, ColumnBand, LedgerRow, Row, RowKind, Table, TableExtractionResult, Token,
};
use super::LayoutError;
use crate::pipeline_config::{PipelineConfig, RowClusterOptions, RowMergeOptions};

pub const MARRIAGE_LAYOUT_ID: &str = "marriage_ledger_v1";

/// Everything at or above this line is title and printed header.
pub const MARRIAGE_HEADER_Y: f64 = 0.295;

/// Printed header words can sit just below the header line.
const HEADER_WORD_MARGIN: f64 = 0.02;

const HEADER_WORDS: &[&str] = &[
    "NUMBER", "DATE", "FULL", "NAME", "OF", "GROOM", "RESIDENCE", "AGE", "RELIGION", "MARRIAGE",
    "FIRST", "NAMES", "PARENTS", "GROOM'S", "BRIDE'S", "BRIDE", "PRIEST", "PRIEST'S", "WITNESSES",
    "AND", "LICENSE", "MARRIAGES", "YEAR", "OR",
];

struct LedgerColumn {
    key: &'static str,
    start: f64,
    end: f64,
    russian: &'static str,
    english: &'static str,
    validator: CellValidator,
}

const COUPLE_COLUMNS: [LedgerColumn; 6] = [
    LedgerColumn {
        key: "number",
        start: 0.020,
        end: 0.060,
        russian: "Счёт браков",
        english: "NUMBER",
        validator: CellValidator::Integer,
    },
    LedgerColumn {
        key: "date",
        start: 0.060,
        end: 0.125,
        russian: "Месяц и день",
        english: "DATE",
        validator: CellValidator::DateMonthDay,
    },
    LedgerColumn {
        key: "groom",
        start: 0.125,
        end: 0.290,
        russian: "Звание, имя, отчество и фамилия жениха, вероисповедание, лета и которым браком",
        english: "FULL NAME OF GROOM, RESIDENCE, AGE, RELIGION, 1st or 2nd MARRIAGE",
        validator: CellValidator::Text,
    },
    LedgerColumn {
        key: "groom_parents",
        start: 0.290,
        end: 0.345,
        russian: "Имена родителей жениха",
        english: "FIRST NAMES OF GROOM'S PARENTS",
        validator: CellValidator::Text,
    },
    LedgerColumn {
        key: "bride",
        start: 0.345,
        end: 0.475,
        russian: "Звание, имя, отчество и фамилия невесты, вероисповедание, лета и которым браком",
        english: "FULL NAME OF BRIDE, RESIDENCE, AGE, RELIGION, 1st or 2nd MARRIAGE",
        validator: CellValidator::Text,
    },
    LedgerColumn {
        key: "bride_parents",
        start: 0.475,
        end: 0.550,
        russian: "Имена родителей невесты",
        english: "FIRST NAMES OF BRIDE'S PARENTS",
        validator: CellValidator::Text,
    },
];

const CEREMONY_COLUMNS: [LedgerColumn; 3] = [
    LedgerColumn {
        key: "priest",
        start: 0.550,
        end: 0.645,
        russian: "Кто совершал таинство",
        english: "PRIEST'S NAME",
        validator: CellValidator::Text,
    },
    LedgerColumn {
        key: "witnesses",
        start: 0.645,
        end: 0.825,
        russian: "Кто были поручители",
        english: "WITNESSES NAMES",
        validator: CellValidator::Text,
    },
    LedgerColumn {
        key: "license",
        start: 0.825,
        end: 1.000,
        russian: "От какого числа и за каким № лицензия",
        english: "DATE AND NUMBER OF LICENSE",
        validator: CellValidator::License,
    },
];

impl LedgerColumn {
    fn band(&self) -> ColumnBand {
        ColumnBand::new(self.key, self.start, self.end)
    }
}

/// Column keys of the ledger's tables, by position (0 = couple, 1 = ceremony).
pub fn marriage_column_keys(table_position: usize) -> Vec<&'static str> {
    let columns: &[LedgerColumn] = if table_position == 0 {
        &COUPLE_COLUMNS
    } else {
        &CEREMONY_COLUMNS
    };
    columns.iter().map(|c| c.key).collect()
}

/// All nine calibrated bands in page order.
pub fn marriage_column_bands() -> Vec<ColumnBand> {
    COUPLE_COLUMNS
        .iter()
        .chain(CEREMONY_COLUMNS.iter())
        .map(LedgerColumn::band)
        .collect()
}

fn is_header_word(text: &str) -> bool {
    let normalized: String = text
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || *c == '\'')
        .collect();
    HEADER_WORDS.contains(&normalized.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarriageLedgerLayout {
    header_y_threshold: f64,
    row_cluster: RowClusterOptions,
    row_merge: RowMergeOptions,
}

impl Default for MarriageLedgerLayout {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl MarriageLedgerLayout {
    /// Row options come from `config`; the header line is the form's own.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            header_y_threshold: MARRIAGE_HEADER_Y,
            row_cluster: config.row_cluster,
            row_merge: config.row_merge,
        }
    }

    pub fn with_header_y(mut self, header_y_threshold: f64) -> Result<Self, LayoutError> {
        if !(0.0..1.0).contains(&header_y_threshold) {
            return Err(LayoutError::InvalidHeaderThreshold(header_y_threshold));
        }
        self.header_y_threshold = header_y_threshold;
        Ok(self)
    }

    fn is_data_token(&self, t: &Token) -> bool {
        if t.y_center <= self.header_y_threshold {
            return false;
        }
        !(t.y_center < self.header_y_threshold + HEADER_WORD_MARGIN && is_header_word(&t.text))
    }
}

fn header_row(
    row_index: usize,
    columns: &[LedgerColumn],
    text: fn(&LedgerColumn) -> &'static str,
) -> Row {
    Row {
        row_index,
        kind: RowKind::Header,
        cells: columns
            .iter()
            .enumerate()
            .map(|(i, c)| Cell::header(row_index, i, c.key, text(c)))
            .collect(),
    }
}

fn build_table(table_number: usize, columns: &[LedgerColumn], ledger_rows: &[LedgerRow]) -> Table {
    let mut rows = vec![
        header_row(0, columns, |c| c.russian),
        header_row(1, columns, |c| c.english),
    ];

    for (i, ledger_row) in ledger_rows.iter().enumerate() {
        let row_index = i + 2;
        let cells = columns
            .iter()
            .enumerate()
            .map(|(c, column)| {
                build_data_cell(ledger_row, row_index, c, &column.band(), Some(column.validator))
            })
            .collect();
        rows.push(Row {
            row_index,
            kind: RowKind::Row,
            cells,
        });
    }

    let header_content = columns
        .iter()
        .map(|c| c.russian)
        .collect::<Vec<_>>()
        .join("|");

    Table::new(table_number, columns.len(), true, Some(header_content), rows)
}

impl TableLayout for MarriageLedgerLayout {
    fn layout_id(&self) -> &'static str {
        MARRIAGE_LAYOUT_ID
    }

    fn extract_at(&self, page: &PageTokens<'_>, extracted_at: DateTime<Utc>) -> TableExtractionResult {
        let data_tokens: Vec<Token> = page
            .tokens
            .iter()
            .filter(|t| self.is_data_token(t))
            .cloned()
            .collect();

        let text_rows = cluster_into_rows(&data_tokens, &self.row_cluster);
        let strategy = MergeStrategy::DateMarker {
            date_band: COUPLE_COLUMNS[1].band(),
        };
        let ledger_rows = merge_ledger_rows(text_rows, &strategy, &self.row_merge);

        let bands = marriage_column_bands();
        TableExtractionResult {
            layout_id: MARRIAGE_LAYOUT_ID.to_string(),
            page_number: page.page_index + 1,
            page_dimensions: page.dimensions,
            tables: vec![
                build_table(1, &COUPLE_COLUMNS, &ledger_rows),
                build_table(2, &CEREMONY_COLUMNS, &ledger_rows),
            ],
            column_bands: band_map(&bands),
            columns_detected: bands.len(),
            header_y_threshold: self.header_y_threshold,
            total_tokens: page.tokens.len(),
            data_tokens: data_tokens.len(),
            data_rows: ledger_rows.len(),
            extracted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::types::CellFlag;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 22, 11, 28, 38).unwrap()
    }

    fn make_token(text: &str, x: f64, y: f64, confidence: f64) -> Token {
        Token::from_bounds(0, text, Some(confidence), x - 0.01, y - 0.004, x + 0.01, y + 0.004, 0)
    }

    fn page(tokens: &[Token]) -> PageTokens<'_> {
        PageTokens {
            tokens,
            page_index: 0,
            dimensions: None,
        }
    }

    /// One register entry on two text lines starting at `y`.
    fn entry(y: f64, number: &str, date: &str) -> Vec<Token> {
        vec![
            make_token(number, 0.04, y, 0.95),
            make_token(date, 0.09, y, 0.92),
            make_token("Ivan", 0.15, y, 0.9),
            make_token("Petrov", 0.20, y, 0.88),
            make_token("Chicago", 0.17, y + 0.012, 0.85),
            make_token("Maria", 0.40, y, 0.9),
            make_token("Fr.", 0.58, y, 0.9),
            make_token("Kedrovsky", 0.62, y, 0.9),
            make_token("#1201", 0.90, y, 0.9),
        ]
    }

    #[test]
    fn builds_two_tables_with_fixed_headers() {
        let mut tokens = entry(0.40, "1", "3/14/1921");
        tokens.extend(entry(0.45, "2", "4/2/1921"));
        let result = MarriageLedgerLayout::default().extract_at(&page(&tokens), fixed_time());

        assert_eq!(result.layout_id, MARRIAGE_LAYOUT_ID);
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.data_rows, 2);
        assert_eq!(result.columns_detected, 9);
        assert_eq!(result.column_bands["license"], [0.825, 1.0]);

        let couple = &result.tables[0];
        assert_eq!(couple.column_count, 6);
        assert_eq!(couple.rows[0].cells[2].column_key, "groom");
        assert_eq!(couple.rows[1].cells[0].content, "NUMBER");
        assert!(couple.rows[1].is_header());
        assert_eq!(couple.rows[2].row_index, 2);
        assert_eq!(couple.rows[2].cells[2].content, "Ivan Petrov Chicago");
        assert_eq!(couple.rows[3].cells[0].content, "2");
        assert!(couple.header_content.as_deref().unwrap().contains('|'));

        let ceremony = &result.tables[1];
        assert_eq!(ceremony.column_count, 3);
        assert_eq!(ceremony.rows[2].cells[0].content, "Fr. Kedrovsky");
        assert_eq!(ceremony.rows[2].cells[2].content, "#1201");
    }

    #[test]
    fn date_column_expects_month_day() {
        let tokens = entry(0.40, "1", "3/14/1921");
        let result = MarriageLedgerLayout::default().extract_at(&page(&tokens), fixed_time());
        let date_cell = &result.tables[0].rows[2].cells[1];
        assert_eq!(date_cell.content, "3/14/1921");
        assert!(date_cell.needs_review);
        assert_eq!(date_cell.reasons, vec![CellFlag::ExpectedDateMd]);
    }

    #[test]
    fn empty_columns_flagged_empty() {
        let tokens = entry(0.40, "1", "3/14");
        let result = MarriageLedgerLayout::default().extract_at(&page(&tokens), fixed_time());
        let row = &result.tables[0].rows[2];
        // nothing in the bride's parents band
        assert_eq!(row.cells[5].content, "");
        assert_eq!(row.cells[5].reasons, vec![CellFlag::Empty]);
        assert!(!row.cells[1].needs_review);
    }

    #[test]
    fn header_region_and_printed_words_excluded() {
        let mut tokens = vec![
            make_token("MARRIAGES", 0.4, 0.10, 0.99),
            make_token("GROOM'S", 0.3, 0.30, 0.99),
            make_token("Parents,", 0.3, 0.31, 0.99),
        ];
        tokens.extend(entry(0.40, "1", "3/14"));
        let result = MarriageLedgerLayout::default().extract_at(&page(&tokens), fixed_time());
        assert_eq!(result.total_tokens, 12);
        assert_eq!(result.data_tokens, 9);
    }

    #[test]
    fn header_word_normalization() {
        assert!(is_header_word("Groom's"));
        assert!(is_header_word("NAME,"));
        assert!(!is_header_word("Ivan"));
        assert!(!is_header_word("Жених"));
    }

    #[test]
    fn empty_page_still_has_header_rows() {
        let result = MarriageLedgerLayout::default().extract_at(&page(&[]), fixed_time());
        assert_eq!(result.data_rows, 0);
        assert_eq!(result.tables.len(), 2);
        assert_eq!(result.tables[0].row_count, 2);
        assert_eq!(result.tables[1].row_count, 2);
    }

    #[test]
    fn bands_are_ordered_and_contiguous() {
        let bands = marriage_column_bands();
        assert_eq!(bands.len(), 9);
        for pair in bands.windows(2) {
            assert!((pair[0].end - pair[1].start).abs() < 1e-12);
        }
        assert_eq!(marriage_column_keys(1), vec!["priest", "witnesses", "license"]);
    }

    #[test]
    fn header_override_validated() {
        assert!(MarriageLedgerLayout::default().with_header_y(0.3).is_ok());
        assert!(matches!(
            MarriageLedgerLayout::default().with_header_y(-0.1),
            Err(LayoutError::InvalidHeaderThreshold(_))
        ));
    }
}
