//! Column-to-field mapping: table rows become record candidates.
//!
//! The calibrated marriage ledger maps its fixed columns through a
//! dictionary. Any other layout infers the mapping from header text using
//! per-type keyword hints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::classify::classify_record_type;
use super::hints::{header_hints, MARRIAGE_COLUMN_MAP, MARRIAGE_NOTES_COLUMNS};
use super::types::{MultiRecordResult, RecordCandidate, RecordType};
use crate::pipeline::extraction::{
    column_key, marriage_column_keys, mean, round2, thresholds, Cell, Row, TableExtractionResult,
    MARRIAGE_LAYOUT_ID,
};

/// Map the tables of one page to record candidates.
///
/// `raw_text` feeds the record-type classifier; `job_type` is the type the
/// page was submitted as. Returns an empty result when there is no table.
pub fn extract_record_candidates(
    table: Option<&TableExtractionResult>,
    raw_text: &str,
    job_type: RecordType,
) -> MultiRecordResult {
    extract_record_candidates_at(table, raw_text, job_type, Utc::now())
}

pub fn extract_record_candidates_at(
    table: Option<&TableExtractionResult>,
    raw_text: &str,
    job_type: RecordType,
    parsed_at: DateTime<Utc>,
) -> MultiRecordResult {
    let _span = tracing::info_span!(
        "extract_record_candidates",
        layout_id = table.map(|t| t.layout_id.as_str()).unwrap_or(""),
        job_type = %job_type
    )
    .entered();

    let (mut detected_type, type_confidence) = resolve_record_type(raw_text, job_type);

    let Some(table) = table else {
        return MultiRecordResult::empty(detected_type, type_confidence, parsed_at);
    };

    let (candidates, column_mapping, unmapped_columns) = if table.layout_id == MARRIAGE_LAYOUT_ID {
        detected_type = RecordType::Marriage;
        let (candidates, mapping) = map_marriage_ledger(table);
        (candidates, mapping, Vec::new())
    } else {
        map_generic_table(table, detected_type)
    };

    tracing::info!(
        detected_type = %detected_type,
        type_confidence = type_confidence,
        candidates = candidates.len(),
        unmapped_columns = unmapped_columns.len(),
        "Record candidates extracted"
    );

    MultiRecordResult {
        candidates,
        detected_type,
        type_confidence,
        column_mapping,
        unmapped_columns,
        parsed_at,
    }
}

/// Classifier verdict when confident, else the job type when it is informative.
fn resolve_record_type(raw_text: &str, job_type: RecordType) -> (RecordType, f64) {
    let mut detected = job_type;
    let mut confidence = 0.0;

    if !raw_text.trim().is_empty() {
        let classification = classify_record_type(raw_text);
        if classification.confidence > thresholds::TYPE_OVERRIDE {
            detected = classification.suggested_type;
            confidence = classification.confidence;
        }
    }

    if !detected.is_informative() && job_type.is_informative() {
        detected = job_type;
    }
    (detected, confidence)
}

fn cell_key(cell: &Cell) -> String {
    if cell.column_key.is_empty() {
        column_key(cell.column_index)
    } else {
        cell.column_key.clone()
    }
}

/// Mean confidence of the cells that carry one.
fn row_average_confidence(row: &Row) -> Option<f64> {
    let confidences: Vec<f64> = row.cells.iter().filter_map(|c| c.confidence).collect();
    mean(&confidences)
}

fn has_content(fields: &BTreeMap<String, String>) -> bool {
    fields.values().any(|v| !v.trim().is_empty())
}

// ═══════════════════════════════════════════════════════════
// Marriage ledger
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
struct LedgerEntry {
    cells: BTreeMap<String, String>,
    confidences: Vec<f64>,
}

fn map_marriage_ledger(table: &TableExtractionResult) -> (Vec<RecordCandidate>, BTreeMap<String, String>) {
    let column_mapping: BTreeMap<String, String> = MARRIAGE_COLUMN_MAP
        .iter()
        .map(|(column, field)| (column.to_string(), field.to_string()))
        .collect();

    // Both tables share row indices; merge them per entry.
    let mut entries: BTreeMap<usize, LedgerEntry> = BTreeMap::new();
    for (position, t) in table.tables.iter().enumerate() {
        let positional = marriage_column_keys(position);
        for row in t.data_rows().filter(|r| r.row_index >= 2) {
            let entry = entries.entry(row.row_index).or_default();
            for cell in &row.cells {
                let key = if cell.column_key.is_empty() {
                    positional
                        .get(cell.column_index)
                        .map(|k| k.to_string())
                        .unwrap_or_else(|| column_key(cell.column_index))
                } else {
                    cell.column_key.clone()
                };
                entry.cells.insert(key, cell.content.trim().to_string());
            }
            if let Some(avg) = row_average_confidence(row).filter(|c| *c > 0.0) {
                entry.confidences.push(avg);
            }
        }
    }

    let mut candidates = Vec::new();
    for (row_index, entry) in entries {
        let value = |key: &str| entry.cells.get(key).filter(|v| !v.is_empty());

        let mut fields: BTreeMap<String, String> = MARRIAGE_COLUMN_MAP
            .iter()
            .filter_map(|(column, field)| value(*column).map(|v| (field.to_string(), v.clone())))
            .collect();

        let notes: Vec<String> = MARRIAGE_NOTES_COLUMNS
            .iter()
            .filter_map(|column| value(*column).map(|v| format!("{column}: {v}")))
            .collect();
        if !notes.is_empty() {
            fields.insert("notes".to_string(), notes.join("; "));
        }

        if !has_content(&fields) {
            tracing::debug!(row_index, "Empty ledger entry dropped");
            continue;
        }

        let confidence = mean(&entry.confidences).unwrap_or(thresholds::NEUTRAL_ROW);
        let needs_review = !fields.contains_key("groom_name") || !fields.contains_key("bride_name");

        candidates.push(RecordCandidate {
            record_type: RecordType::Marriage,
            confidence: round2(confidence),
            fields,
            source_row_index: row_index,
            needs_review,
        });
    }

    (candidates, column_mapping)
}

// ═══════════════════════════════════════════════════════════
// Generic table
// ═══════════════════════════════════════════════════════════

/// Claim fields for header cells, left to right.
///
/// A header scores a field by the longest-ratio keyword it contains
/// (`keyword chars / header chars`); the best field above the minimum wins
/// and is no longer available to later columns. Greedy, no backtracking.
pub fn infer_column_mapping(
    table: &TableExtractionResult,
    record_type: RecordType,
) -> BTreeMap<String, String> {
    let hints = header_hints(record_type);
    let mut mapping = BTreeMap::new();
    if hints.is_empty() {
        return mapping;
    }

    let Some(header) = table
        .tables
        .iter()
        .flat_map(|t| t.rows.iter())
        .find(|r| r.is_header() && !r.cells.is_empty())
    else {
        return mapping;
    };

    let mut used: Vec<&str> = Vec::new();
    for cell in &header.cells {
        let header_text = cell.content.trim().to_lowercase();
        if header_text.is_empty() {
            continue;
        }
        let header_len = header_text.chars().count() as f64;

        let mut best: Option<(&str, f64)> = None;
        for (field, keywords) in hints.iter().filter(|(f, _)| !used.contains(f)) {
            for keyword in keywords.iter().filter(|k| header_text.contains(**k)) {
                let score = keyword.chars().count() as f64 / header_len;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((*field, score));
                }
            }
        }

        if let Some((field, score)) = best {
            if score > thresholds::MIN_HEADER_MATCH {
                mapping.insert(cell_key(cell), field.to_string());
                used.push(field);
            }
        }
    }
    mapping
}

fn map_generic_table(
    table: &TableExtractionResult,
    record_type: RecordType,
) -> (Vec<RecordCandidate>, BTreeMap<String, String>, Vec<String>) {
    let column_mapping = infer_column_mapping(table, record_type);

    let mut unmapped_columns: Vec<String> = Vec::new();
    for cell in table.tables.iter().flat_map(|t| t.rows.iter()).flat_map(|r| r.cells.iter()) {
        let key = cell_key(cell);
        if !column_mapping.contains_key(&key) && !unmapped_columns.contains(&key) {
            unmapped_columns.push(key);
        }
    }

    let identifying = record_type.identifying_fields();
    let unmapped_dominate = unmapped_columns.len() > column_mapping.len();

    let mut candidates = Vec::new();
    for row in table.tables.iter().flat_map(|t| t.data_rows()) {
        let cells: BTreeMap<String, String> = row
            .cells
            .iter()
            .map(|c| (cell_key(c), c.content.trim().to_string()))
            .collect();

        let mut fields: BTreeMap<String, String> = column_mapping
            .iter()
            .filter_map(|(column, field)| {
                cells
                    .get(column)
                    .filter(|v| !v.is_empty())
                    .map(|v| (field.clone(), v.clone()))
            })
            .collect();

        let notes: Vec<&str> = unmapped_columns
            .iter()
            .filter_map(|column| cells.get(column))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        if !notes.is_empty() {
            fields.insert("notes".to_string(), notes.join(" | "));
        }

        if !has_content(&fields) {
            tracing::debug!(row_index = row.row_index, "Empty table row dropped");
            continue;
        }

        let confidence = row_average_confidence(row)
            .filter(|c| *c > 0.0)
            .unwrap_or(thresholds::NEUTRAL_ROW);
        let missing_identity = identifying.iter().any(|f| !fields.contains_key(*f));

        candidates.push(RecordCandidate {
            record_type,
            confidence: round2(confidence),
            fields,
            source_row_index: row.row_index,
            needs_review: unmapped_dominate || missing_identity,
        });
    }

    (candidates, column_mapping, unmapped_columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::{RowKind, Table};
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 22, 11, 28, 38).unwrap()
    }

    fn make_cell(row_index: usize, column_index: usize, key: &str, content: &str, confidence: Option<f64>) -> Cell {
        let mut cell = Cell::header(row_index, column_index, key, content);
        cell.confidence = confidence;
        cell
    }

    fn make_row(row_index: usize, kind: RowKind, cells: &[(&str, &str, Option<f64>)]) -> Row {
        Row {
            row_index,
            kind,
            cells: cells
                .iter()
                .enumerate()
                .map(|(i, (key, content, conf))| make_cell(row_index, i, key, content, *conf))
                .collect(),
        }
    }

    fn make_result(layout_id: &str, tables: Vec<Table>) -> TableExtractionResult {
        let mut result = TableExtractionResult::empty(layout_id, 1, 0.15, fixed_time());
        result.tables = tables;
        result
    }

    fn baptism_table() -> TableExtractionResult {
        let rows = vec![
            make_row(0, RowKind::Header, &[("col_1", "Name of Child", None), ("col_2", "Date of Birth", None), ("col_3", "Remarks", None)]),
            make_row(1, RowKind::Row, &[("col_1", "Anna Ivanova", Some(0.9)), ("col_2", "1/2/1920", Some(0.7)), ("col_3", "twin", Some(0.8))]),
            make_row(2, RowKind::Row, &[("col_1", "", None), ("col_2", "", None), ("col_3", "", None)]),
        ];
        make_result("generic_table_v1", vec![Table::new(1, 3, true, None, rows)])
    }

    #[test]
    fn no_table_is_empty_result() {
        let result = extract_record_candidates_at(None, "", RecordType::Baptism, fixed_time());
        assert!(result.candidates.is_empty());
        assert_eq!(result.detected_type, RecordType::Baptism);
        assert_eq!(result.type_confidence, 0.0);
    }

    #[test]
    fn header_inference_maps_and_folds_notes() {
        let table = baptism_table();
        let result = extract_record_candidates_at(Some(&table), "", RecordType::Baptism, fixed_time());

        assert_eq!(result.column_mapping["col_1"], "child_name");
        assert_eq!(result.column_mapping["col_2"], "date_of_birth");
        assert_eq!(result.unmapped_columns, vec!["col_3".to_string()]);

        // the blank row is dropped
        assert_eq!(result.candidates.len(), 1);
        let c = &result.candidates[0];
        assert_eq!(c.field("child_name"), Some("Anna Ivanova"));
        assert_eq!(c.field("date_of_birth"), Some("1/2/1920"));
        assert_eq!(c.field("notes"), Some("twin"));
        assert_eq!(c.source_row_index, 1);
        assert!((c.confidence - 0.8).abs() < 1e-12);
        assert!(!c.needs_review);
    }

    #[test]
    fn header_scores_prefer_longer_keyword() {
        // "date of birth" (13 chars) beats "birth" for the same header
        let table = baptism_table();
        let mapping = infer_column_mapping(&table, RecordType::Baptism);
        assert_eq!(mapping.len(), 2);
        assert!(!mapping.values().any(|f| f == "date_of_baptism"));
    }

    #[test]
    fn field_claimed_once() {
        let rows = vec![
            make_row(0, RowKind::Header, &[("col_1", "Name", None), ("col_2", "Full Name", None)]),
            make_row(1, RowKind::Row, &[("col_1", "Olga", Some(0.9)), ("col_2", "Olga P.", Some(0.9))]),
        ];
        let table = make_result("generic_table_v1", vec![Table::new(1, 2, true, None, rows)]);
        let mapping = infer_column_mapping(&table, RecordType::Funeral);
        assert_eq!(mapping["col_1"], "deceased_name");
        assert!(!mapping.contains_key("col_2"));
    }

    #[test]
    fn unknown_type_puts_everything_in_notes() {
        let table = baptism_table();
        let result = extract_record_candidates_at(Some(&table), "", RecordType::Unknown, fixed_time());
        assert!(result.column_mapping.is_empty());
        assert_eq!(result.unmapped_columns.len(), 3);
        let c = &result.candidates[0];
        assert_eq!(c.field("notes"), Some("Anna Ivanova | 1/2/1920 | twin"));
        assert!(c.needs_review);
    }

    #[test]
    fn missing_identifying_field_needs_review() {
        let rows = vec![
            make_row(0, RowKind::Header, &[("col_1", "Name of Child", None), ("col_2", "Date of Birth", None)]),
            make_row(1, RowKind::Row, &[("col_1", "", None), ("col_2", "1/2/1920", None)]),
        ];
        let table = make_result("generic_table_v1", vec![Table::new(1, 2, true, None, rows)]);
        let result = extract_record_candidates_at(Some(&table), "", RecordType::Baptism, fixed_time());
        let c = &result.candidates[0];
        assert!(c.needs_review);
        // no confidences at all: neutral default
        assert!((c.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn classifier_overrides_job_type_when_confident() {
        let table = baptism_table();
        let text = "Register of marriages: groom, bride, witnesses";
        let result = extract_record_candidates_at(Some(&table), text, RecordType::Baptism, fixed_time());
        assert_eq!(result.detected_type, RecordType::Marriage);
        assert!(result.type_confidence > 0.3);
    }

    #[test]
    fn weak_classification_keeps_job_type() {
        let (detected, confidence) = resolve_record_type("died", RecordType::Baptism);
        // one hit: 1.0 × 1/5 = 0.2, not enough to override
        assert_eq!(detected, RecordType::Baptism);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn uninformative_classifier_falls_back_to_job_type() {
        let (detected, _) = resolve_record_type("", RecordType::Funeral);
        assert_eq!(detected, RecordType::Funeral);
        let (detected, _) = resolve_record_type("", RecordType::Unknown);
        assert_eq!(detected, RecordType::Unknown);
    }

    fn marriage_tables() -> TableExtractionResult {
        let couple = Table::new(
            1,
            6,
            true,
            None,
            vec![
                make_row(0, RowKind::Header, &[("number", "Счёт", None)]),
                make_row(1, RowKind::Header, &[("number", "NUMBER", None)]),
                make_row(
                    2,
                    RowKind::Row,
                    &[
                        ("number", "12", Some(0.9)),
                        ("date", "3/14", Some(0.9)),
                        ("groom", "Ivan Petrov", Some(0.8)),
                        ("groom_parents", "", None),
                        ("bride", "Maria Orlova", Some(0.8)),
                        ("bride_parents", "Pavel, Anna", Some(0.6)),
                    ],
                ),
                make_row(
                    3,
                    RowKind::Row,
                    &[("number", "", None), ("date", "", None), ("groom", "", None), ("groom_parents", "", None), ("bride", "", None), ("bride_parents", "", None)],
                ),
            ],
        );
        let ceremony = Table::new(
            2,
            3,
            true,
            None,
            vec![
                make_row(0, RowKind::Header, &[("priest", "Кто", None)]),
                make_row(2, RowKind::Row, &[("priest", "Fr. John", Some(0.7)), ("witnesses", "", None), ("license", "#88", Some(0.9))]),
                make_row(3, RowKind::Row, &[("priest", "", None), ("witnesses", "", None), ("license", "", None)]),
            ],
        );
        make_result(MARRIAGE_LAYOUT_ID, vec![couple, ceremony])
    }

    #[test]
    fn marriage_tables_merge_by_row() {
        let table = marriage_tables();
        let result = extract_record_candidates_at(Some(&table), "", RecordType::Baptism, fixed_time());

        assert_eq!(result.detected_type, RecordType::Marriage);
        assert_eq!(result.column_mapping["groom"], "groom_name");
        assert!(result.unmapped_columns.is_empty());
        assert_eq!(result.candidates.len(), 1);

        let c = &result.candidates[0];
        assert_eq!(c.record_type, RecordType::Marriage);
        assert_eq!(c.source_row_index, 2);
        assert_eq!(c.field("groom_name"), Some("Ivan Petrov"));
        assert_eq!(c.field("officiant"), Some("Fr. John"));
        assert_eq!(c.field("date_of_marriage"), Some("3/14"));
        assert_eq!(c.field("witnesses"), None);
        assert_eq!(c.field("notes"), Some("number: 12; bride_parents: Pavel, Anna; license: #88"));
        // couple row 0.8, ceremony row 0.8
        assert!((c.confidence - 0.8).abs() < 1e-12);
        assert!(!c.needs_review);
    }

    #[test]
    fn marriage_positional_keys_when_cells_unkeyed() {
        let couple = Table::new(
            1,
            6,
            true,
            None,
            vec![make_row(2, RowKind::Row, &[("", "1", None), ("", "", None), ("", "Ivan", None)])],
        );
        let table = make_result(MARRIAGE_LAYOUT_ID, vec![couple]);
        let result = extract_record_candidates_at(Some(&table), "", RecordType::Unknown, fixed_time());
        let c = &result.candidates[0];
        assert_eq!(c.field("groom_name"), Some("Ivan"));
        assert_eq!(c.field("notes"), Some("number: 1"));
        assert!(c.needs_review);
        assert!((c.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn mapping_is_deterministic() {
        let table = baptism_table();
        let a = extract_record_candidates_at(Some(&table), "baptism", RecordType::Unknown, fixed_time());
        let b = extract_record_candidates_at(Some(&table), "baptism", RecordType::Unknown, fixed_time());
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }
}
