use super::types::TableExtractionResult;

fn count_or_unknown(n: usize) -> String {
    if n == 0 {
        "?".to_string()
    } else {
        n.to_string()
    }
}

/// Plain-text view of an extraction result: pipe-delimited rows with each
/// header row underlined. `None` when the page has no tables.
///
/// Derived only from `result`, so the same artifact always renders the same text.
pub fn table_to_structured_text(result: &TableExtractionResult) -> Option<String> {
    if result.tables.is_empty() {
        return None;
    }

    let mut lines: Vec<String> = vec![
        format!("=== Structured Table Extraction ({}) ===", result.layout_id),
        format!(
            "Columns: {} | Rows: {}",
            count_or_unknown(result.columns_detected),
            count_or_unknown(result.data_rows)
        ),
        String::new(),
    ];

    for table in &result.tables {
        lines.push(format!(
            "--- Table {} ({} columns, {} rows) ---",
            table.table_number,
            table.column_count,
            table.row_count
        ));
        for row in &table.rows {
            let line = row
                .cells
                .iter()
                .map(|c| c.content.trim())
                .collect::<Vec<_>>()
                .join(" | ");
            let width = line.chars().count();
            lines.push(line);
            if row.is_header() {
                lines.push("-".repeat(width));
            }
        }
        lines.push(String::new());
    }

    Some(lines.join("\n"))
}
