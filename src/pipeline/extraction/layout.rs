use chrono::{DateTime, Utc};

use super::tokens::{extract_word_tokens, page_dimensions, VisionDocument};
use super::types::{PageDimensions, TableExtractionResult, Token};

/// Tokens of one page plus what the layouts need to know about the page.
#[derive(Debug, Clone, Copy)]
pub struct PageTokens<'a> {
    pub tokens: &'a [Token],
    /// Zero-based page index in the provider document.
    pub page_index: usize,
    pub dimensions: Option<PageDimensions>,
}

/// A strategy that turns page tokens into tables.
///
/// Every implementation yields the same [`TableExtractionResult`] contract,
/// so mapping and scoring never look at which layout ran.
pub trait TableLayout {
    fn layout_id(&self) -> &'static str;

    fn extract_at(&self, page: &PageTokens<'_>, extracted_at: DateTime<Utc>) -> TableExtractionResult;

    fn extract(&self, page: &PageTokens<'_>) -> TableExtractionResult {
        self.extract_at(page, Utc::now())
    }
}

/// Normalize one page of a provider document and run `layout` on it.
pub fn extract_page_at(
    layout: &dyn TableLayout,
    doc: &VisionDocument,
    page_index: usize,
    extracted_at: DateTime<Utc>,
) -> TableExtractionResult {
    let _span = tracing::info_span!("extract_page", layout_id = layout.layout_id(), page_index)
        .entered();

    let tokens = extract_word_tokens(doc, page_index);
    let page = PageTokens {
        tokens: &tokens,
        page_index,
        dimensions: page_dimensions(doc, page_index),
    };
    let result = layout.extract_at(&page, extracted_at);

    tracing::info!(
        layout_id = %result.layout_id,
        total_tokens = result.total_tokens,
        data_rows = result.data_rows,
        tables = result.tables.len(),
        "Table extraction complete"
    );
    result
}

pub fn extract_page(
    layout: &dyn TableLayout,
    doc: &VisionDocument,
    page_index: usize,
) -> TableExtractionResult {
    extract_page_at(layout, doc, page_index, Utc::now())
}
