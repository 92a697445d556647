//! Word-token normalization from vision provider output.
//!
//! The provider document is loosely shaped: every level may be missing, and
//! words carry either `text` or a list of `symbols`. Parsing never fails; a
//! document that cannot be read at all behaves like a document with no pages.

use serde::{Deserialize, Serialize};

use super::types::{PageDimensions, Token};

// ═══════════════════════════════════════════════════════════
// Provider document model
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionDocument {
    pub pages: Vec<VisionPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionPage {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub blocks: Vec<VisionBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionBlock {
    pub paragraphs: Vec<VisionParagraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionParagraph {
    pub words: Vec<VisionWord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VisionWord {
    pub text: Option<String>,
    pub confidence: Option<f64>,
    pub bounding_box: Option<BoundingPoly>,
    pub symbols: Vec<VisionSymbol>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundingPoly {
    pub vertices: Vec<Vertex>,
}

/// Pixel-space vertex. Providers omit zero coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vertex {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionSymbol {
    pub text: Option<String>,
}

impl VisionWord {
    /// Word text, assembled from symbols when the provider left `text` empty.
    pub fn resolved_text(&self) -> String {
        match self.text.as_deref() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self
                .symbols
                .iter()
                .filter_map(|s| s.text.as_deref())
                .collect(),
        }
    }
}

impl VisionPage {
    pub fn dimensions(&self) -> Option<PageDimensions> {
        match (usable_extent(self.width), usable_extent(self.height)) {
            (Some(width), Some(height)) => Some(PageDimensions { width, height }),
            _ => None,
        }
    }
}

fn usable_extent(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

// ═══════════════════════════════════════════════════════════
// Parsing and token extraction
// ═══════════════════════════════════════════════════════════

/// Parse provider JSON. Malformed input yields an empty document.
pub fn parse_vision_document(json: &str) -> VisionDocument {
    match serde_json::from_str::<VisionDocument>(json) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed vision document, treating as empty");
            VisionDocument::default()
        }
    }
}

/// Same as [`parse_vision_document`] for an already-decoded JSON value.
pub fn vision_document_from_value(value: serde_json::Value) -> VisionDocument {
    match serde_json::from_value::<VisionDocument>(value) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed vision document, treating as empty");
            VisionDocument::default()
        }
    }
}

/// Page dimensions of `page_index`, when the provider reported both.
pub fn page_dimensions(doc: &VisionDocument, page_index: usize) -> Option<PageDimensions> {
    doc.pages.get(page_index).and_then(VisionPage::dimensions)
}

/// Flatten one page into normalized word tokens.
///
/// Words with blank text or fewer than four vertices are skipped. Vertex
/// coordinates are divided by the page size (1 when absent), so every bbox
/// field is a fraction of the page. Token ids follow document order.
pub fn extract_word_tokens(doc: &VisionDocument, page_index: usize) -> Vec<Token> {
    let Some(page) = doc.pages.get(page_index) else {
        return Vec::new();
    };

    let w = usable_extent(page.width).unwrap_or(1.0);
    let h = usable_extent(page.height).unwrap_or(1.0);
    let mut tokens = Vec::new();

    let words = page
        .blocks
        .iter()
        .flat_map(|b| b.paragraphs.iter())
        .flat_map(|p| p.words.iter());

    for word in words {
        let text = word.resolved_text();
        if text.trim().is_empty() {
            continue;
        }

        let vertices = match &word.bounding_box {
            Some(poly) if poly.vertices.len() >= 4 => &poly.vertices,
            _ => continue,
        };

        let xs = vertices.iter().map(|v| v.x.unwrap_or(0.0));
        let ys = vertices.iter().map(|v| v.y.unwrap_or(0.0));
        let x_min = xs.clone().fold(f64::INFINITY, f64::min) / w;
        let x_max = xs.fold(f64::NEG_INFINITY, f64::max) / w;
        let y_min = ys.clone().fold(f64::INFINITY, f64::min) / h;
        let y_max = ys.fold(f64::NEG_INFINITY, f64::max) / h;

        tokens.push(Token::from_bounds(
            tokens.len(),
            text,
            word.confidence,
            x_min,
            y_min,
            x_max,
            y_max,
            page_index,
        ));
    }

    tracing::debug!(page = page_index, tokens = tokens.len(), "Word tokens extracted");
    tokens
}

/// Concatenated page text, one word per space. Used for record-type
/// classification when no separate full-text annotation is available.
pub fn page_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
