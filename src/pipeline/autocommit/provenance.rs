//! Token → cell → field traceability.
//!
//! Three companion artifacts, none of which alter the table or candidate
//! artifacts they describe: normalized tokens with stable ids, the tokens
//! behind every table cell, and the tokens behind every candidate field.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::{mean, round4, BBox, PageDimensions, TableExtractionResult, Token};
use crate::pipeline::structuring::MultiRecordResult;

pub const TOKEN_NORMALIZE_METHOD: &str = "token_normalize_v1";
pub const TABLE_PROVENANCE_METHOD: &str = "table_provenance_v1";
pub const CANDIDATE_PROVENANCE_METHOD: &str = "record_candidates_provenance_v1";

const UNIT_PAGE: PageDimensions = PageDimensions {
    width: 1.0,
    height: 1.0,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedToken {
    pub token_id: usize,
    pub text: String,
    pub confidence: Option<f64>,
    /// Page-unit box (pixels when the page size is known).
    pub bbox_px: BBox,
    /// Fractional box clamped to [0, 1].
    pub bbox_norm: BBox,
}

impl NormalizedToken {
    fn center(&self) -> (f64, f64) {
        (
            (self.bbox_norm[0] + self.bbox_norm[2]) / 2.0,
            (self.bbox_norm[1] + self.bbox_norm[3]) / 2.0,
        )
    }

    fn area(&self) -> f64 {
        (self.bbox_norm[2] - self.bbox_norm[0]) * (self.bbox_norm[3] - self.bbox_norm[1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTokens {
    pub method: String,
    pub page_dimensions: PageDimensions,
    pub tokens: Vec<NormalizedToken>,
    pub recorded_at: DateTime<Utc>,
}

/// Source tokens of one cell or field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProvenanceBundle {
    pub token_ids: Vec<usize>,
    pub bbox_union: Option<BBox>,
    /// Area-weighted token confidence.
    pub confidence: Option<f64>,
}

impl ProvenanceBundle {
    pub fn has_tokens(&self) -> bool {
        !self.token_ids.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellProvenance {
    pub row_index: usize,
    pub column_key: String,
    pub provenance: ProvenanceBundle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProvenance {
    pub method: String,
    pub page_dimensions: PageDimensions,
    pub cells: Vec<CellProvenance>,
    pub cell_coverage_rate: f64,
    pub token_orphans_count: usize,
    pub total_tokens: usize,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub candidate_index: usize,
    pub field_name: String,
    pub provenance: ProvenanceBundle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProvenance {
    pub method: String,
    pub fields: Vec<FieldProvenance>,
    pub field_coverage_rate: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CandidateProvenance {
    /// Provenance entries of one candidate, in field order.
    pub fn fields_for(&self, candidate_index: usize) -> impl Iterator<Item = &FieldProvenance> {
        self.fields
            .iter()
            .filter(move |f| f.candidate_index == candidate_index)
    }
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

// ═══════════════════════════════════════════════════════════
// Tokens
// ═══════════════════════════════════════════════════════════

pub fn normalize_tokens_for_provenance(
    tokens: &[Token],
    page_dimensions: Option<PageDimensions>,
) -> NormalizedTokens {
    normalize_tokens_for_provenance_at(tokens, page_dimensions, Utc::now())
}

/// Assign stable ids (the normalizer's order) and clamp boxes to the page.
pub fn normalize_tokens_for_provenance_at(
    tokens: &[Token],
    page_dimensions: Option<PageDimensions>,
    recorded_at: DateTime<Utc>,
) -> NormalizedTokens {
    let page = page_dimensions.unwrap_or(UNIT_PAGE);
    let normalized = tokens
        .iter()
        .map(|t| {
            let norm = [
                clamp_unit(t.x_min),
                clamp_unit(t.y_min),
                clamp_unit(t.x_max),
                clamp_unit(t.y_max),
            ];
            NormalizedToken {
                token_id: t.id,
                text: t.text.clone(),
                confidence: t.confidence,
                bbox_px: [
                    norm[0] * page.width,
                    norm[1] * page.height,
                    norm[2] * page.width,
                    norm[3] * page.height,
                ],
                bbox_norm: norm,
            }
        })
        .collect();

    NormalizedTokens {
        method: TOKEN_NORMALIZE_METHOD.to_string(),
        page_dimensions: page,
        tokens: normalized,
        recorded_at,
    }
}

// ═══════════════════════════════════════════════════════════
// Bundles
// ═══════════════════════════════════════════════════════════

/// Area-weighted mean confidence; plain mean when the boxes have no area.
pub fn aggregate_confidence(tokens: &[&NormalizedToken]) -> Option<f64> {
    let with_conf: Vec<(f64, f64)> = tokens
        .iter()
        .filter_map(|t| t.confidence.map(|c| (c, t.area())))
        .collect();
    if with_conf.is_empty() {
        return None;
    }

    let total_area: f64 = with_conf.iter().map(|(_, a)| a).sum();
    if total_area > 0.0 {
        let weighted: f64 = with_conf.iter().map(|(c, a)| c * a).sum();
        return Some(round4(weighted / total_area));
    }
    let confidences: Vec<f64> = with_conf.iter().map(|(c, _)| *c).collect();
    mean(&confidences).map(round4)
}

/// Union of boxes, clamped to [0, 1]. `None` for no boxes.
pub fn bbox_union<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
    let mut union: Option<BBox> = None;
    for b in boxes {
        let u = union.get_or_insert([1.0, 1.0, 0.0, 0.0]);
        u[0] = u[0].min(b[0]);
        u[1] = u[1].min(b[1]);
        u[2] = u[2].max(b[2]);
        u[3] = u[3].max(b[3]);
    }
    union.map(|u| u.map(clamp_unit))
}

pub fn build_bundle(tokens: &[&NormalizedToken]) -> ProvenanceBundle {
    ProvenanceBundle {
        token_ids: tokens.iter().map(|t| t.token_id).collect(),
        bbox_union: bbox_union(tokens.iter().map(|t| &t.bbox_norm)),
        confidence: aggregate_confidence(tokens),
    }
}

// ═══════════════════════════════════════════════════════════
// Table cells
// ═══════════════════════════════════════════════════════════

pub fn build_table_provenance(
    tokens: &NormalizedTokens,
    table: &TableExtractionResult,
) -> TableProvenance {
    build_table_provenance_at(tokens, table, Utc::now())
}

/// Match tokens to every cell of `table`.
///
/// A cell with a bbox claims the tokens whose centre lies inside it (edges
/// included). A cell without one claims tokens whose centre lies in its
/// column band and whose text occurs in the cell content.
pub fn build_table_provenance_at(
    tokens: &NormalizedTokens,
    table: &TableExtractionResult,
    recorded_at: DateTime<Utc>,
) -> TableProvenance {
    let mut cells = Vec::new();
    let mut assigned: HashSet<usize> = HashSet::new();

    for row in table.tables.iter().flat_map(|t| t.rows.iter()) {
        for cell in &row.cells {
            let matched: Vec<&NormalizedToken> = match (cell.bbox, table.column_bands.get(&cell.column_key)) {
                (Some([x0, y0, x1, y1]), _) => tokens
                    .tokens
                    .iter()
                    .filter(|t| {
                        let (cx, cy) = t.center();
                        cx >= x0 && cx <= x1 && cy >= y0 && cy <= y1
                    })
                    .collect(),
                (None, Some([band_start, band_end])) => tokens
                    .tokens
                    .iter()
                    .filter(|t| {
                        let (cx, _) = t.center();
                        cx >= *band_start
                            && cx <= *band_end
                            && !cell.content.is_empty()
                            && cell.content.contains(t.text.as_str())
                    })
                    .collect(),
                (None, None) => Vec::new(),
            };

            assigned.extend(matched.iter().map(|t| t.token_id));
            cells.push(CellProvenance {
                row_index: row.row_index,
                column_key: cell.column_key.clone(),
                provenance: build_bundle(&matched),
            });
        }
    }

    let covered = cells.iter().filter(|c| c.provenance.has_tokens()).count();
    let cell_coverage_rate = if cells.is_empty() {
        0.0
    } else {
        round4(covered as f64 / cells.len() as f64)
    };
    let token_orphans_count = tokens
        .tokens
        .iter()
        .filter(|t| !assigned.contains(&t.token_id))
        .count();

    tracing::debug!(
        cells = cells.len(),
        cell_coverage_rate,
        token_orphans_count,
        "Table provenance built"
    );

    TableProvenance {
        method: TABLE_PROVENANCE_METHOD.to_string(),
        page_dimensions: table.page_dimensions.unwrap_or(UNIT_PAGE),
        cells,
        cell_coverage_rate,
        token_orphans_count,
        total_tokens: tokens.tokens.len(),
        recorded_at,
    }
}

// ═══════════════════════════════════════════════════════════
// Candidate fields
// ═══════════════════════════════════════════════════════════

pub fn build_candidate_provenance(
    table_provenance: &TableProvenance,
    candidates: &MultiRecordResult,
) -> CandidateProvenance {
    build_candidate_provenance_at(table_provenance, candidates, Utc::now())
}

/// Trace each candidate field through the column mapping to its cells.
///
/// A field no column maps to (such as `notes`) is looked up as a column key
/// of its own, which is how template-locked tables name their columns.
pub fn build_candidate_provenance_at(
    table_provenance: &TableProvenance,
    candidates: &MultiRecordResult,
    recorded_at: DateTime<Utc>,
) -> CandidateProvenance {
    let cell_index: HashMap<(usize, &str), &ProvenanceBundle> = table_provenance
        .cells
        .iter()
        .map(|c| ((c.row_index, c.column_key.as_str()), &c.provenance))
        .collect();

    let mut field_columns: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (column, field) in &candidates.column_mapping {
        field_columns.entry(field.as_str()).or_default().push(column.as_str());
    }

    let mut fields = Vec::new();
    let mut covered = 0usize;

    for (candidate_index, candidate) in candidates.candidates.iter().enumerate() {
        let row = candidate.source_row_index;
        for field_name in candidate.fields.keys() {
            let columns: Vec<&str> = match field_columns.get(field_name.as_str()) {
                Some(columns) => columns.clone(),
                None => vec![field_name.as_str()],
            };
            let bundles: Vec<&ProvenanceBundle> = columns
                .iter()
                .filter_map(|column| cell_index.get(&(row, *column)).copied())
                .collect();

            let mut token_ids: Vec<usize> = Vec::new();
            for id in bundles.iter().flat_map(|b| b.token_ids.iter()) {
                if !token_ids.contains(id) {
                    token_ids.push(*id);
                }
            }
            if !token_ids.is_empty() {
                covered += 1;
            }

            let confidences: Vec<f64> = bundles.iter().filter_map(|b| b.confidence).collect();
            fields.push(FieldProvenance {
                candidate_index,
                field_name: field_name.clone(),
                provenance: ProvenanceBundle {
                    token_ids,
                    bbox_union: bbox_union(bundles.iter().filter_map(|b| b.bbox_union.as_ref())),
                    confidence: mean(&confidences).map(round4),
                },
            });
        }
    }

    let field_coverage_rate = if fields.is_empty() {
        0.0
    } else {
        round4(covered as f64 / fields.len() as f64)
    };

    CandidateProvenance {
        method: CANDIDATE_PROVENANCE_METHOD.to_string(),
        fields,
        field_coverage_rate,
        recorded_at,
    }
}
