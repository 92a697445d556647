//! Field, row and page scores with explainable reason codes.
//!
//! field_score = 0.7 · cell confidence + 0.3 · validity, where validity starts
//! at 1 and each failed check scales it down. The row score is the weakest
//! required field (mean of all fields when the type has none), and the page
//! score is the mean row score.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::provenance::{CandidateProvenance, ProvenanceBundle, TableProvenance};
use crate::pipeline::extraction::{mean, round4, BBox};
use crate::pipeline::structuring::MultiRecordResult;
use crate::pipeline_config::ScoringOptions;

pub const SCORING_METHOD: &str = "scoring_v2";

/// Fields expected to hold a date.
pub const DATE_FIELDS: [&str; 7] = [
    "date",
    "date_of_birth",
    "date_of_baptism",
    "date_of_marriage",
    "date_of_death",
    "date_of_funeral",
    "burial_date",
];

/// Confidence assumed for a field with no confidence at all.
const NEUTRAL_CONFIDENCE: f64 = 0.5;

pub mod routing_thresholds {
    pub const ACCEPTED: f64 = 0.85;
    pub const ACCEPTED_WITH_FLAGS: f64 = 0.60;
    pub const REVIEW: f64 = 0.40;
}

static SUSPICIOUS_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[§¶†‡¤¥£€©®™◊∆∑∏∫]{2,}").unwrap());

static YMD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}[-/.]\d{1,2}[-/.]\d{1,2}").unwrap());

static DMY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}").unwrap());

static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|january|february|march|april|june|july|august|september|october|november|december)\b",
    )
    .unwrap()
});

static GREEK_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ιαν|φεβ|μαρ|απρ|μαι|ιουν|ιουλ|αυγ|σεπ|οκτ|νοε|δεκ)\b").unwrap()
});

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    DateParseFail,
    LowOcrConf,
    AmbiguousColumn,
    MissingRequired,
    ShortValue,
    SuspiciousChars,
    FieldOk,
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 7] = [
        Self::DateParseFail,
        Self::LowOcrConf,
        Self::AmbiguousColumn,
        Self::MissingRequired,
        Self::ShortValue,
        Self::SuspiciousChars,
        Self::FieldOk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DateParseFail => "DATE_PARSE_FAIL",
            Self::LowOcrConf => "LOW_OCR_CONF",
            Self::AmbiguousColumn => "AMBIGUOUS_COLUMN",
            Self::MissingRequired => "MISSING_REQUIRED",
            Self::ShortValue => "SHORT_VALUE",
            Self::SuspiciousChars => "SUSPICIOUS_CHARS",
            Self::FieldOk => "FIELD_OK",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
    pub field_name: String,
    pub cell_confidence: Option<f64>,
    pub validity_score: f64,
    pub field_score: f64,
    pub needs_review: bool,
    pub reasons: Vec<ReasonCode>,
    /// Source tokens, for highlighting.
    pub token_ids: Vec<usize>,
    pub bbox_union: Option<BBox>,
}

impl FieldScore {
    pub fn has_reason(&self, reason: ReasonCode) -> bool {
        self.reasons.contains(&reason)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowScore {
    pub candidate_index: usize,
    pub source_row_index: usize,
    pub row_score: f64,
    pub needs_review: bool,
    pub reasons: Vec<ReasonCode>,
    pub fields: Vec<FieldScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    Accepted,
    AcceptedWithFlags,
    Review,
    Retry,
}

impl Routing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::AcceptedWithFlags => "accepted_with_flags",
            Self::Review => "review",
            Self::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options in force when the page was scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringThresholds {
    pub low_ocr_conf: f64,
    pub date_required_types: Vec<String>,
    pub min_value_length: usize,
    pub field_review_threshold: f64,
    pub row_review_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub total_rows: usize,
    pub rows_need_review: usize,
    pub total_fields: usize,
    pub fields_flagged: usize,
    pub flag_counts: BTreeMap<ReasonCode, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub method: String,
    pub thresholds: ScoringThresholds,
    pub rows: Vec<RowScore>,
    #[serde(rename = "page_score_v2")]
    pub page_score: f64,
    pub routing_recommendation: Routing,
    pub summary: ScoringSummary,
    pub recorded_at: DateTime<Utc>,
}

impl ScoringResult {
    pub fn row(&self, candidate_index: usize) -> Option<&RowScore> {
        self.rows.iter().find(|r| r.candidate_index == candidate_index)
    }
}

/// Plausibility of `value` as a date: 1 for a recognizable date, 0.8 for a
/// year-like number with another number, 0 otherwise.
pub fn date_validity_score(value: &str) -> f64 {
    let t = value.trim();
    if t.chars().count() < 4 {
        return 0.0;
    }
    if YMD_RE.is_match(t) || DMY_RE.is_match(t) || MONTH_RE.is_match(t) || GREEK_MONTH_RE.is_match(t) {
        return 1.0;
    }
    let groups: Vec<&str> = DIGITS_RE.find_iter(t).map(|m| m.as_str()).collect();
    if groups.len() >= 2 && groups.iter().any(|g| g.len() >= 4) {
        return 0.8;
    }
    0.0
}

pub fn route(rows: &[RowScore], page_score: f64) -> Routing {
    let rows_need_review = rows.iter().filter(|r| r.needs_review).count();
    if rows.is_empty() {
        Routing::Review
    } else if rows_need_review == 0 && page_score >= routing_thresholds::ACCEPTED {
        Routing::Accepted
    } else if rows_need_review > 0 && page_score >= routing_thresholds::ACCEPTED_WITH_FLAGS {
        Routing::AcceptedWithFlags
    } else if page_score >= routing_thresholds::REVIEW {
        Routing::Review
    } else {
        Routing::Retry
    }
}

pub fn score_candidates(
    candidates: &MultiRecordResult,
    provenance: Option<&CandidateProvenance>,
    table_provenance: Option<&TableProvenance>,
    options: &ScoringOptions,
) -> ScoringResult {
    score_candidates_at(candidates, provenance, table_provenance, options, Utc::now())
}

/// Score every candidate field and row of a page.
///
/// Field confidence comes from the field's provenance, falling back to the
/// candidate's row confidence. Required fields come from the detected type;
/// a required field absent from a candidate scores 0.
pub fn score_candidates_at(
    candidates: &MultiRecordResult,
    provenance: Option<&CandidateProvenance>,
    table_provenance: Option<&TableProvenance>,
    options: &ScoringOptions,
    recorded_at: DateTime<Utc>,
) -> ScoringResult {
    let required: &[&str] = candidates.detected_type.required_fields();

    let field_provenance: HashMap<(usize, &str), &ProvenanceBundle> = provenance
        .map(|p| {
            p.fields
                .iter()
                .map(|f| ((f.candidate_index, f.field_name.as_str()), &f.provenance))
                .collect()
        })
        .unwrap_or_default();

    // Cells that received no token during alignment.
    let unaligned_cells: HashSet<(usize, &str)> = table_provenance
        .map(|t| {
            t.cells
                .iter()
                .filter(|c| !c.provenance.has_tokens())
                .map(|c| (c.row_index, c.column_key.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut flag_counts: BTreeMap<ReasonCode, usize> =
        ReasonCode::ALL.iter().map(|r| (*r, 0)).collect();
    let mut total_fields = 0usize;
    let mut fields_flagged = 0usize;
    let mut rows = Vec::with_capacity(candidates.candidates.len());

    for (ci, candidate) in candidates.candidates.iter().enumerate() {
        let source_row = candidate.source_row_index;
        let mut field_scores: Vec<FieldScore> = Vec::new();

        for (field_name, raw_value) in &candidate.fields {
            total_fields += 1;
            let value = raw_value.trim();
            let bundle = field_provenance.get(&(ci, field_name.as_str())).copied();
            let cell_confidence = bundle
                .and_then(|b| b.confidence)
                .or(Some(candidate.confidence));

            let mut reasons = Vec::new();
            let mut validity = 1.0;

            if cell_confidence.is_some_and(|c| c < options.low_ocr_conf) {
                reasons.push(ReasonCode::LowOcrConf);
                validity *= 0.7;
            }

            if DATE_FIELDS.contains(&field_name.as_str()) {
                let date_score = date_validity_score(value);
                if date_score == 0.0 && !value.is_empty() {
                    reasons.push(ReasonCode::DateParseFail);
                    validity *= 0.3;
                } else if date_score > 0.0 && date_score < 1.0 {
                    validity *= 0.5 + 0.5 * date_score;
                }
            }

            if required.contains(&field_name.as_str()) && value.is_empty() {
                reasons.push(ReasonCode::MissingRequired);
                validity = 0.0;
            }

            let length = value.chars().count();
            if length > 0 && length < options.min_value_length {
                reasons.push(ReasonCode::ShortValue);
                validity *= 0.8;
            }

            if SUSPICIOUS_CHARS_RE.is_match(raw_value) {
                reasons.push(ReasonCode::SuspiciousChars);
                validity *= 0.5;
            }

            if unaligned_cells.contains(&(source_row, field_name.as_str())) {
                reasons.push(ReasonCode::AmbiguousColumn);
                validity *= 0.7;
            }

            if reasons.is_empty() {
                reasons.push(ReasonCode::FieldOk);
            }

            let field_score =
                round4(0.7 * cell_confidence.unwrap_or(NEUTRAL_CONFIDENCE) + 0.3 * validity);
            let flagged = reasons.iter().any(|r| *r != ReasonCode::FieldOk);
            let needs_review = field_score < options.field_review_threshold || flagged;

            for r in &reasons {
                *flag_counts.entry(*r).or_default() += 1;
            }
            if flagged {
                fields_flagged += 1;
            }

            field_scores.push(FieldScore {
                field_name: field_name.clone(),
                cell_confidence,
                validity_score: round4(validity),
                field_score,
                needs_review,
                reasons,
                token_ids: bundle.map(|b| b.token_ids.clone()).unwrap_or_default(),
                bbox_union: bundle.and_then(|b| b.bbox_union),
            });
        }

        for field in required.iter().filter(|f| !candidate.fields.contains_key(**f)) {
            total_fields += 1;
            fields_flagged += 1;
            *flag_counts.entry(ReasonCode::MissingRequired).or_default() += 1;
            field_scores.push(FieldScore {
                field_name: field.to_string(),
                cell_confidence: None,
                validity_score: 0.0,
                field_score: 0.0,
                needs_review: true,
                reasons: vec![ReasonCode::MissingRequired],
                token_ids: Vec::new(),
                bbox_union: None,
            });
        }

        let required_scores: Vec<f64> = field_scores
            .iter()
            .filter(|f| required.contains(&f.field_name.as_str()))
            .map(|f| f.field_score)
            .collect();
        let row_score = if required_scores.is_empty() {
            let all: Vec<f64> = field_scores.iter().map(|f| f.field_score).collect();
            mean(&all).unwrap_or(0.0)
        } else {
            required_scores.iter().copied().fold(f64::INFINITY, f64::min)
        };
        let row_score = round4(row_score);

        let mut row_reasons: Vec<ReasonCode> = Vec::new();
        for r in field_scores.iter().flat_map(|f| f.reasons.iter()) {
            if *r != ReasonCode::FieldOk && !row_reasons.contains(r) {
                row_reasons.push(*r);
            }
        }
        let needs_review = row_score < options.row_review_threshold || !row_reasons.is_empty();
        if row_reasons.is_empty() {
            row_reasons.push(ReasonCode::FieldOk);
        }

        rows.push(RowScore {
            candidate_index: ci,
            source_row_index: source_row,
            row_score,
            needs_review,
            reasons: row_reasons,
            fields: field_scores,
        });
    }

    let row_scores: Vec<f64> = rows.iter().map(|r| r.row_score).collect();
    let page_score = mean(&row_scores).map(round4).unwrap_or(0.0);
    let routing_recommendation = route(&rows, page_score);
    let rows_need_review = rows.iter().filter(|r| r.needs_review).count();

    tracing::info!(
        rows = rows.len(),
        rows_need_review,
        page_score,
        routing = %routing_recommendation,
        "Candidates scored"
    );

    ScoringResult {
        method: SCORING_METHOD.to_string(),
        thresholds: ScoringThresholds {
            low_ocr_conf: options.low_ocr_conf,
            date_required_types: DATE_FIELDS.iter().map(|f| f.to_string()).collect(),
            min_value_length: options.min_value_length,
            field_review_threshold: options.field_review_threshold,
            row_review_threshold: options.row_review_threshold,
        },
        summary: ScoringSummary {
            total_rows: rows.len(),
            rows_need_review,
            total_fields,
            fields_flagged,
            flag_counts,
        },
        rows,
        page_score,
        routing_recommendation,
        recorded_at,
    }
}
