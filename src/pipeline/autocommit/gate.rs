//! Per-row auto-commit eligibility.
//!
//! A row is committed without review only when every check passes. Failed
//! checks are all reported, each as a machine-readable reason string.

use serde::{Deserialize, Serialize};

use super::provenance::CandidateProvenance;
use super::scoring::{ReasonCode, ScoringResult};
use crate::pipeline_config::AutocommitThresholds;

pub const ELIGIBLE: &str = "ELIGIBLE";
pub const NO_SCORING_DATA: &str = "NO_SCORING_DATA";
pub const NO_PROVENANCE_DATA: &str = "NO_PROVENANCE_DATA";
pub const NO_STRUCTURE_SCORE: &str = "NO_STRUCTURE_SCORE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowEligibility {
    pub candidate_index: usize,
    /// `-1` when the row has no scoring data.
    pub source_row_index: i64,
    pub eligible: bool,
    pub row_score: f64,
    pub reasons: Vec<String>,
}

/// Share of a candidate's provenance entries backed by at least one token.
/// `None` when the candidate has no entries.
pub fn provenance_coverage(provenance: &CandidateProvenance, candidate_index: usize) -> Option<f64> {
    let (total, covered) = provenance
        .fields_for(candidate_index)
        .fold((0usize, 0usize), |(total, covered), f| {
            (total + 1, covered + usize::from(f.provenance.has_tokens()))
        });
    (total > 0).then(|| covered as f64 / total as f64)
}

/// Decide whether candidate `candidate_index` may be committed unreviewed.
///
/// Template-locked pages skip the provenance and structure checks when that
/// data is absent; a structure score that is present is still enforced.
pub fn is_row_auto_committable(
    candidate_index: usize,
    scoring: &ScoringResult,
    provenance: Option<&CandidateProvenance>,
    structure_score: Option<f64>,
    template_used: bool,
    thresholds: &AutocommitThresholds,
) -> RowEligibility {
    let Some(row) = scoring.row(candidate_index) else {
        return RowEligibility {
            candidate_index,
            source_row_index: -1,
            eligible: false,
            row_score: 0.0,
            reasons: vec![NO_SCORING_DATA.to_string()],
        };
    };

    let mut reasons = Vec::new();

    if row.row_score < thresholds.auto_commit_row_threshold {
        reasons.push(format!(
            "ROW_SCORE_LOW:{:.2}<{:.2}",
            row.row_score, thresholds.auto_commit_row_threshold
        ));
    }

    for code in [ReasonCode::MissingRequired, ReasonCode::DateParseFail] {
        for field in row.fields.iter().filter(|f| f.has_reason(code)) {
            reasons.push(format!("{code}:{}", field.field_name));
        }
    }

    match provenance.and_then(|p| provenance_coverage(p, candidate_index)) {
        Some(coverage) if coverage < thresholds.required_provenance_coverage => {
            reasons.push(format!(
                "PROVENANCE_LOW:{:.2}<{:.2}",
                coverage, thresholds.required_provenance_coverage
            ));
        }
        Some(_) => {}
        None if !template_used => reasons.push(NO_PROVENANCE_DATA.to_string()),
        None => {}
    }

    match structure_score {
        Some(score) if score < thresholds.min_structure_score => {
            reasons.push(format!(
                "STRUCTURE_SCORE_LOW:{:.2}<{:.2}",
                score, thresholds.min_structure_score
            ));
        }
        Some(_) => {}
        None if !template_used => reasons.push(NO_STRUCTURE_SCORE.to_string()),
        None => {}
    }

    let eligible = reasons.is_empty();
    if eligible {
        reasons.push(ELIGIBLE.to_string());
    }

    RowEligibility {
        candidate_index,
        source_row_index: row.source_row_index as i64,
        eligible,
        row_score: row.row_score,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::autocommit::provenance::{
        FieldProvenance, ProvenanceBundle, CANDIDATE_PROVENANCE_METHOD,
    };
    use crate::pipeline::autocommit::scoring::{
        FieldScore, RowScore, Routing, ScoringSummary, ScoringThresholds, SCORING_METHOD,
    };
    use crate::pipeline_config::ThresholdOverrides;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 22, 11, 28, 38).unwrap()
    }

    fn make_field(name: &str, reasons: Vec<ReasonCode>) -> FieldScore {
        FieldScore {
            field_name: name.to_string(),
            cell_confidence: Some(0.95),
            validity_score: 1.0,
            field_score: 0.95,
            needs_review: false,
            reasons,
            token_ids: vec![],
            bbox_union: None,
        }
    }

    fn make_scoring(row_scores: &[f64]) -> ScoringResult {
        let rows = row_scores
            .iter()
            .enumerate()
            .map(|(i, score)| RowScore {
                candidate_index: i,
                source_row_index: i + 2,
                row_score: *score,
                needs_review: false,
                reasons: vec![ReasonCode::FieldOk],
                fields: vec![
                    make_field("groom_name", vec![ReasonCode::FieldOk]),
                    make_field("bride_name", vec![ReasonCode::FieldOk]),
                ],
            })
            .collect();
        ScoringResult {
            method: SCORING_METHOD.to_string(),
            thresholds: ScoringThresholds {
                low_ocr_conf: 0.7,
                date_required_types: vec![],
                min_value_length: 2,
                field_review_threshold: 0.65,
                row_review_threshold: 0.6,
            },
            rows,
            page_score: 0.9,
            routing_recommendation: Routing::Accepted,
            summary: ScoringSummary {
                total_rows: row_scores.len(),
                rows_need_review: 0,
                total_fields: row_scores.len() * 2,
                fields_flagged: 0,
                flag_counts: BTreeMap::new(),
            },
            recorded_at: fixed_time(),
        }
    }

    fn make_provenance(candidates: usize, with_tokens: bool) -> CandidateProvenance {
        let fields = (0..candidates)
            .flat_map(|ci| {
                ["groom_name", "bride_name"].map(|name| FieldProvenance {
                    candidate_index: ci,
                    field_name: name.to_string(),
                    provenance: ProvenanceBundle {
                        token_ids: if with_tokens { vec![ci] } else { vec![] },
                        bbox_union: None,
                        confidence: Some(0.9),
                    },
                })
            })
            .collect();
        CandidateProvenance {
            method: CANDIDATE_PROVENANCE_METHOD.to_string(),
            fields,
            field_coverage_rate: 1.0,
            recorded_at: fixed_time(),
        }
    }

    #[test]
    fn high_scoring_row_passes() {
        let scoring = make_scoring(&[0.95]);
        let prov = make_provenance(1, true);
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.85), false, &AutocommitThresholds::default());
        assert!(result.eligible);
        assert_eq!(result.reasons, vec!["ELIGIBLE"]);
        assert_eq!(result.source_row_index, 2);
    }

    #[test]
    fn low_row_score_fails() {
        let scoring = make_scoring(&[0.80]);
        let prov = make_provenance(1, true);
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.85), false, &AutocommitThresholds::default());
        assert!(!result.eligible);
        assert_eq!(result.reasons, vec!["ROW_SCORE_LOW:0.80<0.92"]);
    }

    #[test]
    fn low_structure_score_fails() {
        let scoring = make_scoring(&[0.95]);
        let prov = make_provenance(1, true);
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.50), false, &AutocommitThresholds::default());
        assert!(!result.eligible);
        assert_eq!(result.reasons, vec!["STRUCTURE_SCORE_LOW:0.50<0.75"]);
    }

    #[test]
    fn template_excuses_missing_structure_score() {
        let scoring = make_scoring(&[0.95]);
        let prov = make_provenance(1, true);
        let thresholds = AutocommitThresholds::default();

        let with_template = is_row_auto_committable(0, &scoring, Some(&prov), None, true, &thresholds);
        assert!(with_template.eligible);

        let without = is_row_auto_committable(0, &scoring, Some(&prov), None, false, &thresholds);
        assert_eq!(without.reasons, vec![NO_STRUCTURE_SCORE]);
    }

    #[test]
    fn template_excuses_missing_provenance() {
        let scoring = make_scoring(&[0.95]);
        let thresholds = AutocommitThresholds::default();
        assert!(is_row_auto_committable(0, &scoring, None, Some(0.9), true, &thresholds).eligible);
        let without = is_row_auto_committable(0, &scoring, None, Some(0.9), false, &thresholds);
        assert_eq!(without.reasons, vec![NO_PROVENANCE_DATA]);
    }

    #[test]
    fn custom_threshold_applies() {
        let scoring = make_scoring(&[0.85]);
        let prov = make_provenance(1, true);
        let thresholds = AutocommitThresholds::with_overrides(ThresholdOverrides {
            auto_commit_row_threshold: Some(0.80),
            ..Default::default()
        });
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.85), false, &thresholds);
        assert!(result.eligible);
    }

    #[test]
    fn failures_accumulate() {
        let mut scoring = make_scoring(&[0.40]);
        scoring.rows[0].fields.push(FieldScore {
            field_score: 0.0,
            ..make_field("date_of_marriage", vec![ReasonCode::MissingRequired])
        });
        let prov = make_provenance(1, false);
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.30), false, &AutocommitThresholds::default());
        assert!(!result.eligible);
        assert_eq!(
            result.reasons,
            vec![
                "ROW_SCORE_LOW:0.40<0.92",
                "MISSING_REQUIRED:date_of_marriage",
                "PROVENANCE_LOW:0.00<0.90",
                "STRUCTURE_SCORE_LOW:0.30<0.75",
            ]
        );
    }

    #[test]
    fn date_failures_are_named() {
        let mut scoring = make_scoring(&[0.95]);
        scoring.rows[0].fields[0].reasons = vec![ReasonCode::DateParseFail];
        let prov = make_provenance(1, true);
        let result = is_row_auto_committable(0, &scoring, Some(&prov), Some(0.9), false, &AutocommitThresholds::default());
        assert_eq!(result.reasons, vec!["DATE_PARSE_FAIL:groom_name"]);
    }

    #[test]
    fn unknown_candidate_has_no_scoring_data() {
        let scoring = make_scoring(&[0.95]);
        let result = is_row_auto_committable(5, &scoring, None, None, true, &AutocommitThresholds::default());
        assert!(!result.eligible);
        assert_eq!(result.source_row_index, -1);
        assert_eq!(result.row_score, 0.0);
        assert_eq!(result.reasons, vec![NO_SCORING_DATA]);
    }

    #[test]
    fn partial_provenance_coverage() {
        let mut prov = make_provenance(1, true);
        prov.fields[1].provenance.token_ids.clear();
        assert_eq!(provenance_coverage(&prov, 0), Some(0.5));
        assert_eq!(provenance_coverage(&prov, 1), None);
    }

    #[test]
    fn eligibility_serializes_camel_case() {
        let scoring = make_scoring(&[0.95]);
        let result = is_row_auto_committable(0, &scoring, None, None, true, &AutocommitThresholds::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["candidateIndex"], 0);
        assert_eq!(json["sourceRowIndex"], 2);
        assert_eq!(json["rowScore"], 0.95);
    }
}
