//! Auto-commit plans and results.
//!
//! A plan records which rows of a page pass the gate and the thresholds in
//! force at the time; results record what happened when the plan was applied.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gate::{is_row_auto_committable, RowEligibility};
use super::provenance::CandidateProvenance;
use super::scoring::ScoringResult;
use crate::pipeline_config::AutocommitThresholds;

pub const AUTOCOMMIT_METHOD: &str = "autocommit_v1";

pub fn generate_batch_id() -> String {
    Uuid::new_v4().to_string()
}

/// Top-level keys are snake_case; nested rows and thresholds stay camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocommitPlan {
    pub method: String,
    pub batch_id: String,
    pub thresholds: AutocommitThresholds,
    pub structure_score: Option<f64>,
    pub template_used: bool,
    pub eligible_rows: Vec<RowEligibility>,
    pub skipped_rows: Vec<RowEligibility>,
    pub total_candidates: usize,
    pub eligible_count: usize,
    pub skipped_count: usize,
    /// Artifact name → content hash of the inputs the plan was built from.
    pub artifact_refs: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

pub fn build_autocommit_plan(
    scoring: &ScoringResult,
    provenance: Option<&CandidateProvenance>,
    structure_score: Option<f64>,
    template_used: bool,
    artifact_refs: BTreeMap<String, String>,
    thresholds: &AutocommitThresholds,
) -> AutocommitPlan {
    build_autocommit_plan_at(
        scoring,
        provenance,
        structure_score,
        template_used,
        artifact_refs,
        thresholds,
        generate_batch_id(),
        Utc::now(),
    )
}

/// Run the gate over every scored row, in candidate order.
#[allow(clippy::too_many_arguments)]
pub fn build_autocommit_plan_at(
    scoring: &ScoringResult,
    provenance: Option<&CandidateProvenance>,
    structure_score: Option<f64>,
    template_used: bool,
    artifact_refs: BTreeMap<String, String>,
    thresholds: &AutocommitThresholds,
    batch_id: String,
    created_at: DateTime<Utc>,
) -> AutocommitPlan {
    let _span = tracing::info_span!("autocommit_plan", batch_id = %batch_id).entered();

    let (eligible_rows, skipped_rows): (Vec<RowEligibility>, Vec<RowEligibility>) = scoring
        .rows
        .iter()
        .map(|row| {
            is_row_auto_committable(
                row.candidate_index,
                scoring,
                provenance,
                structure_score,
                template_used,
                thresholds,
            )
        })
        .partition(|e| e.eligible);

    tracing::info!(
        total = scoring.rows.len(),
        eligible = eligible_rows.len(),
        skipped = skipped_rows.len(),
        template_used,
        "Auto-commit plan built"
    );

    AutocommitPlan {
        method: AUTOCOMMIT_METHOD.to_string(),
        batch_id,
        thresholds: *thresholds,
        structure_score,
        template_used,
        total_candidates: scoring.rows.len(),
        eligible_count: eligible_rows.len(),
        skipped_count: skipped_rows.len(),
        eligible_rows,
        skipped_rows,
        artifact_refs,
        created_at,
    }
}

// ═══════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowOutcome {
    Committed,
    Skipped,
    Error,
}

impl RowOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocommitRowResult {
    pub candidate_index: usize,
    pub source_row_index: i64,
    pub outcome: RowOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AutocommitRowResult {
    pub fn committed(eligibility: &RowEligibility, record_id: i64, record_type: &str, table: &str) -> Self {
        Self {
            candidate_index: eligibility.candidate_index,
            source_row_index: eligibility.source_row_index,
            outcome: RowOutcome::Committed,
            record_id: Some(record_id),
            record_type: Some(record_type.to_string()),
            table: Some(table.to_string()),
            error: None,
        }
    }

    pub fn skipped(eligibility: &RowEligibility) -> Self {
        Self {
            candidate_index: eligibility.candidate_index,
            source_row_index: eligibility.source_row_index,
            outcome: RowOutcome::Skipped,
            record_id: None,
            record_type: None,
            table: None,
            error: None,
        }
    }

    pub fn failed(eligibility: &RowEligibility, error: impl Into<String>) -> Self {
        Self {
            outcome: RowOutcome::Error,
            error: Some(error.into()),
            ..Self::skipped(eligibility)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutocommitResults {
    pub method: String,
    pub batch_id: String,
    pub job_id: i64,
    pub church_id: i64,
    pub rows: Vec<AutocommitRowResult>,
    pub committed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub created_at: DateTime<Utc>,
}

pub fn build_autocommit_results(
    batch_id: &str,
    job_id: i64,
    church_id: i64,
    rows: Vec<AutocommitRowResult>,
) -> AutocommitResults {
    build_autocommit_results_at(batch_id, job_id, church_id, rows, Utc::now())
}

pub fn build_autocommit_results_at(
    batch_id: &str,
    job_id: i64,
    church_id: i64,
    rows: Vec<AutocommitRowResult>,
    created_at: DateTime<Utc>,
) -> AutocommitResults {
    let count = |outcome: RowOutcome| rows.iter().filter(|r| r.outcome == outcome).count();
    let committed_count = count(RowOutcome::Committed);
    let skipped_count = count(RowOutcome::Skipped);
    let error_count = count(RowOutcome::Error);

    if error_count > 0 {
        tracing::warn!(batch_id, job_id, error_count, "Auto-commit rows failed");
    }
    tracing::info!(batch_id, job_id, church_id, committed_count, skipped_count, "Auto-commit results recorded");

    AutocommitResults {
        method: AUTOCOMMIT_METHOD.to_string(),
        batch_id: batch_id.to_string(),
        job_id,
        church_id,
        rows,
        committed_count,
        skipped_count,
        error_count,
        created_at,
    }
}
