//! Property-based tests for the page pipeline.
//!
//! - Determinism: the same tokens always give byte-identical artifacts
//! - Row order: row indices strictly increase within every table
//! - Band coverage: detected bands are ordered, non-empty and disjoint
//! - Validation keeps content: flagged cells carry the unflagged text
//! - Gate monotonicity: a lower row threshold never revokes eligibility

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use ledger_ocr::pipeline::autocommit::{is_row_auto_committable, score_candidates_at};
use ledger_ocr::pipeline::extraction::{
    cluster_into_rows, detect_columns, CellValidator, GenericTableLayout, MarriageLedgerLayout,
    PageTokens, TableLayout, Token,
};
use ledger_ocr::pipeline::structuring::{MultiRecordResult, RecordCandidate, RecordType};
use ledger_ocr::pipeline_config::{
    AutocommitThresholds, ColumnDetectOptions, RowClusterOptions, ScoringOptions,
};

fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 22, 11, 28, 38).unwrap()
}

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn token_strategy() -> impl Strategy<Value = (String, f64, f64, f64, f64, Option<f64>)> {
    (
        prop::string::string_regex("[A-Za-z0-9/]{1,8}").unwrap(),
        0.0f64..0.9,
        0.01f64..0.1,
        0.0f64..0.95,
        0.005f64..0.03,
        prop::option::of(0.0f64..1.0),
    )
}

fn tokens_strategy() -> impl Strategy<Value = Vec<Token>> {
    prop::collection::vec(token_strategy(), 0..60).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(id, (text, x0, w, y0, h, conf))| {
                Token::from_bounds(id, text, conf, x0, y0, x0 + w, y0 + h, 0)
            })
            .collect()
    })
}

fn page(tokens: &[Token]) -> PageTokens<'_> {
    PageTokens {
        tokens,
        page_index: 0,
        dimensions: None,
    }
}

fn layouts() -> Vec<Box<dyn TableLayout>> {
    vec![
        Box::new(GenericTableLayout::default()),
        Box::new(MarriageLedgerLayout::default()),
    ]
}

// =============================================================================
// EXTRACTION PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn extraction_is_deterministic(tokens in tokens_strategy()) {
        for layout in layouts() {
            let a = serde_json::to_string(&layout.extract_at(&page(&tokens), fixed_time())).unwrap();
            let b = serde_json::to_string(&layout.extract_at(&page(&tokens), fixed_time())).unwrap();
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn row_indices_strictly_increase(tokens in tokens_strategy()) {
        for layout in layouts() {
            let result = layout.extract_at(&page(&tokens), fixed_time());
            for table in &result.tables {
                prop_assert_eq!(table.row_count, table.rows.len());
                for pair in table.rows.windows(2) {
                    prop_assert!(pair[0].row_index < pair[1].row_index);
                }
            }
        }
    }

    #[test]
    fn detected_bands_are_ordered_and_disjoint(tokens in tokens_strategy()) {
        let rows = cluster_into_rows(&tokens, &RowClusterOptions::default());
        let bands = detect_columns(&rows, &ColumnDetectOptions::default());

        prop_assert!(!bands.is_empty());
        for band in &bands {
            prop_assert!(band.start < band.end);
        }
        for pair in bands.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
        for t in &tokens {
            let owners = bands.iter().filter(|b| b.contains(t.x_center)).count();
            prop_assert!(owners <= 1);
        }
    }

    #[test]
    fn validation_never_changes_content(tokens in tokens_strategy()) {
        let plain = GenericTableLayout::default().extract_at(&page(&tokens), fixed_time());
        let validated = GenericTableLayout::default()
            .with_validator("col_1", CellValidator::Integer)
            .with_validator("col_2", CellValidator::Date)
            .extract_at(&page(&tokens), fixed_time());

        prop_assert_eq!(plain.tables.len(), validated.tables.len());
        for (a, b) in plain.tables.iter().zip(&validated.tables) {
            for (ra, rb) in a.rows.iter().zip(&b.rows) {
                for (ca, cb) in ra.cells.iter().zip(&rb.cells) {
                    prop_assert_eq!(&ca.content, &cb.content);
                }
            }
        }
    }
}

// =============================================================================
// GATE PROPERTIES
// =============================================================================

fn marriage_result(confidence: f64) -> MultiRecordResult {
    let mut result = MultiRecordResult::empty(RecordType::Marriage, 0.9, fixed_time());
    result.candidates.push(RecordCandidate {
        record_type: RecordType::Marriage,
        confidence,
        fields: [
            ("groom_name", "Ivan Petrov"),
            ("bride_name", "Maria Sokolova"),
            ("date_of_marriage", "12/6/1921"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        source_row_index: 2,
        needs_review: false,
    });
    result
}

proptest! {
    #[test]
    fn lower_row_threshold_never_revokes(
        confidence in 0.0f64..1.0,
        high in 0.0f64..1.0,
        cut in 0.0f64..1.0,
        structure in prop::option::of(0.0f64..1.0),
        template_used in any::<bool>(),
    ) {
        let scoring = score_candidates_at(
            &marriage_result(confidence),
            None,
            None,
            &ScoringOptions::default(),
            fixed_time(),
        );
        let strict = AutocommitThresholds {
            auto_commit_row_threshold: high,
            ..Default::default()
        };
        let lenient = AutocommitThresholds {
            auto_commit_row_threshold: high * (1.0 - cut),
            ..Default::default()
        };

        let a = is_row_auto_committable(0, &scoring, None, structure, template_used, &strict);
        let b = is_row_auto_committable(0, &scoring, None, structure, template_used, &lenient);
        prop_assert!(!a.eligible || b.eligible);
        prop_assert!(b.reasons.len() <= a.reasons.len() || a.eligible);
    }

    #[test]
    fn eligibility_matches_reasons(confidence in 0.0f64..1.0, structure in prop::option::of(0.0f64..1.0)) {
        let scoring = score_candidates_at(
            &marriage_result(confidence),
            None,
            None,
            &ScoringOptions::default(),
            fixed_time(),
        );
        let result = is_row_auto_committable(0, &scoring, None, structure, true, &AutocommitThresholds::default());
        prop_assert_eq!(result.eligible, result.reasons == vec!["ELIGIBLE".to_string()]);
        prop_assert!(!result.reasons.is_empty());
    }
}
