pub mod config;
pub mod pipeline_config;
pub mod pipeline;

pub use pipeline::autocommit::{
    artifact_hash, build_autocommit_plan, build_autocommit_results, build_candidate_provenance,
    build_table_provenance, is_row_auto_committable, normalize_tokens_for_provenance,
    score_candidates, AutocommitPlan, AutocommitResults, CandidateProvenance, RowEligibility,
    ScoringResult, TableProvenance,
};
pub use pipeline::extraction::{
    extract_page, extract_page_at, parse_vision_document, table_to_structured_text,
    GenericTableLayout, LayoutError, MarriageLedgerLayout, TableExtractionResult, TableLayout,
};
pub use pipeline::structuring::{
    extract_record_candidates, extract_record_candidates_at, MultiRecordResult, RecordCandidate,
    RecordType,
};
pub use pipeline_config::{AutocommitThresholds, ConfigError, PipelineConfig};
