pub mod types;
pub mod confidence;
pub mod tokens;
pub mod rows;
pub mod column_detect;
pub mod cells;
pub mod layout;
pub mod generic_table;
pub mod marriage_ledger;
pub mod render;

pub use types::*;
pub use confidence::*;
pub use tokens::*;
pub use rows::*;
pub use column_detect::*;
pub use cells::*;
pub use layout::*;
pub use generic_table::*;
pub use marriage_ledger::*;
pub use render::*;

use thiserror::Error;

/// Caller-supplied layout configuration that cannot be used.
///
/// OCR content never produces these; noisy pages degrade to empty or
/// flagged output instead.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Column band list is empty")]
    EmptyColumnBands,

    #[error("Invalid column band {key}: [{start}, {end}]")]
    InvalidColumnBand { key: String, start: f64, end: f64 },

    #[error("Column bands {left} and {right} overlap or are out of order")]
    OverlappingColumnBands { left: String, right: String },

    #[error("Duplicate column key: {0}")]
    DuplicateColumnKey(String),

    #[error("Header Y threshold out of range: {0}")]
    InvalidHeaderThreshold(f64),

    #[error("Layout JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
