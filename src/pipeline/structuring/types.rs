use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Register a ledger page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Baptism,
    Marriage,
    Funeral,
    Custom,
    Unknown,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baptism => "baptism",
            Self::Marriage => "marriage",
            Self::Funeral => "funeral",
            Self::Custom => "custom",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the type names an actual register (not custom/unknown).
    pub fn is_informative(&self) -> bool {
        matches!(self, Self::Baptism | Self::Marriage | Self::Funeral)
    }

    /// Fields that identify a person; a candidate without them needs review.
    pub fn identifying_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Baptism => &["child_name"],
            Self::Marriage => &["groom_name", "bride_name"],
            Self::Funeral => &["deceased_name"],
            Self::Custom | Self::Unknown => &[],
        }
    }

    /// Fields a complete record of this type must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Baptism => &["child_name", "date_of_baptism", "date_of_birth"],
            Self::Marriage => &["groom_name", "bride_name", "date_of_marriage"],
            Self::Funeral => &["deceased_name", "date_of_death", "date_of_funeral"],
            Self::Custom | Self::Unknown => &[],
        }
    }
}

/// Job types arrive as free text; an empty value is unknown and anything
/// unrecognized is a custom register.
impl From<&str> for RecordType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "baptism" => Self::Baptism,
            "marriage" => Self::Marriage,
            "funeral" => Self::Funeral,
            "" | "unknown" => Self::Unknown,
            _ => Self::Custom,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One proposed record derived from one table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCandidate {
    pub record_type: RecordType,
    pub confidence: f64,
    pub fields: BTreeMap<String, String>,
    pub source_row_index: usize,
    pub needs_review: bool,
}

impl RecordCandidate {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Candidates for one page plus how they were derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiRecordResult {
    pub candidates: Vec<RecordCandidate>,
    pub detected_type: RecordType,
    pub type_confidence: f64,
    /// Column key → record field.
    pub column_mapping: BTreeMap<String, String>,
    pub unmapped_columns: Vec<String>,
    pub parsed_at: DateTime<Utc>,
}

impl MultiRecordResult {
    pub fn empty(detected_type: RecordType, type_confidence: f64, parsed_at: DateTime<Utc>) -> Self {
        Self {
            candidates: Vec::new(),
            detected_type,
            type_confidence,
            column_mapping: BTreeMap::new(),
            unmapped_columns: Vec::new(),
            parsed_at,
        }
    }
}
