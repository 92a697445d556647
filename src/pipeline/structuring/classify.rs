use serde::{Deserialize, Serialize};

use super::types::RecordType;
use crate::pipeline::extraction::round2;

/// Hits beyond this count add no further confidence.
const SATURATION_HITS: usize = 5;

// English, Greek and Russian register vocabulary, lowercase.
const BAPTISM_KEYWORDS: &[&str] = &[
    "baptism", "baptized", "baptised", "christened", "godparent", "godfather", "godmother",
    "sponsor", "βάπτιση", "βαπτίσεως", "ανάδοχος", "крещение", "крещен", "восприемник",
];

const MARRIAGE_KEYWORDS: &[&str] = &[
    "marriage", "married", "groom", "bride", "wedding", "witnesses", "γάμος", "γάμου", "νυμφίος",
    "νύμφη", "брак", "жених", "невеста", "венчание", "поручител",
];

const FUNERAL_KEYWORDS: &[&str] = &[
    "funeral", "burial", "buried", "deceased", "death", "died", "interment", "cemetery",
    "κηδεία", "θάνατος", "ταφή", "погребение", "смерть", "умерш", "кладбище",
];

/// Classification order; earlier types win ties.
const CLASSIFIED_TYPES: [(RecordType, &[&str]); 3] = [
    (RecordType::Baptism, BAPTISM_KEYWORDS),
    (RecordType::Marriage, MARRIAGE_KEYWORDS),
    (RecordType::Funeral, FUNERAL_KEYWORDS),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordClassification {
    pub suggested_type: RecordType,
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
}

/// Guess the register type of a page from its raw text.
///
/// Each keyword present (case-insensitive substring) is one hit. The type
/// with most hits wins; confidence is its share of all hits, damped until it
/// has five hits of its own.
pub fn classify_record_type(text: &str) -> RecordClassification {
    let lowered = text.to_lowercase();

    let mut total_hits = 0usize;
    let mut best: Option<(RecordType, Vec<&str>)> = None;
    for (record_type, keywords) in CLASSIFIED_TYPES {
        let matched: Vec<&str> = keywords
            .iter()
            .copied()
            .filter(|k| lowered.contains(k))
            .collect();
        total_hits += matched.len();
        let better = match &best {
            Some((_, current)) => matched.len() > current.len(),
            None => !matched.is_empty(),
        };
        if better {
            best = Some((record_type, matched));
        }
    }

    match best {
        Some((suggested_type, matched)) => {
            let hits = matched.len();
            let share = hits as f64 / total_hits as f64;
            let saturation = hits.min(SATURATION_HITS) as f64 / SATURATION_HITS as f64;
            RecordClassification {
                suggested_type,
                confidence: round2(share * saturation),
                matched_keywords: matched.into_iter().map(String::from).collect(),
            }
        }
        None => RecordClassification {
            suggested_type: RecordType::Unknown,
            confidence: 0.0,
            matched_keywords: Vec::new(),
        },
    }
}
