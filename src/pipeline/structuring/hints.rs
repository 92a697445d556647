//! Column and header vocabularies used to map table columns to record fields.

use super::types::RecordType;

/// Marriage ledger column key → record field.
pub const MARRIAGE_COLUMN_MAP: [(&str, &str); 5] = [
    ("groom", "groom_name"),
    ("bride", "bride_name"),
    ("date", "date_of_marriage"),
    ("priest", "officiant"),
    ("witnesses", "witnesses"),
];

/// Marriage ledger columns folded into `notes` as `key: value`.
pub const MARRIAGE_NOTES_COLUMNS: [&str; 4] = ["number", "groom_parents", "bride_parents", "license"];

/// Field → lowercase header keywords, in matching priority order.
pub type HeaderHints = &'static [(&'static str, &'static [&'static str])];

const BAPTISM_HEADER_HINTS: HeaderHints = &[
    (
        "child_name",
        &["child", "name of child", "infant", "baptized", "christened", "first name", "full name", "name"],
    ),
    ("date_of_birth", &["birth", "born", "date of birth"]),
    ("place_of_birth", &["birthplace", "place of birth", "born at"]),
    ("father_name", &["father", "parent"]),
    ("mother_name", &["mother"]),
    ("address", &["address", "residence", "domicile"]),
    ("date_of_baptism", &["baptism", "baptized", "christened", "reception"]),
    ("godparents", &["godparent", "sponsor", "sponsors", "godmother", "godfather"]),
    ("performed_by", &["priest", "clergy", "officiant", "performed", "administered"]),
];

const MARRIAGE_HEADER_HINTS: HeaderHints = &[
    ("groom_name", &["groom", "husband", "bridegroom"]),
    ("bride_name", &["bride", "wife"]),
    ("date_of_marriage", &["date", "marriage date", "wedding"]),
    ("witnesses", &["witness", "best man", "maid"]),
    ("officiant", &["priest", "clergy", "officiant", "performed", "administered"]),
];

const FUNERAL_HEADER_HINTS: HeaderHints = &[
    ("deceased_name", &["deceased", "name", "decedent", "full name"]),
    ("date_of_death", &["death", "died", "date of death"]),
    ("date_of_funeral", &["funeral"]),
    ("date_of_burial", &["burial", "interment", "buried"]),
    ("place_of_burial", &["place of burial", "cemetery", "interment place"]),
    ("age_at_death", &["age"]),
    ("cause_of_death", &["cause", "cause of death"]),
    ("next_of_kin", &["kin", "relative", "family"]),
    ("officiant", &["priest", "clergy", "officiant", "performed"]),
];

pub fn header_hints(record_type: RecordType) -> HeaderHints {
    match record_type {
        RecordType::Baptism => BAPTISM_HEADER_HINTS,
        RecordType::Marriage => MARRIAGE_HEADER_HINTS,
        RecordType::Funeral => FUNERAL_HEADER_HINTS,
        RecordType::Custom | RecordType::Unknown => &[],
    }
}

pub fn marriage_field_for_column(column_key: &str) -> Option<&'static str> {
    MARRIAGE_COLUMN_MAP
        .iter()
        .find(|(column, _)| *column == column_key)
        .map(|(_, field)| *field)
}
