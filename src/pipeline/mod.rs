pub mod extraction; // Tokens → rows → columns → tables
pub mod structuring; // Tables → record candidates
pub mod autocommit; // Provenance, scoring, eligibility gate
