use std::path::Path;

use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes, base64 encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Hash of an artifact's canonical JSON form, for a plan's `artifact_refs`.
///
/// Map-typed fields serialize in key order, so equal artifacts hash equally.
pub fn artifact_hash<T: Serialize>(artifact: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(artifact)?;
    Ok(content_hash(&json))
}

/// Hash of an artifact already written to disk.
pub fn artifact_file_hash(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(content_hash(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash(b"scoring"), content_hash(b"scoring"));
        assert_ne!(content_hash(b"scoring"), content_hash(b"scoring "));
    }

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(
            content_hash(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn artifact_hash_ignores_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("b", 2);
        a.insert("a", 1);
        let mut b = BTreeMap::new();
        b.insert("a", 1);
        b.insert("b", 2);
        assert_eq!(artifact_hash(&a).unwrap(), artifact_hash(&b).unwrap());
    }

    #[test]
    fn file_hash_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scoring_v2.json");
        std::fs::write(&path, r#"{"method":"scoring_v2"}"#).unwrap();

        let from_file = artifact_file_hash(&path).unwrap();
        assert_eq!(from_file, content_hash(br#"{"method":"scoring_v2"}"#));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(artifact_file_hash(&dir.path().join("absent.json")).is_err());
    }
}
