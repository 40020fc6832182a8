//! Hashing - SHA-256 fingerprints for plans, artifacts and manifests
//!
//! Identical inputs must hash identically, so structured values go through
//! canonical JSON (sorted keys, no whitespace) before hashing.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Serialize with object keys sorted at every depth and no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(serde_json::to_value(value)?))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(fields.into_iter().map(|(k, v)| (k, canonicalize(v))).collect::<Map<_, _>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// SHA-256 over the canonical JSON form of `value`.
pub fn content_fingerprint<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// Content hash of a render run: run id, output source, canonical entries
/// and engine version, colon separated.
pub fn compute_run_hash(
    run_id: &str,
    output_source: &str,
    entries: &impl Serialize,
    engine_version: &str,
) -> Result<String, serde_json::Error> {
    let entries = canonical_json(entries)?;
    let mut hasher = Sha256::new();
    for (i, part) in [run_id, output_source, entries.as_str(), engine_version].iter().enumerate() {
        if i > 0 {
            hasher.update(b":");
        }
        hasher.update(part.as_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let obj = json!({"z": 1, "a": {"y": [{"k": 1, "b": 2}], "c": null}});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":{"c":null,"y":[{"b":2,"k":1}]},"z":1}"#);
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = json!({"q_id": "Q1", "model_id": "ARRAYS"});
        let b = json!({"model_id": "ARRAYS", "q_id": "Q1"});
        assert_eq!(content_fingerprint(&a).unwrap(), content_fingerprint(&b).unwrap());
    }

    #[test]
    fn run_hash_depends_on_entries() {
        let a = json!([{"q_id": "Q1", "svg_sha256": "aa"}]);
        let b = json!([{"q_id": "Q1", "svg_sha256": "bb"}]);
        let h1 = compute_run_hash("run", "out.json", &a, "1.0.0").unwrap();
        let h2 = compute_run_hash("run", "out.json", &a, "1.0.0").unwrap();
        let h3 = compute_run_hash("run", "out.json", &b, "1.0.0").unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }
}
