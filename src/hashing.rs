//! Hashing - SHA-256 Fingerprints
//!
//! Compiled programs and resolved parameter maps get stable hex digests so
//! cache hits and repeated renders can be compared byte for byte.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of a compiled program's text.
pub fn compute_program_fingerprint(text: &str) -> String {
    sha256_hex(text.as_bytes())
}

/// Order-independent hash of a serializable parameter map.
pub fn compute_parameters_hash<T: Serialize>(params: &T) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(params)?.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        // preserve_order keeps insertion order in maps, so sorting must be explicit
        let obj = json!({"z": 1, "a": 2, "m": {"y": 0, "b": 1}});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":2,"m":{"b":1,"y":0},"z":1}"#);
    }

    #[test]
    fn test_program_fingerprint_is_sha256() {
        assert_eq!(
            compute_program_fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(compute_program_fingerprint("a"), compute_program_fingerprint("a"));
        assert_ne!(compute_program_fingerprint("a"), compute_program_fingerprint("b"));
    }

    #[test]
    fn test_parameters_hash_ignores_key_order() {
        let h1 = compute_parameters_hash(&json!({"size": 5, "color": "#fff"})).unwrap();
        let h2 = compute_parameters_hash(&json!({"color": "#fff", "size": 5})).unwrap();
        assert_eq!(h1, h2);
    }
}
