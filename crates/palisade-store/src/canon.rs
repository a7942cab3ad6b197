//! Canonical JSON serialization and envelope hashing.
//!
//! Signatures and tamper-evidence hashes must agree across implementations,
//! so the bytes being hashed cannot depend on field insertion order. The
//! canonical form serializes objects with recursively sorted keys and no
//! whitespace.

use serde_json::Value as Json;
use sha2::{Digest, Sha256};

/// Serialize a JSON value with recursively key-sorted objects.
pub fn canonical_json(value: &Json) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Json, out: &mut String) {
    match value {
        Json::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json string rendering handles escaping
                out.push_str(&Json::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Json::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// SHA-256 of the given bytes, hex-encoded.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic digest of a mutation: SHA-256 over the canonical form of
/// `{id, ontology, payload}`.
pub fn compute_envelope_hash(id: &str, ontology: &str, payload: &Json) -> String {
    let doc = serde_json::json!({
        "id": id,
        "ontology": ontology,
        "payload": payload,
    });
    sha256_hex(canonical_json(&doc).as_bytes())
}

/// Digest for delete operations, where only the id remains.
pub fn compute_envelope_hash_for_delete(id: &str) -> String {
    let doc = serde_json::json!({ "id": id });
    sha256_hex(canonical_json(&doc).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let a = json!({"b": 1, "a": {"z": true, "m": [1, {"y": 2, "x": 3}]}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"m":[1,{"x":3,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_envelope_hash_is_key_order_invariant() {
        let h1 = compute_envelope_hash("m1", "profile", &json!({"name": "ada", "age": 36}));
        let h2 = compute_envelope_hash("m1", "profile", &json!({"age": 36, "name": "ada"}));
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_envelope_hash_depends_on_content() {
        let h1 = compute_envelope_hash("m1", "profile", &json!({"name": "ada"}));
        let h2 = compute_envelope_hash("m1", "profile", &json!({"name": "grace"}));
        assert_ne!(h1, h2);
        assert_ne!(h1, compute_envelope_hash_for_delete("m1"));
    }

    #[test]
    fn test_string_escaping_is_preserved() {
        let v = json!({"quote": "she said \"hi\"", "newline": "a\nb"});
        let canon = canonical_json(&v);
        let parsed: Json = serde_json::from_str(&canon).unwrap();
        assert_eq!(parsed, v);
    }
}
