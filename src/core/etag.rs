//! Content fingerprints for optimistic concurrency
//!
//! Format: lowercase hex of SHA256 over a canonical encoding of the payload.
//! Each value is written as a one byte tag followed by its content; strings,
//! numbers and containers carry a 4 byte little-endian length prefix and
//! object keys are written in sorted order, so two payloads with the same
//! content always hash the same regardless of key order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque content hash of an item payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a payload
    pub fn of(payload: &Map<String, Value>) -> Self {
        let mut hasher = Sha256::new();
        write_object(&mut hasher, payload);
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a client supplied token designates this fingerprint.
    ///
    /// Accepts the raw token as well as its quoted HTTP entity-tag form
    /// (`"abc"` or `W/"abc"`).
    pub fn matches(&self, token: &str) -> bool {
        let token = token.trim();
        let token = token.strip_prefix("W/").unwrap_or(token);
        let token = token
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(token);
        token == self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Fingerprint(value)
    }
}

fn write_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u32).to_le_bytes());
}

fn write_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    write_len(hasher, bytes.len());
    hasher.update(bytes);
}

fn write_object(hasher: &mut Sha256, map: &Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    hasher.update(b"o");
    write_len(hasher, keys.len());
    for key in keys {
        write_bytes(hasher, key.as_bytes());
        write_value(hasher, &map[key]);
    }
}

fn write_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"z"),
        Value::Bool(true) => hasher.update(b"t"),
        Value::Bool(false) => hasher.update(b"f"),
        Value::Number(n) => {
            hasher.update(b"n");
            write_bytes(hasher, n.to_string().as_bytes());
        }
        Value::String(s) => {
            hasher.update(b"s");
            write_bytes(hasher, s.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"a");
            write_len(hasher, items.len());
            for item in items {
                write_value(hasher, item);
            }
        }
        Value::Object(map) => write_object(hasher, map),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_deterministic_and_key_order_independent() {
        let a = obj(json!({"id": "1", "title": "x", "meta": {"a": 1, "b": [1, 2]}}));
        let b = obj(json!({"meta": {"b": [1, 2], "a": 1}, "title": "x", "id": "1"}));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&a));
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
        assert_eq!(Fingerprint::of(&a).as_str().len(), 64);
    }

    #[test]
    fn test_any_change_alters_fingerprint() {
        let base = obj(json!({"id": "1", "title": "x", "tags": ["a", "b"]}));
        let variants = [
            json!({"id": "1", "title": "y", "tags": ["a", "b"]}),
            json!({"id": "1", "title": "x", "tags": ["b", "a"]}),
            json!({"id": "1", "title": "x", "tags": ["a", "b"], "extra": null}),
            json!({"id": "1", "title": "x", "tags": ["ab"]}),
            json!({"id": 1, "title": "x", "tags": ["a", "b"]}),
        ];
        let reference = Fingerprint::of(&base);
        for v in variants {
            assert_ne!(Fingerprint::of(&obj(v)), reference);
        }
    }

    #[test]
    fn test_matches_accepts_entity_tag_forms() {
        let fp = Fingerprint::of(&obj(json!({"id": "1"})));
        let raw = fp.to_string();
        assert!(fp.matches(&raw));
        assert!(fp.matches(&format!("\"{}\"", raw)));
        assert!(fp.matches(&format!("W/\"{}\"", raw)));
        assert!(!fp.matches("deadbeef"));
    }
}
