//! Canonical JSON encoding and SHA-256 helpers.
//!
//! `serde_json::Map` is backed by a `BTreeMap` (the `preserve_order` feature
//! must stay disabled), so routing any value through `serde_json::Value`
//! sorts object keys recursively. Block hashes and record digests are computed
//! over this compact, key-sorted text.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::VitaeResult;

/// Serialize `value` to compact JSON with all object keys sorted.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> VitaeResult<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 over the canonical JSON form of `value`.
pub fn digest_canonical<T: Serialize + ?Sized>(value: &T) -> VitaeResult<String> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [3, 2]}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"m":[3,2],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_field_order_does_not_change_digest() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x": 1, "y": "two"}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y": "two", "x": 1}"#).unwrap();
        assert_eq!(digest_canonical(&a).unwrap(), digest_canonical(&b).unwrap());
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_float_text_is_stable() {
        let value = json!({"timestamp": 1718000000.123456});
        let text = canonical_json(&value).unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(canonical_json(&reparsed).unwrap(), text);
    }
}
