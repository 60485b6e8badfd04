//! Field-level encryption of structured records
//!
//! Only the named fields of a JSON object are replaced by tokens; the rest
//! stay in plaintext so they remain searchable. Composite values (objects,
//! arrays) are encrypted as their canonical JSON text so their structure
//! survives the round trip. `null` is never encrypted.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use vitae_core::{canonical_json, VitaeError, VitaeResult};

use crate::keys::TokenKeys;
use crate::token::{decrypt_text, encrypt_text};

/// Replace every field named in `sensitive` with a token.
pub fn encrypt_fields(
    keys: &TokenKeys,
    record: &Map<String, Value>,
    sensitive: &[&str],
) -> VitaeResult<Map<String, Value>> {
    let mut out = Map::with_capacity(record.len());
    for (name, value) in record {
        let stored = if sensitive.contains(&name.as_str()) && !value.is_null() {
            Value::String(encrypt_text(keys, &portable_text(value)?)?)
        } else {
            value.clone()
        };
        out.insert(name.clone(), stored);
    }
    Ok(out)
}

/// Reverse [`encrypt_fields`].
///
/// Fields listed in `composite` are parsed back from JSON text, keeping the
/// plain string if the text is not JSON. Sensitive fields that do not hold a
/// token string (null, or never encrypted) pass through unchanged.
pub fn decrypt_fields(
    keys: &TokenKeys,
    record: &Map<String, Value>,
    sensitive: &[&str],
    composite: &[&str],
) -> VitaeResult<Map<String, Value>> {
    let mut out = Map::with_capacity(record.len());
    for (name, value) in record {
        let restored = match value {
            Value::String(token) if sensitive.contains(&name.as_str()) => {
                let text = decrypt_text(keys, token).map_err(|e| {
                    VitaeError::Decryption(format!("field {name:?}: {e}"))
                })?;
                if composite.contains(&name.as_str()) {
                    serde_json::from_str(&text).unwrap_or(Value::String(text))
                } else {
                    Value::String(text)
                }
            }
            other => other.clone(),
        };
        out.insert(name.clone(), restored);
    }
    Ok(out)
}

/// Encrypt every value of `values` independently, as its JSON text.
pub fn encrypt_values(
    keys: &TokenKeys,
    values: &BTreeMap<String, Value>,
) -> VitaeResult<BTreeMap<String, String>> {
    values
        .iter()
        .map(|(name, value)| Ok((name.clone(), encrypt_text(keys, &canonical_json(value)?)?)))
        .collect()
}

/// Reverse [`encrypt_values`]; values come back with their original JSON types.
pub fn decrypt_values(
    keys: &TokenKeys,
    tokens: &BTreeMap<String, String>,
) -> VitaeResult<BTreeMap<String, Value>> {
    tokens
        .iter()
        .map(|(name, token)| {
            let text = decrypt_text(keys, token)?;
            let value = serde_json::from_str(&text).map_err(|e| {
                VitaeError::Decryption(format!("value {name:?} is not JSON after decryption: {e}"))
            })?;
            Ok((name.clone(), value))
        })
        .collect()
}

/// Text form of a value before encryption: strings as-is, everything else as JSON.
fn portable_text(value: &Value) -> VitaeResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => canonical_json(other),
    }
}
