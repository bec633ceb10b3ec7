use crate::error::{CoreError, CoreResult};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// Canonical form used for content hashes and journal hashes:
// object keys sorted, compact separators, integer-only numbers.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let sorted = sort_keys(serde_json::to_value(value)?)?;
    Ok(serde_json::to_vec(&sorted)?)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn content_hash<T: Serialize>(value: &T) -> CoreResult<String> {
    Ok(sha256_hex(&to_canonical_bytes(value)?))
}

fn sort_keys(value: Value) -> CoreResult<Value> {
    Ok(match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k, sort_keys(v)?);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(sort_keys)
                .collect::<CoreResult<Vec<_>>>()?,
        ),
        Value::Number(n) if !(n.is_i64() || n.is_u64()) => {
            return Err(CoreError::DeterminismViolation(format!(
                "non-integer number {} in canonical JSON",
                n
            )))
        }
        other => other,
    })
}
