//! # Canonical Serialization
//!
//! `CanonicalBytes` is the only input accepted by the structured digest path.
//! Two logically equal values (same fields, any map insertion order) always
//! produce the same byte sequence, which is what makes evaluation body hashes
//! comparable across processes and across cache/audit storage round trips.
//!
//! ## Rules
//!
//! 1. The value is first converted to a `serde_json::Value`.
//! 2. Non-integral numbers are **rejected**. Coverage is carried as integer
//!    hundredths of a percent precisely so that this rule holds.
//! 3. The tree is serialized with `serde_jcs` (RFC 8785): sorted keys,
//!    compact separators, UTF-8.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced by RFC 8785 canonicalization of a float-free value.
///
/// The inner buffer is private; `CanonicalBytes::new()` is the sole
/// constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Canonicalize any serializable value.
    ///
    /// # Errors
    ///
    /// [`CanonicalizationError::FloatRejected`] names the JSON pointer of the
    /// first non-integral number found. [`CanonicalizationError::SerializationFailed`]
    /// wraps `serde_json` failures (e.g. maps with non-string keys).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value, &mut String::new())?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Borrow the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the byte sequence is empty. Never true for a valid JSON value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value, path: &mut String) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                return Ok(());
            }
            Err(CanonicalizationError::FloatRejected {
                path: if path.is_empty() { "/".to_string() } else { path.clone() },
                value: n.as_f64().unwrap_or(f64::NAN),
            })
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let len = path.len();
                path.push('/');
                path.push_str(&i.to_string());
                reject_floats(item, path)?;
                path.truncate(len);
            }
            Ok(())
        }
        Value::Object(map) => {
            for (k, v) in map {
                let len = path.len();
                path.push('/');
                // RFC 6901 escaping.
                path.push_str(&k.replace('~', "~0").replace('/', "~1"));
                reject_floats(v, path)?;
                path.truncate(len);
            }
            Ok(())
        }
    }
}
