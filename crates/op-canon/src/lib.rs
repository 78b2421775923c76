// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic canonical byte encoding of signable objects.
//!
//! Canonicalization is a bijection over the signable fields of a [`Layout`]
//! or [`Link`](https://docs.rs/op-model) (or any other `Serialize` value):
//! object keys are emitted in Unicode code-point order, there is no
//! insignificant whitespace, strings carry standard JSON escaping, and
//! integers are emitted without a decimal point. Floating point is rejected
//! outright — signable fields never need it, and it would make bit-for-bit
//! agreement between signer and verifier host-dependent.
//!
//! Signing and verification MUST call [`canonicalize`] on the same logical
//! value and compare/sign the resulting bytes; this crate is the single
//! place that encoding is allowed to happen.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Errors raised while canonicalizing or decoding a signable value.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The value could not be converted to or from JSON at all.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A floating-point number was found in a signable field.
    ///
    /// This also covers non-finite values (`NaN`/`Infinity`): those can only
    /// reach this encoder already wrapped as a JSON number, and any JSON
    /// number that is not exactly representable as an integer is rejected
    /// here regardless of finiteness.
    #[error("floating-point value at {path} is not permitted in a signable field")]
    FloatNotAllowed {
        /// Dot/bracket path to the offending value, e.g. `steps[0].threshold`.
        path: String,
    },

    /// A JSON object contained a non-string key.
    ///
    /// Unreachable when encoding through [`serde_json::Value`] (JSON object
    /// keys are always strings), kept as an explicit variant since a
    /// future non-JSON encoder could hit it directly.
    #[error("non-string mapping key at {path}")]
    NonStringKey {
        /// Dot/bracket path to the offending mapping.
        path: String,
    },
}

/// Canonicalize `value` into its deterministic byte encoding.
///
/// # Errors
///
/// Returns [`EncodeError::Json`] if `value` cannot be serialized to JSON at
/// all, or [`EncodeError::FloatNotAllowed`] if any field holds a
/// floating-point number.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let v = serde_json::to_value(value)?;
    validate(&v, "$")?;
    // serde_json's `Map` is a `BTreeMap<String, Value>` by default, so
    // `to_vec` already emits keys in code-point order with no insignificant
    // whitespace. Integers serialize without a decimal point as long as the
    // float check above passed.
    Ok(serde_json::to_vec(&v)?)
}

/// Like [`canonicalize`], but returns a `String` (the bytes are always
/// valid UTF-8 for any value this function accepts).
///
/// # Errors
///
/// Same as [`canonicalize`].
pub fn canonicalize_str<T: Serialize>(value: &T) -> Result<String, EncodeError> {
    let bytes = canonicalize(value)?;
    // serde_json never emits invalid UTF-8.
    Ok(String::from_utf8(bytes).expect("canonical JSON is always valid UTF-8"))
}

/// Decode a canonical byte string back into `T`.
///
/// # Errors
///
/// Returns [`EncodeError::Json`] if `bytes` is not valid JSON for `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn validate(value: &Value, path: &str) -> Result<(), EncodeError> {
    match value {
        Value::Number(n) => {
            if n.is_f64() {
                return Err(EncodeError::FloatNotAllowed {
                    path: path.to_string(),
                });
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                validate(item, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (k, v) in map {
                validate(v, &format!("{path}.{k}"))?;
            }
            Ok(())
        }
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_by_code_point() {
        let v = json!({"b": 1, "a": 2, "ab": 3, "A": 4});
        let bytes = canonicalize(&v).unwrap();
        let s = String::from_utf8(bytes).unwrap();
        // 'A' (0x41) < 'a' (0x61) < "ab" < "b"
        assert_eq!(s, r#"{"A":4,"a":2,"ab":3,"b":1}"#);
    }

    #[test]
    fn integers_have_no_decimal_point() {
        let v = json!({"threshold": 2, "count": 0});
        let s = canonicalize_str(&v).unwrap();
        assert!(s.contains("\"threshold\":2"));
        assert!(!s.contains('.'));
    }

    #[test]
    fn rejects_floats() {
        let v = json!({"ratio": 1.5});
        let err = canonicalize(&v).unwrap_err();
        assert!(matches!(err, EncodeError::FloatNotAllowed { .. }));
    }

    #[test]
    fn rejects_nested_floats() {
        let v = json!({"steps": [{"weight": 0.25}]});
        let err = canonicalize(&v).unwrap_err();
        match err {
            EncodeError::FloatNotAllowed { path } => assert_eq!(path, "$.steps[0].weight"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn integral_floats_are_still_rejected() {
        // serde_json represents `1.0` as a float Number even though it has
        // no fractional part; the signable encoding must still reject it.
        let v: Value = serde_json::from_str("1.0").unwrap();
        let err = validate(&v, "$").unwrap_err();
        assert!(matches!(err, EncodeError::FloatNotAllowed { .. }));
    }

    #[test]
    fn no_insignificant_whitespace() {
        let v = json!({"a": [1, 2, 3], "b": "x"});
        let s = canonicalize_str(&v).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn decode_is_inverse_of_canonicalize_for_accepted_values() {
        let original = json!({"name": "write-code", "threshold": 1, "pubkeys": ["abc"]});
        let bytes = canonicalize(&original).unwrap();
        let decoded: Value = decode(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn same_logical_value_encodes_identically_regardless_of_source_key_order() {
        let a = json!({"x": 1, "y": 2});
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    proptest::proptest! {
        #[test]
        fn canonicalization_is_deterministic(n in 0i64..1_000_000, s in "[a-z]{1,8}") {
            let v = json!({ s.clone(): n });
            let first = canonicalize(&v).unwrap();
            let second = canonicalize(&v).unwrap();
            proptest::prop_assert_eq!(first, second);
        }
    }
}
