//! # JSON Serialization Module
//!
//! Request bodies are parsed with simd-json; responses are written with
//! serde_json.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

const JSON: &str = "application/json";

/// Parse a JSON string into `T` using simd-json
///
/// # Errors
///
/// Returns `Error::MalformedBody` if parsing fails
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();
    parse_json_bytes(&mut bytes)
}

/// Parse JSON bytes into `T` using simd-json
///
/// The buffer is used as scratch space and is left in an unspecified state.
///
/// # Errors
///
/// Returns `Error::MalformedBody` if parsing fails
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::MalformedBody {
        content_type: JSON.to_string(),
        reason: e.to_string(),
    })
}

/// Serialize a value to a JSON string
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize a value to JSON bytes
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized
pub fn to_json_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct LineItem {
        sku: String,
        quantity: i32,
    }

    #[test]
    fn test_parse_json_object() {
        let item: LineItem = parse_json(r#"{"sku": "A-1", "quantity": 3}"#).unwrap();
        assert_eq!(item.sku, "A-1");
        assert_eq!(item.quantity, 3);
    }

    #[test]
    fn test_parse_json_bytes_to_value() {
        let mut bytes = br#"{"items": [1, 2], "note": null}"#.to_vec();
        let value: Value = parse_json_bytes(&mut bytes).unwrap();
        assert_eq!(value, json!({"items": [1, 2], "note": null}));
    }

    #[test]
    fn test_to_json() {
        let item = LineItem {
            sku: "B-2".to_string(),
            quantity: 40,
        };
        let json = to_json(&item).unwrap();
        assert!(json.contains("B-2"));
        assert_eq!(to_json_vec(&item).unwrap(), json.into_bytes());
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_json::<Value>("not valid json").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedBody { ref content_type, .. } if content_type == JSON
        ));
    }
}
