//! Tolerant field decoders for JSON written by models and no-code workflows.
//!
//! A field with an unexpected shape decodes as absent instead of failing the whole body.
//! Use with `#[serde(default, deserialize_with = "...")]`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Strings as-is; numbers and booleans as their JSON text; anything else is absent.
pub fn string<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Booleans, also written as `"true"` / `"false"`.
pub fn flag<'de, D>(d: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => Some(b),
        Value::String(s) => s.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    })
}

/// The value decoded as `T`, or absent when it has another shape.
pub fn best_effort<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(d)?;
    Ok(serde_json::from_value(value).ok())
}

/// Array items that decode as `T`; the rest are dropped. A non-array is absent.
pub fn items<'de, D, T>(d: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(values) => Some(
            values
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
        ),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pair {
        a: String,
        b: String,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Loose {
        #[serde(default, deserialize_with = "string")]
        text: Option<String>,
        #[serde(default, deserialize_with = "flag")]
        on: Option<bool>,
        #[serde(default, deserialize_with = "best_effort")]
        pair: Option<Pair>,
        #[serde(default, deserialize_with = "items")]
        pairs: Option<Vec<Pair>>,
    }

    #[test]
    fn scalars_are_coerced_to_text() {
        let l: Loose = serde_json::from_str(r#"{"text":500}"#).unwrap();
        assert_eq!(l.text.as_deref(), Some("500"));
        let l: Loose = serde_json::from_str(r#"{"text":true}"#).unwrap();
        assert_eq!(l.text.as_deref(), Some("true"));
        let l: Loose = serde_json::from_str(r#"{"text":{"x":1}}"#).unwrap();
        assert_eq!(l.text, None);
    }

    #[test]
    fn flags_accept_strings() {
        let l: Loose = serde_json::from_str(r#"{"on":"True"}"#).unwrap();
        assert_eq!(l.on, Some(true));
        let l: Loose = serde_json::from_str(r#"{"on":1}"#).unwrap();
        assert_eq!(l.on, None);
    }

    #[test]
    fn wrong_shapes_are_absent() {
        let l: Loose = serde_json::from_str(r#"{"pair":"","pairs":""}"#).unwrap();
        assert_eq!(l.pair, None);
        assert_eq!(l.pairs, None);
    }

    #[test]
    fn malformed_items_are_dropped() {
        let l: Loose =
            serde_json::from_str(r#"{"pairs":[{"a":"1","b":"2"},{"a":"only"},3]}"#).unwrap();
        assert_eq!(
            l.pairs,
            Some(vec![Pair {
                a: "1".to_string(),
                b: "2".to_string()
            }])
        );
    }
}
