//! String sentinels for numbers JSON can not hold
//!
//! NaN and the infinities are written as `"NaN"`, `"infinity"`, and
//! `"-infinity"`. The module doubles as a serde `with` adaptor for `f64`
//! fields:
//!
//! ```rust
//! # use serde::{Deserialize, Serialize};
//! #[derive(Serialize, Deserialize)]
//! struct Thickness {
//!     #[serde(with = "voltools_document::sentinel")]
//!     value: f64,
//! }
//!
//! let json = serde_json::to_string(&Thickness { value: f64::INFINITY }).unwrap();
//! assert_eq!(json, r#"{"value":"infinity"}"#);
//!
//! let back: Thickness = serde_json::from_str(&json).unwrap();
//! assert_eq!(back.value, f64::INFINITY);
//! ```

// voltools modules
use voltools_utils::f;

// external crates
use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Sentinel for not-a-number
pub const NAN: &str = "NaN";

/// Sentinel for positive infinity
pub const INFINITY: &str = "infinity";

/// Sentinel for negative infinity
pub const NEG_INFINITY: &str = "-infinity";

/// Encode a number, using a sentinel string where JSON has no literal
pub fn encode(value: f64) -> Value {
    if value.is_finite() {
        Value::from(value)
    } else if value.is_nan() {
        Value::from(NAN)
    } else if value > 0.0 {
        Value::from(INFINITY)
    } else {
        Value::from(NEG_INFINITY)
    }
}

/// Decode a number or sentinel
///
/// Numeric strings are accepted as well, since older documents wrote some
/// values that way. `null` decodes as NaN. Anything else is `None`.
///
/// ```rust
/// # use voltools_document::sentinel::decode;
/// # use serde_json::json;
/// assert_eq!(decode(&json!("-infinity")), Some(f64::NEG_INFINITY));
/// assert_eq!(decode(&json!("2.5")), Some(2.5));
/// assert!(decode(&json!(null)).unwrap().is_nan());
/// assert_eq!(decode(&json!("gray")), None);
/// ```
pub fn decode(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            NAN => Some(f64::NAN),
            INFINITY => Some(f64::INFINITY),
            NEG_INFINITY => Some(f64::NEG_INFINITY),
            other => other.trim().parse::<f64>().ok(),
        },
        _ => None,
    }
}

/// True for one of the three sentinel strings
pub fn is_sentinel(value: &Value) -> bool {
    matches!(value.as_str(), Some(NAN | INFINITY | NEG_INFINITY))
}

/// Serialize an `f64` with sentinels for non-finite values
pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else if value.is_nan() {
        serializer.serialize_str(NAN)
    } else if *value > 0.0 {
        serializer.serialize_str(INFINITY)
    } else {
        serializer.serialize_str(NEG_INFINITY)
    }
}

/// Deserialize an `f64` written by [serialize()] or as a plain number
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    decode(&value).ok_or_else(|| D::Error::custom(f!("expected a number, found {value}")))
}

/// The same adaptor for `Vec<f64>` fields, applied per element
///
/// ```rust
/// # use serde::{Deserialize, Serialize};
/// #[derive(Serialize, Deserialize)]
/// struct Color {
///     #[serde(with = "voltools_document::sentinel::vec")]
///     rgba: Vec<f64>,
/// }
///
/// let json = serde_json::to_string(&Color { rgba: vec![1.0, f64::NAN] }).unwrap();
/// assert_eq!(json, r#"{"rgba":[1.0,"NaN"]}"#);
///
/// let back: Color = serde_json::from_str(&json).unwrap();
/// assert!(back.rgba[1].is_nan());
/// ```
pub mod vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&encode(*value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Value>::deserialize(deserializer)?
            .iter()
            .map(|v| decode(v).ok_or_else(|| D::Error::custom(f!("expected a number, found {v}"))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_values_stay_numbers() {
        assert_eq!(encode(1.5), Value::from(1.5));
        assert_eq!(encode(f64::NEG_INFINITY), Value::from("-infinity"));
        assert!(encode(f64::NAN).as_str() == Some(NAN));
    }

    #[test]
    fn objects_are_not_numbers() {
        assert_eq!(decode(&serde_json::json!({"0": 1})), None);
        assert!(is_sentinel(&Value::from("infinity")));
        assert!(!is_sentinel(&Value::from("1.0")));
    }
}
