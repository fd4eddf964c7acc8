//! Runtime field values and coercion helpers.
//!
//! A `FieldValue` is what a respondent's answer to a single block looks
//! like at runtime: a string, a number, a boolean, a list of selected
//! option strings, a timestamp, or nothing. The comparison semantics the
//! logic evaluator needs (string coercion, numeric coercion, emptiness)
//! live here next to the type.

use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A single answer value.
///
/// The JSON representation matches what the builder's renderer emits:
/// string / number / bool / array-of-strings / RFC 3339 string / null.
/// Strings always deserialize as `Text`; `Timestamp` is only constructed
/// programmatically (date/time widgets) and serializes to RFC 3339.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
    Timestamp(OffsetDateTime),
    Empty,
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Empty
    }
}

impl FieldValue {
    /// Returns a human-readable type name for messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "bool",
            FieldValue::List(_) => "list",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Empty => "empty",
        }
    }

    /// True when the value counts as "not answered": nothing, an empty
    /// string, or an empty selection list. Zero and `false` are answers.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Numeric coercion. Returns `None` unless the value coerces to a
    /// finite number: numbers pass through, text parses, booleans map to
    /// 1/0, timestamps become epoch milliseconds.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Number(_) => None,
            FieldValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Timestamp(ts) => {
                Some((ts.unix_timestamp_nanos() / 1_000_000) as f64)
            }
            FieldValue::List(_) | FieldValue::Empty => None,
        }
    }

    /// String coercion used for mismatched-type comparisons. Lists join
    /// with commas, whole numbers drop the fractional point.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::List(items) => items.join(","),
            FieldValue::Timestamp(ts) => ts.format(&Rfc3339).unwrap_or_default(),
            FieldValue::Empty => String::new(),
        }
    }

    /// Convert a plain JSON value into a field value.
    ///
    /// Shapes outside the answer model (objects, non-finite numbers)
    /// collapse to `Empty` rather than erroring.
    pub fn from_json(v: &serde_json::Value) -> FieldValue {
        match v {
            serde_json::Value::Null => FieldValue::Empty,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => FieldValue::Number(f),
                _ => FieldValue::Empty,
            },
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Array(items) => {
                FieldValue::List(items.iter().map(json_item_to_string).collect())
            }
            serde_json::Value::Object(_) => FieldValue::Empty,
        }
    }

    /// Convert back to plain JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Text(s) => serde_json::Value::String(s.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|s| serde_json::Value::String(s.clone()))
                    .collect(),
            ),
            FieldValue::Timestamp(ts) => {
                serde_json::Value::String(ts.format(&Rfc3339).unwrap_or_default())
            }
            FieldValue::Empty => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Format a number the way the web runtime stringifies it: integral
/// values print without a trailing `.0`.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn json_item_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Number(n) => serializer.serialize_f64(*n),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Timestamp(ts) => {
                serializer.serialize_str(&ts.format(&Rfc3339).unwrap_or_default())
            }
            FieldValue::Empty => serializer.serialize_unit(),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        Ok(FieldValue::from_json(&v))
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_detection() {
        assert!(FieldValue::Empty.is_empty());
        assert!(FieldValue::Text(String::new()).is_empty());
        assert!(FieldValue::List(vec![]).is_empty());
        assert!(!FieldValue::Number(0.0).is_empty());
        assert!(!FieldValue::Bool(false).is_empty());
        assert!(!FieldValue::Text("x".into()).is_empty());
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(FieldValue::Number(5.0).as_number(), Some(5.0));
        assert_eq!(FieldValue::Text("  42 ".into()).as_number(), Some(42.0));
        assert_eq!(FieldValue::Text("abc".into()).as_number(), None);
        assert_eq!(FieldValue::Text("".into()).as_number(), None);
        assert_eq!(FieldValue::Bool(true).as_number(), Some(1.0));
        assert_eq!(FieldValue::List(vec!["1".into()]).as_number(), None);
        assert_eq!(FieldValue::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn text_coercion() {
        assert_eq!(FieldValue::Number(5.0).to_text(), "5");
        assert_eq!(FieldValue::Number(5.5).to_text(), "5.5");
        assert_eq!(FieldValue::Bool(true).to_text(), "true");
        assert_eq!(
            FieldValue::List(vec!["a".into(), "b".into()]).to_text(),
            "a,b"
        );
        assert_eq!(FieldValue::Empty.to_text(), "");
    }

    #[test]
    fn json_round_trip() {
        let cases = vec![
            FieldValue::Text("hello".into()),
            FieldValue::Number(3.25),
            FieldValue::Bool(false),
            FieldValue::List(vec!["a".into(), "b".into()]),
            FieldValue::Empty,
        ];
        for v in cases {
            let json = serde_json::to_value(&v).unwrap();
            let back: FieldValue = serde_json::from_value(json).unwrap();
            assert_eq!(back, v);
        }
    }

    #[test]
    fn object_json_collapses_to_empty() {
        let back: FieldValue = serde_json::from_value(serde_json::json!({"a": 1})).unwrap();
        assert_eq!(back, FieldValue::Empty);
    }

    #[test]
    fn mixed_array_elements_coerce_to_strings() {
        let back: FieldValue = serde_json::from_value(serde_json::json!(["a", 2, true])).unwrap();
        assert_eq!(
            back,
            FieldValue::List(vec!["a".into(), "2".into(), "true".into()])
        );
    }

    #[test]
    fn timestamp_serializes_as_rfc3339() {
        let ts = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let json = serde_json::to_value(FieldValue::Timestamp(ts)).unwrap();
        assert_eq!(json, serde_json::json!("2023-11-14T22:13:20Z"));
    }
}
