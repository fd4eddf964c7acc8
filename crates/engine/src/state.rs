//! Session-volatile state and the persisted snapshot shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use formrun_schema::FieldValue;

/// The live, session-volatile state the orchestrator mutates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    /// Index into the visible-block sequence.
    pub current_step: usize,
    pub values: BTreeMap<String, FieldValue>,
    pub errors: BTreeMap<String, String>,
    pub touched: BTreeSet<String>,
    pub is_submitting: bool,
    pub is_complete: bool,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What the engine hands to the persistence layer on every save, and
/// what it gets back on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub respondent_key: String,
    pub values: BTreeMap<String, FieldValue>,
    pub current_step: usize,
    pub progress: f32,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Encode an answer map as a JSON object (block id -> plain JSON value).
pub fn values_to_json(values: &BTreeMap<String, FieldValue>) -> serde_json::Value {
    serde_json::Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Decode an answer map from a JSON object. Non-object input yields an
/// empty map (corrupt data must not break resume).
pub fn values_from_json(json: &serde_json::Value) -> BTreeMap<String, FieldValue> {
    match json {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_json_round_trip() {
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), FieldValue::Text("Ada".into()));
        values.insert("age".to_string(), FieldValue::Number(36.0));
        values.insert(
            "tags".to_string(),
            FieldValue::List(vec!["a".into(), "b".into()]),
        );
        let json = values_to_json(&values);
        assert_eq!(values_from_json(&json), values);
    }

    #[test]
    fn corrupt_values_json_yields_empty_map() {
        assert!(values_from_json(&serde_json::json!("not an object")).is_empty());
        assert!(values_from_json(&serde_json::json!(null)).is_empty());
    }

    #[test]
    fn snapshot_serde_round_trip() {
        let snap = SessionSnapshot {
            respondent_key: "r1".into(),
            values: BTreeMap::from([("q".to_string(), FieldValue::Bool(true))]),
            current_step: 3,
            progress: 75.0,
            started_at_ms: 1_000,
            resume_token: Some("tok".into()),
            metadata: None,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
