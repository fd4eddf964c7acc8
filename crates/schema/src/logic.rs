//! Conditional-logic rules: conditions gate actions against form fields.

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Condition operator.
///
/// Unknown operator strings deserialize to `Other` and never match; a
/// malformed rule must not break the rest of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    #[serde(untagged)]
    Other(String),
}

/// Action type. Unknown action strings are inert, same policy as operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Show,
    Hide,
    Skip,
    Jump,
    SetValue,
    #[serde(untagged)]
    Other(String),
}

/// A single condition: `field <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicCondition {
    pub field: String,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: FieldValue,
}

/// A single action applied when the owning rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicAction {
    #[serde(rename = "type")]
    pub action: ActionType,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

/// A rule: all conditions must match (implicit AND) for every action to
/// fire. A rule with an empty condition list never fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicRule {
    pub id: String,
    #[serde(default)]
    pub conditions: Vec<LogicCondition>,
    #[serde(default)]
    pub actions: Vec<LogicAction>,
}

impl LogicRule {
    pub fn new(id: &str) -> Self {
        LogicRule {
            id: id.to_string(),
            conditions: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn when(mut self, field: &str, op: ConditionOp, value: FieldValue) -> Self {
        self.conditions.push(LogicCondition {
            field: field.to_string(),
            op,
            value,
        });
        self
    }

    pub fn then(mut self, action: ActionType, target: &str) -> Self {
        self.actions.push(LogicAction {
            action,
            target: target.to_string(),
            value: None,
        });
        self
    }

    pub fn then_set(mut self, target: &str, value: FieldValue) -> Self {
        self.actions.push(LogicAction {
            action: ActionType::SetValue,
            target: target.to_string(),
            value: Some(value),
        });
        self
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
