//! Block (question) definitions.

use serde::{Deserialize, Serialize};

/// The widget/answer kind of a block.
///
/// Unrecognized type strings from newer builder versions land in `Other`
/// and render/validate as plain text rather than failing the whole schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    LongText,
    Email,
    Phone,
    Number,
    Currency,
    Date,
    Time,
    Dropdown,
    SingleSelect,
    MultiSelect,
    Checkbox,
    Rating,
    Scale,
    FileUpload,
    Signature,
    Payment,
    Statement,
    #[serde(untagged)]
    Other(String),
}

impl BlockType {
    /// Blocks that collect no answer (display-only).
    pub fn is_presentational(&self) -> bool {
        matches!(self, BlockType::Statement)
    }
}

/// A declared per-block validation rule, checked in declaration order
/// after the required/format checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Minimum length (text answers) or magnitude (numeric answers).
    Min {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Maximum length (text answers) or magnitude (numeric answers).
    Max {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Regular-expression test against the text form of the answer.
    Pattern {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Forward-compatible: rule types this runtime does not know are inert.
    #[serde(other)]
    Unknown,
}

/// A single question within a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Free-form widget properties: options, min/max, rows, currency…
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationRule>,
}

impl Block {
    /// Minimal constructor used by tests and the CLI inspector.
    pub fn new(id: &str, block_type: BlockType, question: &str) -> Self {
        Block {
            id: id.to_string(),
            block_type,
            question: question.to_string(),
            description: None,
            placeholder: None,
            required: false,
            properties: serde_json::Map::new(),
            validations: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validations.push(rule);
        self
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_round_trip() {
        let json = serde_json::json!("multi_select");
        let bt: BlockType = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(bt, BlockType::MultiSelect);
        assert_eq!(serde_json::to_value(&bt).unwrap(), json);
    }

    #[test]
    fn unknown_block_type_is_preserved() {
        let bt: BlockType = serde_json::from_value(serde_json::json!("hologram")).unwrap();
        assert_eq!(bt, BlockType::Other("hologram".into()));
    }

    #[test]
    fn block_defaults() {
        let block: Block = serde_json::from_value(serde_json::json!({
            "id": "q1",
            "type": "text",
            "question": "Your name?"
        }))
        .unwrap();
        assert!(!block.required);
        assert!(block.validations.is_empty());
        assert!(block.properties.is_empty());
    }

    #[test]
    fn validation_rule_parsing() {
        let rules: Vec<ValidationRule> = serde_json::from_value(serde_json::json!([
            {"type": "min", "value": 3},
            {"type": "pattern", "value": "^[a-z]+$", "message": "lowercase only"},
            {"type": "luhn_checksum"}
        ]))
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert!(matches!(rules[0], ValidationRule::Min { value, .. } if value == 3.0));
        assert!(matches!(rules[2], ValidationRule::Unknown));
    }
}
