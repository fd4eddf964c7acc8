//! Top-level form schema: pages, settings, theme, logic.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::logic::LogicRule;

/// A page of blocks. Forms without explicit pages use the flat block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// Display settings for the runtime shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSettings {
    #[serde(default = "default_true")]
    pub show_progress_bar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thank_you_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FormSettings {
    fn default() -> Self {
        FormSettings {
            show_progress_bar: true,
            submit_label: None,
            thank_you_html: None,
            redirect_url: None,
        }
    }
}

/// Visual theme. The runtime never interprets these; they pass through to
/// the rendering layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_color: Option<String>,
}

/// The immutable-per-session description of a published form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<Page>,
    /// Legacy no-pages mode. Ignored when `pages` is non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub settings: FormSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logic: Vec<LogicRule>,
}

fn default_version() -> u32 {
    1
}

/// A structural problem found by [`FormSchema::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaIssue {
    /// Two blocks share an id.
    DuplicateBlockId { id: String },
    /// A logic condition references a block id that does not exist.
    UnknownConditionField { rule_id: String, field: String },
    /// A logic action targets a block id that does not exist.
    UnknownActionTarget { rule_id: String, target: String },
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaIssue::DuplicateBlockId { id } => {
                write!(f, "duplicate block id: {}", id)
            }
            SchemaIssue::UnknownConditionField { rule_id, field } => {
                write!(f, "rule '{}' condition references unknown field: {}", rule_id, field)
            }
            SchemaIssue::UnknownActionTarget { rule_id, target } => {
                write!(f, "rule '{}' action targets unknown field: {}", rule_id, target)
            }
        }
    }
}

impl FormSchema {
    pub fn new(id: &str) -> Self {
        FormSchema {
            id: id.to_string(),
            version: 1,
            pages: Vec::new(),
            blocks: Vec::new(),
            settings: FormSettings::default(),
            theme: None,
            logic: Vec::new(),
        }
    }

    /// The ordered question list: pages win over the flat block list when
    /// both are present.
    pub fn effective_blocks(&self) -> Vec<&Block> {
        if !self.pages.is_empty() {
            self.pages.iter().flat_map(|p| p.blocks.iter()).collect()
        } else {
            self.blocks.iter().collect()
        }
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.effective_blocks().into_iter().find(|b| b.id == id)
    }

    /// Structural checks the builder runs before publishing: block-id
    /// uniqueness across the whole schema, and logic references resolving
    /// to real blocks.
    pub fn check(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for block in self.effective_blocks() {
            if !seen.insert(block.id.as_str()) {
                issues.push(SchemaIssue::DuplicateBlockId {
                    id: block.id.clone(),
                });
            }
        }
        for rule in &self.logic {
            for cond in &rule.conditions {
                if !seen.contains(cond.field.as_str()) {
                    issues.push(SchemaIssue::UnknownConditionField {
                        rule_id: rule.id.clone(),
                        field: cond.field.clone(),
                    });
                }
            }
            for action in &rule.actions {
                if !seen.contains(action.target.as_str()) {
                    issues.push(SchemaIssue::UnknownActionTarget {
                        rule_id: rule.id.clone(),
                        target: action.target.clone(),
                    });
                }
            }
        }
        issues
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockType;

    fn schema_with_pages() -> FormSchema {
        let mut schema = FormSchema::new("f1");
        schema.pages = vec![
            Page {
                id: "p1".into(),
                title: None,
                blocks: vec![Block::new("name", BlockType::Text, "Name?")],
            },
            Page {
                id: "p2".into(),
                title: Some("Contact".into()),
                blocks: vec![Block::new("email", BlockType::Email, "Email?")],
            },
        ];
        schema.blocks = vec![Block::new("legacy", BlockType::Text, "ignored")];
        schema
    }

    #[test]
    fn pages_win_over_flat_blocks() {
        let schema = schema_with_pages();
        let ids: Vec<&str> = schema
            .effective_blocks()
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec!["name", "email"]);
    }

    #[test]
    fn flat_blocks_used_without_pages() {
        let mut schema = FormSchema::new("f2");
        schema.blocks = vec![Block::new("only", BlockType::Text, "q")];
        let ids: Vec<&str> = schema
            .effective_blocks()
            .iter()
            .map(|b| b.id.as_str())
            .collect();
        assert_eq!(ids, vec!["only"]);
    }

    #[test]
    fn check_reports_duplicates_and_dangling_refs() {
        let mut schema = FormSchema::new("f3");
        schema.blocks = vec![
            Block::new("a", BlockType::Text, "A"),
            Block::new("a", BlockType::Text, "A again"),
        ];
        schema.logic = vec![LogicRule::new("r1")
            .when("ghost", crate::logic::ConditionOp::Equals, crate::FieldValue::Empty)
            .then(crate::logic::ActionType::Hide, "phantom")];
        let issues = schema.check();
        assert_eq!(issues.len(), 3);
        assert!(issues
            .iter()
            .any(|i| matches!(i, SchemaIssue::DuplicateBlockId { id } if id == "a")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, SchemaIssue::UnknownConditionField { field, .. } if field == "ghost")));
        assert!(issues
            .iter()
            .any(|i| matches!(i, SchemaIssue::UnknownActionTarget { target, .. } if target == "phantom")));
    }

    #[test]
    fn schema_json_round_trip() {
        let schema = schema_with_pages();
        let json = schema.to_json().unwrap();
        let back = FormSchema::from_json(&json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn minimal_schema_parses_with_defaults() {
        let schema = FormSchema::from_json(r#"{"id": "bare"}"#).unwrap();
        assert_eq!(schema.version, 1);
        assert!(schema.settings.show_progress_bar);
        assert!(schema.effective_blocks().is_empty());
    }
}
