//! Per-field and per-form validation.
//!
//! `validate_field` is a pure function so it can run synchronously on
//! every keystroke. Checks run in a fixed order and the first failure
//! wins: required-and-empty, then the block type's format check, then
//! each declared validation rule in declaration order.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use formrun_schema::{Block, BlockType, FieldValue, ValidationRule};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"))
}

/// Validate one answer against its block. Returns `None` when valid,
/// otherwise the message to surface inline.
pub fn validate_field(block: &Block, value: &FieldValue) -> Option<String> {
    if block.block_type.is_presentational() {
        return None;
    }
    if value.is_empty() {
        if block.required {
            return Some(format!("{} is required", block.question));
        }
        return None;
    }

    if let Some(message) = check_format(block, value) {
        return Some(message);
    }

    for rule in &block.validations {
        if let Some(message) = check_rule(rule, value) {
            return Some(message);
        }
    }
    None
}

/// Validate every given block, returning the per-field error map. Blocks
/// without an answer validate against `Empty`.
pub fn validate_all(
    blocks: &[&Block],
    values: &BTreeMap<String, FieldValue>,
) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();
    for block in blocks {
        let value = values.get(&block.id).cloned().unwrap_or_default();
        if let Some(message) = validate_field(block, &value) {
            errors.insert(block.id.clone(), message);
        }
    }
    errors
}

fn check_format(block: &Block, value: &FieldValue) -> Option<String> {
    let text = value.to_text();
    match block.block_type {
        BlockType::Email => {
            if email_regex().is_match(text.trim()) {
                None
            } else {
                Some("Please enter a valid email address".to_string())
            }
        }
        BlockType::Phone => {
            let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
            if digits >= 10 {
                None
            } else {
                Some("Please enter a valid phone number".to_string())
            }
        }
        BlockType::Number | BlockType::Rating | BlockType::Scale => {
            if value.as_number().is_some() {
                None
            } else {
                Some("Please enter a valid number".to_string())
            }
        }
        BlockType::Currency => {
            let cleaned: String = text
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            if Decimal::from_str(&cleaned).is_ok() {
                None
            } else {
                Some("Please enter a valid amount".to_string())
            }
        }
        BlockType::Date => {
            if matches!(value, FieldValue::Timestamp(_)) || parse_date(&text) {
                None
            } else {
                Some("Please enter a valid date".to_string())
            }
        }
        BlockType::Time => {
            let fmt = format_description!("[hour]:[minute]");
            if time::Time::parse(text.trim(), fmt).is_ok() {
                None
            } else {
                Some("Please enter a valid time".to_string())
            }
        }
        _ => None,
    }
}

fn parse_date(text: &str) -> bool {
    let trimmed = text.trim();
    let ymd = format_description!("[year]-[month]-[day]");
    time::Date::parse(trimmed, ymd).is_ok()
        || time::OffsetDateTime::parse(trimmed, &Rfc3339).is_ok()
}

fn check_rule(rule: &ValidationRule, value: &FieldValue) -> Option<String> {
    match rule {
        ValidationRule::Min {
            value: min,
            message,
        } => {
            let failed = match value.as_number() {
                Some(n) if matches!(value, FieldValue::Number(_)) => n < *min,
                _ => (value.to_text().chars().count() as f64) < *min,
            };
            if failed {
                Some(message.clone().unwrap_or_else(|| {
                    if matches!(value, FieldValue::Number(_)) {
                        format!("Must be at least {}", format_bound(*min))
                    } else {
                        format!("Must be at least {} characters", format_bound(*min))
                    }
                }))
            } else {
                None
            }
        }
        ValidationRule::Max {
            value: max,
            message,
        } => {
            let failed = match value.as_number() {
                Some(n) if matches!(value, FieldValue::Number(_)) => n > *max,
                _ => (value.to_text().chars().count() as f64) > *max,
            };
            if failed {
                Some(message.clone().unwrap_or_else(|| {
                    if matches!(value, FieldValue::Number(_)) {
                        format!("Must be at most {}", format_bound(*max))
                    } else {
                        format!("Must be at most {} characters", format_bound(*max))
                    }
                }))
            } else {
                None
            }
        }
        ValidationRule::Pattern {
            value: pattern,
            message,
        } => match Regex::new(pattern) {
            Ok(re) => {
                if re.is_match(&value.to_text()) {
                    None
                } else {
                    Some(
                        message
                            .clone()
                            .unwrap_or_else(|| "Invalid format".to_string()),
                    )
                }
            }
            // An unparseable pattern is inert, same policy as malformed
            // logic rules.
            Err(_) => None,
        },
        ValidationRule::Unknown => None,
    }
}

fn format_bound(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
