//! Conditional-logic evaluation.
//!
//! Rules are evaluated independently and in schema order on every value
//! change. All conditions of a rule must match (implicit AND) for its
//! actions to fire; a rule with no conditions never fires, which guards
//! against accidental "always fire" rules from malformed data.
//!
//! Effects fold cumulatively in evaluation order: the hidden-set is
//! recomputed from scratch each pass with last-wins show/hide per target,
//! `set_value` overrides become visible to conditions evaluated later in
//! the same pass, and only the first `skip`/`jump` per pass is honored.
//!
//! Malformed rules are inert, never errors: an unknown operator compares
//! false, an unknown action type is ignored.

use std::collections::{BTreeMap, BTreeSet};

use formrun_schema::{ActionType, ConditionOp, FieldValue, LogicAction, LogicCondition, LogicRule};

/// A staged navigation instruction produced by a `skip` or `jump` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub kind: NavKind,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKind {
    /// Advance to the step after the target block.
    Skip,
    /// Go directly to the target block's step.
    Jump,
}

/// Observable result of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogicEffects {
    pub hidden_fields: BTreeSet<String>,
    pub field_updates: BTreeMap<String, FieldValue>,
    pub navigation: Option<Navigation>,
}

/// The rule engine. Owns the hidden-set and the working value cache so a
/// pass can expose `set_value` overrides to later conditions.
#[derive(Debug, Default)]
pub struct LogicEvaluator {
    hidden: BTreeSet<String>,
    cache: BTreeMap<String, FieldValue>,
}

impl LogicEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields currently hidden by logic, as of the last pass.
    pub fn hidden(&self) -> &BTreeSet<String> {
        &self.hidden
    }

    /// Clear all cached hidden-fields and values, restoring the evaluator
    /// to its just-constructed state.
    pub fn reset(&mut self) {
        self.hidden.clear();
        self.cache.clear();
    }

    /// Collect the actions of every fired rule, in schema order.
    ///
    /// Pure with respect to the evaluator: conditions read only the map
    /// passed in. A rule with an empty condition list never fires.
    pub fn evaluate_rules(
        rules: &[LogicRule],
        values: &BTreeMap<String, FieldValue>,
    ) -> Vec<LogicAction> {
        let mut fired = Vec::new();
        for rule in rules {
            if rule_fires(rule, values) {
                fired.extend(rule.actions.iter().cloned());
            }
        }
        fired
    }

    /// Fold a pre-collected action list into effects.
    ///
    /// The hidden-set is reset at the start of every call: each pass
    /// recomputes it from scratch off the full action list.
    pub fn apply_actions(&mut self, actions: &[LogicAction]) -> LogicEffects {
        self.hidden.clear();
        let mut updates = BTreeMap::new();
        let mut navigation = None;
        for action in actions {
            self.fold(action, &mut updates, &mut navigation);
        }
        LogicEffects {
            hidden_fields: self.hidden.clone(),
            field_updates: updates,
            navigation,
        }
    }

    /// One full evaluation pass: rules are walked in order, and a fired
    /// rule's actions fold immediately, so a `set_value` staged by an
    /// earlier rule is visible to a later rule's conditions in the same
    /// pass.
    pub fn run_pass(
        &mut self,
        rules: &[LogicRule],
        values: &BTreeMap<String, FieldValue>,
    ) -> LogicEffects {
        self.cache = values.clone();
        self.hidden.clear();
        let mut updates = BTreeMap::new();
        let mut navigation = None;
        for rule in rules {
            if rule_fires(rule, &self.cache) {
                for action in &rule.actions {
                    self.fold(action, &mut updates, &mut navigation);
                }
            }
        }
        LogicEffects {
            hidden_fields: self.hidden.clone(),
            field_updates: updates,
            navigation,
        }
    }

    fn fold(
        &mut self,
        action: &LogicAction,
        updates: &mut BTreeMap<String, FieldValue>,
        navigation: &mut Option<Navigation>,
    ) {
        match &action.action {
            ActionType::Show => {
                self.hidden.remove(&action.target);
            }
            ActionType::Hide => {
                self.hidden.insert(action.target.clone());
            }
            ActionType::SetValue => {
                let value = action.value.clone().unwrap_or_default();
                self.cache.insert(action.target.clone(), value.clone());
                updates.insert(action.target.clone(), value);
            }
            ActionType::Skip => {
                if navigation.is_none() {
                    *navigation = Some(Navigation {
                        kind: NavKind::Skip,
                        target: action.target.clone(),
                    });
                }
            }
            ActionType::Jump => {
                if navigation.is_none() {
                    *navigation = Some(Navigation {
                        kind: NavKind::Jump,
                        target: action.target.clone(),
                    });
                }
            }
            ActionType::Other(_) => {}
        }
    }
}

fn rule_fires(rule: &LogicRule, values: &BTreeMap<String, FieldValue>) -> bool {
    !rule.conditions.is_empty() && rule.conditions.iter().all(|c| condition_matches(c, values))
}

fn condition_matches(cond: &LogicCondition, values: &BTreeMap<String, FieldValue>) -> bool {
    let actual = values
        .get(&cond.field)
        .cloned()
        .unwrap_or_else(|| FieldValue::Text(String::new()));
    match &cond.op {
        ConditionOp::Equals => is_equal(&actual, &cond.value),
        ConditionOp::NotEquals => !is_equal(&actual, &cond.value),
        ConditionOp::Contains => contains_value(&actual, &cond.value),
        ConditionOp::NotContains => !contains_value(&actual, &cond.value),
        ConditionOp::GreaterThan => numeric_gt(&actual, &cond.value),
        ConditionOp::LessThan => numeric_gt(&cond.value, &actual),
        ConditionOp::Other(_) => false,
    }
}

/// Type-coercing deep equality: same-typed scalars compare directly,
/// lists compare elementwise, mismatched types compare as strings.
pub fn is_equal(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::List(xs), FieldValue::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| x == y)
        }
        (FieldValue::Number(x), FieldValue::Number(y)) => x == y,
        (FieldValue::Bool(x), FieldValue::Bool(y)) => x == y,
        (FieldValue::Text(x), FieldValue::Text(y)) => x == y,
        _ => a.to_text() == b.to_text(),
    }
}

/// Case-insensitive substring match for text, element membership (via
/// the equality semantics) for lists, false for any other type.
pub fn contains_value(haystack: &FieldValue, needle: &FieldValue) -> bool {
    match haystack {
        FieldValue::Text(h) => h
            .to_lowercase()
            .contains(&needle.to_text().to_lowercase()),
        FieldValue::List(items) => items
            .iter()
            .any(|item| is_equal(&FieldValue::Text(item.clone()), needle)),
        _ => false,
    }
}

/// Numeric ordering: false unless both sides coerce to finite numbers.
fn numeric_gt(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x > y,
        _ => false,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use formrun_schema::LogicRule;

    fn values(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.into())
    }

    #[test]
    fn rule_with_empty_conditions_never_fires() {
        let rule = LogicRule {
            id: "r1".into(),
            conditions: vec![],
            actions: vec![LogicAction {
                action: ActionType::Hide,
                target: "x".into(),
                value: None,
            }],
        };
        let fired = LogicEvaluator::evaluate_rules(&[rule], &values(&[]));
        assert!(fired.is_empty());
    }

    #[test]
    fn hide_then_show_leaves_visible() {
        let mut ev = LogicEvaluator::new();
        let actions = vec![
            LogicAction {
                action: ActionType::Hide,
                target: "x".into(),
                value: None,
            },
            LogicAction {
                action: ActionType::Show,
                target: "x".into(),
                value: None,
            },
        ];
        let effects = ev.apply_actions(&actions);
        assert!(!effects.hidden_fields.contains("x"));
    }

    #[test]
    fn show_then_hide_leaves_hidden() {
        let mut ev = LogicEvaluator::new();
        let actions = vec![
            LogicAction {
                action: ActionType::Show,
                target: "x".into(),
                value: None,
            },
            LogicAction {
                action: ActionType::Hide,
                target: "x".into(),
                value: None,
            },
        ];
        let effects = ev.apply_actions(&actions);
        assert!(effects.hidden_fields.contains("x"));
    }

    #[test]
    fn hidden_set_resets_between_passes() {
        let mut ev = LogicEvaluator::new();
        let hide = vec![LogicAction {
            action: ActionType::Hide,
            target: "x".into(),
            value: None,
        }];
        assert!(ev.apply_actions(&hide).hidden_fields.contains("x"));
        // The next pass carries no hide action for x; it becomes visible.
        assert!(ev.apply_actions(&[]).hidden_fields.is_empty());
    }

    #[test]
    fn equality_is_type_coercing() {
        assert!(is_equal(
            &FieldValue::List(vec!["a".into(), "b".into()]),
            &FieldValue::List(vec!["a".into(), "b".into()])
        ));
        assert!(!is_equal(
            &FieldValue::List(vec!["a".into(), "b".into()]),
            &FieldValue::List(vec!["a".into()])
        ));
        assert!(is_equal(&FieldValue::Number(5.0), &text("5")));
        assert!(!is_equal(&FieldValue::Number(5.0), &text("6")));
        assert!(is_equal(&FieldValue::Bool(true), &text("true")));
    }

    #[test]
    fn contains_semantics() {
        assert!(contains_value(&text("Hello World"), &text("world")));
        assert!(!contains_value(&text("Hello"), &text("world")));
        assert!(contains_value(
            &FieldValue::List(vec!["a".into(), "b".into()]),
            &text("a")
        ));
        assert!(!contains_value(&FieldValue::Number(42.0), &text("4")));
    }

    #[test]
    fn numeric_comparison_requires_finite_numbers() {
        let vals = values(&[("age", text("30"))]);
        let gt = LogicCondition {
            field: "age".into(),
            op: ConditionOp::GreaterThan,
            value: FieldValue::Number(18.0),
        };
        assert!(condition_matches(&gt, &vals));

        let vals = values(&[("age", text("abc"))]);
        assert!(!condition_matches(&gt, &vals));
        let lt = LogicCondition {
            field: "age".into(),
            op: ConditionOp::LessThan,
            value: FieldValue::Number(18.0),
        };
        assert!(!condition_matches(&lt, &vals));
    }

    #[test]
    fn missing_value_is_empty_string() {
        let eq_empty = LogicCondition {
            field: "ghost".into(),
            op: ConditionOp::Equals,
            value: text(""),
        };
        assert!(condition_matches(&eq_empty, &values(&[])));
    }

    #[test]
    fn unknown_operator_never_matches() {
        let cond = LogicCondition {
            field: "x".into(),
            op: ConditionOp::Other("sounds_like".into()),
            value: text("x"),
        };
        assert!(!condition_matches(&cond, &values(&[("x", text("x"))])));
    }

    #[test]
    fn unknown_action_type_is_ignored() {
        let mut ev = LogicEvaluator::new();
        let effects = ev.apply_actions(&[LogicAction {
            action: ActionType::Other("teleport".into()),
            target: "x".into(),
            value: None,
        }]);
        assert_eq!(effects, LogicEffects::default());
    }

    #[test]
    fn first_navigation_wins_per_pass() {
        let mut ev = LogicEvaluator::new();
        let actions = vec![
            LogicAction {
                action: ActionType::Skip,
                target: "first".into(),
                value: None,
            },
            LogicAction {
                action: ActionType::Jump,
                target: "second".into(),
                value: None,
            },
        ];
        let effects = ev.apply_actions(&actions);
        assert_eq!(
            effects.navigation,
            Some(Navigation {
                kind: NavKind::Skip,
                target: "first".into()
            })
        );
    }

    #[test]
    fn set_value_is_visible_to_later_rules_in_same_pass() {
        let rules = vec![
            LogicRule::new("stage")
                .when("trigger", ConditionOp::Equals, text("yes"))
                .then_set("derived", text("computed")),
            LogicRule::new("chain")
                .when("derived", ConditionOp::Equals, text("computed"))
                .then(ActionType::Hide, "downstream"),
        ];
        let mut ev = LogicEvaluator::new();
        let effects = ev.run_pass(&rules, &values(&[("trigger", text("yes"))]));
        assert_eq!(effects.field_updates.get("derived"), Some(&text("computed")));
        assert!(effects.hidden_fields.contains("downstream"));
    }

    #[test]
    fn rules_evaluate_in_schema_order_with_last_wins_visibility() {
        let rules = vec![
            LogicRule::new("hide_it")
                .when("a", ConditionOp::Equals, text("1"))
                .then(ActionType::Hide, "x"),
            LogicRule::new("show_it")
                .when("a", ConditionOp::Equals, text("1"))
                .then(ActionType::Show, "x"),
        ];
        let mut ev = LogicEvaluator::new();
        let effects = ev.run_pass(&rules, &values(&[("a", text("1"))]));
        assert!(!effects.hidden_fields.contains("x"));
    }

    #[test]
    fn reset_clears_state() {
        let mut ev = LogicEvaluator::new();
        ev.apply_actions(&[LogicAction {
            action: ActionType::Hide,
            target: "x".into(),
            value: None,
        }]);
        assert!(!ev.hidden().is_empty());
        ev.reset();
        assert!(ev.hidden().is_empty());
    }
}
