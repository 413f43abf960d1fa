//! Structural validation for rule trees.
//!
//! Two schemas exist. [`ModelSchema`] guards trees built inside the product:
//! any depth, every operator, decimal values. [`SynthesisSchema`] guards
//! trees produced by the text generator and is deliberately narrower.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::condition::{Condition, Field, Operator};
use crate::group::{Combinator, RuleGroup, RuleNode, ROOT_ID};

/// One failed check, located by a JSON path such as `$.rules[2].value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaViolations(Vec<SchemaViolation>);

impl SchemaViolations {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(SchemaViolation {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SchemaViolation> {
        self.0.iter()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|violation| violation.path.as_str()).collect()
    }

    fn into_result<T>(self, value: T) -> Result<T, SchemaViolations> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Validation for trees edited through the builder or submitted to the API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSchema;

impl ModelSchema {
    pub fn validate(&self, tree: &RuleGroup) -> Result<(), SchemaViolations> {
        let mut violations = SchemaViolations::default();
        if tree.id != ROOT_ID {
            violations.push("$.id", format!("root id must be `{ROOT_ID}`"));
        }
        for duplicate in tree.duplicate_ids() {
            violations.push("$", format!("id `{duplicate}` is used more than once"));
        }
        check_model_group(tree, "$", &mut violations);
        violations.into_result(())
    }
}

fn check_model_group(group: &RuleGroup, path: &str, violations: &mut SchemaViolations) {
    if group.id.trim().is_empty() {
        violations.push(format!("{path}.id"), "group id must not be empty");
    }
    for (index, node) in group.rules.iter().enumerate() {
        let node_path = format!("{path}.rules[{index}]");
        match node.as_ref() {
            RuleNode::Group(child) => check_model_group(child, &node_path, violations),
            RuleNode::Condition(condition) => {
                if condition.id.trim().is_empty() {
                    violations.push(format!("{node_path}.id"), "condition id must not be empty");
                }
                let numeric = condition
                    .value
                    .trim()
                    .parse::<f64>()
                    .map(|number| number.is_finite())
                    .unwrap_or(false);
                if condition.field.is_numeric() && !numeric {
                    violations.push(
                        format!("{node_path}.value"),
                        format!("`{}` requires a numeric value", condition.field),
                    );
                }
            }
        }
    }
}

fn rule_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^rule-\d+$").expect("static rule id pattern"))
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+$").expect("static integer pattern"))
}

/// Contract imposed on generator output.
///
/// Exactly one flat level of conditions under a `root` group, integer string
/// values, and no `!=`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesisSchema;

impl SynthesisSchema {
    pub const VERSION: u32 = 1;

    pub const OPERATORS: [Operator; 5] = [
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThanOrEqual,
        Operator::Equals,
    ];

    /// JSON Schema document embedded in generation prompts.
    pub fn json_schema(&self) -> Value {
        let fields: Vec<&str> = Field::ALL.iter().map(Field::as_str).collect();
        let operators: Vec<&str> = Self::OPERATORS.iter().map(Operator::as_str).collect();
        json!({
            "$id": format!("reach/synthesis/v{}", Self::VERSION),
            "type": "object",
            "required": ["id", "combinator", "rules"],
            "additionalProperties": false,
            "properties": {
                "id": {"const": ROOT_ID},
                "combinator": {"enum": ["AND", "OR"]},
                "rules": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["id", "field", "operator", "value"],
                        "additionalProperties": false,
                        "properties": {
                            "id": {"type": "string", "pattern": r"^rule-\d+$"},
                            "field": {"enum": fields},
                            "operator": {"enum": operators},
                            "value": {"type": "string", "pattern": r"^\d+$"}
                        }
                    }
                }
            }
        })
    }

    /// Validates an untrusted JSON value and builds the tree it describes.
    ///
    /// Nothing is returned unless every check passes.
    pub fn validate_value(&self, value: &Value) -> Result<RuleGroup, SchemaViolations> {
        let mut violations = SchemaViolations::default();
        let Some(object) = value.as_object() else {
            violations.push("$", "expected an object");
            return Err(violations);
        };

        ignore_unknown_keys(object, &["id", "combinator", "rules"], "$");

        match object.get("id").and_then(Value::as_str) {
            Some(ROOT_ID) => {}
            _ => violations.push("$.id", format!("must be the string `{ROOT_ID}`")),
        }

        let combinator = match object.get("combinator").and_then(Value::as_str) {
            Some("AND") => Some(Combinator::And),
            Some("OR") => Some(Combinator::Or),
            _ => {
                violations.push("$.combinator", "must be `AND` or `OR`");
                None
            }
        };

        let mut conditions = Vec::new();
        match object.get("rules").and_then(Value::as_array) {
            None => violations.push("$.rules", "must be an array"),
            Some(rules) if rules.is_empty() => {
                violations.push("$.rules", "must contain at least one rule")
            }
            Some(rules) => {
                let mut seen = HashSet::new();
                for (index, rule) in rules.iter().enumerate() {
                    let path = format!("$.rules[{index}]");
                    if let Some(condition) = self.check_rule(rule, &path, &mut violations) {
                        if !seen.insert(condition.id.clone()) {
                            violations.push(format!("{path}.id"), "duplicate rule id");
                        }
                        conditions.push(condition);
                    }
                }
            }
        }

        let combinator = match combinator {
            Some(combinator) if violations.is_empty() => combinator,
            _ => return Err(violations),
        };

        Ok(RuleGroup {
            id: ROOT_ID.to_string(),
            combinator,
            rules: conditions
                .into_iter()
                .map(|condition| Arc::new(RuleNode::Condition(condition)))
                .collect(),
        })
    }

    fn check_rule(
        &self,
        rule: &Value,
        path: &str,
        violations: &mut SchemaViolations,
    ) -> Option<Condition> {
        let Some(object) = rule.as_object() else {
            violations.push(path, "expected a rule object");
            return None;
        };
        if object.contains_key("combinator") || object.contains_key("rules") {
            violations.push(path, "nested groups are not allowed");
            return None;
        }
        ignore_unknown_keys(object, &["id", "field", "operator", "value"], path);
        let before = violations.len();

        let id = object.get("id").and_then(Value::as_str);
        if !id.is_some_and(|id| rule_id_pattern().is_match(id)) {
            violations.push(format!("{path}.id"), r"must match ^rule-\d+$");
        }

        let field = object
            .get("field")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<Field>().ok());
        if field.is_none() {
            violations.push(format!("{path}.field"), "unknown field");
        }

        let operator = object
            .get("operator")
            .and_then(Value::as_str)
            .and_then(|raw| Self::OPERATORS.into_iter().find(|op| op.as_str() == raw));
        if operator.is_none() {
            violations.push(format!("{path}.operator"), "operator not allowed");
        }

        let value = object.get("value").and_then(Value::as_str);
        let integer = value.is_some_and(|value| {
            integer_pattern().is_match(value) && value.parse::<f64>().is_ok_and(f64::is_finite)
        });
        if !integer {
            violations.push(format!("{path}.value"), r"must be a string matching ^\d+$");
        }

        if violations.len() != before {
            return None;
        }
        match (id, field, operator, value) {
            (Some(id), Some(field), Some(operator), Some(value)) => {
                Some(Condition::new(id, field, operator, value))
            }
            _ => None,
        }
    }
}

/// Extra properties are tolerated; only known keys reach the built tree.
fn ignore_unknown_keys(object: &Map<String, Value>, known: &[&str], path: &str) {
    for key in object.keys().filter(|key| !known.contains(&key.as_str())) {
        debug!(path = %format!("{path}.{key}"), "ignoring unknown property in generated rules");
    }
}
