//! Conversion between the builder's rule tree and the evaluator's query.
//!
//! Field names follow the rename table below; tree values are strings and are
//! coerced per (field, operator) on the way out.
//!
//! | tree              | query           |
//! |-------------------|-----------------|
//! | `spend`           | `totalSpend`    |
//! | `visits`          | `visitCount`    |
//! | `inactive_days`   | `inactiveDays`  |
//! | `purchase_count`  | `orderCount`    |
//! | `avg_order_value` | `avgOrderValue` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::{Condition, Field, Operator};
use crate::error::RuleError;
use crate::group::{Combinator, RuleGroup, RuleNode};
use crate::query::{BackendQuery, QueryCondition, QueryField, QueryGroup, QueryOperator, QueryValue};

/// Upper bound on the groups produced by [`TranslationMode::PreserveGroups`].
pub const MAX_QUERY_GROUPS: usize = 64;

/// How a rule tree is mapped onto the group/condition query shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// Every leaf lands in one AND group; OR and nesting are discarded.
    #[default]
    Flatten,
    /// Disjunctive normal form: one group per conjunction.
    PreserveGroups,
}

impl TranslationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationMode::Flatten => "flatten",
            TranslationMode::PreserveGroups => "preserve_groups",
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranslationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "flatten" => Ok(TranslationMode::Flatten),
            "preserve_groups" | "preserve-groups" | "dnf" => Ok(TranslationMode::PreserveGroups),
            other => Err(format!("unknown translation mode `{other}`")),
        }
    }
}

/// Result of translating a tree, with bookkeeping for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub query: BackendQuery,
    pub condition_count: usize,
    /// True when the query matches a different audience than the tree.
    pub lossy: bool,
}

impl From<Field> for QueryField {
    fn from(field: Field) -> Self {
        match field {
            Field::Spend => QueryField::TotalSpend,
            Field::Visits => QueryField::VisitCount,
            Field::InactiveDays => QueryField::InactiveDays,
            Field::PurchaseCount => QueryField::OrderCount,
            Field::AvgOrderValue => QueryField::AvgOrderValue,
        }
    }
}

impl TryFrom<QueryField> for Field {
    type Error = RuleError;

    fn try_from(field: QueryField) -> Result<Self, Self::Error> {
        match field {
            QueryField::TotalSpend => Ok(Field::Spend),
            QueryField::VisitCount => Ok(Field::Visits),
            QueryField::InactiveDays => Ok(Field::InactiveDays),
            QueryField::OrderCount => Ok(Field::PurchaseCount),
            QueryField::AvgOrderValue => Ok(Field::AvgOrderValue),
            QueryField::LastOrderDate | QueryField::UserCreatedAt => Err(
                RuleError::Untranslatable(format!("field `{field}` has no builder counterpart")),
            ),
        }
    }
}

impl From<Operator> for QueryOperator {
    fn from(operator: Operator) -> Self {
        match operator {
            Operator::GreaterThan => QueryOperator::GreaterThan,
            Operator::GreaterThanOrEqual => QueryOperator::GreaterThanOrEqual,
            Operator::LessThan => QueryOperator::LessThan,
            Operator::LessThanOrEqual => QueryOperator::LessThanOrEqual,
            Operator::Equals => QueryOperator::Equals,
            Operator::NotEquals => QueryOperator::NotEquals,
        }
    }
}

impl TryFrom<QueryOperator> for Operator {
    type Error = RuleError;

    fn try_from(operator: QueryOperator) -> Result<Self, Self::Error> {
        match operator {
            QueryOperator::GreaterThan => Ok(Operator::GreaterThan),
            QueryOperator::GreaterThanOrEqual => Ok(Operator::GreaterThanOrEqual),
            QueryOperator::LessThan => Ok(Operator::LessThan),
            QueryOperator::LessThanOrEqual => Ok(Operator::LessThanOrEqual),
            QueryOperator::Equals => Ok(Operator::Equals),
            QueryOperator::NotEquals => Ok(Operator::NotEquals),
            other => Err(RuleError::Untranslatable(format!(
                "operator `{other}` has no builder counterpart"
            ))),
        }
    }
}

/// Coerces a raw operand for the given field and operator.
///
/// Date comparisons keep the raw text. Numeric fields and day counts become
/// numbers, with anything unparseable silently becoming `0`. Everything else
/// stays text.
pub fn coerce_value(field: QueryField, operator: QueryOperator, raw: &str) -> QueryValue {
    if operator.is_date_compare() {
        return QueryValue::Text(raw.to_string());
    }
    if field.is_numeric() || operator.is_day_count() {
        let number = raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .unwrap_or(0.0);
        return QueryValue::Number(number);
    }
    QueryValue::Text(raw.to_string())
}

impl From<&Condition> for QueryCondition {
    fn from(condition: &Condition) -> Self {
        let field = QueryField::from(condition.field);
        let operator = QueryOperator::from(condition.operator);
        QueryCondition {
            field,
            operator,
            value: coerce_value(field, operator, &condition.value),
        }
    }
}

/// Flattens every leaf of the tree, depth first, into a single AND group.
///
/// Combinators are ignored, so a tree using OR yields a narrower audience
/// than it describes. The condition count always equals the leaf count.
pub fn to_backend_query(tree: &RuleGroup) -> BackendQuery {
    let conditions = tree.conditions().into_iter().map(QueryCondition::from).collect();
    BackendQuery::single(conditions)
}

/// Translates a tree using the requested mode.
pub fn translate(tree: &RuleGroup, mode: TranslationMode) -> Result<BackendQuery, RuleError> {
    match mode {
        TranslationMode::Flatten => Ok(to_backend_query(tree)),
        TranslationMode::PreserveGroups => {
            let conjunctions = disjunctive_normal_form(tree)?;
            debug!(groups = conjunctions.len(), "tree expanded to normal form");
            Ok(BackendQuery {
                groups: conjunctions
                    .into_iter()
                    .map(|conditions| QueryGroup {
                        conditions: conditions.into_iter().map(QueryCondition::from).collect(),
                    })
                    .collect(),
            })
        }
    }
}

/// Translates and reports whether the result is exact.
pub fn translate_with_report(
    tree: &RuleGroup,
    mode: TranslationMode,
) -> Result<Translation, RuleError> {
    let query = translate(tree, mode)?;
    let lossy = mode == TranslationMode::Flatten && tree.has_disjunction();
    Ok(Translation {
        condition_count: query.condition_count(),
        query,
        lossy,
    })
}

type Conjunction<'a> = Vec<&'a Condition>;

// An empty group, whatever its combinator, places no constraint.
fn disjunctive_normal_form(group: &RuleGroup) -> Result<Vec<Conjunction<'_>>, RuleError> {
    if group.is_empty() {
        return Ok(vec![Vec::new()]);
    }

    match group.combinator {
        Combinator::Or => {
            let mut out = Vec::new();
            for node in &group.rules {
                let expanded = expand_node(node)?;
                ensure_within_limit(out.len() + expanded.len())?;
                out.extend(expanded);
            }
            Ok(out)
        }
        Combinator::And => {
            let mut out: Vec<Conjunction<'_>> = vec![Vec::new()];
            for node in &group.rules {
                let expanded = expand_node(node)?;
                ensure_within_limit(out.len() * expanded.len())?;
                out = out
                    .iter()
                    .flat_map(|left| {
                        expanded.iter().map(move |right| {
                            let mut joined = left.clone();
                            joined.extend(right.iter().copied());
                            joined
                        })
                    })
                    .collect();
            }
            Ok(out)
        }
    }
}

fn expand_node(node: &RuleNode) -> Result<Vec<Conjunction<'_>>, RuleError> {
    match node {
        RuleNode::Condition(condition) => Ok(vec![vec![condition]]),
        RuleNode::Group(group) => disjunctive_normal_form(group),
    }
}

fn ensure_within_limit(groups: usize) -> Result<(), RuleError> {
    if groups > MAX_QUERY_GROUPS {
        return Err(RuleError::QueryTooComplex {
            groups,
            limit: MAX_QUERY_GROUPS,
        });
    }
    Ok(())
}

/// Rebuilds an editable tree from a stored query.
///
/// One group becomes an AND root; several become an OR root holding one AND
/// group each. Fields and operators only reachable through the API cannot be
/// expressed and fail.
pub fn from_backend_query(query: &BackendQuery) -> Result<RuleGroup, RuleError> {
    let mut next_rule = 0usize;
    let mut rebuild = |group: &QueryGroup, id: String| -> Result<RuleGroup, RuleError> {
        let mut out = RuleGroup::new(id, Combinator::And);
        for condition in &group.conditions {
            next_rule += 1;
            out = out.with(Condition::new(
                format!("rule-{next_rule}"),
                Field::try_from(condition.field)?,
                Operator::try_from(condition.operator)?,
                condition.value.as_text(),
            ));
        }
        Ok(out)
    };

    match query.groups.as_slice() {
        [] => Err(RuleError::Untranslatable(
            "a query without groups matches nobody and has no tree form".into(),
        )),
        [only] => rebuild(only, crate::group::ROOT_ID.to_string()),
        groups => {
            let mut root = RuleGroup::root(Combinator::Or);
            for (index, group) in groups.iter().enumerate() {
                root = root.with(rebuild(group, format!("group-{}", index + 1))?);
            }
            Ok(root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn cond(id: &str, field: Field, operator: Operator, value: &str) -> Condition {
        Condition::new(id, field, operator, value)
    }

    fn mixed_tree() -> RuleGroup {
        RuleGroup::root(Combinator::And)
            .with(cond("rule-1", Field::Spend, Operator::GreaterThan, "10000"))
            .with(
                RuleGroup::new("group-1", Combinator::Or)
                    .with(cond("rule-2", Field::InactiveDays, Operator::GreaterThan, "90"))
                    .with(cond("rule-3", Field::Visits, Operator::LessThan, "3")),
            )
    }

    #[test]
    fn flattens_every_leaf_into_one_group() {
        let query = to_backend_query(&mixed_tree());
        assert_eq!(query.groups.len(), 1);
        let fields: Vec<_> = query.groups[0].conditions.iter().map(|c| c.field).collect();
        assert_eq!(
            fields,
            vec![QueryField::TotalSpend, QueryField::InactiveDays, QueryField::VisitCount]
        );
        assert_eq!(query.groups[0].conditions[0].value, QueryValue::Number(10000.0));
        assert_eq!(query.groups[0].conditions[2].operator, QueryOperator::LessThan);
    }

    #[test]
    fn flatten_count_matches_leaf_count_for_any_shape() {
        let deep = RuleGroup::root(Combinator::Or).with(
            RuleGroup::new("group-1", Combinator::And).with(
                RuleGroup::new("group-2", Combinator::Or)
                    .with(cond("rule-1", Field::Visits, Operator::Equals, "1"))
                    .with(cond("rule-2", Field::Visits, Operator::Equals, "2"))
                    .with(cond("rule-3", Field::Visits, Operator::Equals, "3")),
            ),
        );
        for tree in [mixed_tree(), deep, RuleGroup::default()] {
            assert_eq!(to_backend_query(&tree).condition_count(), tree.condition_count());
        }
    }

    #[test_case(QueryField::TotalSpend, QueryOperator::GreaterThan, "12.5", QueryValue::Number(12.5); "numeric field")]
    #[test_case(QueryField::VisitCount, QueryOperator::Equals, "abc", QueryValue::Number(0.0); "garbage becomes zero")]
    #[test_case(QueryField::OrderCount, QueryOperator::LessThan, "", QueryValue::Number(0.0); "empty becomes zero")]
    #[test_case(QueryField::LastOrderDate, QueryOperator::OlderThanDays, "30", QueryValue::Number(30.0); "day count")]
    #[test_case(QueryField::LastOrderDate, QueryOperator::BeforeDate, "2024-01-01", QueryValue::Text("2024-01-01".into()); "date compare keeps text")]
    #[test_case(QueryField::UserCreatedAt, QueryOperator::Equals, "2024-01-01", QueryValue::Text("2024-01-01".into()); "other stays text")]
    fn coerces_values(field: QueryField, operator: QueryOperator, raw: &str, expected: QueryValue) {
        assert_eq!(coerce_value(field, operator, raw), expected);
    }

    #[test]
    fn preserve_groups_expands_to_normal_form() {
        let query = translate(&mixed_tree(), TranslationMode::PreserveGroups).unwrap();
        assert_eq!(query.groups.len(), 2);
        assert_eq!(query.groups[0].conditions.len(), 2);
        assert_eq!(query.groups[0].conditions[0].field, QueryField::TotalSpend);
        assert_eq!(query.groups[0].conditions[1].field, QueryField::InactiveDays);
        assert_eq!(query.groups[1].conditions[1].field, QueryField::VisitCount);
    }

    #[test]
    fn preserve_groups_of_empty_tree_matches_everyone() {
        let query = translate(&RuleGroup::default(), TranslationMode::PreserveGroups).unwrap();
        assert_eq!(query.groups.len(), 1);
        assert!(query.groups[0].conditions.is_empty());
    }

    #[test]
    fn preserve_groups_rejects_explosive_trees() {
        // seven two-way ORs under an AND expand to 128 conjunctions
        let mut root = RuleGroup::root(Combinator::And);
        for index in 0..7 {
            root = root.with(
                RuleGroup::new(format!("group-{index}"), Combinator::Or)
                    .with(cond(&format!("rule-{index}a"), Field::Visits, Operator::Equals, "1"))
                    .with(cond(&format!("rule-{index}b"), Field::Visits, Operator::Equals, "2")),
            );
        }
        let err = translate(&root, TranslationMode::PreserveGroups).unwrap_err();
        assert!(matches!(err, RuleError::QueryTooComplex { groups: 128, limit: 64 }));
    }

    #[test]
    fn reports_lossy_flattening() {
        let report = translate_with_report(&mixed_tree(), TranslationMode::Flatten).unwrap();
        assert!(report.lossy);
        assert_eq!(report.condition_count, 3);

        let exact = translate_with_report(&mixed_tree(), TranslationMode::PreserveGroups).unwrap();
        assert!(!exact.lossy);
        assert_eq!(exact.condition_count, 4);
    }

    #[test]
    fn rebuilds_tree_from_query() {
        let query = translate(&mixed_tree(), TranslationMode::PreserveGroups).unwrap();
        let tree = from_backend_query(&query).unwrap();
        assert_eq!(tree.combinator, Combinator::Or);
        assert_eq!(tree.rules.len(), 2);
        assert_eq!(tree.condition_count(), 4);
        assert!(tree.duplicate_ids().is_empty());

        let first = tree.find_condition("rule-1").unwrap();
        assert_eq!(first.field, Field::Spend);
        assert_eq!(first.value, "10000");
    }

    #[test]
    fn single_group_rebuilds_as_and_root() {
        let tree = from_backend_query(&to_backend_query(&mixed_tree())).unwrap();
        assert!(tree.is_root());
        assert_eq!(tree.combinator, Combinator::And);
        assert_eq!(tree.condition_count(), 3);
    }

    #[test]
    fn api_only_fields_cannot_be_rebuilt() {
        let query = BackendQuery::single(vec![QueryCondition::new(
            QueryField::LastOrderDate,
            QueryOperator::OlderThanDays,
            30.0,
        )]);
        assert!(matches!(
            from_backend_query(&query),
            Err(RuleError::Untranslatable(_))
        ));
        assert!(from_backend_query(&BackendQuery::default()).is_err());
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("flatten".parse::<TranslationMode>(), Ok(TranslationMode::Flatten));
        assert_eq!(
            "PRESERVE_GROUPS".parse::<TranslationMode>(),
            Ok(TranslationMode::PreserveGroups)
        );
        assert!("nested".parse::<TranslationMode>().is_err());
    }
}
