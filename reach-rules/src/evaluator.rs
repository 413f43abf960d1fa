use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::Condition;
use crate::group::{Combinator, RuleGroup, RuleNode};
use crate::query::{BackendQuery, QueryCondition, QueryField, QueryGroup, QueryOperator};

/// Number of sample ids returned with an estimate unless configured otherwise.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// The slice of a customer record that segmentation reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub total_spend: f64,
    pub visit_count: i64,
    pub order_count: i64,
    pub avg_order_value: f64,
    #[serde(default)]
    pub last_order_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CustomerProfile {
    /// Whole days since the last order, or since sign-up for customers who
    /// never ordered. Never negative.
    pub fn inactive_days(&self, now: DateTime<Utc>) -> i64 {
        let since = self.last_order_at.unwrap_or(self.created_at);
        (now - since).num_days().max(0)
    }

    fn number(&self, field: QueryField, now: DateTime<Utc>) -> Option<f64> {
        match field {
            QueryField::TotalSpend => Some(self.total_spend),
            QueryField::VisitCount => Some(self.visit_count as f64),
            QueryField::InactiveDays => Some(self.inactive_days(now) as f64),
            QueryField::OrderCount => Some(self.order_count as f64),
            QueryField::AvgOrderValue => Some(self.avg_order_value),
            QueryField::LastOrderDate | QueryField::UserCreatedAt => None,
        }
    }

    fn date(&self, field: QueryField) -> Option<DateTime<Utc>> {
        match field {
            QueryField::LastOrderDate => self.last_order_at,
            QueryField::UserCreatedAt => Some(self.created_at),
            _ => None,
        }
    }
}

/// Audience size plus a bounded sample of matching customer ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudienceEstimate {
    pub audience_size: usize,
    pub sample_user_ids: Vec<String>,
}

/// Evaluates queries against in-memory customer profiles.
///
/// Evaluation is pure: the same query over the same customers at the same
/// instant always yields the same estimate.
#[derive(Debug, Clone)]
pub struct AudienceEvaluator {
    sample_limit: usize,
    clock: Option<DateTime<Utc>>,
}

impl Default for AudienceEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_SIZE)
    }
}

impl AudienceEvaluator {
    pub fn new(sample_limit: usize) -> Self {
        Self {
            sample_limit,
            clock: None,
        }
    }

    /// Pins "now" for day-based comparisons.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn sample_limit(&self) -> usize {
        self.sample_limit
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    pub fn evaluate(&self, query: &BackendQuery, customers: &[CustomerProfile]) -> AudienceEstimate {
        let now = self.now();
        self.collect(customers, |customer| matches_query(query, customer, now))
    }

    /// Evaluates the tree directly, honouring every combinator.
    pub fn evaluate_tree(&self, tree: &RuleGroup, customers: &[CustomerProfile]) -> AudienceEstimate {
        let now = self.now();
        self.collect(customers, |customer| matches_group(tree, customer, now))
    }

    pub fn matches(&self, query: &BackendQuery, customer: &CustomerProfile) -> bool {
        matches_query(query, customer, self.now())
    }

    fn collect(
        &self,
        customers: &[CustomerProfile],
        mut predicate: impl FnMut(&CustomerProfile) -> bool,
    ) -> AudienceEstimate {
        let mut estimate = AudienceEstimate::default();
        for customer in customers {
            if !predicate(customer) {
                continue;
            }
            estimate.audience_size += 1;
            if estimate.sample_user_ids.len() < self.sample_limit {
                estimate.sample_user_ids.push(customer.id.clone());
            }
        }
        debug!(
            customers = customers.len(),
            audience = estimate.audience_size,
            "audience evaluated"
        );
        estimate
    }
}

fn matches_query(query: &BackendQuery, customer: &CustomerProfile, now: DateTime<Utc>) -> bool {
    query
        .groups
        .iter()
        .any(|group| matches_conjunction(group, customer, now))
}

fn matches_conjunction(group: &QueryGroup, customer: &CustomerProfile, now: DateTime<Utc>) -> bool {
    group
        .conditions
        .iter()
        .all(|condition| matches_condition(condition, customer, now))
}

fn matches_group(group: &RuleGroup, customer: &CustomerProfile, now: DateTime<Utc>) -> bool {
    if group.is_empty() {
        return true;
    }
    let mut children = group.rules.iter().map(|node| match node.as_ref() {
        RuleNode::Condition(condition) => matches_leaf(condition, customer, now),
        RuleNode::Group(child) => matches_group(child, customer, now),
    });
    match group.combinator {
        Combinator::And => children.all(|matched| matched),
        Combinator::Or => children.any(|matched| matched),
    }
}

fn matches_leaf(condition: &Condition, customer: &CustomerProfile, now: DateTime<Utc>) -> bool {
    matches_condition(&QueryCondition::from(condition), customer, now)
}

/// Evaluates one condition. Operands that cannot be read as the operator
/// requires make the condition false.
pub fn matches_condition(
    condition: &QueryCondition,
    customer: &CustomerProfile,
    now: DateTime<Utc>,
) -> bool {
    let field = condition.field;
    match condition.operator {
        QueryOperator::OlderThanDays | QueryOperator::NewerThanDays => {
            let (Some(date), Some(days)) = (customer.date(field), condition.value.as_number())
            else {
                return false;
            };
            let age = (now - date).num_days() as f64;
            if condition.operator == QueryOperator::OlderThanDays {
                age > days
            } else {
                age < days
            }
        }
        QueryOperator::OnDate | QueryOperator::BeforeDate | QueryOperator::AfterDate => {
            let (Some(date), Some(target)) = (customer.date(field), condition.value.as_date())
            else {
                return false;
            };
            let day = date.date_naive();
            match condition.operator {
                QueryOperator::OnDate => day == target,
                QueryOperator::BeforeDate => day < target,
                _ => day > target,
            }
        }
        comparison if field.is_date() => {
            let (Some(date), Some(target)) = (customer.date(field), condition.value.as_date())
            else {
                return false;
            };
            compare(comparison, date.date_naive(), target)
        }
        comparison => {
            let (Some(actual), Some(expected)) =
                (customer.number(field, now), condition.value.as_number())
            else {
                return false;
            };
            compare_numbers(comparison, actual, expected)
        }
    }
}

fn compare_numbers(operator: QueryOperator, actual: f64, expected: f64) -> bool {
    let equal = (actual - expected).abs() < f64::EPSILON;
    match operator {
        QueryOperator::GreaterThan => actual > expected,
        QueryOperator::GreaterThanOrEqual => actual > expected || equal,
        QueryOperator::LessThan => actual < expected,
        QueryOperator::LessThanOrEqual => actual < expected || equal,
        QueryOperator::Equals => equal,
        QueryOperator::NotEquals => !equal,
        _ => false,
    }
}

fn compare<T: PartialOrd>(operator: QueryOperator, actual: T, expected: T) -> bool {
    match operator {
        QueryOperator::GreaterThan => actual > expected,
        QueryOperator::GreaterThanOrEqual => actual >= expected,
        QueryOperator::LessThan => actual < expected,
        QueryOperator::LessThanOrEqual => actual <= expected,
        QueryOperator::Equals => actual == expected,
        QueryOperator::NotEquals => actual != expected,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Field, Operator};
    use crate::query::QueryValue;
    use crate::translator::{translate, TranslationMode};
    use chrono::{Duration, TimeZone};
    use test_case::test_case;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn customer(id: &str, spend: f64, visits: i64, orders: i64, idle_days: Option<i64>) -> CustomerProfile {
        CustomerProfile {
            id: id.into(),
            name: format!("Customer {id}"),
            email: format!("{id}@example.com"),
            total_spend: spend,
            visit_count: visits,
            order_count: orders,
            avg_order_value: if orders > 0 { spend / orders as f64 } else { 0.0 },
            last_order_at: idle_days.map(|days| now() - Duration::days(days)),
            created_at: now() - Duration::days(400),
        }
    }

    fn customers() -> Vec<CustomerProfile> {
        vec![
            customer("c1", 12_000.0, 2, 10, Some(120)),
            customer("c2", 500.0, 20, 3, Some(5)),
            customer("c3", 15_000.0, 8, 12, Some(10)),
            customer("c4", 0.0, 1, 0, None),
        ]
    }

    fn spend_over(value: f64) -> QueryCondition {
        QueryCondition::new(QueryField::TotalSpend, QueryOperator::GreaterThan, value)
    }

    #[test]
    fn any_group_all_conditions() {
        let query = BackendQuery {
            groups: vec![
                QueryGroup {
                    conditions: vec![
                        spend_over(10_000.0),
                        QueryCondition::new(QueryField::InactiveDays, QueryOperator::GreaterThan, 90.0),
                    ],
                },
                QueryGroup {
                    conditions: vec![QueryCondition::new(
                        QueryField::VisitCount,
                        QueryOperator::GreaterThanOrEqual,
                        20.0,
                    )],
                },
            ],
        };
        let estimate = AudienceEvaluator::default().at(now()).evaluate(&query, &customers());
        assert_eq!(estimate.audience_size, 2);
        assert_eq!(estimate.sample_user_ids, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn empty_groups_match_nobody_and_empty_group_matches_everyone() {
        let evaluator = AudienceEvaluator::default().at(now());
        let nobody = evaluator.evaluate(&BackendQuery::default(), &customers());
        assert_eq!(nobody.audience_size, 0);

        let everyone = evaluator.evaluate(&BackendQuery::single(vec![]), &customers());
        assert_eq!(everyone.audience_size, 4);
    }

    #[test]
    fn sample_is_bounded_but_count_is_not() {
        let many: Vec<_> = (0..25).map(|i| customer(&format!("x{i}"), 100.0, 1, 1, Some(1))).collect();
        let estimate = AudienceEvaluator::new(10)
            .at(now())
            .evaluate(&BackendQuery::single(vec![spend_over(50.0)]), &many);
        assert_eq!(estimate.audience_size, 25);
        assert_eq!(estimate.sample_user_ids.len(), 10);
        assert_eq!(estimate.sample_user_ids[0], "x0");
    }

    #[test]
    fn evaluation_is_idempotent() {
        let evaluator = AudienceEvaluator::default().at(now());
        let query = BackendQuery::single(vec![spend_over(1_000.0)]);
        let first = evaluator.evaluate(&query, &customers());
        assert_eq!(first, evaluator.evaluate(&query, &customers()));
    }

    #[test]
    fn inactive_days_fall_back_to_sign_up() {
        let never_ordered = customer("c4", 0.0, 1, 0, None);
        assert_eq!(never_ordered.inactive_days(now()), 400);
        let recent = customer("c2", 1.0, 1, 1, Some(5));
        assert_eq!(recent.inactive_days(now()), 5);
    }

    #[test_case(QueryOperator::OlderThanDays, QueryValue::Number(60.0), 1; "older than")]
    #[test_case(QueryOperator::NewerThanDays, QueryValue::Number(30.0), 2; "newer than")]
    #[test_case(QueryOperator::BeforeDate, QueryValue::Text("2024-05-01".into()), 1; "before date")]
    #[test_case(QueryOperator::AfterDate, QueryValue::Text("2024-05-01T00:00:00Z".into()), 2; "after rfc3339 date")]
    #[test_case(QueryOperator::OnDate, QueryValue::Text("2024-05-27".into()), 1; "on date")]
    #[test_case(QueryOperator::BeforeDate, QueryValue::Text("last tuesday".into()), 0; "unparseable date is false")]
    fn last_order_date_operators(operator: QueryOperator, value: QueryValue, expected: usize) {
        let query = BackendQuery::single(vec![QueryCondition {
            field: QueryField::LastOrderDate,
            operator,
            value,
        }]);
        let estimate = AudienceEvaluator::default().at(now()).evaluate(&query, &customers());
        assert_eq!(estimate.audience_size, expected);
    }

    #[test]
    fn text_operands_on_numeric_fields() {
        let evaluator = AudienceEvaluator::default().at(now());
        let parsed = BackendQuery::single(vec![QueryCondition::new(
            QueryField::OrderCount,
            QueryOperator::Equals,
            "12",
        )]);
        assert_eq!(evaluator.evaluate(&parsed, &customers()).audience_size, 1);

        let garbage = BackendQuery::single(vec![QueryCondition::new(
            QueryField::OrderCount,
            QueryOperator::NotEquals,
            "many",
        )]);
        assert_eq!(evaluator.evaluate(&garbage, &customers()).audience_size, 0);
    }

    #[test]
    fn preserve_groups_agrees_with_tree_evaluation() {
        let tree = RuleGroup::root(Combinator::Or)
            .with(
                RuleGroup::new("group-1", Combinator::And)
                    .with(Condition::new("rule-1", Field::Spend, Operator::GreaterThan, "10000"))
                    .with(
                        RuleGroup::new("group-2", Combinator::Or)
                            .with(Condition::new("rule-2", Field::InactiveDays, Operator::GreaterThan, "90"))
                            .with(Condition::new("rule-3", Field::Visits, Operator::GreaterThanOrEqual, "8")),
                    ),
            )
            .with(Condition::new("rule-4", Field::PurchaseCount, Operator::Equals, "0"));

        let evaluator = AudienceEvaluator::default().at(now());
        let direct = evaluator.evaluate_tree(&tree, &customers());
        let query = translate(&tree, TranslationMode::PreserveGroups).unwrap();
        assert_eq!(evaluator.evaluate(&query, &customers()), direct);
        assert_eq!(direct.sample_user_ids, vec!["c1", "c3", "c4"]);

        // flattening drops the OR and narrows the audience
        let flat = translate(&tree, TranslationMode::Flatten).unwrap();
        assert_eq!(evaluator.evaluate(&flat, &customers()).audience_size, 0);
    }
}
