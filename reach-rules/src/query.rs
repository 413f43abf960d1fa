use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuleError;

/// Customer attribute names understood by the audience evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QueryField {
    TotalSpend,
    VisitCount,
    InactiveDays,
    OrderCount,
    AvgOrderValue,
    LastOrderDate,
    UserCreatedAt,
}

impl QueryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryField::TotalSpend => "totalSpend",
            QueryField::VisitCount => "visitCount",
            QueryField::InactiveDays => "inactiveDays",
            QueryField::OrderCount => "orderCount",
            QueryField::AvgOrderValue => "avgOrderValue",
            QueryField::LastOrderDate => "lastOrderDate",
            QueryField::UserCreatedAt => "userCreatedAt",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !self.is_date()
    }

    pub fn is_date(&self) -> bool {
        matches!(self, QueryField::LastOrderDate | QueryField::UserCreatedAt)
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators understood by the audience evaluator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum QueryOperator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Equals,
    NotEquals,
    OlderThanDays,
    NewerThanDays,
    OnDate,
    BeforeDate,
    AfterDate,
}

impl QueryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOperator::GreaterThan => "greaterThan",
            QueryOperator::GreaterThanOrEqual => "greaterThanOrEqual",
            QueryOperator::LessThan => "lessThan",
            QueryOperator::LessThanOrEqual => "lessThanOrEqual",
            QueryOperator::Equals => "equals",
            QueryOperator::NotEquals => "notEquals",
            QueryOperator::OlderThanDays => "olderThanDays",
            QueryOperator::NewerThanDays => "newerThanDays",
            QueryOperator::OnDate => "onDate",
            QueryOperator::BeforeDate => "beforeDate",
            QueryOperator::AfterDate => "afterDate",
        }
    }

    /// Operators whose operand is a number of days.
    pub fn is_day_count(&self) -> bool {
        matches!(self, QueryOperator::OlderThanDays | QueryOperator::NewerThanDays)
    }

    /// Operators whose operand is a calendar date.
    pub fn is_date_compare(&self) -> bool {
        matches!(
            self,
            QueryOperator::OnDate | QueryOperator::BeforeDate | QueryOperator::AfterDate
        )
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operand of a backend condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryValue {
    Number(f64),
    Text(String),
}

impl QueryValue {
    /// Numeric view of the operand; text is parsed leniently.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            QueryValue::Number(number) => Some(*number),
            QueryValue::Text(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Calendar day named by the operand: `YYYY-MM-DD` or an RFC 3339
    /// timestamp. Numbers are never dates.
    pub fn as_date(&self) -> Option<NaiveDate> {
        let QueryValue::Text(raw) = self else {
            return None;
        };
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc).date_naive())
        })
    }

    pub fn as_text(&self) -> String {
        match self {
            QueryValue::Number(number) => format_number(*number),
            QueryValue::Text(text) => text.clone(),
        }
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        QueryValue::Number(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Text(value.to_string())
    }
}

/// Renders whole numbers without a trailing `.0`.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryCondition {
    pub field: QueryField,
    pub operator: QueryOperator,
    pub value: QueryValue,
}

impl QueryCondition {
    pub fn new(field: QueryField, operator: QueryOperator, value: impl Into<QueryValue>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
        }
    }
}

/// Conjunction of conditions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryGroup {
    pub conditions: Vec<QueryCondition>,
}

/// Disjunction of groups; the evaluator's input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendQuery {
    pub groups: Vec<QueryGroup>,
}

impl BackendQuery {
    pub fn single(conditions: Vec<QueryCondition>) -> Self {
        Self {
            groups: vec![QueryGroup { conditions }],
        }
    }

    pub fn condition_count(&self) -> usize {
        self.groups.iter().map(|group| group.conditions.len()).sum()
    }

    /// Whether any group carries no conditions at all.
    pub fn has_empty_group(&self) -> bool {
        self.groups.iter().any(|group| group.conditions.is_empty())
    }
}

/// Decodes an untrusted JSON payload into a [`BackendQuery`].
///
/// Structural problems are reported with the location that failed so that
/// callers can tell a malformed query apart from one that matches nobody.
pub fn parse_query(value: &Value) -> Result<BackendQuery, RuleError> {
    let object = value
        .as_object()
        .ok_or_else(|| RuleError::MalformedQuery("query must be a JSON object".into()))?;
    let groups = object
        .get("groups")
        .ok_or_else(|| RuleError::MalformedQuery("missing `groups`".into()))?
        .as_array()
        .ok_or_else(|| RuleError::MalformedQuery("`groups` must be an array".into()))?;

    let mut parsed = Vec::with_capacity(groups.len());
    for (group_index, group) in groups.iter().enumerate() {
        let conditions = group
            .get("conditions")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RuleError::MalformedQuery(format!(
                    "groups[{group_index}].conditions must be an array"
                ))
            })?;

        let mut decoded = Vec::with_capacity(conditions.len());
        for (condition_index, condition) in conditions.iter().enumerate() {
            let condition = QueryCondition::deserialize(condition).map_err(|err| {
                RuleError::MalformedQuery(format!(
                    "groups[{group_index}].conditions[{condition_index}]: {err}"
                ))
            })?;
            decoded.push(condition);
        }
        parsed.push(QueryGroup {
            conditions: decoded,
        });
    }

    Ok(BackendQuery { groups: parsed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn dates_read_from_day_or_timestamp_text() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(QueryValue::from("2024-05-01").as_date(), day);
        assert_eq!(QueryValue::from("2024-05-01T23:30:00Z").as_date(), day);
        assert_eq!(QueryValue::from("yesterday").as_date(), None);
        assert_eq!(QueryValue::Number(20240501.0).as_date(), None);
    }

    #[test]
    fn parses_wire_query() {
        let query = parse_query(&json!({
            "groups": [
                {"conditions": [
                    {"field": "totalSpend", "operator": "greaterThan", "value": 10000},
                    {"field": "lastOrderDate", "operator": "beforeDate", "value": "2024-01-01"}
                ]},
                {"conditions": []}
            ]
        }))
        .expect("query");

        assert_eq!(query.groups.len(), 2);
        assert_eq!(query.condition_count(), 2);
        assert_eq!(query.groups[0].conditions[0].value, QueryValue::Number(10000.0));
        assert_eq!(
            query.groups[0].conditions[1].value,
            QueryValue::Text("2024-01-01".into())
        );
        assert!(query.has_empty_group());
    }

    #[test]
    fn empty_group_list_is_valid() {
        let query = parse_query(&json!({"groups": []})).expect("query");
        assert!(query.groups.is_empty());
    }

    #[test_case(json!([]); "not an object")]
    #[test_case(json!({}); "missing groups")]
    #[test_case(json!({"groups": {}}); "groups not an array")]
    #[test_case(json!({"groups": [{}]}); "group without conditions")]
    #[test_case(json!({"groups": [{"conditions": [{"field": "spend", "operator": "greaterThan", "value": 1}]}]}); "tree field name")]
    #[test_case(json!({"groups": [{"conditions": [{"field": "totalSpend", "operator": ">", "value": 1}]}]}); "tree operator name")]
    fn rejects_malformed_queries(payload: Value) {
        let err = parse_query(&payload).unwrap_err();
        assert!(matches!(err, RuleError::MalformedQuery(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn serializes_camel_case_names() {
        let query = BackendQuery::single(vec![QueryCondition::new(
            QueryField::AvgOrderValue,
            QueryOperator::LessThanOrEqual,
            25.5,
        )]);
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(
            value,
            json!({"groups": [{"conditions": [
                {"field": "avgOrderValue", "operator": "lessThanOrEqual", "value": 25.5}
            ]}]})
        );
    }

    #[test]
    fn numeric_view_of_text_operand() {
        assert_eq!(QueryValue::from(" 42 ").as_number(), Some(42.0));
        assert_eq!(QueryValue::from("abc").as_number(), None);
        assert_eq!(QueryValue::Number(3.0).as_text(), "3");
        assert_eq!(QueryValue::Number(2.5).as_text(), "2.5");
    }
}
