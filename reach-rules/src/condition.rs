use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Customer attribute a condition compares against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Spend,
    Visits,
    InactiveDays,
    PurchaseCount,
    AvgOrderValue,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Spend,
        Field::Visits,
        Field::InactiveDays,
        Field::PurchaseCount,
        Field::AvgOrderValue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Spend => "spend",
            Field::Visits => "visits",
            Field::InactiveDays => "inactive_days",
            Field::PurchaseCount => "purchase_count",
            Field::AvgOrderValue => "avg_order_value",
        }
    }

    /// Human readable label shown by builder front-ends.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Spend => "Total Spend",
            Field::Visits => "Visit Count",
            Field::InactiveDays => "Inactive Days",
            Field::PurchaseCount => "Purchase Count",
            Field::AvgOrderValue => "Avg Order Value",
        }
    }

    /// Every builder field is compared numerically.
    pub fn is_numeric(&self) -> bool {
        match self {
            Field::Spend
            | Field::Visits
            | Field::InactiveDays
            | Field::PurchaseCount
            | Field::AvgOrderValue => true,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| RuleError::UnknownField(value.to_string()))
    }
}

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "=", alias = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::GreaterThanOrEqual,
        Operator::LessThanOrEqual,
        Operator::Equals,
        Operator::NotEquals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThanOrEqual => "<=",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "==" {
            return Ok(Operator::Equals);
        }
        Operator::ALL
            .into_iter()
            .find(|operator| operator.as_str() == value)
            .ok_or_else(|| RuleError::UnknownOperator(value.to_string()))
    }
}

/// Leaf of a rule tree: a single field/operator/value comparison.
///
/// `value` stays a string because it is whatever the user typed; numeric
/// interpretation happens during translation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub id: String,
    pub field: Field,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(
        id: impl Into<String>,
        field: Field,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            field,
            operator,
            value: value.into(),
        }
    }

    /// Returns a copy with one attribute replaced.
    pub fn with_update(&self, update: &ConditionUpdate) -> Self {
        let mut next = self.clone();
        match update {
            ConditionUpdate::Field(field) => next.field = *field,
            ConditionUpdate::Operator(operator) => next.operator = *operator,
            ConditionUpdate::Value(value) => next.value = value.clone(),
        }
        next
    }
}

/// A single attribute change applied to a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionUpdate {
    Field(Field),
    Operator(Operator),
    Value(String),
}

impl ConditionUpdate {
    /// Parses an `(attribute, value)` pair as sent by builder front-ends.
    pub fn parse(attribute: &str, value: &str) -> Result<Self, RuleError> {
        match attribute {
            "field" => Ok(ConditionUpdate::Field(value.parse()?)),
            "operator" => Ok(ConditionUpdate::Operator(value.parse()?)),
            "value" => Ok(ConditionUpdate::Value(value.to_string())),
            other => Err(RuleError::UnknownAttribute(other.to_string())),
        }
    }
}
