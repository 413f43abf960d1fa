use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::RuleError;

/// Identifier every rule tree root carries.
pub const ROOT_ID: &str = "root";

/// Boolean combinator applied to the children of a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Combinator {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AND" => Ok(Combinator::And),
            "OR" => Ok(Combinator::Or),
            other => Err(RuleError::UnknownCombinator(other.to_string())),
        }
    }
}

/// A node of the rule tree.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RuleNode {
    Group(RuleGroup),
    Condition(Condition),
}

impl RuleNode {
    pub fn id(&self) -> &str {
        match self {
            RuleNode::Group(group) => &group.id,
            RuleNode::Condition(condition) => &condition.id,
        }
    }
}

impl From<Condition> for RuleNode {
    fn from(value: Condition) -> Self {
        RuleNode::Condition(value)
    }
}

impl From<RuleGroup> for RuleNode {
    fn from(value: RuleGroup) -> Self {
        RuleNode::Group(value)
    }
}

// Wire payloads do not tag nodes; an object carrying `combinator` or `rules`
// is a group, anything else must decode as a condition.
impl<'de> Deserialize<'de> for RuleNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let is_group = value
            .as_object()
            .map(|object| object.contains_key("combinator") || object.contains_key("rules"))
            .ok_or_else(|| D::Error::custom("rule node must be a JSON object"))?;

        if is_group {
            RuleGroup::deserialize(value)
                .map(RuleNode::Group)
                .map_err(D::Error::custom)
        } else {
            Condition::deserialize(value)
                .map(RuleNode::Condition)
                .map_err(D::Error::custom)
        }
    }
}

/// Internal node combining child conditions and groups.
///
/// Children are reference counted so that edits can share every subtree
/// they do not touch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleGroup {
    pub id: String,
    pub combinator: Combinator,
    #[serde(default)]
    pub rules: Vec<Arc<RuleNode>>,
}

impl RuleGroup {
    pub fn new(id: impl Into<String>, combinator: Combinator) -> Self {
        Self {
            id: id.into(),
            combinator,
            rules: Vec::new(),
        }
    }

    /// Creates an empty root group.
    pub fn root(combinator: Combinator) -> Self {
        Self::new(ROOT_ID, combinator)
    }

    /// Appends a child, consuming and returning the group.
    pub fn with(mut self, node: impl Into<RuleNode>) -> Self {
        self.rules.push(Arc::new(node.into()));
        self
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All leaf conditions in depth-first order, regardless of combinators.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        for node in &self.rules {
            match node.as_ref() {
                RuleNode::Condition(condition) => out.push(condition),
                RuleNode::Group(group) => group.collect_conditions(out),
            }
        }
    }

    pub fn condition_count(&self) -> usize {
        self.rules
            .iter()
            .map(|node| match node.as_ref() {
                RuleNode::Condition(_) => 1,
                RuleNode::Group(group) => group.condition_count(),
            })
            .sum()
    }

    /// Nesting depth; a group with only leaves has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .rules
            .iter()
            .map(|node| match node.as_ref() {
                RuleNode::Condition(_) => 0,
                RuleNode::Group(group) => group.depth(),
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether some group ORs two or more children together.
    pub fn has_disjunction(&self) -> bool {
        (self.combinator == Combinator::Or && self.rules.len() > 1)
            || self.rules.iter().any(|node| match node.as_ref() {
                RuleNode::Group(group) => group.has_disjunction(),
                RuleNode::Condition(_) => false,
            })
    }

    pub fn find_group(&self, id: &str) -> Option<&RuleGroup> {
        if self.id == id {
            return Some(self);
        }
        self.rules.iter().find_map(|node| match node.as_ref() {
            RuleNode::Group(group) => group.find_group(id),
            RuleNode::Condition(_) => None,
        })
    }

    pub fn find_condition(&self, id: &str) -> Option<&Condition> {
        self.rules.iter().find_map(|node| match node.as_ref() {
            RuleNode::Condition(condition) if condition.id == id => Some(condition),
            RuleNode::Condition(_) => None,
            RuleNode::Group(group) => group.find_condition(id),
        })
    }

    /// Every node id in the tree, root included, in depth-first order.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        for node in &self.rules {
            match node.as_ref() {
                RuleNode::Condition(condition) => ids.push(&condition.id),
                RuleNode::Group(group) => ids.extend(group.node_ids()),
            }
        }
        ids
    }

    /// Ids that occur more than once.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for id in self.node_ids() {
            if !seen.insert(id) && !duplicates.iter().any(|existing| existing == id) {
                duplicates.push(id.to_string());
            }
        }
        duplicates
    }
}

impl Default for RuleGroup {
    fn default() -> Self {
        RuleGroup::root(Combinator::And)
    }
}
