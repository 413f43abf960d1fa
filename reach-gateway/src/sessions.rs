use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use reach_rules::{
    AudienceEstimator, Combinator, Field, LivePreview, Mutation, Operator, RuleBuilder, RuleError,
    RuleGroup, TranslationMode,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_SESSION_CAPACITY: usize = 1024;

pub type SharedBuilder = Arc<Mutex<RuleBuilder>>;

/// One edit to a builder session, as posted to `/mutations`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BuilderOp {
    AddRule {
        group_id: String,
    },
    AddCondition {
        group_id: String,
        field: String,
        operator: String,
        value: String,
    },
    AddGroup {
        parent_id: String,
    },
    Update {
        condition_id: String,
        attribute: String,
        value: String,
    },
    Remove {
        node_id: String,
    },
    SetCombinator {
        group_id: String,
        combinator: String,
    },
    Replace {
        tree: RuleGroup,
    },
}

impl BuilderOp {
    /// Applies the edit. String attributes are parsed here, so unknown
    /// fields, operators or combinators fail before the tree is touched.
    pub fn apply(self, builder: &mut RuleBuilder) -> Result<Mutation, RuleError> {
        match self {
            BuilderOp::AddRule { group_id } => Ok(builder.add_rule(&group_id)),
            BuilderOp::AddCondition {
                group_id,
                field,
                operator,
                value,
            } => {
                let field: Field = field.parse()?;
                let operator: Operator = operator.parse()?;
                Ok(builder.add_condition(&group_id, field, operator, &value))
            }
            BuilderOp::AddGroup { parent_id } => Ok(builder.add_nested_group(&parent_id)),
            BuilderOp::Update {
                condition_id,
                attribute,
                value,
            } => builder.update(&condition_id, &attribute, &value),
            BuilderOp::Remove { node_id } => Ok(builder.remove(&node_id)),
            BuilderOp::SetCombinator {
                group_id,
                combinator,
            } => {
                let combinator: Combinator = combinator.parse()?;
                Ok(builder.set_combinator(&group_id, combinator))
            }
            BuilderOp::Replace { tree } => builder.replace_tree(tree),
        }
    }
}

#[derive(Default)]
struct Sessions {
    builders: HashMap<Uuid, SharedBuilder>,
    order: VecDeque<Uuid>,
}

/// Live rule builder sessions, oldest evicted first once full.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<Sessions>>,
    estimator: Arc<dyn AudienceEstimator>,
    mode: TranslationMode,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(estimator: Arc<dyn AudienceEstimator>, mode: TranslationMode) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Sessions::default())),
            estimator,
            mode,
            capacity: DEFAULT_SESSION_CAPACITY,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.read().builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a session over `tree`. The tree is validated first.
    pub fn open(&self, tree: RuleGroup) -> Result<(Uuid, SharedBuilder), RuleError> {
        let builder = RuleBuilder::new(RuleGroup::default())
            .with_mode(self.mode)
            .with_preview(LivePreview::new(Arc::clone(&self.estimator)));
        let builder = Arc::new(Mutex::new(builder));
        builder.lock().replace_tree(tree)?;

        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write();
        while sessions.builders.len() >= self.capacity {
            let Some(oldest) = sessions.order.pop_front() else {
                break;
            };
            sessions.builders.remove(&oldest);
            debug!(session_id = %oldest, "evicted builder session");
        }
        sessions.builders.insert(id, Arc::clone(&builder));
        sessions.order.push_back(id);
        info!(session_id = %id, "opened builder session");
        Ok((id, builder))
    }

    pub fn get(&self, id: Uuid) -> Option<SharedBuilder> {
        self.sessions.read().builders.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reach_rules::{AudienceEvaluator, InMemoryAudience, RuleNode};
    use serde_json::json;

    fn registry() -> SessionRegistry {
        let estimator = InMemoryAudience::new(Vec::new(), AudienceEvaluator::default());
        SessionRegistry::new(Arc::new(estimator), TranslationMode::Flatten)
    }

    #[test]
    fn ops_decode_from_tagged_json() {
        let op: BuilderOp = serde_json::from_value(json!({
            "op": "update",
            "conditionId": "rule-1",
            "attribute": "operator",
            "value": ">="
        }))
        .unwrap();
        assert_eq!(
            op,
            BuilderOp::Update {
                condition_id: "rule-1".into(),
                attribute: "operator".into(),
                value: ">=".into(),
            }
        );

        assert!(serde_json::from_value::<BuilderOp>(json!({ "op": "explode" })).is_err());
    }

    #[tokio::test]
    async fn applies_ops_to_the_session_tree() {
        let registry = registry();
        let (id, builder) = registry.open(RuleGroup::default()).unwrap();
        assert!(registry.get(id).is_some());

        let mut builder = builder.lock();
        let added = BuilderOp::AddRule {
            group_id: "root".into(),
        }
        .apply(&mut builder)
        .unwrap();
        assert!(added.changed);
        assert_eq!(added.created.as_deref(), Some("rule-1"));

        BuilderOp::SetCombinator {
            group_id: "root".into(),
            combinator: "OR".into(),
        }
        .apply(&mut builder)
        .unwrap();
        assert_eq!(builder.tree().combinator, Combinator::Or);
        match builder.tree().rules[0].as_ref() {
            RuleNode::Condition(condition) => assert_eq!(condition.field, Field::Visits),
            RuleNode::Group(_) => panic!("expected a condition"),
        }
    }

    #[tokio::test]
    async fn unknown_attributes_leave_the_tree_alone() {
        let registry = registry();
        let (_, builder) = registry.open(RuleGroup::default()).unwrap();
        let mut builder = builder.lock();
        let before = builder.tree().clone();

        let err = BuilderOp::SetCombinator {
            group_id: "root".into(),
            combinator: "XOR".into(),
        }
        .apply(&mut builder)
        .unwrap_err();
        assert!(matches!(err, RuleError::UnknownCombinator(_)));
        assert_eq!(builder.tree(), &before);
    }

    #[tokio::test]
    async fn evicts_the_oldest_session_when_full() {
        let registry = registry().with_capacity(2);
        let (first, _) = registry.open(RuleGroup::default()).unwrap();
        let (second, _) = registry.open(RuleGroup::default()).unwrap();
        let (third, _) = registry.open(RuleGroup::default()).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
        assert!(registry.get(third).is_some());
    }
}
