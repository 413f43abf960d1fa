use tracing::{debug, warn};

use crate::condition::{Condition, ConditionUpdate, Field, Operator};
use crate::error::RuleError;
use crate::group::{Combinator, RuleGroup};
use crate::mutate;
use crate::preview::{LivePreview, PreviewSnapshot, ScheduledPreview};
use crate::query::BackendQuery;
use crate::schema::ModelSchema;
use crate::translator::{translate, TranslationMode};

/// Hands out `rule-N` and `group-N` ids that do not collide with a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIdGenerator {
    last_rule: u64,
    last_group: u64,
}

impl NodeIdGenerator {
    /// Starts numbering after the highest id of each kind found in `tree`.
    pub fn seeded_from(tree: &RuleGroup) -> Self {
        let mut generator = Self::default();
        for id in tree.node_ids() {
            if let Some(n) = numeric_suffix(id, "rule-") {
                generator.last_rule = generator.last_rule.max(n);
            } else if let Some(n) = numeric_suffix(id, "group-") {
                generator.last_group = generator.last_group.max(n);
            }
        }
        generator
    }

    pub fn next_rule_id(&mut self) -> String {
        self.last_rule += 1;
        format!("rule-{}", self.last_rule)
    }

    pub fn next_group_id(&mut self) -> String {
        self.last_group += 1;
        format!("group-{}", self.last_group)
    }
}

fn numeric_suffix(id: &str, prefix: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

/// What a builder operation did.
#[derive(Debug)]
pub struct Mutation {
    pub changed: bool,
    /// Id of the node created by the operation, if any.
    pub created: Option<String>,
    /// Audience recomputation started because the tree changed.
    pub preview: Option<ScheduledPreview>,
}

impl Mutation {
    fn unchanged() -> Self {
        Self {
            changed: false,
            created: None,
            preview: None,
        }
    }
}

/// Interactive editing session over one rule tree.
///
/// Each structural change replaces the tree wholesale (sharing untouched
/// subtrees) and, when a live preview is attached, schedules a fresh audience
/// estimate for it.
#[derive(Debug)]
pub struct RuleBuilder {
    tree: RuleGroup,
    ids: NodeIdGenerator,
    mode: TranslationMode,
    preview: Option<LivePreview>,
}

impl Default for RuleBuilder {
    fn default() -> Self {
        Self::new(RuleGroup::default())
    }
}

impl RuleBuilder {
    pub fn new(tree: RuleGroup) -> Self {
        Self {
            ids: NodeIdGenerator::seeded_from(&tree),
            tree,
            mode: TranslationMode::default(),
            preview: None,
        }
    }

    pub fn with_mode(mut self, mode: TranslationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_preview(mut self, preview: LivePreview) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn tree(&self) -> &RuleGroup {
        &self.tree
    }

    pub fn mode(&self) -> TranslationMode {
        self.mode
    }

    /// Generation of the most recently scheduled estimate, `0` before any.
    pub fn generation(&self) -> u64 {
        self.preview
            .as_ref()
            .map(|preview| preview.tracker().current_generation())
            .unwrap_or(0)
    }

    pub fn latest_estimate(&self) -> Option<PreviewSnapshot> {
        self.preview.as_ref().and_then(LivePreview::latest)
    }

    pub fn query(&self) -> Result<BackendQuery, RuleError> {
        translate(&self.tree, self.mode)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        ModelSchema.validate(&self.tree).map_err(RuleError::Schema)
    }

    /// Adds the default `visits < 3` condition to a group.
    pub fn add_rule(&mut self, group_id: &str) -> Mutation {
        self.add_condition(group_id, Field::Visits, Operator::LessThan, "3")
    }

    pub fn add_condition(
        &mut self,
        group_id: &str,
        field: Field,
        operator: Operator,
        value: &str,
    ) -> Mutation {
        if self.tree.find_group(group_id).is_none() {
            return Mutation::unchanged();
        }
        let id = self.ids.next_rule_id();
        let next = mutate::add_condition(
            &self.tree,
            group_id,
            Condition::new(id.clone(), field, operator, value),
        );
        self.commit(next, Some(id))
    }

    /// Adds an OR group seeded with `inactive_days > 90`.
    pub fn add_nested_group(&mut self, parent_id: &str) -> Mutation {
        if self.tree.find_group(parent_id).is_none() {
            return Mutation::unchanged();
        }
        let group_id = self.ids.next_group_id();
        let seed = Condition::new(
            self.ids.next_rule_id(),
            Field::InactiveDays,
            Operator::GreaterThan,
            "90",
        );
        let group = RuleGroup::new(group_id.clone(), Combinator::Or).with(seed);
        let next = mutate::add_group(&self.tree, parent_id, group);
        self.commit(next, Some(group_id))
    }

    /// Applies an `(attribute, value)` edit as sent by front-ends.
    pub fn update(
        &mut self,
        condition_id: &str,
        attribute: &str,
        value: &str,
    ) -> Result<Mutation, RuleError> {
        let update = ConditionUpdate::parse(attribute, value)?;
        Ok(self.update_condition(condition_id, update))
    }

    pub fn update_condition(&mut self, condition_id: &str, update: ConditionUpdate) -> Mutation {
        let next = mutate::update_condition(&self.tree, condition_id, update);
        self.commit(next, None)
    }

    pub fn remove(&mut self, node_id: &str) -> Mutation {
        let next = mutate::remove_node(&self.tree, node_id);
        self.commit(next, None)
    }

    pub fn set_combinator(&mut self, group_id: &str, combinator: Combinator) -> Mutation {
        let next = mutate::set_combinator(&self.tree, group_id, combinator);
        self.commit(next, None)
    }

    /// Installs a whole tree, for example one produced by synthesis.
    pub fn replace_tree(&mut self, tree: RuleGroup) -> Result<Mutation, RuleError> {
        ModelSchema.validate(&tree).map_err(RuleError::Schema)?;
        self.ids = NodeIdGenerator::seeded_from(&tree);
        Ok(self.commit(tree, None))
    }

    /// Schedules an estimate for the current tree without changing it.
    pub fn refresh(&self) -> Option<ScheduledPreview> {
        self.schedule_preview()
    }

    fn commit(&mut self, next: RuleGroup, created: Option<String>) -> Mutation {
        if next == self.tree {
            debug!("builder mutation left the tree unchanged");
            return Mutation::unchanged();
        }
        self.tree = next;
        Mutation {
            changed: true,
            created,
            preview: self.schedule_preview(),
        }
    }

    fn schedule_preview(&self) -> Option<ScheduledPreview> {
        let preview = self.preview.as_ref()?;
        match self.query() {
            Ok(query) => Some(preview.schedule(query)),
            Err(err) => {
                let generation = preview.tracker().invalidate();
                warn!(generation, error = %err, "skipping audience preview");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{AudienceEstimate, AudienceEvaluator};
    use crate::preview::{AudienceEstimator, InMemoryAudience};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn default_rule_and_group_shapes() {
        let mut builder = RuleBuilder::default();
        let rule = builder.add_rule("root");
        assert!(rule.changed);
        assert_eq!(rule.created.as_deref(), Some("rule-1"));

        let group = builder.add_nested_group("root");
        assert_eq!(group.created.as_deref(), Some("group-1"));

        let tree = builder.tree();
        let added = tree.find_condition("rule-1").unwrap();
        assert_eq!((added.field, added.operator, added.value.as_str()), (Field::Visits, Operator::LessThan, "3"));

        let nested = tree.find_group("group-1").unwrap();
        assert_eq!(nested.combinator, Combinator::Or);
        let seeded = tree.find_condition("rule-2").unwrap();
        assert_eq!((seeded.field, seeded.operator, seeded.value.as_str()), (Field::InactiveDays, Operator::GreaterThan, "90"));
    }

    #[test]
    fn ids_continue_after_existing_ones() {
        let tree = RuleGroup::root(Combinator::And)
            .with(Condition::new("rule-7", Field::Spend, Operator::GreaterThan, "1"))
            .with(RuleGroup::new("group-3", Combinator::Or));
        let mut builder = RuleBuilder::new(tree);
        assert_eq!(builder.add_rule("group-3").created.as_deref(), Some("rule-8"));
        assert_eq!(builder.add_nested_group("root").created.as_deref(), Some("group-4"));
        assert!(builder.tree().duplicate_ids().is_empty());
    }

    #[test]
    fn unknown_targets_do_not_consume_ids() {
        let mut builder = RuleBuilder::default();
        assert!(!builder.add_rule("group-9").changed);
        assert!(!builder.remove("rule-9").changed);
        assert_eq!(builder.add_rule("root").created.as_deref(), Some("rule-1"));
    }

    #[test]
    fn string_updates_are_parsed_at_the_boundary() {
        let mut builder = RuleBuilder::default();
        builder.add_rule("root");
        assert!(builder.update("rule-1", "value", "12").unwrap().changed);
        assert!(builder.update("rule-1", "operator", ">=").unwrap().changed);
        assert!(matches!(
            builder.update("rule-1", "field", "ltv"),
            Err(RuleError::UnknownField(_))
        ));
        assert!(matches!(
            builder.update("rule-1", "colour", "blue"),
            Err(RuleError::UnknownAttribute(_))
        ));
        let rule = builder.tree().find_condition("rule-1").unwrap();
        assert_eq!(rule.value, "12");
        assert_eq!(rule.operator, Operator::GreaterThanOrEqual);
    }

    #[test]
    fn replace_tree_validates_and_reseeds() {
        let mut builder = RuleBuilder::default();
        let invalid = RuleGroup::new("other", Combinator::And);
        assert!(matches!(builder.replace_tree(invalid), Err(RuleError::Schema(_))));

        let synthesized = RuleGroup::root(Combinator::Or)
            .with(Condition::new("rule-1", Field::Spend, Operator::GreaterThan, "5000"))
            .with(Condition::new("rule-2", Field::Visits, Operator::LessThan, "2"));
        assert!(builder.replace_tree(synthesized).unwrap().changed);
        assert_eq!(builder.add_rule("root").created.as_deref(), Some("rule-3"));
    }

    #[test]
    fn preserve_groups_mode_keeps_disjunctions() {
        let mut builder = RuleBuilder::default().with_mode(TranslationMode::PreserveGroups);
        builder.add_rule("root");
        builder.set_combinator("root", Combinator::Or);
        builder.add_rule("root");
        assert_eq!(builder.query().unwrap().groups.len(), 2);
    }

    #[tokio::test]
    async fn structural_changes_schedule_estimates() {
        let audience = InMemoryAudience::new(Vec::new(), AudienceEvaluator::default());
        let mut builder = RuleBuilder::default().with_preview(LivePreview::new(Arc::new(audience)));

        let added = builder.add_rule("root");
        let preview = added.preview.expect("preview scheduled");
        assert!(preview.wait().await);
        assert_eq!(builder.generation(), 1);

        let noop = builder.remove("missing");
        assert!(noop.preview.is_none());
        assert_eq!(builder.generation(), 1);

        let snapshot = builder.latest_estimate().unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.estimate.audience_size, 0);
    }

    #[tokio::test]
    async fn untranslatable_tree_clears_the_previous_estimate() {
        let audience = InMemoryAudience::new(Vec::new(), AudienceEvaluator::default());
        let mut builder = RuleBuilder::default()
            .with_mode(TranslationMode::PreserveGroups)
            .with_preview(LivePreview::new(Arc::new(audience)));

        // Each OR group of two under an AND root doubles the DNF group count.
        for _ in 0..6 {
            let group = builder.add_nested_group("root").created.unwrap();
            let added = builder.add_rule(&group);
            assert!(added.preview.expect("translatable").wait().await);
        }
        let before = builder.latest_estimate().expect("estimate for 64 groups");
        assert_eq!(before.generation, builder.generation());

        let group = builder.add_nested_group("root").created.unwrap();
        let overflow = builder.add_rule(&group);
        assert!(overflow.changed);
        assert!(overflow.preview.is_none());
        assert!(matches!(builder.query(), Err(RuleError::QueryTooComplex { .. })));
        assert!(builder.generation() > before.generation);
        assert!(builder.latest_estimate().is_none());
    }

    struct SlowFirst;

    #[async_trait]
    impl AudienceEstimator for SlowFirst {
        async fn estimate(&self, query: &BackendQuery) -> Result<AudienceEstimate, RuleError> {
            let conditions = query.condition_count();
            let delay = if conditions == 1 { 1_000 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AudienceEstimate {
                audience_size: conditions,
                sample_user_ids: Vec::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_keep_the_newest_estimate() {
        let mut builder = RuleBuilder::default().with_preview(LivePreview::new(Arc::new(SlowFirst)));

        let first = builder.add_rule("root").preview.unwrap();
        let second = builder.add_rule("root").preview.unwrap();

        assert!(second.wait().await);
        assert!(!first.wait().await);

        let latest = builder.latest_estimate().unwrap();
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.estimate.audience_size, 2);
    }
}
