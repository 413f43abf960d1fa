//! Copy-on-write edits over a rule tree.
//!
//! Every operation takes the current tree by reference and returns the next
//! one. Only the groups on the path from the root to the edited node are
//! reallocated; all other subtrees are shared with the input. When the target
//! id does not exist the returned tree is equal to the input.

use std::sync::Arc;

use crate::condition::{Condition, ConditionUpdate};
use crate::group::{Combinator, RuleGroup, RuleNode};

/// Appends `condition` to the group identified by `target_group_id`.
pub fn add_condition(tree: &RuleGroup, target_group_id: &str, condition: Condition) -> RuleGroup {
    insert_into_group(tree, target_group_id, RuleNode::Condition(condition))
}

/// Appends a nested group to the group identified by `parent_group_id`.
pub fn add_group(tree: &RuleGroup, parent_group_id: &str, group: RuleGroup) -> RuleGroup {
    insert_into_group(tree, parent_group_id, RuleNode::Group(group))
}

/// Replaces one attribute of the condition identified by `condition_id`.
pub fn update_condition(tree: &RuleGroup, condition_id: &str, update: ConditionUpdate) -> RuleGroup {
    edit(tree, &mut |group| {
        let position = group.rules.iter().position(|node| {
            matches!(node.as_ref(), RuleNode::Condition(condition) if condition.id == condition_id)
        })?;
        let RuleNode::Condition(condition) = group.rules[position].as_ref() else {
            return None;
        };
        let mut next = group.clone();
        next.rules[position] = Arc::new(RuleNode::Condition(condition.with_update(&update)));
        Some(next)
    })
}

/// Removes the condition or group identified by `node_id` from its parent.
///
/// The root itself is never removed. Emptying the root is allowed.
pub fn remove_node(tree: &RuleGroup, node_id: &str) -> RuleGroup {
    edit(tree, &mut |group| {
        let position = group.rules.iter().position(|node| node.id() == node_id)?;
        let mut next = group.clone();
        next.rules.remove(position);
        Some(next)
    })
}

/// Sets the combinator of the group identified by `group_id`.
pub fn set_combinator(tree: &RuleGroup, group_id: &str, combinator: Combinator) -> RuleGroup {
    edit(tree, &mut |group| {
        (group.id == group_id).then(|| RuleGroup {
            combinator,
            ..group.clone()
        })
    })
}

fn insert_into_group(tree: &RuleGroup, target_id: &str, node: RuleNode) -> RuleGroup {
    let node = Arc::new(node);
    edit(tree, &mut |group| {
        (group.id == target_id).then(|| {
            let mut next = group.clone();
            next.rules.push(Arc::clone(&node));
            next
        })
    })
}

fn edit(tree: &RuleGroup, visit: &mut dyn FnMut(&RuleGroup) -> Option<RuleGroup>) -> RuleGroup {
    rewrite(tree, visit).unwrap_or_else(|| tree.clone())
}

// Returns `Some` only when something below (or at) `group` changed. The first
// match wins; ids are unique within a tree.
fn rewrite(
    group: &RuleGroup,
    visit: &mut dyn FnMut(&RuleGroup) -> Option<RuleGroup>,
) -> Option<RuleGroup> {
    if let Some(replaced) = visit(group) {
        return Some(replaced);
    }

    for (index, node) in group.rules.iter().enumerate() {
        let RuleNode::Group(child) = node.as_ref() else {
            continue;
        };
        if let Some(replaced) = rewrite(child, visit) {
            let mut next = group.clone();
            next.rules[index] = Arc::new(RuleNode::Group(replaced));
            return Some(next);
        }
    }

    None
}
