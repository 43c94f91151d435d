//! Structural operations over the filter tree.
//!
//! Every edit returns a new tree; the input is never mutated. Trees are a
//! handful of nodes, so plain recursive cloning is all that is needed.

use std::collections::HashSet;

use crate::ast::{new_node_id, Condition, FilterNode, Group, Placement};
use crate::error::QueryError;

impl Group {
    /// Deep copy with every id regenerated, for duplicating a subtree.
    pub fn clone_with_new_ids(&self) -> Group {
        Group {
            id: new_node_id(),
            logic: self.logic,
            children: self.children.iter().map(renew_ids).collect(),
        }
    }

    pub fn find_by_id(&self, id: &str) -> Option<&FilterNode> {
        self.children.iter().find_map(|child| find_in(child, id))
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.id == id || self.find_by_id(id).is_some()
    }

    /// Removes the node with `id`. A group left empty by the removal is
    /// removed too, recursively up to (but excluding) the root.
    pub fn remove_by_id(&self, id: &str) -> Group {
        Group {
            id: self.id.clone(),
            logic: self.logic,
            children: remove_from(&self.children, id),
        }
    }

    /// Applies `update` to the node with `id`. The node keeps its id.
    ///
    /// The root stays a group: if `update` replaces it with a leaf, the leaf
    /// becomes the only child of the root.
    pub fn update_by_id(&self, id: &str, update: impl FnOnce(&mut FilterNode)) -> Group {
        if self.id == id {
            let mut node = FilterNode::Group(self.clone());
            update(&mut node);
            return match node {
                FilterNode::Group(mut g) => {
                    g.id = self.id.clone();
                    g
                }
                leaf => Group {
                    id: self.id.clone(),
                    logic: self.logic,
                    children: vec![leaf],
                },
            };
        }
        let mut next = self.clone();
        let mut update = Some(update);
        update_in(&mut next.children, id, &mut update);
        next
    }

    /// Appends a condition to the root, giving it a fresh id if it would
    /// collide with an existing one.
    pub fn append_condition(&self, mut condition: Condition) -> Group {
        if self.contains_id(&condition.id) {
            condition.id = new_node_id();
        }
        let mut next = self.clone();
        next.children.push(FilterNode::Condition(condition));
        next
    }

    /// Flips AND/OR on the group with `group_id` (the root included).
    pub fn toggle_group_logic(&self, group_id: &str) -> Group {
        let mut next = self.clone();
        if next.id == group_id {
            next.logic = next.logic.toggled();
            return next;
        }
        let mut toggle = Some(|node: &mut FilterNode| {
            if let FilterNode::Group(g) = node {
                g.logic = g.logic.toggled();
            }
        });
        update_in(&mut next.children, group_id, &mut toggle);
        next
    }

    /// Number of Condition leaves; Raw fragments are not counted.
    pub fn count_conditions(&self) -> usize {
        self.children.iter().map(count_in).sum()
    }

    /// Condition leaves in document order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        collect_conditions(&self.children, &mut out);
        out
    }

    /// Deepest group nesting found, the root counting as 1.
    pub fn nesting_depth(&self) -> usize {
        1 + self.children.iter().map(depth_of).max().unwrap_or(0)
    }

    /// Fails with `NestingTooDeep` when the tree exceeds `max`.
    pub fn validate_nesting_depth(&self, max: usize) -> Result<usize, QueryError> {
        check_depth(self.nesting_depth(), max)
    }

    /// Whether every id in the tree is distinct.
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = HashSet::new();
        seen.insert(self.id.as_str());
        all_unique(&self.children, &mut seen)
    }

    /// Drops empty groups anywhere below the root.
    pub fn pruned(&self) -> Group {
        self.filtered(&|_: Option<&Condition>| true)
    }

    /// Keeps only leaves accepted by `keep`, pruning groups that end up
    /// empty. Raw fragments carry no placement and are treated as
    /// WHERE-placed conditions would be: they are passed to `keep` as `None`.
    pub fn filtered(&self, keep: &dyn Fn(Option<&Condition>) -> bool) -> Group {
        Group {
            id: self.id.clone(),
            logic: self.logic,
            children: self
                .children
                .iter()
                .filter_map(|child| filter_node(child, keep))
                .collect(),
        }
    }

    /// Subtree of conditions with the requested placement. For `On`, only
    /// conditions on `for_table` are kept; Raw fragments never go to ON.
    pub fn for_placement(&self, placement: Placement, for_table: Option<&str>) -> Group {
        self.filtered(&|leaf: Option<&Condition>| match (leaf, placement) {
            (None, Placement::On) => false,
            (None, Placement::Where) => true,
            (Some(c), Placement::On) => {
                c.placement == Placement::On && for_table.map_or(true, |t| c.table == t)
            }
            (Some(c), Placement::Where) => c.placement == Placement::Where,
        })
    }
}

pub(crate) fn check_depth(depth: usize, max: usize) -> Result<usize, QueryError> {
    if depth > max {
        Err(QueryError::NestingTooDeep { depth, max })
    } else {
        Ok(depth)
    }
}

/// Depth of a node; leaves contribute nothing.
pub(crate) fn depth_of(node: &FilterNode) -> usize {
    match node {
        FilterNode::Group(g) => g.nesting_depth(),
        FilterNode::Condition(_) | FilterNode::Raw(_) => 0,
    }
}

fn renew_ids(node: &FilterNode) -> FilterNode {
    match node {
        FilterNode::Condition(c) => FilterNode::Condition(Condition {
            id: new_node_id(),
            ..c.clone()
        }),
        FilterNode::Group(g) => FilterNode::Group(g.clone_with_new_ids()),
        FilterNode::Raw(r) => FilterNode::raw(r.sql.clone()),
    }
}

fn find_in<'a>(node: &'a FilterNode, id: &str) -> Option<&'a FilterNode> {
    if node.id() == id {
        return Some(node);
    }
    match node {
        FilterNode::Group(g) => g.find_by_id(id),
        FilterNode::Condition(_) | FilterNode::Raw(_) => None,
    }
}

fn remove_from(children: &[FilterNode], id: &str) -> Vec<FilterNode> {
    children
        .iter()
        .filter(|child| child.id() != id)
        .filter_map(|child| match child {
            FilterNode::Group(g) if g.contains_id(id) => {
                let next = g.remove_by_id(id);
                if next.children.is_empty() {
                    None
                } else {
                    Some(FilterNode::Group(next))
                }
            }
            other => Some(other.clone()),
        })
        .collect()
}

fn update_in<F: FnOnce(&mut FilterNode)>(
    children: &mut [FilterNode],
    id: &str,
    update: &mut Option<F>,
) {
    for child in children.iter_mut() {
        if update.is_none() {
            return;
        }
        if child.id() == id {
            let original_id = child.id().to_string();
            if let Some(f) = update.take() {
                f(child);
            }
            restore_id(child, original_id);
            return;
        }
        if let FilterNode::Group(g) = child {
            update_in(&mut g.children, id, update);
        }
    }
}

fn restore_id(node: &mut FilterNode, id: String) {
    match node {
        FilterNode::Condition(c) => c.id = id,
        FilterNode::Group(g) => g.id = id,
        FilterNode::Raw(r) => r.id = id,
    }
}

fn count_in(node: &FilterNode) -> usize {
    match node {
        FilterNode::Condition(_) => 1,
        FilterNode::Group(g) => g.count_conditions(),
        FilterNode::Raw(_) => 0,
    }
}

fn collect_conditions<'a>(children: &'a [FilterNode], out: &mut Vec<&'a Condition>) {
    for child in children {
        match child {
            FilterNode::Condition(c) => out.push(c),
            FilterNode::Group(g) => collect_conditions(&g.children, out),
            FilterNode::Raw(_) => {}
        }
    }
}

fn all_unique<'a>(children: &'a [FilterNode], seen: &mut HashSet<&'a str>) -> bool {
    children.iter().all(|child| {
        seen.insert(child.id())
            && match child {
                FilterNode::Group(g) => all_unique(&g.children, seen),
                FilterNode::Condition(_) | FilterNode::Raw(_) => true,
            }
    })
}

fn filter_node(node: &FilterNode, keep: &dyn Fn(Option<&Condition>) -> bool) -> Option<FilterNode> {
    match node {
        FilterNode::Condition(c) => keep(Some(c)).then(|| node.clone()),
        FilterNode::Raw(_) => keep(None).then(|| node.clone()),
        FilterNode::Group(g) => {
            let next = g.filtered(keep);
            (!next.children.is_empty()).then_some(FilterNode::Group(next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Logic, Operator};

    fn cond(column: &str) -> Condition {
        Condition::compare("t", column, Operator::Eq, 1)
    }

    /// root(AND)[a, (OR)[b, (AND)[c]]]
    fn sample() -> (Group, Vec<String>) {
        let a = cond("a");
        let b = cond("b");
        let c = cond("c");
        let inner = Group::with_children(Logic::And, vec![c.clone().into()]);
        let middle = Group::with_children(Logic::Or, vec![b.clone().into(), inner.clone().into()]);
        let ids = vec![a.id.clone(), b.id.clone(), c.id.clone(), inner.id.clone(), middle.id.clone()];
        let root = Group::with_children(Logic::And, vec![a.into(), middle.into()]);
        (root, ids)
    }

    #[test]
    fn test_find_by_id() {
        let (root, ids) = sample();
        for id in &ids {
            assert_eq!(root.find_by_id(id).map(|n| n.id()), Some(id.as_str()));
        }
        assert!(root.find_by_id("missing").is_none());
    }

    #[test]
    fn test_remove_prunes_emptied_ancestors() {
        let (root, ids) = sample();
        let removed = root.remove_by_id(&ids[2]);
        // the inner group lost its only child and disappears; the OR group keeps b
        assert!(removed.find_by_id(&ids[3]).is_none());
        assert!(removed.find_by_id(&ids[4]).is_some());
        assert_eq!(removed.count_conditions(), 2);
        // original untouched
        assert_eq!(root.count_conditions(), 3);
    }

    #[test]
    fn test_remove_cascades_to_root_children() {
        let (root, ids) = sample();
        let removed = root.remove_by_id(&ids[1]).remove_by_id(&ids[2]);
        assert!(removed.find_by_id(&ids[4]).is_none());
        assert_eq!(removed.children.len(), 1);

        let emptied = removed.remove_by_id(&ids[0]);
        assert!(emptied.children.is_empty());
        assert_eq!(emptied.id, root.id);
    }

    #[test]
    fn test_update_keeps_id() {
        let (root, ids) = sample();
        let updated = root.update_by_id(&ids[1], |node| {
            *node = FilterNode::Condition(Condition::compare("t", "z", Operator::Gt, 9));
        });
        match updated.find_by_id(&ids[1]) {
            Some(FilterNode::Condition(c)) => {
                assert_eq!(c.column, "z");
                assert_eq!(c.operator, Operator::Gt);
            }
            other => panic!("expected condition, got {:?}", other),
        }
    }

    #[test]
    fn test_update_root() {
        let (root, ids) = sample();
        let updated = root.update_by_id(&root.id, |node| {
            if let FilterNode::Group(g) = node {
                g.logic = g.logic.toggled();
                g.id = "replaced".to_string();
            }
        });
        assert_eq!(updated.id, root.id);
        assert_eq!(updated.logic, root.logic.toggled());
        assert_eq!(updated.count_conditions(), root.count_conditions());
        assert!(updated.find_by_id(&ids[0]).is_some());

        let replaced = root.update_by_id(&root.id, |node| {
            *node = FilterNode::Condition(cond("solo"));
        });
        assert_eq!(replaced.id, root.id);
        assert_eq!(replaced.children.len(), 1);
        assert_eq!(replaced.count_conditions(), 1);
    }

    #[test]
    fn test_append_and_toggle() {
        let (root, ids) = sample();
        let appended = root.append_condition(cond("d"));
        assert_eq!(appended.count_conditions(), 4);

        let duplicate = Condition { id: ids[0].clone(), ..cond("e") };
        let appended = appended.append_condition(duplicate);
        assert!(appended.has_unique_ids());

        let toggled = root.toggle_group_logic(&ids[4]);
        match toggled.find_by_id(&ids[4]) {
            Some(FilterNode::Group(g)) => assert_eq!(g.logic, Logic::And),
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(root.toggle_group_logic(&root.id).logic, Logic::Or);
    }

    #[test]
    fn test_conditions_in_document_order() {
        let (root, ids) = sample();
        let with_raw = Group {
            children: [root.children.clone(), vec![FilterNode::raw("x = 1")]].concat(),
            ..root
        };
        let found: Vec<_> = with_raw.conditions().iter().map(|c| c.id.clone()).collect();
        assert_eq!(found, ids[..3].to_vec());
    }

    #[test]
    fn test_nesting_depth() {
        let (root, _) = sample();
        assert_eq!(root.nesting_depth(), 3);
        assert_eq!(root.validate_nesting_depth(3), Ok(3));
        assert_eq!(
            root.validate_nesting_depth(2),
            Err(QueryError::NestingTooDeep { depth: 3, max: 2 })
        );
        assert_eq!(Group::default().nesting_depth(), 1);
    }

    #[test]
    fn test_clone_with_new_ids() {
        let (root, ids) = sample();
        let copy = root.clone_with_new_ids();
        assert_eq!(copy.count_conditions(), 3);
        assert!(ids.iter().all(|id| copy.find_by_id(id).is_none()));
        assert!(copy.has_unique_ids());
    }

    #[test]
    fn test_for_placement() {
        let on_b = Condition::compare("b", "x", Operator::Eq, 1).placed(Placement::On);
        let on_c = Condition::compare("c", "y", Operator::Eq, 2).placed(Placement::On);
        let where_a = Condition::compare("a", "z", Operator::Eq, 3);
        let nested = Group::with_children(Logic::Or, vec![on_c.into()]);
        let root = Group::with_children(
            Logic::And,
            vec![on_b.into(), where_a.into(), nested.into(), FilterNode::raw("1 = 1")],
        );

        let for_b = root.for_placement(Placement::On, Some("b"));
        assert_eq!(for_b.count_conditions(), 1);
        assert_eq!(for_b.children.len(), 1);

        let wheres = root.for_placement(Placement::Where, None);
        assert_eq!(wheres.count_conditions(), 1);
        // nested OR group had only an ON condition and was pruned; raw stays
        assert_eq!(wheres.children.len(), 2);

        // source tree untouched
        assert_eq!(root.count_conditions(), 3);
    }
}
