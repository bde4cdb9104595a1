//! Coarsening of the element hierarchy before the tree is built.

use crate::model::{GroupElement, TreeObject, WeightedTreeSet};

/// Regroup `set` at hierarchy `level`.
///
/// Level 0 merges every element's trees into [`GroupElement::all`]. Level `n`
/// keeps the first `n` levels of the hierarchy; elements on level `n` become
/// leaves holding the merged trees of their whole subtree.
pub fn group_by<N: TreeObject, E: GroupElement>(
    set: &WeightedTreeSet<N, E>,
    level: usize,
) -> WeightedTreeSet<N, E> {
    let mut grouped = WeightedTreeSet::new().with_extra_data_sets(set.extra_data_sets().to_vec());
    if level == 0 {
        let all = E::all();
        grouped.add_element(all.clone(), None);
        for element in set.all_elements() {
            for tree in set.trees_for(element) {
                grouped.add_weighted_tree(&all, tree.clone());
            }
        }
        return grouped;
    }
    for root in set.elements() {
        regroup(set, &mut grouped, root, None, 1, level);
    }
    grouped
}

fn regroup<N: TreeObject, E: GroupElement>(
    set: &WeightedTreeSet<N, E>,
    out: &mut WeightedTreeSet<N, E>,
    element: &E,
    parent: Option<&E>,
    depth: usize,
    level: usize,
) {
    out.add_element(element.clone(), parent);
    if depth == level {
        for member in set.subtree(element) {
            for tree in set.trees_for(member) {
                out.add_weighted_tree(element, tree.clone());
            }
        }
        return;
    }
    for tree in set.trees_for(element) {
        out.add_weighted_tree(element, tree.clone());
    }
    for child in set.children_of(element) {
        regroup(set, out, child, Some(element), depth + 1, level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Symbol, WeightedTree};

    fn sym(name: &str) -> Symbol {
        Symbol::from(name)
    }

    fn node(name: &str, weight: i64) -> WeightedTree<Symbol> {
        WeightedTree::new(sym(name), weight)
    }

    /// p1 { t1: main(4){a(3)}, t2: main(6){b(2)} }, p2 { t3: idle(5) }
    fn processes() -> WeightedTreeSet<Symbol, Symbol> {
        let mut set = WeightedTreeSet::new();
        set.add_element(sym("p1"), None);
        set.add_element(sym("t1"), Some(&sym("p1")));
        set.add_element(sym("t2"), Some(&sym("p1")));
        set.add_element(sym("p2"), None);
        set.add_element(sym("t3"), Some(&sym("p2")));
        set.add_weighted_tree(&sym("t1"), node("main", 4).with_child(node("a", 3)));
        set.add_weighted_tree(&sym("t2"), node("main", 6).with_child(node("b", 2)));
        set.add_weighted_tree(&sym("t3"), node("idle", 5));
        set
    }

    #[test]
    fn level_zero_merges_everything_into_all() {
        let grouped = group_by(&processes(), 0);
        assert_eq!(grouped.elements(), &[Symbol::all()]);
        let trees = grouped.trees_for(&Symbol::all());
        assert_eq!(trees.len(), 2);
        let main = trees.iter().find(|t| t.object() == &sym("main")).unwrap();
        assert_eq!(main.weight(), 10);
        assert_eq!(main.children().len(), 2);
    }

    #[test]
    fn level_one_collapses_threads_into_processes() {
        let grouped = group_by(&processes(), 1);
        assert_eq!(grouped.elements(), &[sym("p1"), sym("p2")]);
        assert!(grouped.children_of(&sym("p1")).is_empty());
        let p1 = grouped.trees_for(&sym("p1"));
        assert_eq!(p1.len(), 1);
        assert_eq!(p1[0].weight(), 10);
        assert_eq!(grouped.trees_for(&sym("p2"))[0].weight(), 5);
    }

    #[test]
    fn levels_past_the_hierarchy_change_nothing() {
        let set = processes();
        let grouped = group_by(&set, 5);
        assert_eq!(grouped.all_elements(), set.all_elements());
        for element in set.all_elements() {
            assert_eq!(grouped.trees_for(element), set.trees_for(element));
        }
    }
}
