use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use super::weighted_tree::{TreeObject, WeightedTree};

/// Capability of a grouping element (a process, a thread…).
pub trait GroupElement: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static {
    /// The synthetic element every tree is merged into when grouping by all.
    fn all() -> Self;
}

/// Root trees grouped under a hierarchy of elements.
#[derive(Debug, Clone)]
pub struct WeightedTreeSet<N, E> {
    roots: Vec<E>,
    children: HashMap<E, Vec<E>>,
    parents: HashMap<E, E>,
    trees: HashMap<E, Vec<WeightedTree<N>>>,
    extra_data_sets: Vec<String>,
}

impl<N, E> Default for WeightedTreeSet<N, E> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            children: HashMap::new(),
            parents: HashMap::new(),
            trees: HashMap::new(),
            extra_data_sets: Vec::new(),
        }
    }
}

impl<N: TreeObject, E: GroupElement> WeightedTreeSet<N, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_data_sets(mut self, titles: Vec<String>) -> Self {
        self.extra_data_sets = titles;
        self
    }

    /// Register `element`, as a root or under `parent`. Known elements are
    /// left where they are; an unknown parent is registered as a root first.
    pub fn add_element(&mut self, element: E, parent: Option<&E>) {
        if self.contains(&element) {
            return;
        }
        match parent {
            Some(parent) => {
                if !self.contains(parent) {
                    self.roots.push(parent.clone());
                }
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .push(element.clone());
                self.parents.insert(element, parent.clone());
            }
            None => self.roots.push(element),
        }
    }

    /// Attach `tree` to `element`, merging it into a root tree with an equal
    /// object if there is one. Unknown elements become roots.
    pub fn add_weighted_tree(&mut self, element: &E, tree: WeightedTree<N>) {
        self.add_element(element.clone(), None);
        let trees = self.trees.entry(element.clone()).or_default();
        match trees.iter_mut().find(|t| t.object() == tree.object()) {
            Some(existing) => existing.absorb(tree),
            None => trees.push(tree),
        }
    }

    pub fn contains(&self, element: &E) -> bool {
        self.parents.contains_key(element) || self.roots.contains(element)
    }

    /// Root elements, in insertion order.
    pub fn elements(&self) -> &[E] {
        &self.roots
    }

    pub fn children_of(&self, element: &E) -> &[E] {
        self.children.get(element).map_or(&[], Vec::as_slice)
    }

    pub fn parent_of(&self, element: &E) -> Option<&E> {
        self.parents.get(element)
    }

    pub fn trees_for(&self, element: &E) -> &[WeightedTree<N>] {
        self.trees.get(element).map_or(&[], Vec::as_slice)
    }

    pub fn extra_data_sets(&self) -> &[String] {
        &self.extra_data_sets
    }

    /// Every element, parents before their children.
    pub fn all_elements(&self) -> Vec<&E> {
        let mut out = Vec::new();
        let mut stack: Vec<&E> = self.roots.iter().rev().collect();
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(self.children_of(element).iter().rev());
        }
        out
    }

    /// `element` followed by all of its descendants, parents first.
    pub fn subtree<'a>(&'a self, element: &'a E) -> Vec<&'a E> {
        let mut out = Vec::new();
        let mut stack = vec![element];
        while let Some(element) = stack.pop() {
            out.push(element);
            stack.extend(self.children_of(element).iter().rev());
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.trees.values().all(Vec::is_empty)
    }
}
