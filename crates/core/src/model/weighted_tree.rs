use std::fmt;

use thiserror::Error;

/// Requirements on the payload of a [`WeightedTree`].
///
/// Equality decides which nodes merge; the string form drives the sibling
/// ordering and the default label.
pub trait TreeObject: Clone + PartialEq + fmt::Display + Send + Sync + 'static {}

impl<T> TreeObject for T where T: Clone + PartialEq + fmt::Display + Send + Sync + 'static {}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("cannot merge `{other}` into `{target}`: objects differ")]
    ObjectMismatch { target: String, other: String },
}

/// A node of an aggregated call tree.
///
/// The weight of a node is not required to cover the weights of its
/// children; `self_weight` is whatever is left, floored at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedTree<N> {
    object: N,
    weight: i64,
    children: Vec<WeightedTree<N>>,
    max_depth: usize,
    /// Named extra child sets, indexed like the provider's `extra_data_sets`.
    extra_trees: Vec<Vec<WeightedTree<N>>>,
}

impl<N: TreeObject> WeightedTree<N> {
    pub fn new(object: N, weight: i64) -> Self {
        Self {
            object,
            weight: weight.max(0),
            children: Vec::new(),
            max_depth: 1,
            extra_trees: Vec::new(),
        }
    }

    /// Builder form of [`add_child`](Self::add_child).
    pub fn with_child(mut self, child: WeightedTree<N>) -> Self {
        self.add_child(child);
        self
    }

    pub fn object(&self) -> &N {
        &self.object
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn add_to_weight(&mut self, weight: i64) {
        self.weight = self.weight.saturating_add(weight.max(0));
    }

    pub fn children(&self) -> &[WeightedTree<N>] {
        &self.children
    }

    /// 1 for a leaf, 1 + the deepest child otherwise.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn self_weight(&self) -> i64 {
        let children = self
            .children
            .iter()
            .fold(0i64, |sum, c| sum.saturating_add(c.weight));
        (self.weight - children).max(0)
    }

    /// Add `child`, merging it into an existing child with an equal object.
    pub fn add_child(&mut self, child: WeightedTree<N>) {
        self.max_depth = self.max_depth.max(child.max_depth + 1);
        match self.children.iter_mut().find(|c| c.object == child.object) {
            Some(existing) => existing.absorb(child),
            None => self.children.push(child),
        }
    }

    /// Add `other`'s weight, children and extra trees to this node.
    pub fn merge(&mut self, other: WeightedTree<N>) -> Result<(), TreeError> {
        if self.object != other.object {
            return Err(TreeError::ObjectMismatch {
                target: self.object.to_string(),
                other: other.object.to_string(),
            });
        }
        self.absorb(other);
        Ok(())
    }

    pub fn extra_data_trees(&self, index: usize) -> &[WeightedTree<N>] {
        self.extra_trees.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn add_extra_data_tree(&mut self, index: usize, tree: WeightedTree<N>) {
        if self.extra_trees.len() <= index {
            self.extra_trees.resize_with(index + 1, Vec::new);
        }
        let set = &mut self.extra_trees[index];
        match set.iter_mut().find(|t| t.object == tree.object) {
            Some(existing) => existing.absorb(tree),
            None => set.push(tree),
        }
    }

    /// Deep copy with every payload mapped through `f`.
    pub fn map_objects<M: TreeObject>(&self, f: &impl Fn(&N) -> M) -> WeightedTree<M> {
        WeightedTree {
            object: f(&self.object),
            weight: self.weight,
            children: self.children.iter().map(|c| c.map_objects(f)).collect(),
            max_depth: self.max_depth,
            extra_trees: self
                .extra_trees
                .iter()
                .map(|set| set.iter().map(|t| t.map_objects(f)).collect())
                .collect(),
        }
    }

    /// [`merge`](Self::merge) for callers that already matched the objects.
    pub(crate) fn absorb(&mut self, other: WeightedTree<N>) {
        self.add_to_weight(other.weight);
        for child in other.children {
            self.add_child(child);
        }
        for (index, set) in other.extra_trees.into_iter().enumerate() {
            for tree in set {
                self.add_extra_data_tree(index, tree);
            }
        }
    }
}
