pub mod symbol;
pub mod tree_set;
pub mod weighted_tree;

pub use symbol::Symbol;
pub use tree_set::{GroupElement, WeightedTreeSet};
pub use weighted_tree::{TreeError, TreeObject, WeightedTree};
