//! Differential flame graphs: the trees of one run annotated with how much
//! each node changed relative to a base run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use flame_tree_protocol::{OutputStyle, Rgba};

use crate::grouping::group_by;
use crate::metrics::{DataType, MetricError, MetricType, MetricValue};
use crate::model::{GroupElement, Symbol, TreeObject, WeightedTree, WeightedTreeSet};
use crate::palette::DataPalette;
use crate::provider::WeightedTreeProvider;

/// Element holding every differential tree.
pub const DIFF_ELEMENT: &str = "diff";

const HEAT_STEPS: u32 = 10;

/// Payload of a differential tree. Compares and displays as the wrapped
/// object; the difference is carried along.
#[derive(Debug, Clone)]
pub struct DiffNode<N> {
    pub object: N,
    /// `(other - base) / base`, `NaN` when the node is new.
    pub difference: f64,
}

impl<N: PartialEq> PartialEq for DiffNode<N> {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
    }
}

impl<N: fmt::Display> fmt::Display for DiffNode<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.object.fmt(f)
    }
}

/// Relative change from `base` to `other`. A zero base gives `0` when
/// nothing changed and `NaN` otherwise.
pub fn relative_difference(base: i64, other: i64) -> f64 {
    if base == 0 {
        return if other == 0 { 0.0 } else { f64::NAN };
    }
    (other as f64 - base as f64) / base as f64
}

/// The `other` trees, each node weighted as in `other` and compared with the
/// node at the same path in `base`.
pub fn diff_trees<N: TreeObject>(
    base: &[WeightedTree<N>],
    other: &[WeightedTree<N>],
) -> Vec<WeightedTree<DiffNode<N>>> {
    other
        .iter()
        .map(|tree| diff_node(base.iter().find(|b| b.object() == tree.object()), tree))
        .collect()
}

fn diff_node<N: TreeObject>(
    base: Option<&WeightedTree<N>>,
    other: &WeightedTree<N>,
) -> WeightedTree<DiffNode<N>> {
    let difference = base.map_or(f64::NAN, |b| relative_difference(b.weight(), other.weight()));
    let mut node = WeightedTree::new(
        DiffNode {
            object: other.object().clone(),
            difference,
        },
        other.weight(),
    );
    let base_children = base.map_or(&[][..], WeightedTree::children);
    for child in diff_trees(base_children, other.children()) {
        node.add_child(child);
    }
    node
}

/// Style key of a difference: `equal`, or `less<n>`/`more<n>` with `n` in
/// `1..=10` growing with the magnitude. New nodes are `more10`.
pub fn heat_key(difference: f64) -> String {
    if difference.is_nan() {
        return format!("more{HEAT_STEPS}");
    }
    if difference == 0.0 {
        return "equal".to_string();
    }
    let heat = (difference.abs() * f64::from(HEAT_STEPS)).ceil().clamp(1.0, f64::from(HEAT_STEPS));
    let side = if difference < 0.0 { "less" } else { "more" };
    format!("{side}{}", heat as u32)
}

/// Greens for nodes that shrank, reds for nodes that grew, white otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferentialPalette;

impl<N: TreeObject> DataPalette<DiffNode<N>> for DifferentialPalette {
    fn style_for(&self, tree: &WeightedTree<DiffNode<N>>) -> OutputStyle {
        OutputStyle::reference(heat_key(tree.object().difference))
    }

    fn styles(&self) -> BTreeMap<String, OutputStyle> {
        let mut styles = BTreeMap::new();
        styles.insert("equal".to_string(), OutputStyle::filled(Rgba::WHITE));
        for step in 1..=HEAT_STEPS {
            let saturation = f64::from(step) / f64::from(HEAT_STEPS);
            styles.insert(
                format!("less{step}"),
                OutputStyle::filled(Rgba::from_hsv(120.0, saturation, 1.0)),
            );
            styles.insert(
                format!("more{step}"),
                OutputStyle::filled(Rgba::from_hsv(0.0, saturation, 1.0)),
            );
        }
        styles
    }
}

fn format_difference(value: &MetricValue) -> String {
    match value.as_f64() {
        Some(d) if d.is_nan() => "new".to_string(),
        Some(d) => format!("{:+.1}%", d * 100.0),
        None => value.to_string(),
    }
}

/// Serves the difference between two tree sets, each merged over all its
/// elements, as one element named [`DIFF_ELEMENT`].
pub struct DifferentialProvider<N> {
    title: String,
    trees: Arc<WeightedTreeSet<DiffNode<N>, Symbol>>,
    metrics: Vec<MetricType>,
}

impl<N: TreeObject> DifferentialProvider<N> {
    pub fn new<E: GroupElement>(
        title: impl Into<String>,
        base: &WeightedTreeSet<N, E>,
        other: &WeightedTreeSet<N, E>,
    ) -> Self {
        let base = group_by(base, 0);
        let other = group_by(other, 0);
        let all = E::all();
        let element = Symbol::new(DIFF_ELEMENT);
        let mut trees = WeightedTreeSet::new();
        trees.add_element(element.clone(), None);
        for tree in diff_trees(base.trees_for(&all), other.trees_for(&all)) {
            trees.add_weighted_tree(&element, tree);
        }
        Self {
            title: title.into(),
            trees: Arc::new(trees),
            metrics: vec![
                MetricType::new("Difference", DataType::Other).with_formatter(format_difference),
            ],
        }
    }
}

impl<N: TreeObject> WeightedTreeProvider for DifferentialProvider<N> {
    type Object = DiffNode<N>;
    type Element = Symbol;

    fn title(&self) -> &str {
        &self.title
    }

    fn tree_set(&self) -> Arc<WeightedTreeSet<DiffNode<N>, Symbol>> {
        Arc::clone(&self.trees)
    }

    fn additional_metrics(&self) -> &[MetricType] {
        &self.metrics
    }

    fn additional_metric(
        &self,
        tree: &WeightedTree<DiffNode<N>>,
        index: usize,
    ) -> Result<MetricValue, MetricError> {
        match index {
            0 => Ok(MetricValue::Float(tree.object().difference)),
            _ => Err(MetricError::OutOfRange {
                index,
                count: self.metrics.len(),
            }),
        }
    }

    fn palette(&self) -> Option<Arc<dyn DataPalette<DiffNode<N>>>> {
        Some(Arc::new(DifferentialPalette))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &'static str, weight: i64) -> WeightedTree<&'static str> {
        WeightedTree::new(name, weight)
    }

    fn child<'a, N>(tree: &'a WeightedTree<N>, name: &str) -> &'a WeightedTree<N>
    where
        N: TreeObject,
    {
        tree.children()
            .iter()
            .find(|c| c.object().to_string() == name)
            .unwrap()
    }

    #[test]
    fn relative_difference_edges() {
        assert_eq!(relative_difference(10, 10), 0.0);
        assert_eq!(relative_difference(10, 15), 0.5);
        assert_eq!(relative_difference(10, 5), -0.5);
        assert_eq!(relative_difference(0, 0), 0.0);
        assert!(relative_difference(0, 3).is_nan());
    }

    #[test]
    fn differences_follow_paths() {
        let base = vec![node("main", 10).with_child(node("parse", 4)).with_child(node("eval", 6))];
        let other = vec![node("main", 12).with_child(node("parse", 2)).with_child(node("jit", 10))];
        let diff = diff_trees(&base, &other);

        assert_eq!(diff.len(), 1);
        let main = &diff[0];
        assert_eq!(main.weight(), 12);
        assert!((main.object().difference - 0.2).abs() < 1e-9);
        assert_eq!(child(main, "parse").object().difference, -0.5);
        assert!(child(main, "jit").object().difference.is_nan());
        assert_eq!(main.children().len(), 2);
    }

    #[test]
    fn heat_keys() {
        assert_eq!(heat_key(0.0), "equal");
        assert_eq!(heat_key(0.01), "more1");
        assert_eq!(heat_key(-0.25), "less3");
        assert_eq!(heat_key(4.0), "more10");
        assert_eq!(heat_key(f64::NAN), "more10");
    }

    #[test]
    fn palette_covers_every_key() {
        let styles = <DifferentialPalette as DataPalette<DiffNode<&str>>>::styles(&DifferentialPalette);
        assert_eq!(styles.len(), 21);
        for key in ["equal", "less1", "less10", "more1", "more10"] {
            assert!(styles.contains_key(key), "{key}");
        }
    }

    #[test]
    fn provider_exposes_one_diff_element() {
        let mut base: WeightedTreeSet<Symbol, Symbol> = WeightedTreeSet::new();
        base.add_weighted_tree(&Symbol::from("t1"), WeightedTree::new(Symbol::from("main"), 4));
        base.add_weighted_tree(&Symbol::from("t2"), WeightedTree::new(Symbol::from("main"), 4));
        let mut other: WeightedTreeSet<Symbol, Symbol> = WeightedTreeSet::new();
        other.add_weighted_tree(&Symbol::from("t1"), WeightedTree::new(Symbol::from("main"), 12));

        let provider = DifferentialProvider::new("diff", &base, &other);
        let set = provider.tree_set();
        assert_eq!(set.elements(), &[Symbol::from(DIFF_ELEMENT)]);
        let main = &set.trees_for(&Symbol::from(DIFF_ELEMENT))[0];
        assert_eq!(main.weight(), 12);

        let metric = &provider.additional_metrics()[0];
        let value = provider.additional_metric(main, 0).unwrap();
        assert_eq!(metric.format(&value), "+50.0%");
        assert_eq!(metric.format(&MetricValue::Float(f64::NAN)), "new");
        assert!(provider.additional_metric(main, 1).is_err());
    }
}
