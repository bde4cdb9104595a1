use std::sync::Arc;

use crate::metrics::{MetricError, MetricIndex, MetricType, MetricValue, Statistics};
use crate::model::{GroupElement, TreeObject, WeightedTree, WeightedTreeSet};
use crate::palette::DataPalette;

/// Whether the analysis behind a provider has finished producing trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisState {
    Running,
    Completed,
}

/// Source of weighted trees for the flame graph engine.
///
/// Repeated calls must return structurally equal trees until the provider's
/// data changes.
pub trait WeightedTreeProvider: Send + Sync {
    type Object: TreeObject;
    type Element: GroupElement;

    fn title(&self) -> &str;

    /// Trees over the full range.
    fn tree_set(&self) -> Arc<WeightedTreeSet<Self::Object, Self::Element>>;

    /// Trees restricted to `[start, end]`, or `None` when the provider cannot
    /// compute selections.
    fn selection(
        &self,
        _start: i64,
        _end: i64,
    ) -> Option<Arc<WeightedTreeSet<Self::Object, Self::Element>>> {
        None
    }

    fn analysis_state(&self) -> AnalysisState {
        AnalysisState::Completed
    }

    fn weight_type(&self) -> MetricType {
        MetricType::weight()
    }

    fn additional_metrics(&self) -> &[MetricType] {
        &[]
    }

    fn additional_metric(
        &self,
        _tree: &WeightedTree<Self::Object>,
        index: usize,
    ) -> Result<MetricValue, MetricError> {
        Err(MetricError::OutOfRange {
            index,
            count: self.additional_metrics().len(),
        })
    }

    /// `Ok(None)` when the metric declares no statistics.
    fn statistics(
        &self,
        _tree: &WeightedTree<Self::Object>,
        index: MetricIndex,
    ) -> Result<Option<Statistics>, MetricError> {
        match index {
            MetricIndex::Weight => Ok(None),
            MetricIndex::Additional(index) => {
                let count = self.additional_metrics().len();
                if index < count {
                    Ok(None)
                } else {
                    Err(MetricError::OutOfRange { index, count })
                }
            }
        }
    }

    fn extra_data_sets(&self) -> Vec<String> {
        self.tree_set().extra_data_sets().to_vec()
    }

    fn to_display_string(&self, tree: &WeightedTree<Self::Object>) -> String {
        tree.object().to_string()
    }

    /// `None` selects the engine's default palette.
    fn palette(&self) -> Option<Arc<dyn DataPalette<Self::Object>>> {
        None
    }
}

type MetricFn<N> = Box<dyn Fn(&WeightedTree<N>) -> MetricValue + Send + Sync>;
type StatisticsFn<N> = Box<dyn Fn(&WeightedTree<N>) -> Statistics + Send + Sync>;

/// In-memory provider over a fixed tree set.
pub struct SimpleTreeProvider<N, E> {
    title: String,
    trees: Arc<WeightedTreeSet<N, E>>,
    state: AnalysisState,
    weight_type: MetricType,
    weight_statistics: Option<StatisticsFn<N>>,
    metric_types: Vec<MetricType>,
    metric_values: Vec<Option<MetricFn<N>>>,
    metric_statistics: Vec<Option<StatisticsFn<N>>>,
    palette: Option<Arc<dyn DataPalette<N>>>,
}

impl<N: TreeObject, E: GroupElement> SimpleTreeProvider<N, E> {
    pub fn new(title: impl Into<String>, trees: WeightedTreeSet<N, E>) -> Self {
        Self {
            title: title.into(),
            trees: Arc::new(trees),
            state: AnalysisState::Completed,
            weight_type: MetricType::weight(),
            weight_statistics: None,
            metric_types: Vec::new(),
            metric_values: Vec::new(),
            metric_statistics: Vec::new(),
            palette: None,
        }
    }

    pub fn with_weight_type(mut self, weight_type: MetricType) -> Self {
        self.weight_type = weight_type;
        self
    }

    /// Declare an additional metric computed by `value`.
    pub fn with_metric(
        mut self,
        metric: MetricType,
        value: impl Fn(&WeightedTree<N>) -> MetricValue + Send + Sync + 'static,
    ) -> Self {
        self.metric_types.push(metric);
        self.metric_values.push(Some(Box::new(value)));
        self.metric_statistics.push(None);
        self
    }

    /// Declare an additional metric without computing it. Asking for its
    /// value is an error.
    pub fn with_declared_metric(mut self, metric: MetricType) -> Self {
        self.metric_types.push(metric);
        self.metric_values.push(None);
        self.metric_statistics.push(None);
        self
    }

    /// Attach statistics to a metric and flag it as having statistics.
    /// Indices of undeclared metrics are ignored.
    pub fn with_statistics(
        mut self,
        index: MetricIndex,
        statistics: impl Fn(&WeightedTree<N>) -> Statistics + Send + Sync + 'static,
    ) -> Self {
        match index {
            MetricIndex::Weight => {
                self.weight_type.has_statistics = true;
                self.weight_statistics = Some(Box::new(statistics));
            }
            MetricIndex::Additional(i) => {
                if let (Some(metric), Some(slot)) =
                    (self.metric_types.get_mut(i), self.metric_statistics.get_mut(i))
                {
                    metric.has_statistics = true;
                    *slot = Some(Box::new(statistics));
                }
            }
        }
        self
    }

    pub fn with_analysis_state(mut self, state: AnalysisState) -> Self {
        self.state = state;
        self
    }

    pub fn with_palette(mut self, palette: Arc<dyn DataPalette<N>>) -> Self {
        self.palette = Some(palette);
        self
    }
}

impl<N: TreeObject, E: GroupElement> WeightedTreeProvider for SimpleTreeProvider<N, E> {
    type Object = N;
    type Element = E;

    fn title(&self) -> &str {
        &self.title
    }

    fn tree_set(&self) -> Arc<WeightedTreeSet<N, E>> {
        Arc::clone(&self.trees)
    }

    fn analysis_state(&self) -> AnalysisState {
        self.state
    }

    fn weight_type(&self) -> MetricType {
        self.weight_type.clone()
    }

    fn additional_metrics(&self) -> &[MetricType] {
        &self.metric_types
    }

    fn additional_metric(
        &self,
        tree: &WeightedTree<N>,
        index: usize,
    ) -> Result<MetricValue, MetricError> {
        let count = self.metric_types.len();
        match self.metric_values.get(index) {
            Some(Some(value)) => Ok(value(tree)),
            Some(None) => Err(MetricError::NotComputed {
                title: self.metric_types[index].title.clone(),
            }),
            None => Err(MetricError::OutOfRange { index, count }),
        }
    }

    fn statistics(
        &self,
        tree: &WeightedTree<N>,
        index: MetricIndex,
    ) -> Result<Option<Statistics>, MetricError> {
        match index {
            MetricIndex::Weight => Ok(self.weight_statistics.as_ref().map(|f| f(tree))),
            MetricIndex::Additional(i) => match self.metric_statistics.get(i) {
                Some(statistics) => Ok(statistics.as_ref().map(|f| f(tree))),
                None => Err(MetricError::OutOfRange {
                    index: i,
                    count: self.metric_types.len(),
                }),
            },
        }
    }

    fn palette(&self) -> Option<Arc<dyn DataPalette<N>>> {
        self.palette.clone()
    }
}
