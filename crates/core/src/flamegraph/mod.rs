//! Flame graph query engine.
//!
//! [`FlameGraphEngine`] answers the four queries of the protocol against one
//! [`WeightedTreeProvider`]:
//!
//! ```text
//!   fetch_tree ──▶ entries (trace ▸ element ▸ depth)     writer, cached
//!        │
//!        └──▶ QueryIndex snapshot ──▶ fetch_rows         readers
//!                                 └─▶ fetch_tooltip
//!   fetch_style ──▶ palette table
//! ```
//!
//! A tree build serializes on a mutex, builds a fresh [`index`] off to the
//! side and swaps it in. Readers clone the current snapshot under a short
//! read lock, so they see either the previous or the new index, never a mix.

pub mod entries;
pub mod filter;
mod index;
pub mod layout;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use flame_tree_protocol::params::keys;
use flame_tree_protocol::{
    FetchParameters, ParamError, Response, Row, RowModel, StyleModel, TimeGraphState,
    TooltipModel, TreeModel,
};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, debug_span, warn};

use self::entries::build_entries;
use self::filter::{DepthFilters, FilterError};
use self::index::QueryIndex;
use self::layout::RowLayout;
use crate::cancel::CancellationToken;
use crate::config::FlameGraphConfig;
use crate::grouping::group_by;
use crate::metrics::{MetricError, MetricIndex, MetricValue};
use crate::model::{WeightedTree, WeightedTreeSet};
use crate::palette::{DataPalette, FlamePalette, stable_hash};
use crate::provider::{AnalysisState, WeightedTreeProvider};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("task cancelled")]
    Cancelled,
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error("missing parameter `{0}`")]
    MissingParameter(&'static str),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("tooltip needs exactly one {0}")]
    TooltipTarget(&'static str),
    #[error(transparent)]
    Metric(#[from] MetricError),
}

impl QueryError {
    /// The response a caller sees for this error.
    pub fn into_response<T>(self) -> Response<T> {
        match self {
            Self::Cancelled => Response::cancelled(),
            Self::Params(_) | Self::MissingParameter(_) | Self::Filter(_) => {
                Response::incorrect_parameters()
            }
            other => Response::failed(other.to_string()),
        }
    }
}

type Trees<P> = WeightedTreeSet<
    <P as WeightedTreeProvider>::Object,
    <P as WeightedTreeProvider>::Element,
>;
type Index<P> = QueryIndex<<P as WeightedTreeProvider>::Object, <P as WeightedTreeProvider>::Element>;

pub struct FlameGraphEngine<P: WeightedTreeProvider> {
    provider: Arc<P>,
    palette: Arc<dyn DataPalette<P::Object>>,
    config: FlameGraphConfig,
    build: Mutex<()>,
    index: RwLock<Arc<Index<P>>>,
}

impl<P: WeightedTreeProvider> FlameGraphEngine<P> {
    pub fn new(provider: Arc<P>, config: FlameGraphConfig) -> Self {
        let palette = provider
            .palette()
            .unwrap_or_else(|| Arc::new(FlamePalette::new(config.palette_size)));
        Self {
            provider,
            palette,
            config,
            build: Mutex::new(()),
            index: RwLock::new(Arc::new(QueryIndex::empty())),
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Build (or return the cached) entry tree for `params`.
    ///
    /// Keys: `group_by`, `selection_range`.
    pub fn fetch_tree(
        &self,
        params: &FetchParameters,
        cancel: &CancellationToken,
    ) -> Response<TreeModel> {
        let _span = debug_span!("fetch_tree", provider = self.provider.title()).entered();
        let _build = self.build.lock();
        if let Some(cached) = self.index.read().cached(params) {
            debug!("tree served from cache");
            return cached;
        }
        match self.build_index(params, cancel) {
            Ok(index) => {
                let response = index.response();
                *self.index.write() = Arc::new(index);
                response
            }
            Err(err) => self.fail(err),
        }
    }

    /// States of the requested entries around the requested times.
    ///
    /// Keys: `requested_times` (required), `requested_items`,
    /// `regex_map_filters`.
    pub fn fetch_rows(
        &self,
        params: &FetchParameters,
        cancel: &CancellationToken,
    ) -> Response<RowModel> {
        let _span = debug_span!("fetch_rows", provider = self.provider.title()).entered();
        match self.rows(params, cancel) {
            Ok(model) => self.respond(model),
            Err(err) => self.fail(err),
        }
    }

    /// Metrics of the node under one requested time of one requested item.
    pub fn fetch_tooltip(
        &self,
        params: &FetchParameters,
        cancel: &CancellationToken,
    ) -> Response<TooltipModel> {
        let _span = debug_span!("fetch_tooltip", provider = self.provider.title()).entered();
        if cancel.is_cancelled() {
            return Response::cancelled();
        }
        match self.tooltip(params) {
            Ok(model) => Response::completed(model),
            Err(err) => self.fail(err),
        }
    }

    pub fn fetch_style(&self, _params: &FetchParameters) -> Response<StyleModel> {
        Response::completed(StyleModel {
            styles: self.palette.styles(),
        })
    }

    /// The node displayed by function entry `entry_id` at `time`.
    pub fn find_node_at(&self, entry_id: i64, time: i64) -> Option<WeightedTree<P::Object>> {
        let index = self.snapshot();
        let entry = index.depth_entry(entry_id)?;
        layout::find_node_at(index.trees_for(&entry.element), entry.depth, time).cloned()
    }

    fn snapshot(&self) -> Arc<Index<P>> {
        Arc::clone(&*self.index.read())
    }

    fn respond<T>(&self, model: T) -> Response<T> {
        match self.provider.analysis_state() {
            AnalysisState::Running => Response::running(model),
            AnalysisState::Completed => Response::completed(model),
        }
    }

    fn fail<T>(&self, err: QueryError) -> Response<T> {
        match err {
            QueryError::Cancelled => debug!("query cancelled"),
            ref err => warn!(error = %err, "query failed"),
        }
        err.into_response()
    }

    fn build_index(
        &self,
        params: &FetchParameters,
        cancel: &CancellationToken,
    ) -> Result<Index<P>, QueryError> {
        let level = params.group_by()?;
        let selection = params.selection_range()?;
        let state = self.provider.analysis_state();

        let mut trees: Arc<Trees<P>> = match selection {
            Some((start, end)) => self.provider.selection(start, end).unwrap_or_else(|| {
                debug!(start, end, "selection unsupported, using the full range");
                self.provider.tree_set()
            }),
            None => self.provider.tree_set(),
        };
        if let Some(level) = level {
            trees = Arc::new(group_by(&*trees, level));
        }

        let built = build_entries(&*trees, &self.config.trace_name, cancel)?;
        debug!(entries = built.entries.len(), "tree built");
        let model = TreeModel {
            entries: built.entries.clone(),
        };
        // A partial tree is returned but never served again from the cache.
        let (response, cache_key) = match state {
            AnalysisState::Completed => (Response::completed(model), Some(params.clone())),
            AnalysisState::Running => (Response::running(model), None),
        };
        Ok(QueryIndex::new(trees, built, response, cache_key))
    }

    fn rows(
        &self,
        params: &FetchParameters,
        cancel: &CancellationToken,
    ) -> Result<RowModel, QueryError> {
        let times = params
            .requested_times()?
            .ok_or(QueryError::MissingParameter(keys::REQUESTED_TIMES))?;
        let filters = match params.regex_filters()? {
            Some(patterns) => DepthFilters::compile(&patterns)?,
            None => DepthFilters::default(),
        };
        let index = self.snapshot();
        let ids = match params.requested_items()? {
            Some(ids) => {
                let mut seen = HashSet::new();
                ids.into_iter().filter(|id| seen.insert(*id)).collect()
            }
            None => index.entry_ids(),
        };

        // Walk each element once, whatever the number of depths requested.
        let mut groups: Vec<(&P::Element, BTreeMap<usize, i64>)> = Vec::new();
        let mut positions: HashMap<&P::Element, usize> = HashMap::new();
        for &id in &ids {
            let Some(entry) = index.depth_entry(id) else {
                continue;
            };
            let position = *positions.entry(&entry.element).or_insert_with(|| {
                groups.push((&entry.element, BTreeMap::new()));
                groups.len() - 1
            });
            groups[position].1.insert(entry.depth, id);
        }

        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let make_state = |tree: &WeightedTree<P::Object>, start: i64, width: i64| {
            self.state_for(tree, start, width)
        };
        let mut states_by_id: HashMap<i64, Vec<TimeGraphState>> = HashMap::new();
        for (element, depths) in &groups {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            let element_end = depths
                .values()
                .filter_map(|&id| index.end_time(id))
                .max()
                .unwrap_or(0);
            let mut layout: RowLayout<'_, P::Object> =
                RowLayout::new(depths.keys().copied(), &times, &filters, cancel, &make_state);
            layout.run(index.trees_for(element), element_end)?;
            for (depth, states) in layout.into_rows() {
                if let Some(&id) = depths.get(&depth) {
                    states_by_id.insert(id, states);
                }
            }
        }

        let rows: Vec<Row> = ids
            .into_iter()
            .map(|id| Row {
                entry_id: id,
                states: states_by_id.remove(&id).unwrap_or_default(),
            })
            .collect();
        debug!(rows = rows.len(), elements = groups.len(), "rows computed");
        Ok(RowModel { rows })
    }

    fn state_for(&self, tree: &WeightedTree<P::Object>, start: i64, width: i64) -> TimeGraphState {
        let label = self.provider.to_display_string(tree);
        let identity = stable_hash(&tree.object().to_string()) as i64;
        TimeGraphState::new(start, width, label, self.palette.style_for(tree)).with_value(identity)
    }

    fn tooltip(&self, params: &FetchParameters) -> Result<TooltipModel, QueryError> {
        let times = params.requested_times()?.unwrap_or_default();
        let &[time] = times.as_slice() else {
            return Err(QueryError::TooltipTarget("requested time"));
        };
        let items = params.requested_items()?.unwrap_or_default();
        let &[item] = items.as_slice() else {
            return Err(QueryError::TooltipTarget("requested item"));
        };

        let index = self.snapshot();
        let Some(entry) = index.depth_entry(item) else {
            return Ok(TooltipModel::default());
        };
        match layout::find_node_at(index.trees_for(&entry.element), entry.depth, time) {
            Some(tree) => self.describe(tree),
            None => Ok(TooltipModel::default()),
        }
    }

    /// Weight first, then additional metrics in declaration order, then the
    /// statistics of the metrics that have some.
    fn describe(&self, tree: &WeightedTree<P::Object>) -> Result<TooltipModel, QueryError> {
        let mut model = TooltipModel::default();
        let weight = self.provider.weight_type();
        model.push(&weight.title, weight.format(&MetricValue::Integer(tree.weight())));

        let metrics = self.provider.additional_metrics();
        for (i, metric) in metrics.iter().enumerate() {
            let value = self.provider.additional_metric(tree, i)?;
            model.push(&metric.title, metric.format(&value));
        }

        if weight.has_statistics
            && let Some(stats) = self.provider.statistics(tree, MetricIndex::Weight)?
        {
            model.push(format!("{} (statistics)", weight.title), stats.describe(&weight));
        }
        for (i, metric) in metrics.iter().enumerate().filter(|(_, m)| m.has_statistics) {
            if let Some(stats) = self.provider.statistics(tree, MetricIndex::Additional(i))? {
                model.push(format!("{} (statistics)", metric.title), stats.describe(metric));
            }
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DataType, MetricType, Statistics};
    use crate::model::Symbol;
    use crate::provider::SimpleTreeProvider;
    use flame_tree_protocol::{EntryType, QueryBuilder, Status};

    type Provider = SimpleTreeProvider<Symbol, Symbol>;

    fn node(name: &str, weight: i64) -> WeightedTree<Symbol> {
        WeightedTree::new(Symbol::from(name), weight)
    }

    fn scenario() -> WeightedTreeSet<Symbol, Symbol> {
        let mut set = WeightedTreeSet::new();
        let thread = Symbol::from("thread-1");
        set.add_weighted_tree(&thread, node("A", 10).with_child(node("B", 4)));
        set.add_weighted_tree(&thread, node("C", 5));
        set
    }

    fn engine(provider: Provider) -> FlameGraphEngine<Provider> {
        FlameGraphEngine::new(Arc::new(provider), FlameGraphConfig::default())
    }

    fn function_ids(response: &Response<TreeModel>) -> Vec<i64> {
        response
            .model
            .as_ref()
            .map(|m| m.of_type(EntryType::Function).map(|e| e.id).collect())
            .unwrap_or_default()
    }

    #[test]
    fn scenario_end_to_end() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        let tree = engine.fetch_tree(&FetchParameters::new(), &cancel);
        assert_eq!(tree.status, Status::Completed);
        let ids = function_ids(&tree);
        assert_eq!(ids.len(), 2);

        let rows = engine.fetch_rows(&QueryBuilder::new().times([0, 5, 12]).items(ids.clone()).build(), &cancel);
        let rows = rows.model.unwrap();
        let depth0: Vec<(Option<&str>, i64, i64)> = rows.rows[0]
            .states
            .iter()
            .map(|s| (s.label.as_deref(), s.start_time, s.end_time()))
            .collect();
        assert_eq!(depth0, vec![(Some("A"), 0, 10), (Some("C"), 10, 15)]);
        let depth1: Vec<(Option<&str>, i64, i64)> = rows.rows[1]
            .states
            .iter()
            .map(|s| (s.label.as_deref(), s.start_time, s.end_time()))
            .collect();
        assert_eq!(depth1, vec![(Some("B"), 0, 4), (None, 4, 10), (None, 10, 15)]);

        assert_eq!(engine.find_node_at(ids[0], 12).map(|t| t.object().clone()), Some(Symbol::from("C")));
        assert_eq!(engine.find_node_at(ids[1], 2).map(|t| t.object().clone()), Some(Symbol::from("B")));
        assert!(engine.find_node_at(ids[1], 12).is_none());
    }

    #[test]
    fn trace_entry_takes_the_configured_name() {
        let config = FlameGraphConfig::default().with_trace_name("perf.data");
        let engine = FlameGraphEngine::new(Arc::new(Provider::new("test", scenario())), config);
        assert_eq!(engine.provider().title(), "test");

        let tree = engine.fetch_tree(&FetchParameters::new(), &CancellationToken::new());
        assert!(tree.is_completed());
        let trace: Vec<&str> = tree
            .model
            .iter()
            .flat_map(|m| m.of_type(EntryType::Trace))
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(trace, vec!["perf.data"]);
    }

    #[test]
    fn repeated_tree_request_is_cached() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        let params = FetchParameters::new();
        let first = engine.fetch_tree(&params, &cancel);
        let before = Arc::as_ptr(&engine.snapshot());
        let second = engine.fetch_tree(&params, &cancel);
        assert_eq!(first, second);
        assert_eq!(before, Arc::as_ptr(&engine.snapshot()));

        let grouped = engine.fetch_tree(&QueryBuilder::new().group_by(0).build(), &cancel);
        assert_ne!(before, Arc::as_ptr(&engine.snapshot()));
        assert_eq!(grouped.status, Status::Completed);
    }

    #[test]
    fn rows_without_times_fail() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        engine.fetch_tree(&FetchParameters::new(), &cancel);
        let response = engine.fetch_rows(&QueryBuilder::new().items([2]).build(), &cancel);
        assert_eq!(response.status, Status::Failed);
        assert_eq!(response.message, "Incorrect query parameters");
        assert!(response.model.is_none());
    }

    #[test]
    fn unknown_ids_give_empty_rows() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        engine.fetch_tree(&FetchParameters::new(), &cancel);
        let response = engine.fetch_rows(&QueryBuilder::new().times([0]).items([0, 99]).build(), &cancel);
        let model = response.model.unwrap();
        assert_eq!(model.rows.len(), 2);
        assert!(model.rows.iter().all(|r| r.states.is_empty()));
    }

    #[test]
    fn cancelled_rows_return_no_model() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        engine.fetch_tree(&FetchParameters::new(), &cancel);
        cancel.cancel();
        let response = engine.fetch_rows(&QueryBuilder::new().times([0]).build(), &cancel);
        assert_eq!(response.status, Status::Cancelled);
        assert!(response.model.is_none());
    }

    #[test]
    fn cancelled_build_keeps_previous_index() {
        let engine = engine(Provider::new("test", scenario()));
        let live = CancellationToken::new();
        let first = engine.fetch_tree(&FetchParameters::new(), &live);

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let response = engine.fetch_tree(&QueryBuilder::new().group_by(0).build(), &cancelled);
        assert_eq!(response.status, Status::Cancelled);
        assert_eq!(engine.fetch_tree(&FetchParameters::new(), &live), first);
    }

    #[test]
    fn tooltip_lists_metrics_in_order() {
        let provider = Provider::new("test", scenario())
            .with_weight_type(MetricType::new("Duration", DataType::Nanoseconds))
            .with_metric(MetricType::new("Self time", DataType::Nanoseconds), |t| {
                MetricValue::Integer(t.self_weight())
            })
            .with_statistics(MetricIndex::Weight, |t| {
                Statistics::from_iter([4, t.weight()])
            });
        let engine = engine(provider);
        let cancel = CancellationToken::new();
        let ids = function_ids(&engine.fetch_tree(&FetchParameters::new(), &cancel));

        let query = QueryBuilder::new().times([3]).items([ids[0]]).build();
        let tooltip = engine.fetch_tooltip(&query, &cancel).model.unwrap();
        let names: Vec<&str> = tooltip.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Duration", "Self time", "Duration (statistics)"]);
        assert_eq!(tooltip.get("Duration"), Some("10ns"));
        assert_eq!(tooltip.get("Self time"), Some("6ns"));
        assert_eq!(tooltip.get("Duration (statistics)"), Some("min: 4ns, max: 10ns, avg: 7ns"));
    }

    #[test]
    fn tooltip_in_a_gap_is_empty() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        let ids = function_ids(&engine.fetch_tree(&FetchParameters::new(), &cancel));
        let query = QueryBuilder::new().times([12]).items([ids[1]]).build();
        let response = engine.fetch_tooltip(&query, &cancel);
        assert_eq!(response.status, Status::Completed);
        assert!(response.model.unwrap().is_empty());
    }

    #[test]
    fn tooltip_needs_a_single_target() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        engine.fetch_tree(&FetchParameters::new(), &cancel);
        let response = engine.fetch_tooltip(&QueryBuilder::new().times([1, 2]).items([2]).build(), &cancel);
        assert_eq!(response.status, Status::Failed);
        let response = engine.fetch_tooltip(&QueryBuilder::new().times([1]).build(), &cancel);
        assert_eq!(response.status, Status::Failed);
    }

    #[test]
    fn uncomputed_metric_fails_the_tooltip() {
        let provider = Provider::new("test", scenario())
            .with_declared_metric(MetricType::new("Calls", DataType::Number));
        let engine = engine(provider);
        let cancel = CancellationToken::new();
        let ids = function_ids(&engine.fetch_tree(&FetchParameters::new(), &cancel));
        let query = QueryBuilder::new().times([0]).items([ids[0]]).build();
        let response = engine.fetch_tooltip(&query, &cancel);
        assert_eq!(response.status, Status::Failed);
        assert!(response.message.contains("Calls"));
    }

    #[test]
    fn running_analysis_is_not_cached() {
        let provider =
            Provider::new("test", scenario()).with_analysis_state(AnalysisState::Running);
        let engine = engine(provider);
        let cancel = CancellationToken::new();
        let params = FetchParameters::new();
        let response = engine.fetch_tree(&params, &cancel);
        assert_eq!(response.status, Status::Running);
        assert!(response.model.is_some());
        let before = Arc::as_ptr(&engine.snapshot());
        engine.fetch_tree(&params, &cancel);
        assert_ne!(before, Arc::as_ptr(&engine.snapshot()));
    }

    #[test]
    fn style_table_matches_state_references() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        let ids = function_ids(&engine.fetch_tree(&FetchParameters::new(), &cancel));
        let styles = engine.fetch_style(&FetchParameters::new()).model.unwrap();
        assert_eq!(styles.styles.len(), crate::palette::DEFAULT_PALETTE_SIZE);

        let rows = engine
            .fetch_rows(&QueryBuilder::new().times([0]).items([ids[0]]).build(), &cancel)
            .model
            .unwrap();
        let style = rows.rows[0].states[0].style.as_ref().unwrap();
        assert!(style.is_reference());
        assert!(styles.styles.contains_key(style.parent_key.as_deref().unwrap()));
    }

    #[test]
    fn regex_filter_drops_states() {
        let engine = engine(Provider::new("test", scenario()));
        let cancel = CancellationToken::new();
        let ids = function_ids(&engine.fetch_tree(&FetchParameters::new(), &cancel));
        let query = QueryBuilder::new().times([0, 12]).items([ids[0]]).filter(0, "^C$").build();
        let rows = engine.fetch_rows(&query, &cancel).model.unwrap();
        let labels: Vec<Option<&str>> =
            rows.rows[0].states.iter().map(|s| s.label.as_deref()).collect();
        assert_eq!(labels, vec![Some("C")]);

        let bad = QueryBuilder::new().times([0]).filter(0, "(").build();
        assert_eq!(engine.fetch_rows(&bad, &cancel).status, Status::Failed);
    }
}
