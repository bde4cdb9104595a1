use std::collections::HashMap;
use std::sync::Arc;

use flame_tree_protocol::{FetchParameters, FlameEntry, Response, TreeModel};

use super::entries::{DepthEntry, EntryTree};
use crate::model::{GroupElement, TreeObject, WeightedTree, WeightedTreeSet};

/// Everything one tree build produced. Published as a whole, never mutated.
pub(crate) struct QueryIndex<N, E> {
    /// Parameters the response may be served again for; `None` when the
    /// build must not be reused.
    cache_key: Option<FetchParameters>,
    response: Response<TreeModel>,
    trees: Arc<WeightedTreeSet<N, E>>,
    entries: Vec<FlameEntry>,
    by_id: HashMap<i64, usize>,
    depth_entries: HashMap<i64, DepthEntry<E>>,
}

impl<N: TreeObject, E: GroupElement> QueryIndex<N, E> {
    pub(crate) fn empty() -> Self {
        Self {
            cache_key: None,
            response: Response::completed(TreeModel::default()),
            trees: Arc::new(WeightedTreeSet::new()),
            entries: Vec::new(),
            by_id: HashMap::new(),
            depth_entries: HashMap::new(),
        }
    }

    pub(crate) fn new(
        trees: Arc<WeightedTreeSet<N, E>>,
        built: EntryTree<E>,
        response: Response<TreeModel>,
        cache_key: Option<FetchParameters>,
    ) -> Self {
        let by_id = built
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        Self {
            cache_key,
            response,
            trees,
            entries: built.entries,
            by_id,
            depth_entries: built.depth_entries,
        }
    }

    pub(crate) fn cached(&self, params: &FetchParameters) -> Option<Response<TreeModel>> {
        (self.cache_key.as_ref() == Some(params)).then(|| self.response.clone())
    }

    pub(crate) fn response(&self) -> Response<TreeModel> {
        self.response.clone()
    }

    pub(crate) fn entry_ids(&self) -> Vec<i64> {
        self.entries.iter().map(|e| e.id).collect()
    }

    pub(crate) fn end_time(&self, id: i64) -> Option<i64> {
        self.by_id.get(&id).map(|&i| self.entries[i].end_time)
    }

    pub(crate) fn depth_entry(&self, id: i64) -> Option<&DepthEntry<E>> {
        self.depth_entries.get(&id)
    }

    pub(crate) fn trees_for(&self, element: &E) -> &[WeightedTree<N>] {
        self.trees.trees_for(element)
    }
}
