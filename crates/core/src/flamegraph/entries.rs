use std::collections::HashMap;

use flame_tree_protocol::{EntryType, FlameEntry};

use super::QueryError;
use super::layout::sorted_trees;
use crate::cancel::CancellationToken;
use crate::model::{GroupElement, TreeObject, WeightedTreeSet};

/// The `(element, depth)` a function entry displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthEntry<E> {
    pub element: E,
    pub depth: usize,
}

/// Result of one build pass: entries parents first, and the depth
/// association of every function entry.
#[derive(Debug)]
pub struct EntryTree<E> {
    pub entries: Vec<FlameEntry>,
    pub depth_entries: HashMap<i64, DepthEntry<E>>,
}

/// Build the entry hierarchy: one trace root, one level per element
/// (recursing into sub-elements), and one function entry per depth of the
/// element's root trees.
///
/// Ids are allocated from 0 in emission order, so equal tree sets always
/// produce equal entries.
pub fn build_entries<N: TreeObject, E: GroupElement>(
    set: &WeightedTreeSet<N, E>,
    trace_name: &str,
    cancel: &CancellationToken,
) -> Result<EntryTree<E>, QueryError> {
    let mut builder = EntryBuilder {
        set,
        cancel,
        entries: Vec::new(),
        depth_entries: HashMap::new(),
    };
    let trace = builder.push(trace_name.to_string(), FlameEntry::NO_PARENT, EntryType::Trace, None);
    let trace_id = builder.entries[trace].id;
    for element in set.elements() {
        builder.element(element, trace_id)?;
    }

    let end = builder.entries.iter().map(|e| e.end_time).max().unwrap_or(0);
    builder.entries[trace].end_time = end;
    Ok(EntryTree {
        entries: builder.entries,
        depth_entries: builder.depth_entries,
    })
}

struct EntryBuilder<'a, N, E> {
    set: &'a WeightedTreeSet<N, E>,
    cancel: &'a CancellationToken,
    entries: Vec<FlameEntry>,
    depth_entries: HashMap<i64, DepthEntry<E>>,
}

impl<N: TreeObject, E: GroupElement> EntryBuilder<'_, N, E> {
    fn push(
        &mut self,
        name: String,
        parent_id: i64,
        entry_type: EntryType,
        depth: Option<usize>,
    ) -> usize {
        let index = self.entries.len();
        self.entries.push(FlameEntry {
            id: index as i64,
            parent_id,
            name,
            start_time: 0,
            end_time: 0,
            entry_type,
            depth,
        });
        index
    }

    /// Emit `element` and its subtree; returns the element's end time.
    fn element(&mut self, element: &E, parent_id: i64) -> Result<i64, QueryError> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let set = self.set;
        let level = self.push(element.to_string(), parent_id, EntryType::Level, None);
        let level_id = self.entries[level].id;

        let mut end = 0;
        for child in set.children_of(element) {
            end = end.max(self.element(child, level_id)?);
        }

        // A depth ends where the last root reaching it ends.
        let mut cursor: i64 = 0;
        let mut depth_ends: Vec<i64> = Vec::new();
        for tree in sorted_trees(set.trees_for(element)) {
            cursor = cursor.saturating_add(tree.weight());
            if depth_ends.len() < tree.max_depth() {
                depth_ends.resize(tree.max_depth(), 0);
            }
            depth_ends[..tree.max_depth()].fill(cursor);
        }
        for (depth, depth_end) in depth_ends.into_iter().enumerate() {
            let index = self.push(depth.to_string(), level_id, EntryType::Function, Some(depth));
            self.entries[index].end_time = depth_end;
            self.depth_entries.insert(
                self.entries[index].id,
                DepthEntry {
                    element: element.clone(),
                    depth,
                },
            );
        }

        end = end.max(cursor);
        self.entries[level].end_time = end;
        Ok(end)
    }
}
