//! Horizontal placement of weighted trees.
//!
//! Siblings are laid out one after the other on a shared timeline, heaviest
//! first. Every pass that positions nodes (entry end times, rows, point
//! lookup) goes through [`slots`], so two independent queries agree on where
//! each node lives without exchanging any state.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;

use flame_tree_protocol::TimeGraphState;

use super::QueryError;
use super::filter::DepthFilters;
use crate::cancel::CancellationToken;
use crate::model::{TreeObject, WeightedTree};

/// Siblings in layout order: descending weight, then ascending string form
/// of the payload.
pub fn sorted_trees<N: TreeObject>(trees: &[WeightedTree<N>]) -> Vec<&WeightedTree<N>> {
    let mut sorted: Vec<&WeightedTree<N>> = trees.iter().collect();
    sorted.sort_by_cached_key(|t| (Reverse(t.weight()), t.object().to_string()));
    sorted
}

/// A node positioned on the timeline.
#[derive(Debug)]
pub struct Slot<'a, N> {
    pub tree: &'a WeightedTree<N>,
    pub start: i64,
    /// Visible width: the weight, clipped to the parent's end.
    pub width: i64,
}

impl<N> Slot<'_, N> {
    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.width)
    }

    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time < self.end()
    }
}

/// Lay out `trees` from `start`. With a `limit`, widths are clipped to it and
/// siblings that would start at or past it are dropped; the cursor always
/// advances by the full weight.
pub fn slots<N: TreeObject>(
    trees: &[WeightedTree<N>],
    start: i64,
    limit: Option<i64>,
) -> Vec<Slot<'_, N>> {
    let mut cursor = start;
    let mut out = Vec::with_capacity(trees.len());
    for tree in sorted_trees(trees) {
        let width = match limit {
            Some(limit) if cursor >= limit => break,
            Some(limit) => tree.weight().min(limit - cursor),
            None => tree.weight(),
        };
        out.push(Slot {
            tree,
            start: cursor,
            width,
        });
        cursor = cursor.saturating_add(tree.weight());
    }
    out
}

/// The slot covering `time` at `depth`, descending from `roots`.
pub fn locate<N: TreeObject>(
    roots: &[WeightedTree<N>],
    depth: usize,
    time: i64,
) -> Option<Slot<'_, N>> {
    let mut level = slots(roots, 0, None);
    let mut current = 0;
    loop {
        let slot = level.into_iter().find(|s| s.contains(time))?;
        if current == depth {
            return Some(slot);
        }
        level = slots(slot.tree.children(), slot.start, Some(slot.end()));
        current += 1;
    }
}

/// The node at `depth` whose interval contains `time`, or `None` when the
/// time falls in a gap.
pub fn find_node_at<N: TreeObject>(
    roots: &[WeightedTree<N>],
    depth: usize,
    time: i64,
) -> Option<&WeightedTree<N>> {
    locate(roots, depth, time).map(|slot| slot.tree)
}

/// Whether any requested time lies in `[start, start + duration]`.
pub fn overlaps(start: i64, duration: i64, times: &[i64]) -> bool {
    let end = start.saturating_add(duration);
    times.iter().any(|&t| start <= t && t <= end)
}

pub type StateFactory<'f, N> = dyn Fn(&WeightedTree<N>, i64, i64) -> TimeGraphState + 'f;

/// Builds the rows of the requested depths of one grouping element.
pub struct RowLayout<'a, N> {
    times: &'a [i64],
    filters: &'a DepthFilters,
    cancel: &'a CancellationToken,
    make_state: &'a StateFactory<'a, N>,
    rows: BTreeMap<usize, Vec<TimeGraphState>>,
    deepest: usize,
}

impl<'a, N: TreeObject> RowLayout<'a, N> {
    pub fn new(
        depths: impl IntoIterator<Item = usize>,
        times: &'a [i64],
        filters: &'a DepthFilters,
        cancel: &'a CancellationToken,
        make_state: &'a StateFactory<'a, N>,
    ) -> Self {
        let rows: BTreeMap<usize, Vec<TimeGraphState>> =
            depths.into_iter().map(|d| (d, Vec::new())).collect();
        let deepest = rows.keys().next_back().copied().unwrap_or(0);
        Self {
            times,
            filters,
            cancel,
            make_state,
            rows,
            deepest,
        }
    }

    /// Place every root overlapping a requested time, then pad the rows up
    /// to `element_end`. Returns the final cursor, the sum of root weights.
    pub fn run(&mut self, roots: &[WeightedTree<N>], element_end: i64) -> Result<i64, QueryError> {
        let mut cursor = 0;
        for slot in slots(roots, 0, None) {
            if overlaps(slot.start, slot.width, self.times) {
                self.place(&slot, 0, self.deepest)?;
            }
            cursor = slot.end();
        }
        if element_end > cursor && overlaps(cursor, element_end - cursor, self.times) {
            self.fill(None, self.deepest, cursor, element_end - cursor);
        }
        Ok(cursor)
    }

    pub fn into_rows(self) -> BTreeMap<usize, Vec<TimeGraphState>> {
        self.rows
    }

    fn place(&mut self, slot: &Slot<'_, N>, depth: usize, limit: usize) -> Result<(), QueryError> {
        if self.cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        if let Some(states) = self.rows.get_mut(&depth) {
            let state = (self.make_state)(slot.tree, slot.start, slot.width);
            if self.filters.accepts(depth, &state, slot.tree.weight()) {
                states.push(state);
            }
        }
        if depth >= limit {
            return Ok(());
        }

        // Nothing below this node deeper than its own reach.
        let reach = depth + slot.tree.max_depth() - 1;
        self.fill(Some(reach), limit, slot.start, slot.width);
        let limit = limit.min(reach);

        let mut used = slot.start;
        for child in slots(slot.tree.children(), slot.start, Some(slot.end())) {
            if overlaps(child.start, child.width, self.times) {
                self.place(&child, depth + 1, limit)?;
            }
            used = child.end();
        }
        let remaining = slot.end() - used;
        if remaining > 0 && overlaps(used, remaining, self.times) {
            self.fill(Some(depth), limit, used, remaining);
        }
        Ok(())
    }

    /// Null states on the requested depths in `(after, through]`.
    fn fill(&mut self, after: Option<usize>, through: usize, start: i64, duration: i64) {
        if duration <= 0 {
            return;
        }
        if let Some(after) = after
            && after >= through
        {
            return;
        }
        let lower = after.map_or(Bound::Included(0), Bound::Excluded);
        for states in self.rows.range_mut((lower, Bound::Included(through))).map(|(_, s)| s) {
            states.push(TimeGraphState::null(start, duration));
        }
    }
}
