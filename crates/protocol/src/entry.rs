use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Root of the entry tree, one per query.
    Trace,
    /// A grouping element (process, thread, "All"…).
    Level,
    /// One depth row of an element's call trees.
    Function,
    Kernel,
}

/// A node of the entry tree returned by `fetch_tree`.
///
/// Entries are listed parents first; the root has `parent_id == NO_PARENT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlameEntry {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub start_time: i64,
    pub end_time: i64,
    pub entry_type: EntryType,
    /// Only set on `Function` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
}

impl FlameEntry {
    pub const NO_PARENT: i64 = -1;

    pub fn is_root(&self) -> bool {
        self.parent_id == Self::NO_PARENT
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeModel {
    pub entries: Vec<FlameEntry>,
}

impl TreeModel {
    pub fn entry(&self, id: i64) -> Option<&FlameEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn children_of(&self, id: i64) -> impl Iterator<Item = &FlameEntry> {
        self.entries.iter().filter(move |e| e.parent_id == id)
    }

    pub fn of_type(&self, entry_type: EntryType) -> impl Iterator<Item = &FlameEntry> {
        self.entries
            .iter()
            .filter(move |e| e.entry_type == entry_type)
    }
}
