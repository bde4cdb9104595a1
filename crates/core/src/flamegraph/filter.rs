use std::collections::BTreeMap;

use flame_tree_protocol::TimeGraphState;
use regex::Regex;
use thiserror::Error;

/// Filter key applying to every depth.
pub const ALL_DEPTHS: i64 = -1;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled per-depth regex predicates.
///
/// A real state passes when every pattern applying to its depth matches its
/// label or its weight. Placeholder states always pass.
#[derive(Debug, Default)]
pub struct DepthFilters {
    by_depth: BTreeMap<i64, Vec<Regex>>,
}

impl DepthFilters {
    pub fn compile(patterns: &BTreeMap<i64, Vec<String>>) -> Result<Self, FilterError> {
        let mut by_depth = BTreeMap::new();
        for (&depth, sources) in patterns {
            let compiled = sources
                .iter()
                .map(|pattern| {
                    Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            by_depth.insert(depth, compiled);
        }
        Ok(Self { by_depth })
    }

    pub fn is_empty(&self) -> bool {
        self.by_depth.values().all(Vec::is_empty)
    }

    pub fn accepts(&self, depth: usize, state: &TimeGraphState, weight: i64) -> bool {
        if state.is_null() || self.is_empty() {
            return true;
        }
        let depth = i64::try_from(depth).unwrap_or(i64::MAX);
        let label = state.label.as_deref().unwrap_or_default();
        let weight = weight.to_string();
        [ALL_DEPTHS, depth]
            .iter()
            .filter_map(|key| self.by_depth.get(key))
            .flatten()
            .all(|re| re.is_match(label) || re.is_match(&weight))
    }
}
