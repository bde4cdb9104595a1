use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys understood by the flame graph queries.
pub mod keys {
    /// Array of timestamps the caller wants states for.
    pub const REQUESTED_TIMES: &str = "requested_times";
    /// Array of entry ids.
    pub const REQUESTED_ITEMS: &str = "requested_items";
    /// Object mapping a depth (`-1` for every depth) to regex patterns.
    pub const REGEX_MAP_FILTERS: &str = "regex_map_filters";
    /// Grouping level of the elements hierarchy.
    pub const GROUP_BY: &str = "group_by";
    /// Two timestamps delimiting a selection.
    pub const SELECTION_RANGE: &str = "selection_range";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("`{key}` must be {expected}")]
    InvalidType {
        key: &'static str,
        expected: &'static str,
    },
    #[error("`{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Free-form query parameters, as sent by a client.
///
/// Equality is structural, which is what the tree cache keys on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchParameters(Map<String, Value>);

impl FetchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn requested_times(&self) -> Result<Option<Vec<i64>>, ParamError> {
        self.long_list(keys::REQUESTED_TIMES)
    }

    pub fn requested_items(&self) -> Result<Option<Vec<i64>>, ParamError> {
        self.long_list(keys::REQUESTED_ITEMS)
    }

    /// Regex filters per depth. A single string is accepted in place of a
    /// one-element array.
    pub fn regex_filters(&self) -> Result<Option<BTreeMap<i64, Vec<String>>>, ParamError> {
        const KEY: &str = keys::REGEX_MAP_FILTERS;
        let Some(value) = self.0.get(KEY) else {
            return Ok(None);
        };
        let object = value.as_object().ok_or(ParamError::InvalidType {
            key: KEY,
            expected: "an object of depth to patterns",
        })?;

        let mut filters = BTreeMap::new();
        for (depth, patterns) in object {
            let depth: i64 = depth.trim().parse().map_err(|_| ParamError::InvalidValue {
                key: KEY,
                reason: format!("`{depth}` is not a depth"),
            })?;
            let patterns = match patterns {
                Value::String(pattern) => vec![pattern.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or(ParamError::InvalidType {
                            key: KEY,
                            expected: "string patterns",
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                _ => {
                    return Err(ParamError::InvalidType {
                        key: KEY,
                        expected: "string patterns",
                    });
                }
            };
            filters.entry(depth).or_insert_with(Vec::new).extend(patterns);
        }
        Ok(Some(filters))
    }

    pub fn group_by(&self) -> Result<Option<usize>, ParamError> {
        const KEY: &str = keys::GROUP_BY;
        let Some(value) = self.0.get(KEY) else {
            return Ok(None);
        };
        if let Some(level) = value.as_u64() {
            return usize::try_from(level)
                .map(Some)
                .map_err(|_| ParamError::InvalidValue {
                    key: KEY,
                    reason: format!("{level} is too large"),
                });
        }
        if value.as_i64().is_some() {
            return Err(ParamError::InvalidValue {
                key: KEY,
                reason: "must not be negative".to_string(),
            });
        }
        Err(ParamError::InvalidType {
            key: KEY,
            expected: "an integer",
        })
    }

    /// The selection as `(start, end)` with `start <= end`.
    pub fn selection_range(&self) -> Result<Option<(i64, i64)>, ParamError> {
        const KEY: &str = keys::SELECTION_RANGE;
        let Some(range) = self.long_list(KEY)? else {
            return Ok(None);
        };
        match range.as_slice() {
            [a, b] => Ok(Some(((*a).min(*b), (*a).max(*b)))),
            _ => Err(ParamError::InvalidValue {
                key: KEY,
                reason: format!("expected 2 timestamps, got {}", range.len()),
            }),
        }
    }

    fn long_list(&self, key: &'static str) -> Result<Option<Vec<i64>>, ParamError> {
        let Some(value) = self.0.get(key) else {
            return Ok(None);
        };
        let invalid = ParamError::InvalidType {
            key,
            expected: "an array of integers",
        };
        let items = value.as_array().ok_or_else(|| invalid.clone())?;
        items
            .iter()
            .map(|item| item.as_i64().ok_or_else(|| invalid.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

impl From<Map<String, Value>> for FetchParameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Fluent construction of [`FetchParameters`].
#[derive(Debug, Default)]
pub struct QueryBuilder {
    params: FetchParameters,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn times(mut self, times: impl IntoIterator<Item = i64>) -> Self {
        let times: Vec<i64> = times.into_iter().collect();
        self.params.insert(keys::REQUESTED_TIMES, times);
        self
    }

    pub fn items(mut self, items: impl IntoIterator<Item = i64>) -> Self {
        let items: Vec<i64> = items.into_iter().collect();
        self.params.insert(keys::REQUESTED_ITEMS, items);
        self
    }

    /// Add a pattern for `depth` (`-1` applies to every depth).
    pub fn filter(mut self, depth: i64, pattern: impl Into<String>) -> Self {
        let filters = self
            .params
            .0
            .entry(keys::REGEX_MAP_FILTERS)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(filters) = filters {
            let patterns = filters
                .entry(depth.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(patterns) = patterns {
                patterns.push(Value::String(pattern.into()));
            }
        }
        self
    }

    pub fn group_by(mut self, level: usize) -> Self {
        self.params.insert(keys::GROUP_BY, level);
        self
    }

    pub fn selection_range(mut self, start: i64, end: i64) -> Self {
        self.params.insert(keys::SELECTION_RANGE, vec![start, end]);
        self
    }

    pub fn build(self) -> FetchParameters {
        self.params
    }
}
