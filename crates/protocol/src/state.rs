use serde::{Deserialize, Serialize};

use crate::style::OutputStyle;

/// One interval of a row.
///
/// A state without label and style is a placeholder: it only keeps the row
/// contiguous where no node exists at that depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGraphState {
    pub start_time: i64,
    pub duration: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<OutputStyle>,
    /// Stable identity of the node's payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl TimeGraphState {
    pub fn new(start_time: i64, duration: i64, label: impl Into<String>, style: OutputStyle) -> Self {
        Self {
            start_time,
            duration: duration.max(0),
            label: Some(label.into()),
            style: Some(style),
            value: None,
        }
    }

    pub fn null(start_time: i64, duration: i64) -> Self {
        Self {
            start_time,
            duration: duration.max(0),
            label: None,
            style: None,
            value: None,
        }
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn end_time(&self) -> i64 {
        self.start_time.saturating_add(self.duration)
    }

    pub fn is_null(&self) -> bool {
        self.label.is_none() && self.style.is_none()
    }

    pub fn contains(&self, time: i64) -> bool {
        self.start_time <= time && time < self.end_time()
    }
}

/// The states of one entry, sorted by start time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub entry_id: i64,
    pub states: Vec<TimeGraphState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowModel {
    pub rows: Vec<Row>,
}

impl RowModel {
    pub fn row(&self, entry_id: i64) -> Option<&Row> {
        self.rows.iter().find(|r| r.entry_id == entry_id)
    }

    /// The state of `entry_id` covering `time`, if any.
    pub fn state_at(&self, entry_id: i64, time: i64) -> Option<&TimeGraphState> {
        self.row(entry_id)?.states.iter().find(|s| s.contains(time))
    }
}
