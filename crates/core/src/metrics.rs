use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the values of a metric represent, which decides their formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Plain number, shortened with a decimal prefix (k, M, G, T).
    Number,
    /// A duration in nanoseconds.
    Nanoseconds,
    /// A size in bytes.
    Bytes,
    /// A throughput in bytes per second.
    BinarySpeed,
    /// Passed through as is.
    Other,
}

const KIB: f64 = 1_024.0;
const MIB: f64 = KIB * 1_024.0;
const GIB: f64 = MIB * 1_024.0;
const TIB: f64 = GIB * 1_024.0;

impl DataType {
    pub fn format(self, value: f64) -> String {
        match self {
            Self::Number => format_decimal(value),
            Self::Nanoseconds => {
                let abs = value.abs();
                if abs >= 1_000_000_000.0 {
                    format!("{:.2}s", value / 1_000_000_000.0)
                } else if abs >= 1_000_000.0 {
                    format!("{:.1}ms", value / 1_000_000.0)
                } else if abs >= 1_000.0 {
                    format!("{:.1}µs", value / 1_000.0)
                } else {
                    format!("{value:.0}ns")
                }
            }
            Self::Bytes => format_bytes(value),
            Self::BinarySpeed => format!("{}/s", format_bytes(value)),
            Self::Other => MetricValue::Float(value).to_string(),
        }
    }
}

fn format_decimal(value: f64) -> String {
    let abs = value.abs();
    let (scale, prefix) = if abs >= 1e12 {
        (1e12, "T")
    } else if abs >= 1e9 {
        (1e9, "G")
    } else if abs >= 1e6 {
        (1e6, "M")
    } else if abs >= 1e3 {
        (1e3, "k")
    } else if value.fract() == 0.0 {
        return format!("{value:.0}");
    } else {
        return format!("{value:.2}");
    };
    format!("{:.1} {prefix}", value / scale)
}

fn format_bytes(value: f64) -> String {
    let abs = value.abs();
    if abs >= TIB {
        format!("{:.1} TiB", value / TIB)
    } else if abs >= GIB {
        format!("{:.1} GiB", value / GIB)
    } else if abs >= MIB {
        format!("{:.1} MiB", value / MIB)
    } else if abs >= KIB {
        format!("{:.1} KiB", value / KIB)
    } else {
        format!("{value:.0} B")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.0}"),
            Self::Float(v) => write!(f, "{v:.3}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Description of the main weight or of an additional per-node metric.
#[derive(Debug, Clone)]
pub struct MetricType {
    pub title: String,
    pub data_type: DataType,
    pub has_statistics: bool,
    /// Overrides the data type's formatting.
    pub formatter: Option<fn(&MetricValue) -> String>,
}

impl MetricType {
    pub fn new(title: impl Into<String>, data_type: DataType) -> Self {
        Self {
            title: title.into(),
            data_type,
            has_statistics: false,
            formatter: None,
        }
    }

    /// The default weight metric: "Weight", a plain number.
    pub fn weight() -> Self {
        Self::new("Weight", DataType::Number)
    }

    pub fn with_formatter(mut self, formatter: fn(&MetricValue) -> String) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn format(&self, value: &MetricValue) -> String {
        if let Some(formatter) = self.formatter {
            return formatter(value);
        }
        match value.as_f64() {
            Some(v) => self.data_type.format(v),
            None => value.to_string(),
        }
    }
}

impl Default for MetricType {
    fn default() -> Self {
        Self::weight()
    }
}

/// Which metric of a provider a statistics request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricIndex {
    Weight,
    Additional(usize),
}

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric index {index} out of range: {count} additional metric(s) declared")]
    OutOfRange { index: usize, count: usize },
    #[error("metric `{title}` is declared but not computed by this provider")]
    NotComputed { title: String },
}

/// Running statistics over the values aggregated into a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub count: u64,
    pub min: i64,
    pub max: i64,
    pub total: i64,
}

impl Statistics {
    pub fn update(&mut self, value: i64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.total = self.total.saturating_add(value);
    }

    pub fn merge(&mut self, other: &Statistics) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count += other.count;
        self.total = self.total.saturating_add(other.total);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total as f64 / self.count as f64
        }
    }

    /// One-line summary with values formatted by `metric`.
    pub fn describe(&self, metric: &MetricType) -> String {
        format!(
            "min: {}, max: {}, avg: {}",
            metric.format(&MetricValue::Integer(self.min)),
            metric.format(&MetricValue::Integer(self.max)),
            metric.format(&MetricValue::Float(self.mean())),
        )
    }
}

impl FromIterator<i64> for Statistics {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        let mut stats = Self::default();
        for value in iter {
            stats.update(value);
        }
        stats
    }
}
