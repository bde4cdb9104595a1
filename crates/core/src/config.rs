use serde::{Deserialize, Serialize};

use crate::palette::DEFAULT_PALETTE_SIZE;

/// Engine settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlameGraphConfig {
    /// Name of the root entry of every tree.
    pub trace_name: String,
    /// Number of colors of the default palette.
    pub palette_size: usize,
}

impl Default for FlameGraphConfig {
    fn default() -> Self {
        Self {
            trace_name: "trace".to_string(),
            palette_size: DEFAULT_PALETTE_SIZE,
        }
    }
}

impl FlameGraphConfig {
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn with_trace_name(mut self, name: impl Into<String>) -> Self {
        self.trace_name = name.into();
        self
    }
}
