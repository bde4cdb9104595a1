use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooltipField {
    pub name: String,
    pub value: String,
}

/// Tooltip fields, in metric declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooltipModel {
    pub fields: Vec<TooltipField>,
}

impl TooltipModel {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(TooltipField {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
