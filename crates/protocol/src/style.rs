use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Style property names.
pub mod properties {
    pub const BACKGROUND_COLOR: &str = "background-color";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Build an opaque color from hue (degrees), saturation and value in `[0, 1]`.
    pub fn from_hsv(hue: f64, saturation: f64, value: f64) -> Self {
        let hue = hue.rem_euclid(360.0) / 60.0;
        let chroma = value * saturation;
        let x = chroma * (1.0 - (hue % 2.0 - 1.0).abs());
        let (r, g, b) = match hue as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = value - chroma;
        let channel = |c: f64| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(channel(r), channel(g), channel(b))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Value of a style property. Serialized as the bare value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Color(Rgba),
}

/// A style, possibly inheriting from a named style of the [`StyleModel`].
///
/// States reference palette entries through `parent_key` with no values of
/// their own, so a row of thousands of states shares a handful of styles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, StyleValue>,
}

impl OutputStyle {
    /// A lightweight reference to the named style `key`.
    pub fn reference(key: impl Into<String>) -> Self {
        Self {
            parent_key: Some(key.into()),
            values: BTreeMap::new(),
        }
    }

    pub fn filled(color: Rgba) -> Self {
        let mut values = BTreeMap::new();
        values.insert(
            properties::BACKGROUND_COLOR.to_string(),
            StyleValue::Color(color),
        );
        Self {
            parent_key: None,
            values,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.parent_key.is_some() && self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleModel {
    pub styles: BTreeMap<String, OutputStyle>,
}

impl StyleModel {
    /// Follow `style`'s parent reference to the concrete style.
    pub fn resolve<'a>(&'a self, style: &'a OutputStyle) -> &'a OutputStyle {
        style
            .parent_key
            .as_ref()
            .and_then(|key| self.styles.get(key))
            .unwrap_or(style)
    }
}
