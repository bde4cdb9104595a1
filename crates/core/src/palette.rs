use std::collections::BTreeMap;

use flame_tree_protocol::{OutputStyle, Rgba};

use crate::model::{TreeObject, WeightedTree};

/// Maps nodes to styles of a fixed style table.
pub trait DataPalette<N>: Send + Sync {
    /// Style of one node. Implementations return references into
    /// [`styles`](Self::styles) rather than materialized styles.
    fn style_for(&self, tree: &WeightedTree<N>) -> OutputStyle;

    fn styles(&self) -> BTreeMap<String, OutputStyle>;
}

/// 64-bit FNV-1a, stable across runs and platforms.
pub fn stable_hash(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME))
}

pub const DEFAULT_PALETTE_SIZE: usize = 20;

/// Rotating-hue palette; a node's color is picked from the hash of its
/// payload's string form, so the same function always gets the same color.
#[derive(Debug, Clone)]
pub struct FlamePalette {
    size: usize,
}

impl FlamePalette {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn key_for(&self, text: &str) -> String {
        (stable_hash(text) % self.size as u64).to_string()
    }
}

impl Default for FlamePalette {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE_SIZE)
    }
}

impl<N: TreeObject> DataPalette<N> for FlamePalette {
    fn style_for(&self, tree: &WeightedTree<N>) -> OutputStyle {
        OutputStyle::reference(self.key_for(&tree.object().to_string()))
    }

    fn styles(&self) -> BTreeMap<String, OutputStyle> {
        (0..self.size)
            .map(|i| {
                let hue = 360.0 * i as f64 / self.size as f64;
                // Alternate value so neighbouring hues stay distinguishable.
                let value = if i % 2 == 0 { 0.95 } else { 0.8 };
                (
                    i.to_string(),
                    OutputStyle::filled(Rgba::from_hsv(hue, 0.6, value)),
                )
            })
            .collect()
    }
}
