//! Category-ordered light id lists
//!
//! A [`LightGroup`] stores light ids sorted by [`LightCategory`] with one
//! boundary per category plus an end marker, so the ids of any category
//! are a contiguous slice. The per-category counts form the key used to
//! pick a shader permutation.

use super::light::{LightCategory, LightId};

/// Errors raised while building a light group
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightGroupError {
    /// Appending this category would go back in shading order
    #[error("cannot append {category:?} after {last:?}")]
    OutOfOrder {
        /// Category being appended
        category: LightCategory,
        /// Last non-empty category in the group
        last: LightCategory,
    },

    /// No more ids fit in the group
    #[error("light group is full")]
    Full,
}

/// Shader-permutation key: 8 bits of light count per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LightGroupKey(pub u64);

impl LightGroupKey {
    /// Light count recorded for a category, saturated at 255
    pub fn count(self, category: LightCategory) -> u8 {
        (self.0 >> (category.index() * 8)) as u8
    }
}

/// Light ids ordered by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LightGroup {
    ids: Vec<LightId>,
    // bounds[c] is the first id of category c, bounds[COUNT] the end
    bounds: [u16; LightCategory::COUNT + 1],
}

impl LightGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a group from per-category buckets
    pub(super) fn from_buckets(buckets: &[Vec<LightId>; LightCategory::COUNT]) -> Self {
        let mut group = Self::new();
        for (category, bucket) in LightCategory::ALL.iter().zip(buckets) {
            for &id in bucket {
                group.insert(*category, id);
            }
        }
        group
    }

    /// Append a light; categories must arrive in shading order
    pub fn push(&mut self, category: LightCategory, id: LightId) -> Result<(), LightGroupError> {
        if let Some(last) = self.last_category() {
            if category < last {
                return Err(LightGroupError::OutOfOrder { category, last });
            }
        }
        if self.ids.len() >= usize::from(u16::MAX) {
            return Err(LightGroupError::Full);
        }
        self.insert(category, id);
        Ok(())
    }

    /// Insert a light at the end of its category, wherever that is
    pub fn insert(&mut self, category: LightCategory, id: LightId) {
        if self.ids.len() >= usize::from(u16::MAX) {
            log::warn!("Light group full, dropping light {}", id.0);
            return;
        }
        let end = usize::from(self.bounds[category.index() + 1]);
        self.ids.insert(end, id);
        for bound in &mut self.bounds[category.index() + 1..] {
            *bound += 1;
        }
    }

    /// `(start, count)` of a category's slice
    pub fn category(&self, category: LightCategory) -> (usize, usize) {
        let start = usize::from(self.bounds[category.index()]);
        let end = usize::from(self.bounds[category.index() + 1]);
        (start, end - start)
    }

    /// Ids of one category
    pub fn ids_in(&self, category: LightCategory) -> &[LightId] {
        let (start, count) = self.category(category);
        &self.ids[start..start + count]
    }

    /// All ids in category order
    pub fn ids(&self) -> &[LightId] {
        &self.ids
    }

    /// Iterate `(category, id)` in shading order
    pub fn iter(&self) -> impl Iterator<Item = (LightCategory, LightId)> + '_ {
        LightCategory::ALL
            .iter()
            .flat_map(move |&category| self.ids_in(category).iter().map(move |&id| (category, id)))
    }

    /// Number of lights
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// No lights
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether any shadow-casting category is populated
    pub fn has_shadow_lights(&self) -> bool {
        LightCategory::ALL
            .iter()
            .any(|c| c.is_shadow() && self.category(*c).1 > 0)
    }

    fn last_category(&self) -> Option<LightCategory> {
        LightCategory::ALL
            .iter()
            .rev()
            .copied()
            .find(|c| self.category(*c).1 > 0)
    }

    /// Shader-permutation key
    pub fn key(&self) -> LightGroupKey {
        let key = LightCategory::ALL.iter().fold(0u64, |key, category| {
            let count = self.category(*category).1.min(usize::from(u8::MAX)) as u64;
            key | (count << (category.index() * 8))
        });
        LightGroupKey(key)
    }

    /// Ids packed two per word, low half first, for GPU upload
    pub fn packed_ids(&self) -> Vec<u32> {
        let raw: &[u16] = bytemuck::cast_slice(&self.ids);
        raw.chunks(2)
            .map(|pair| {
                let high = pair.get(1).copied().unwrap_or(0);
                u32::from(pair[0]) | (u32::from(high) << 16)
            })
            .collect()
    }
}
