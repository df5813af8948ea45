//! Splitting light groups into passes that fit a per-pass cost budget

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::group::LightGroup;
use super::light::LightCategory;

bitflags! {
    /// How shadow-casting lights are treated when subdividing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SubdivisionPolicy: u8 {
        /// Leave shadow-casting lights out entirely
        const NO_SHADOW_LIGHTS = 1 << 0;
        /// Shade shadow-casting lights as plain lights of the same kind
        const CONVERT_SHADOW_LIGHTS = 1 << 1;
    }
}

/// Shader cost per light category and the budget of one pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LightCostTable {
    /// Ambient light
    pub ambient: u32,
    /// Directional light
    pub directional: u32,
    /// Point light
    pub point: u32,
    /// Spot light
    pub spot: u32,
    /// Shadow-casting directional light
    pub shadow_directional: u32,
    /// Shadow-casting point light
    pub shadow_point: u32,
    /// Shadow-casting spot light
    pub shadow_spot: u32,
    /// Largest total cost of a single pass
    pub budget: u32,
}

impl Default for LightCostTable {
    fn default() -> Self {
        Self {
            ambient: 10,
            directional: 50,
            point: 100,
            spot: 150,
            shadow_directional: 150,
            shadow_point: 200,
            shadow_spot: 250,
            budget: 1000,
        }
    }
}

impl LightCostTable {
    /// Cost of one light in a category
    pub fn cost(&self, category: LightCategory) -> u32 {
        match category {
            LightCategory::Ambient => self.ambient,
            LightCategory::Directional => self.directional,
            LightCategory::ShadowDirectional => self.shadow_directional,
            LightCategory::Point => self.point,
            LightCategory::ShadowPoint => self.shadow_point,
            LightCategory::Spot => self.spot,
            LightCategory::ShadowSpot => self.shadow_spot,
        }
    }

    /// Total cost of a group under a policy
    pub fn group_cost(&self, group: &LightGroup, policy: SubdivisionPolicy) -> u32 {
        group
            .iter()
            .filter_map(|(category, _)| effective_category(category, policy))
            .map(|category| self.cost(category))
            .sum()
    }
}

/// One pass worth of lights
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubGroup {
    /// Lights shaded in this pass
    pub group: LightGroup,
    /// Accumulated cost
    pub cost: u32,
}

fn effective_category(category: LightCategory, policy: SubdivisionPolicy) -> Option<LightCategory> {
    if !category.is_shadow() {
        Some(category)
    } else if policy.contains(SubdivisionPolicy::NO_SHADOW_LIGHTS) {
        None
    } else if policy.contains(SubdivisionPolicy::CONVERT_SHADOW_LIGHTS) {
        Some(category.without_shadow())
    } else {
        Some(category)
    }
}

/// Split a group into sub-groups whose cost stays within the budget
///
/// Lights are taken in shading order. A sub-group is closed when the next
/// light would push it over budget, unless it is still empty, so a single
/// light more expensive than the budget gets a pass of its own. At least
/// one (possibly empty) sub-group is always returned.
pub fn subdivide(
    group: &LightGroup,
    policy: SubdivisionPolicy,
    costs: &LightCostTable,
) -> Vec<SubGroup> {
    let mut sub_groups = Vec::new();
    let mut current = SubGroup::default();

    for (category, id) in group.iter() {
        let Some(category) = effective_category(category, policy) else {
            continue;
        };
        let cost = costs.cost(category);

        if !current.group.is_empty() && current.cost.saturating_add(cost) > costs.budget {
            sub_groups.push(std::mem::take(&mut current));
        }
        current.group.insert(category, id);
        current.cost = current.cost.saturating_add(cost);
    }

    if !current.group.is_empty() || sub_groups.is_empty() {
        sub_groups.push(current);
    }

    log::trace!(
        "Subdivided {} lights into {} sub-groups ({:?})",
        group.len(),
        sub_groups.len(),
        policy
    );
    sub_groups
}
