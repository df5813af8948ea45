//! Light storage and per-frame light group construction

use super::group::{LightGroup, LightGroupError};
use super::light::{Light, LightCategory, LightId};
use crate::foundation::math::{utils, Vec3};

/// Owns every light and caches the frame's main light group
#[derive(Debug, Default)]
pub struct LightManager {
    lights: Vec<Light>,
    main_group: Option<LightGroup>,
    frame: u64,
}

impl LightManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a light
    pub fn add_light(&mut self, light: Light) -> Result<LightId, LightGroupError> {
        let id = u16::try_from(self.lights.len()).map_err(|_| LightGroupError::Full)?;
        if id == u16::MAX {
            return Err(LightGroupError::Full);
        }
        log::debug!("Added {:?} light {}", light.kind, id);
        self.lights.push(light);
        self.main_group = None;
        Ok(LightId(id))
    }

    /// Light by id
    pub fn light(&self, id: LightId) -> Option<&Light> {
        self.lights.get(usize::from(id.0))
    }

    /// Mutable light by id; invalidates the cached main group
    pub fn light_mut(&mut self, id: LightId) -> Option<&mut Light> {
        let light = self.lights.get_mut(usize::from(id.0))?;
        self.main_group = None;
        Some(light)
    }

    /// Disable a light; its id stays reserved
    pub fn remove_light(&mut self, id: LightId) -> bool {
        match self.light_mut(id) {
            Some(light) => {
                light.enabled = false;
                true
            }
            None => false,
        }
    }

    /// Number of lights ever added
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// No lights
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Frames started so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Start a frame; drops the cached main group
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.main_group = None;
    }

    /// Every enabled light, classified by category
    pub fn main_light_group(&mut self) -> &LightGroup {
        let lights = &self.lights;
        self.main_group.get_or_insert_with(|| {
            let group = Self::classify(lights.iter().enumerate().filter(|(_, l)| l.enabled));
            log::trace!("Built main light group: {} lights", group.len());
            group
        })
    }

    /// Enabled lights that can reach a bounding sphere
    ///
    /// Ambient and directional lights always qualify; point and spot
    /// lights when their range overlaps the sphere.
    pub fn light_group_for_sphere(&self, center: &Vec3, radius: f32) -> LightGroup {
        Self::classify(self.lights.iter().enumerate().filter(|(_, light)| {
            light.enabled
                && (!light.is_local()
                    || utils::spheres_overlap(&light.position, light.range, center, radius))
        }))
    }

    fn classify<'a>(lights: impl Iterator<Item = (usize, &'a Light)>) -> LightGroup {
        let mut buckets: [Vec<LightId>; LightCategory::COUNT] = Default::default();
        for (index, light) in lights {
            // Ids were range-checked by add_light
            let id = LightId(index as u16);
            buckets[light.category().index()].push(id);
        }
        LightGroup::from_buckets(&buckets)
    }
}
