//! Pipeline stages
//!
//! Each stage is a [`RenderPass`] run against a shared [`FrameContext`].
//! Stages only issue device calls; anything they cannot draw (no vertex
//! array, no shader, no shader variant) is skipped and counted.

use super::device::{
    BlendState, ClearFlags, RenderDevice, RenderTarget, ShaderId, ShadowCaster, TextureSource,
};
use super::material::MaterialKey;
use super::mesh::{MeshFlags, MeshKey};
use super::pipeline::{FrameStats, RenderStage};
use super::store::RenderResources;
use super::visibility::{Viewport, VisibleObjects};
use crate::core::config::RenderConfig;
use crate::lighting::{
    subdivide, LightCategory, LightCostTable, LightGroup, LightId, LightManager,
    SubdivisionPolicy,
};

const DIFFUSE_UNIT: u32 = 0;
const SPECULAR_UNIT: u32 = 1;
const BACKGROUND_UNIT: u32 = 2;
const MATERIAL_TEXTURE_UNIT: u32 = 4;

/// One mesh queued for drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawItem {
    /// Mesh to draw
    pub mesh: MeshKey,
    /// Its material
    pub material: MaterialKey,
}

/// Everything a stage needs to render one viewport
pub struct FrameContext<'a> {
    /// Target device
    pub device: &'a mut dyn RenderDevice,
    /// Viewport being rendered
    pub viewport: &'a Viewport,
    /// Mesh and material store
    pub resources: &'a RenderResources,
    /// Light store
    pub lights: &'a LightManager,
    /// Every enabled light of the frame
    pub main_group: &'a LightGroup,
    /// Pipeline switches
    pub config: &'a RenderConfig,
    /// Light cost table for subdivision
    pub costs: &'a LightCostTable,
    /// Opaque meshes that write depth, in draw order
    pub opaque: Vec<DrawItem>,
    /// Opaque meshes flagged `NO_DEPTH_WRITE`, drawn after the opaque passes
    pub deferred: Vec<DrawItem>,
    /// Transparent meshes, draw-last ones at the end
    pub transparent: Vec<DrawItem>,
    /// Index into `transparent` where the draw-last meshes begin
    pub transparent_last_start: usize,
    /// Shadow maps of every shadow light have been rendered this frame
    pub shadow_maps_ready: bool,
    /// Counters
    pub stats: FrameStats,
}

impl<'a> FrameContext<'a> {
    /// Split the visible lists into per-stage draw lists
    pub fn new(
        device: &'a mut dyn RenderDevice,
        viewport: &'a Viewport,
        visible: &VisibleObjects,
        resources: &'a RenderResources,
        lights: &'a LightManager,
        main_group: &'a LightGroup,
        config: &'a RenderConfig,
        costs: &'a LightCostTable,
    ) -> Self {
        let mut opaque = Vec::new();
        let mut deferred = Vec::new();
        for (material, meshes) in visible.opaque.iter().chain(visible.opaque_last.iter()) {
            for &mesh in meshes {
                let Some(instance) = resources.mesh(mesh) else {
                    log::debug!("Visible mesh {:?} no longer exists", mesh);
                    continue;
                };
                let item = DrawItem {
                    mesh,
                    material: *material,
                };
                if instance.flags.contains(MeshFlags::NO_DEPTH_WRITE) {
                    deferred.push(item);
                } else {
                    opaque.push(item);
                }
            }
        }

        let transparent_items = |keys: &[MeshKey]| -> Vec<DrawItem> {
            keys.iter()
                .filter_map(|&mesh| {
                    let instance = resources.mesh(mesh)?;
                    Some(DrawItem {
                        mesh,
                        material: instance.material,
                    })
                })
                .collect()
        };
        let mut transparent = transparent_items(&visible.transparent);
        let transparent_last_start = transparent.len();
        transparent.extend(transparent_items(&visible.transparent_last));

        Self {
            device,
            viewport,
            resources,
            lights,
            main_group,
            config,
            costs,
            opaque,
            deferred,
            transparent,
            transparent_last_start,
            shadow_maps_ready: false,
            stats: FrameStats::default(),
        }
    }

    /// Draw one mesh with a shader, skipping it if anything is missing
    fn draw_mesh(&mut self, mesh: MeshKey, shader: Option<ShaderId>) -> bool {
        let Some(instance) = self.resources.mesh(mesh) else {
            self.stats.skipped_draws += 1;
            return false;
        };
        let (Some(vertex_array), Some(shader)) = (instance.vertex_array, shader) else {
            log::debug!(
                "Skipping draw of '{}': vertex array {:?}, shader {:?}",
                instance.name,
                instance.vertex_array,
                shader
            );
            self.stats.skipped_draws += 1;
            return false;
        };

        self.device.set_current_shader(shader);
        self.device.set_transform(&instance.transform);
        self.device.draw(vertex_array, instance.mode);
        self.stats.draw_calls += 1;
        true
    }

    fn shadow_casters(&self) -> Vec<ShadowCaster> {
        self.opaque
            .iter()
            .chain(&self.deferred)
            .filter_map(|item| {
                let mesh = self.resources.mesh(item.mesh)?;
                if !mesh.flags.contains(MeshFlags::CASTS_SHADOW) {
                    return None;
                }
                Some(ShadowCaster {
                    vertex_array: mesh.vertex_array?,
                    transform: mesh.transform,
                })
            })
            .collect()
    }

    fn shadow_lights(&self) -> Vec<(LightCategory, LightId)> {
        self.main_group
            .iter()
            .filter(|(category, _)| category.is_shadow())
            .collect()
    }

    fn render_shadow_map(
        &mut self,
        category: LightCategory,
        id: LightId,
        casters: &[ShadowCaster],
    ) {
        let Some(light) = self.lights.light(id) else {
            log::debug!("Shadow light {} vanished", id.0);
            return;
        };
        log::trace!("Rendering {:?} shadow map for light {}", category, id.0);
        self.device.render_shadow_map(id, light, casters);
        self.stats.shadow_maps += 1;
    }

    fn render_all_shadow_maps(&mut self) {
        if self.shadow_maps_ready {
            return;
        }
        let casters = self.shadow_casters();
        for (category, id) in self.shadow_lights() {
            self.render_shadow_map(category, id, &casters);
        }
        self.shadow_maps_ready = true;
    }

    fn begin_light_accumulation(&mut self, clear: bool) {
        self.device
            .set_draw_buffers(&[RenderTarget::LightDiffuse, RenderTarget::LightSpecular]);
        if clear {
            self.device.clear(ClearFlags::COLOR, [0.0; 4]);
        }
        self.device.set_color_write(true);
        self.device.set_depth(true, false);
        self.device.set_blend(Some(BlendState::ADDITIVE));
    }

    /// Draw `items` once with the lighting shader specialised for `group`
    fn draw_lit(&mut self, items: &[DrawItem], group: &LightGroup) {
        self.device.set_light_group(group, self.lights);
        let key = group.key();
        let mut cached: Option<(MaterialKey, Option<ShaderId>)> = None;

        for item in items {
            let shader = match cached {
                Some((material, shader)) if material == item.material => shader,
                _ => {
                    let base = self
                        .resources
                        .material(item.material)
                        .and_then(|material| material.lighting_shader);
                    let shader = base.and_then(|base| self.device.light_group_shader(base, key));
                    cached = Some((item.material, shader));
                    shader
                }
            };
            self.draw_mesh(item.mesh, shader);
        }
    }

    /// Accumulate diffuse and specular lighting for `items`
    pub fn accumulate_lighting(&mut self, items: &[DrawItem]) {
        if items.is_empty() {
            return;
        }

        let policy = if !self.config.shadows_enabled {
            SubdivisionPolicy::CONVERT_SHADOW_LIGHTS
        } else if self.config.split_shadow_lights {
            SubdivisionPolicy::NO_SHADOW_LIGHTS
        } else {
            self.render_all_shadow_maps();
            SubdivisionPolicy::empty()
        };

        let sub_groups = subdivide(self.main_group, policy, self.costs);
        self.stats.light_sub_groups += sub_groups.len();
        self.begin_light_accumulation(true);
        for sub_group in &sub_groups {
            self.draw_lit(items, &sub_group.group);
        }

        if self.config.shadows_enabled && self.config.split_shadow_lights {
            let casters = self.shadow_casters();
            for (category, id) in self.shadow_lights() {
                self.render_shadow_map(category, id, &casters);
                self.begin_light_accumulation(false);
                let mut single = LightGroup::new();
                single.insert(category, id);
                self.stats.light_sub_groups += 1;
                self.draw_lit(items, &single);
            }
        }
    }

    /// Resolve accumulated lighting into final colour for `items`
    pub fn resolve_materials(&mut self, items: &[DrawItem]) {
        if items.is_empty() {
            return;
        }

        self.device.set_draw_buffers(&[RenderTarget::Back]);
        self.device.set_color_write(true);
        self.device.set_depth(true, false);
        self.device.set_blend(None);
        self.device
            .bind_texture(DIFFUSE_UNIT, TextureSource::Target(RenderTarget::LightDiffuse));
        self.device
            .bind_texture(SPECULAR_UNIT, TextureSource::Target(RenderTarget::LightSpecular));

        let resources = self.resources;
        let mut bound: Option<MaterialKey> = None;
        for item in items {
            let material = resources.material(item.material);
            if bound != Some(item.material) {
                if let Some(material) = material {
                    for (unit, texture) in (MATERIAL_TEXTURE_UNIT..).zip(&material.textures) {
                        self.device.bind_texture(unit, TextureSource::Texture(*texture));
                    }
                }
                bound = Some(item.material);
            }
            self.draw_mesh(item.mesh, material.and_then(|m| m.material_shader));
        }
    }

    /// Transparent meshes back to front, draw-last group after the rest
    fn sorted_transparent(&self) -> Vec<DrawItem> {
        let by_distance = |items: &[DrawItem]| -> Vec<DrawItem> {
            let mut keyed: Vec<(f32, DrawItem)> = items
                .iter()
                .filter_map(|item| {
                    let mesh = self.resources.mesh(item.mesh)?;
                    Some((self.viewport.distance_to(&mesh.position()), *item))
                })
                .collect();
            keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
            keyed.into_iter().map(|(_, item)| item).collect()
        };

        let (regular, last) = self.transparent.split_at(self.transparent_last_start);
        let mut sorted = by_distance(regular);
        sorted.extend(by_distance(last));
        sorted
    }
}

/// A stage of the per-viewport pipeline
pub trait RenderPass {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Stage this pass implements
    fn stage(&self) -> RenderStage;

    /// Issue the stage's device calls
    fn run(&self, frame: &mut FrameContext<'_>);
}

/// Clears colour and depth of the back target
pub struct ClearPass;

impl RenderPass for ClearPass {
    fn name(&self) -> &str {
        "clear"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::Clear
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        frame.device.set_draw_buffers(&[RenderTarget::Back]);
        frame.device.set_color_write(true);
        frame.device.set_depth(true, true);
        frame
            .device
            .clear(ClearFlags::COLOR | ClearFlags::DEPTH, frame.config.clear_color);
    }
}

/// Writes opaque depth with colour writes off
pub struct DepthPrepass;

impl RenderPass for DepthPrepass {
    fn name(&self) -> &str {
        "depth-prepass"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::DepthPrepass
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        if frame.opaque.is_empty() {
            return;
        }
        frame.device.set_draw_buffers(&[RenderTarget::Back]);
        frame.device.set_color_write(false);
        frame.device.set_depth(true, true);
        frame.device.set_blend(None);

        let items = frame.opaque.clone();
        for item in &items {
            let shader = frame
                .resources
                .material(item.material)
                .and_then(|material| material.depth_shader);
            frame.draw_mesh(item.mesh, shader);
        }
        frame.device.set_color_write(true);
    }
}

/// Shadow maps and additive light accumulation for opaque meshes
pub struct OpaqueLightingPass;

impl RenderPass for OpaqueLightingPass {
    fn name(&self) -> &str {
        "opaque-lighting"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::OpaqueLighting
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        let items = frame.opaque.clone();
        frame.accumulate_lighting(&items);
    }
}

/// Final colour for opaque meshes from the lighting targets
pub struct OpaqueMaterialPass;

impl RenderPass for OpaqueMaterialPass {
    fn name(&self) -> &str {
        "opaque-material"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::OpaqueMaterial
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        let items = frame.opaque.clone();
        frame.resolve_materials(&items);
    }
}

/// Lighting and material for meshes that skipped the depth pre-pass
pub struct DeferredNoDepthWritePass;

impl RenderPass for DeferredNoDepthWritePass {
    fn name(&self) -> &str {
        "deferred-no-depth-write"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::DeferredNoDepthWrite
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        let items = frame.deferred.clone();
        frame.accumulate_lighting(&items);
        frame.resolve_materials(&items);
    }
}

/// Sorted, blended transparent meshes
pub struct TransparentPass;

impl RenderPass for TransparentPass {
    fn name(&self) -> &str {
        "transparent"
    }

    fn stage(&self) -> RenderStage {
        RenderStage::Transparent
    }

    fn run(&self, frame: &mut FrameContext<'_>) {
        if frame.transparent.is_empty() {
            return;
        }

        // Shadowed lighting needs maps rendered by an earlier stage
        let policy = if frame.shadow_maps_ready {
            SubdivisionPolicy::empty()
        } else {
            SubdivisionPolicy::CONVERT_SHADOW_LIGHTS
        };
        let sub_groups = subdivide(frame.main_group, policy, frame.costs);
        let resources = frame.resources;

        frame.device.set_draw_buffers(&[RenderTarget::Back]);
        frame.device.set_color_write(true);
        frame.device.set_depth(true, false);

        for item in frame.sorted_transparent() {
            let Some(material) = resources.material(item.material) else {
                frame.stats.skipped_draws += 1;
                continue;
            };
            if material.is_refractive() {
                frame.device.copy_background();
                frame
                    .device
                    .bind_texture(BACKGROUND_UNIT, TextureSource::Background);
            }
            for (unit, texture) in (MATERIAL_TEXTURE_UNIT..).zip(&material.textures) {
                frame.device.bind_texture(unit, TextureSource::Texture(*texture));
            }

            for (pass, sub_group) in sub_groups.iter().enumerate() {
                let blend = if pass == 0 {
                    material.blend
                } else {
                    BlendState::ADDITIVE
                };
                frame.device.set_blend(Some(blend));
                frame.device.set_light_group(&sub_group.group, frame.lights);
                let key = sub_group.group.key();
                let shader = material
                    .material_shader
                    .and_then(|shader| frame.device.light_group_shader(shader, key));
                frame.draw_mesh(item.mesh, shader);
            }
        }
        frame.device.set_blend(None);
    }
}
