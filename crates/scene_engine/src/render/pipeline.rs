//! Per-viewport multi-pass pipeline
//!
//! ```text
//! Clear → DepthPrepass → OpaqueLighting → OpaqueMaterial
//!       → DeferredNoDepthWrite → Transparent
//! ```
//!
//! A frame runs to completion on the calling thread. There is no retry:
//! draws that cannot be issued are skipped and counted in [`FrameStats`].

use super::device::RenderDevice;
use super::passes::{
    ClearPass, DeferredNoDepthWritePass, DepthPrepass, FrameContext, OpaqueLightingPass,
    OpaqueMaterialPass, RenderPass, TransparentPass,
};
use super::store::RenderResources;
use super::visibility::{Viewport, VisibleObjects};
use crate::core::config::RenderConfig;
use crate::lighting::{LightCostTable, LightManager};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    /// Back target cleared
    Clear,
    /// Opaque depth written, colour writes off
    DepthPrepass,
    /// Shadow maps and light accumulation
    OpaqueLighting,
    /// Final colour from accumulated lighting
    OpaqueMaterial,
    /// Meshes that skipped the depth pre-pass
    DeferredNoDepthWrite,
    /// Sorted transparent meshes
    Transparent,
}

/// Counters for one rendered viewport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls issued
    pub draw_calls: usize,
    /// Draws skipped for a missing vertex array, shader or variant
    pub skipped_draws: usize,
    /// Shadow maps rendered
    pub shadow_maps: usize,
    /// Light sub-groups accumulated
    pub light_sub_groups: usize,
    /// Stages run, in order
    pub stages: Vec<RenderStage>,
}

/// Ordered list of passes plus the settings they run with
pub struct RenderPipeline {
    passes: Vec<Box<dyn RenderPass>>,
    config: RenderConfig,
    costs: LightCostTable,
    frames: u64,
}

impl RenderPipeline {
    /// Standard six-stage pipeline
    pub fn new(config: RenderConfig, costs: LightCostTable) -> Self {
        let passes: Vec<Box<dyn RenderPass>> = vec![
            Box::new(ClearPass),
            Box::new(DepthPrepass),
            Box::new(OpaqueLightingPass),
            Box::new(OpaqueMaterialPass),
            Box::new(DeferredNoDepthWritePass),
            Box::new(TransparentPass),
        ];
        log::debug!(
            "Render pipeline: {} passes, split shadows {}, shadows {}",
            passes.len(),
            config.split_shadow_lights,
            config.shadows_enabled
        );
        Self {
            passes,
            config,
            costs,
            frames: 0,
        }
    }

    /// Current settings
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replace the settings; takes effect next frame
    pub fn set_config(&mut self, config: RenderConfig) {
        self.config = config;
    }

    /// Light cost table used for subdivision
    pub fn costs(&self) -> &LightCostTable {
        &self.costs
    }

    /// Names of the passes in execution order
    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Frames rendered
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Render one viewport
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        viewport: &Viewport,
        visible: &VisibleObjects,
        resources: &RenderResources,
        lights: &mut LightManager,
    ) -> FrameStats {
        self.frames += 1;
        let main_group = lights.main_light_group().clone();
        let lights: &LightManager = lights;

        let mut frame = FrameContext::new(
            device,
            viewport,
            visible,
            resources,
            lights,
            &main_group,
            &self.config,
            &self.costs,
        );
        for pass in &self.passes {
            log::trace!("Frame {}: {}", self.frames, pass.name());
            frame.stats.stages.push(pass.stage());
            pass.run(&mut frame);
        }

        let stats = frame.stats;
        log::trace!(
            "Frame {}: {} draws, {} skipped, {} shadow maps, {} light sub-groups",
            self.frames,
            stats.draw_calls,
            stats.skipped_draws,
            stats.shadow_maps,
            stats.light_sub_groups
        );
        stats
    }
}
