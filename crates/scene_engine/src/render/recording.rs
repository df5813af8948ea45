//! Headless device that records every call
//!
//! Useful for tests, tooling and running the engine without a GPU. Every
//! command is also logged at trace level.

use std::collections::HashSet;

use super::device::{
    BlendState, ClearFlags, PrimitiveMode, RenderDevice, RenderTarget, ShaderId, ShadowCaster,
    TextureSource, VertexArrayId,
};
use crate::foundation::math::Mat4;
use crate::lighting::{Light, LightGroup, LightGroupKey, LightId, LightManager};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// [`RenderDevice::set_draw_buffers`]
    SetDrawBuffers(Vec<RenderTarget>),
    /// [`RenderDevice::clear`]
    Clear(ClearFlags),
    /// [`RenderDevice::set_current_shader`]
    SetShader(ShaderId),
    /// [`RenderDevice::draw`]
    Draw(VertexArrayId, PrimitiveMode),
    /// [`RenderDevice::set_blend`]
    SetBlend(Option<BlendState>),
    /// [`RenderDevice::set_depth`]
    SetDepth {
        /// Depth test
        test: bool,
        /// Depth write
        write: bool,
    },
    /// [`RenderDevice::set_color_write`]
    SetColorWrite(bool),
    /// [`RenderDevice::bind_texture`]
    BindTexture(u32, TextureSource),
    /// [`RenderDevice::render_shadow_map`]
    RenderShadowMap(LightId, usize),
    /// [`RenderDevice::copy_background`]
    CopyBackground,
    /// [`RenderDevice::set_light_group`]
    SetLightGroup(LightGroupKey, Vec<LightId>),
    /// [`RenderDevice::set_transform`]
    SetTransform(Mat4),
}

/// [`RenderDevice`] that stores its calls instead of drawing
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    unavailable: HashSet<ShaderId>,
}

impl RecordingDevice {
    /// Create a device with every shader variant available
    pub fn new() -> Self {
        Self::default()
    }

    /// Report no light-group variants for `shader`
    pub fn with_unavailable_shader(mut self, shader: ShaderId) -> Self {
        self.unavailable.insert(shader);
        self
    }

    /// Recorded calls, oldest first
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drain the recorded calls
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Vertex arrays drawn, in order
    pub fn draws(&self) -> Vec<VertexArrayId> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Draw(vertex_array, _) => Some(*vertex_array),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }

    fn record(&mut self, command: DeviceCommand) {
        log::trace!("device: {:?}", command);
        self.commands.push(command);
    }
}

impl RenderDevice for RecordingDevice {
    fn set_draw_buffers(&mut self, targets: &[RenderTarget]) {
        self.record(DeviceCommand::SetDrawBuffers(targets.to_vec()));
    }

    fn clear(&mut self, flags: ClearFlags, _color: [f32; 4]) {
        self.record(DeviceCommand::Clear(flags));
    }

    fn set_current_shader(&mut self, shader: ShaderId) {
        self.record(DeviceCommand::SetShader(shader));
    }

    fn draw(&mut self, vertex_array: VertexArrayId, mode: PrimitiveMode) {
        self.record(DeviceCommand::Draw(vertex_array, mode));
    }

    fn set_blend(&mut self, blend: Option<BlendState>) {
        self.record(DeviceCommand::SetBlend(blend));
    }

    fn set_depth(&mut self, test: bool, write: bool) {
        self.record(DeviceCommand::SetDepth { test, write });
    }

    fn set_color_write(&mut self, enabled: bool) {
        self.record(DeviceCommand::SetColorWrite(enabled));
    }

    fn bind_texture(&mut self, unit: u32, source: TextureSource) {
        self.record(DeviceCommand::BindTexture(unit, source));
    }

    fn render_shadow_map(&mut self, id: LightId, _light: &Light, casters: &[ShadowCaster]) {
        self.record(DeviceCommand::RenderShadowMap(id, casters.len()));
    }

    fn copy_background(&mut self) {
        self.record(DeviceCommand::CopyBackground);
    }

    fn light_group_shader(&mut self, shader: ShaderId, _key: LightGroupKey) -> Option<ShaderId> {
        (!self.unavailable.contains(&shader)).then_some(shader)
    }

    fn set_light_group(&mut self, group: &LightGroup, _lights: &LightManager) {
        self.record(DeviceCommand::SetLightGroup(group.key(), group.ids().to_vec()));
    }

    fn set_transform(&mut self, transform: &Mat4) {
        self.record(DeviceCommand::SetTransform(*transform));
    }
}
