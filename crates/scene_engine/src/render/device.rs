//! Immediate-mode rendering device abstraction
//!
//! The pipeline never talks to a graphics API directly. The host supplies a
//! [`RenderDevice`] whose calls are synchronous and issued from a single
//! thread; a device that cannot honour a call simply ignores it.

use bitflags::bitflags;

use crate::foundation::math::Mat4;
use crate::lighting::{Light, LightGroup, LightGroupKey, LightId, LightManager};

/// Host-side vertex array handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayId(pub u32);

/// Host-side shader program handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Host-side texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Colour targets the pipeline draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Final colour of the viewport
    Back,
    /// Accumulated diffuse lighting
    LightDiffuse,
    /// Accumulated specular lighting
    LightSpecular,
}

/// Anything that can be bound to a texture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// Material texture
    Texture(TextureId),
    /// Contents of an off-screen target
    Target(RenderTarget),
    /// Snapshot taken by [`RenderDevice::copy_background`]
    Background,
    /// Shadow map rendered for a light
    ShadowMap(LightId),
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveMode {
    /// Triangle list
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Line list
    Lines,
    /// Point list
    Points,
}

bitflags! {
    /// Buffers reset by [`RenderDevice::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Colour buffers
        const COLOR = 1 << 0;
        /// Depth buffer
        const DEPTH = 1 << 1;
    }
}

/// Blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum BlendEquation {
    /// `src + dst`
    #[default]
    Add,
    /// `src - dst`
    Subtract,
    /// `dst - src`
    ReverseSubtract,
    /// `min(src, dst)`
    Min,
    /// `max(src, dst)`
    Max,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
    /// Source colour
    SrcColor,
    /// Destination colour
    DstColor,
}

/// Blend configuration for one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlendState {
    /// Equation combining source and destination
    pub equation: BlendEquation,
    /// Source factor
    pub source: BlendFactor,
    /// Destination factor
    pub destination: BlendFactor,
}

impl BlendState {
    /// Classic alpha blending
    pub const ALPHA: Self = Self {
        equation: BlendEquation::Add,
        source: BlendFactor::SrcAlpha,
        destination: BlendFactor::OneMinusSrcAlpha,
    };

    /// Pure additive accumulation
    pub const ADDITIVE: Self = Self {
        equation: BlendEquation::Add,
        source: BlendFactor::One,
        destination: BlendFactor::One,
    };

    /// Multiply source with destination
    pub const MULTIPLY: Self = Self {
        equation: BlendEquation::Add,
        source: BlendFactor::DstColor,
        destination: BlendFactor::Zero,
    };
}

/// Geometry drawn into a shadow map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCaster {
    /// Geometry
    pub vertex_array: VertexArrayId,
    /// World transform
    pub transform: Mat4,
}

/// Externally supplied immediate-mode renderer
pub trait RenderDevice {
    /// Select the colour targets subsequent draws write to
    fn set_draw_buffers(&mut self, targets: &[RenderTarget]);

    /// Clear the bound targets
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]);

    /// Bind a shader program
    fn set_current_shader(&mut self, shader: ShaderId);

    /// Draw a vertex array with the bound state
    fn draw(&mut self, vertex_array: VertexArrayId, mode: PrimitiveMode);

    /// Enable blending with the given state, or disable it with `None`
    fn set_blend(&mut self, blend: Option<BlendState>);

    /// Depth test and depth write switches
    fn set_depth(&mut self, test: bool, write: bool);

    /// Colour write switch
    fn set_color_write(&mut self, enabled: bool);

    /// Bind a texture source to a unit
    fn bind_texture(&mut self, unit: u32, source: TextureSource);

    /// Render the shadow map of one light
    ///
    /// May clobber the draw buffers and raster state; the pipeline restores
    /// them afterwards.
    fn render_shadow_map(&mut self, id: LightId, light: &Light, casters: &[ShadowCaster]);

    /// Snapshot the current back target into [`TextureSource::Background`]
    fn copy_background(&mut self);

    /// Variant of `shader` compiled for a light-group layout
    ///
    /// `None` means the variant is unavailable and the draw is skipped.
    fn light_group_shader(&mut self, shader: ShaderId, key: LightGroupKey) -> Option<ShaderId>;

    /// Upload the lights used by subsequent draws; ids resolve through `lights`
    fn set_light_group(&mut self, group: &LightGroup, lights: &LightManager);

    /// Model transform for subsequent draws
    fn set_transform(&mut self, transform: &Mat4);
}
