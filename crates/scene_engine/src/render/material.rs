//! Material system for rendering
//!
//! A material names the shader used by each pipeline stage plus the state
//! the transparent pass needs. Missing shaders are allowed: draws that need
//! one are skipped for that stage.

use bitflags::bitflags;

use super::device::{BlendState, ShaderId, TextureId};

slotmap::new_key_type! {
    /// Handle to a material in a [`super::RenderResources`] store
    pub struct MaterialKey;
}

bitflags! {
    /// Material behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u8 {
        /// Rendered in the sorted transparent pass
        const TRANSPARENT = 1 << 0;
        /// Samples a snapshot of the background before drawing
        const REFRACTIVE = 1 << 1;
        /// Rendered after every other object of its kind
        const DRAW_LAST = 1 << 2;
    }
}

/// Material properties for multi-pass rendering
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Debug name
    pub name: String,
    /// Depth pre-pass shader
    pub depth_shader: Option<ShaderId>,
    /// Lighting accumulation shader; specialised per light-group layout
    pub lighting_shader: Option<ShaderId>,
    /// Final colour shader; specialised per light-group layout when transparent
    pub material_shader: Option<ShaderId>,
    /// Blend state for the transparent pass
    pub blend: BlendState,
    /// Textures bound from unit 4 upwards
    pub textures: Vec<TextureId>,
    /// Behaviour switches
    pub flags: MaterialFlags,
}

impl Material {
    /// Create an opaque material with no shaders
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depth_shader: None,
            lighting_shader: None,
            material_shader: None,
            blend: BlendState::ALPHA,
            textures: Vec::new(),
            flags: MaterialFlags::empty(),
        }
    }

    /// Opaque material using the same shader family for every stage
    pub fn opaque(name: impl Into<String>, depth: ShaderId, lighting: ShaderId, material: ShaderId) -> Self {
        Self::new(name)
            .with_depth_shader(depth)
            .with_lighting_shader(lighting)
            .with_material_shader(material)
    }

    /// Transparent material drawn with `blend`
    pub fn transparent(name: impl Into<String>, material: ShaderId, blend: BlendState) -> Self {
        let mut result = Self::new(name).with_material_shader(material);
        result.blend = blend;
        result.flags |= MaterialFlags::TRANSPARENT;
        result
    }

    /// Set the depth pre-pass shader
    pub fn with_depth_shader(mut self, shader: ShaderId) -> Self {
        self.depth_shader = Some(shader);
        self
    }

    /// Set the lighting shader
    pub fn with_lighting_shader(mut self, shader: ShaderId) -> Self {
        self.lighting_shader = Some(shader);
        self
    }

    /// Set the final colour shader
    pub fn with_material_shader(mut self, shader: ShaderId) -> Self {
        self.material_shader = Some(shader);
        self
    }

    /// Add behaviour switches
    pub fn with_flags(mut self, flags: MaterialFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Add a texture
    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.textures.push(texture);
        self
    }

    /// Rendered in the transparent pass
    pub fn is_transparent(&self) -> bool {
        self.flags.contains(MaterialFlags::TRANSPARENT)
    }

    /// Needs a background snapshot
    pub fn is_refractive(&self) -> bool {
        self.flags.contains(MaterialFlags::REFRACTIVE)
    }

    /// Deferred to the end of its pass
    pub fn draws_last(&self) -> bool {
        self.flags.contains(MaterialFlags::DRAW_LAST)
    }
}
