//! Renderable mesh instances
//!
//! A mesh here is a reference to host geometry (a vertex array) plus the
//! material and world transform used to draw it. Vertex data itself lives
//! on the host side of the [`super::RenderDevice`].

use bitflags::bitflags;

use super::device::{PrimitiveMode, VertexArrayId};
use super::material::MaterialKey;
use crate::foundation::math::{Mat4, Vec3};

slotmap::new_key_type! {
    /// Handle to a mesh in a [`super::RenderResources`] store
    pub struct MeshKey;
}

bitflags! {
    /// Per-mesh render switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MeshFlags: u8 {
        /// Skips the depth pre-pass and is drawn after the opaque passes
        const NO_DEPTH_WRITE = 1 << 0;
        /// Drawn into shadow maps
        const CASTS_SHADOW = 1 << 1;
        /// Excluded from rendering
        const HIDDEN = 1 << 2;
    }
}

/// Drawable instance of host geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Debug name
    pub name: String,
    /// Host geometry; `None` until the host has uploaded it
    pub vertex_array: Option<VertexArrayId>,
    /// Primitive assembly mode
    pub mode: PrimitiveMode,
    /// Material used by every stage
    pub material: MaterialKey,
    /// World transform
    pub transform: Mat4,
    /// Bounding sphere radius around the transform origin
    pub bounding_radius: f32,
    /// Render switches
    pub flags: MeshFlags,
}

impl Mesh {
    /// Create a mesh at the origin
    pub fn new(name: impl Into<String>, vertex_array: Option<VertexArrayId>, material: MaterialKey) -> Self {
        Self {
            name: name.into(),
            vertex_array,
            mode: PrimitiveMode::Triangles,
            material,
            transform: Mat4::identity(),
            bounding_radius: 1.0,
            flags: MeshFlags::CASTS_SHADOW,
        }
    }

    /// Set the world transform
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Place the mesh at a position
    pub fn at(self, position: Vec3) -> Self {
        self.with_transform(Mat4::new_translation(&position))
    }

    /// Replace the render switches
    pub fn with_flags(mut self, flags: MeshFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the bounding sphere radius
    pub fn with_bounding_radius(mut self, radius: f32) -> Self {
        self.bounding_radius = radius;
        self
    }

    /// World-space origin of the mesh
    pub fn position(&self) -> Vec3 {
        Vec3::new(
            self.transform[(0, 3)],
            self.transform[(1, 3)],
            self.transform[(2, 3)],
        )
    }

    /// Excluded from rendering
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(MeshFlags::HIDDEN)
    }
}
