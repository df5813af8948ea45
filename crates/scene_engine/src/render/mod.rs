//! # Rendering System
//!
//! Multi-pass, per-viewport rendering over an abstract [`RenderDevice`].
//!
//! ## Architecture
//!
//! - **Device**: the host graphics layer, reached only through [`RenderDevice`]
//! - **Resources**: meshes and materials in a [`RenderResources`] store
//! - **Visibility**: a [`VisibilityProcessor`] buckets what a [`Viewport`] sees
//! - **Pipeline**: [`RenderPipeline`] runs the [`RenderPass`] stages in order
//!
//! Lighting is accumulated additively into the diffuse and specular targets
//! one light sub-group at a time, then resolved by each material's final
//! shader. Transparent meshes are lit forward and drawn back to front.

pub mod device;
pub mod material;
pub mod mesh;
pub mod passes;
pub mod pipeline;
pub mod recording;
pub mod store;
pub mod visibility;

pub use device::{
    BlendEquation, BlendFactor, BlendState, ClearFlags, PrimitiveMode, RenderDevice, RenderTarget,
    ShaderId, ShadowCaster, TextureId, TextureSource, VertexArrayId,
};
pub use material::{Material, MaterialFlags, MaterialKey};
pub use mesh::{Mesh, MeshFlags, MeshKey};
pub use passes::{
    ClearPass, DeferredNoDepthWritePass, DepthPrepass, DrawItem, FrameContext, OpaqueLightingPass,
    OpaqueMaterialPass, RenderPass, TransparentPass,
};
pub use pipeline::{FrameStats, RenderPipeline, RenderStage};
pub use recording::{DeviceCommand, RecordingDevice};
pub use store::RenderResources;
pub use visibility::{BucketingVisibility, Viewport, VisibilityProcessor, VisibleObjects};
