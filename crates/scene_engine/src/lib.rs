//! # Scene Engine
//!
//! The engineering core of a 3D game engine: a scene node runtime, light
//! management with budgeted light-group subdivision, and a multi-pass
//! renderer over an abstract device.
//!
//! ## Features
//!
//! - **Scene Runtime**: chunked node storage, components, parallel stepping
//!   with structural changes buffered to an end-of-step barrier
//! - **Lighting**: category-ordered light groups split into passes that fit
//!   a shader cost budget
//! - **Rendering**: depth pre-pass, additive light accumulation, material
//!   resolve and sorted transparency through [`render::RenderDevice`]
//! - **Assets**: forward-compatible chunked binary model files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut engine = Engine::new(EngineConfig::default(), ComponentRegistry::new())?;
//!     engine.scene_mut().create_scene_node(1, "player")?;
//!     engine.scene_mut().insert(1)?;
//!
//!     let mut device = RecordingDevice::new();
//!     let report = engine.frame(1.0 / 60.0, &Viewport::default(), &mut device);
//!     println!("{} nodes stepped", report.step.visited);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

// Subsystems
pub mod assets;
pub mod lighting;
pub mod render;
pub mod scene;

mod application;
mod engine;

pub use application::{AppError, Application};
pub use engine::{Engine, EngineError, FrameReport};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{ChunkError, ModelDefinition},
        core::config::{Config, EngineConfig, RenderConfig, SceneConfig},
        foundation::{
            math::{Mat4, Quat, Transform, Vec3},
            time::{Stopwatch, Timer},
        },
        lighting::{Light, LightCostTable, LightGroup, LightId, LightManager},
        render::{
            BlendState, Material, MaterialFlags, Mesh, MeshFlags, RecordingDevice, RenderDevice,
            RenderPipeline, RenderResources, ShaderId, VertexArrayId, Viewport,
        },
        scene::{
            Component, ComponentRegistry, ComponentType, ComponentTypeId, NodeContext, SceneState,
            StepContext,
        },
        AppError, Application, Engine, EngineError, FrameReport,
    };
}
